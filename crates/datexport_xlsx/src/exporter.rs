//! Export orchestration: binding validation, fetching, payload building
//! and workbook rendering.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Local, NaiveDate};
use log::{debug, info, warn};

use crate::conf::C_FIELD_COUNTER;
use crate::source::DataSource;
use crate::spec::{
    DataExportError, Result, SpecExecuteOptions, SpecExportPayload, SpecExportReport,
    SpecExportSettings, SpecExportTemplate, SpecGridBinding, SpecRecord,
};
use crate::template::TemplateSource;
use crate::util::{
    collect_template_directives, derive_counter_cell, derive_export_file_name,
    derive_filter_summary, flatten_hierarchy, format_field_value,
};
use crate::writer::XlsxExportWriter;

/// Finished export.
#[derive(Debug, Clone)]
pub struct SpecExportArtifact {
    /// Download file name: sheet name plus `.xlsx`.
    pub file_name: String,
    /// Workbook bytes.
    pub bytes: Vec<u8>,
    /// Layout and warnings of the written sheet.
    pub report: SpecExportReport,
}

impl SpecExportArtifact {
    /// Write the workbook into `dir` and return its path.
    pub async fn save_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        tokio::fs::write(&path, &self.bytes).await?;
        info!("saved {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

/// Counts one running export for its lifetime.
struct BusyGuard {
    n_in_flight: Arc<AtomicUsize>,
}

impl BusyGuard {
    fn new(n_in_flight: Arc<AtomicUsize>) -> Self {
        n_in_flight.fetch_add(1, Ordering::SeqCst);
        Self { n_in_flight }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.n_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Grid exporter bound to one data source and one template source.
pub struct DataExporter<S, T> {
    source: S,
    template_source: T,
    binding: SpecGridBinding,
    settings: SpecExportSettings,
    date_export: Option<NaiveDate>,
    n_in_flight: Arc<AtomicUsize>,
}

impl<S: DataSource, T: TemplateSource> DataExporter<S, T> {
    /// Create an exporter.
    pub fn new(
        source: S,
        template_source: T,
        binding: SpecGridBinding,
        settings: SpecExportSettings,
    ) -> Self {
        Self {
            source,
            template_source,
            binding,
            settings,
            date_export: None,
            n_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fix the export date shown in the filter summary (today by default).
    pub fn with_export_date(mut self, date_export: NaiveDate) -> Self {
        self.date_export = Some(date_export);
        self
    }

    /// Whether at least one export is running.
    pub fn is_busy(&self) -> bool {
        self.n_in_flight.load(Ordering::SeqCst) > 0
    }

    /// Run one export.
    ///
    /// The binding is validated before anything is fetched. Any failure
    /// aborts the export and is returned as is.
    pub async fn export_to_xlsx(&self) -> Result<SpecExportArtifact> {
        let _guard = BusyGuard::new(Arc::clone(&self.n_in_flight));
        validate_grid_binding(&self.binding)?;

        let template = self.template_source.fetch_template().await?;
        let result = self
            .source
            .execute(&self.settings.source_args, SpecExecuteOptions::default())
            .await?;
        info!(
            "exporting {} records of {:?}",
            result.data.len(),
            self.settings.sheet_name
        );

        let date_export = self
            .date_export
            .unwrap_or_else(|| Local::now().date_naive());
        let payload = build_export_payload(
            &self.binding,
            &self.settings,
            &template,
            &result.data,
            date_export,
        );

        let mut writer = XlsxExportWriter::new(template);
        let report = writer.write_payload(&payload, &self.settings.labels)?;
        let bytes = writer.save_to_buffer()?;
        for c_warning in &report.warnings {
            warn!("{c_warning}");
        }

        Ok(SpecExportArtifact {
            file_name: derive_export_file_name(&self.settings.sheet_name),
            bytes,
            report,
        })
    }
}

/// Reject bindings that cannot be exported.
pub fn validate_grid_binding(binding: &SpecGridBinding) -> Result<()> {
    if let Some(tree) = &binding.tree {
        if tree.key.trim().is_empty() || tree.pkey.trim().is_empty() {
            return Err(DataExportError::Binding(
                "tree grid requires non-empty key and parent key field names".to_string(),
            ));
        }
    }
    if let Some(n_idx) = binding
        .columns
        .iter()
        .position(|col| !col.hidden && col.field.trim().is_empty())
    {
        return Err(DataExportError::Binding(format!(
            "visible column #{n_idx} has no field name"
        )));
    }
    Ok(())
}

/// Shape fetched records into the writer payload.
///
/// Tree grids are flattened first; the counter column is always first.
pub fn build_export_payload(
    binding: &SpecGridBinding,
    settings: &SpecExportSettings,
    template: &SpecExportTemplate,
    records: &[SpecRecord],
    date_export: NaiveDate,
) -> SpecExportPayload {
    let labels = &settings.labels;
    let l_columns: Vec<_> = binding.columns.iter().filter(|col| !col.hidden).collect();

    let mut fields = vec![C_FIELD_COUNTER.to_string()];
    let mut names = vec![labels.counter_header.clone()];
    let mut widths = vec![template.width_px_counter];
    for col in &l_columns {
        fields.push(col.field.clone());
        names.push(col.header.clone());
        widths.push(
            col.width
                .or(col.width_calculated)
                .unwrap_or(template.width_px_default),
        );
    }

    let l_records_flat;
    let l_records = match &binding.tree {
        Some(tree) => {
            l_records_flat = flatten_hierarchy(records, &tree.key, &tree.pkey);
            &l_records_flat[..]
        }
        None => records,
    };

    let mut n_counter_next = 1;
    let rows = l_records
        .iter()
        .map(|record| {
            let mut l_row = Vec::with_capacity(fields.len());
            l_row.push(derive_counter_cell(
                record,
                &mut n_counter_next,
                &labels.boolean_names,
            ));
            for col in &l_columns {
                l_row.push(format_field_value(
                    record.get(&col.field),
                    &labels.boolean_names,
                ));
            }
            l_row
        })
        .collect::<Vec<_>>();
    debug!("built {} rows x {} columns", rows.len(), fields.len());

    SpecExportPayload {
        sheet_name: settings.sheet_name.clone(),
        rows,
        names,
        fields,
        filters: derive_filter_summary(
            settings.export_title.as_deref(),
            &settings.filters,
            date_export,
            labels,
        ),
        widths,
        directives: collect_template_directives(&settings.directives),
    }
}
