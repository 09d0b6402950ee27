use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use datexport_xlsx::spec::{
    DataExportError, EnumDirectiveKind, EnumFieldValue, Result as ExportResult,
    SpecColumnDescriptor, SpecDirectiveDecl, SpecExportLabels, SpecExportSettings,
    SpecExportTemplate, SpecFilterItem, SpecGridBinding, SpecTreeKeys,
};
use datexport_xlsx::{
    BuiltinTemplateSource, DataExporter, JsonTemplateSource, PolarsIpcSource, TemplateSource,
    XlsxTemplateSource, derive_column_name, render_template_workbook,
};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyAny, PyBytes, PyDict};

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "datexport.xlsx.exporter.v1";
const C_BRIDGE_TRANSPORT: &str = "arrow_ipc";

/// Template source chosen at construction time.
#[derive(Debug, Clone)]
enum EnumPyTemplateSource {
    Builtin(BuiltinTemplateSource),
    Json(JsonTemplateSource),
    Xlsx(XlsxTemplateSource),
}

impl TemplateSource for EnumPyTemplateSource {
    async fn fetch_template(&self) -> ExportResult<SpecExportTemplate> {
        match self {
            Self::Builtin(source) => source.fetch_template().await,
            Self::Json(source) => source.fetch_template().await,
            Self::Xlsx(source) => source.fetch_template().await,
        }
    }
}

#[pyclass(name = "DataExporter")]
struct PyDataExporter {
    #[pyo3(get)]
    sheet_name: String,
    binding: SpecGridBinding,
    settings: SpecExportSettings,
    template_source: EnumPyTemplateSource,
}

#[pymethods]
impl PyDataExporter {
    #[new]
    #[pyo3(signature = (
        sheet_name,
        columns,
        export_title = None,
        tree_keys = None,
        directives = None,
        filters = None,
        boolean_names = None,
        file_template = None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        sheet_name: String,
        columns: Vec<Bound<'_, PyAny>>,
        export_title: Option<String>,
        tree_keys: Option<(String, String)>,
        directives: Option<Vec<Bound<'_, PyAny>>>,
        filters: Option<Vec<Bound<'_, PyAny>>>,
        boolean_names: Option<(String, String)>,
        file_template: Option<PathBuf>,
    ) -> PyResult<Self> {
        let binding = SpecGridBinding {
            columns: columns
                .iter()
                .map(parse_spec_column_descriptor)
                .collect::<PyResult<Vec<_>>>()?,
            tree: tree_keys.map(|(key, pkey)| SpecTreeKeys { key, pkey }),
        };

        let mut labels = SpecExportLabels::default();
        if let Some((c_true, c_false)) = boolean_names {
            labels.boolean_names = [c_true, c_false];
        }

        let settings = SpecExportSettings {
            sheet_name: sheet_name.clone(),
            export_title,
            filters: filters
                .unwrap_or_default()
                .iter()
                .map(parse_spec_filter_item)
                .collect::<PyResult<Vec<_>>>()?,
            directives: directives
                .unwrap_or_default()
                .iter()
                .map(parse_spec_directive_decl)
                .collect::<PyResult<Vec<_>>>()?,
            labels,
            source_args: serde_json::Value::Null,
        };

        let template_source = match file_template {
            Some(path)
                if path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx")) =>
            {
                EnumPyTemplateSource::Xlsx(XlsxTemplateSource::new(path))
            }
            Some(path) => EnumPyTemplateSource::Json(JsonTemplateSource::new(path)),
            None => EnumPyTemplateSource::Builtin(BuiltinTemplateSource::new()),
        };

        Ok(Self {
            sheet_name,
            binding,
            settings,
            template_source,
        })
    }

    /// Export rows of an Arrow IPC payload; returns `(file_name, bytes)`.
    fn export_ipc(&self, py: Python<'_>, v_ipc_df: Vec<u8>) -> PyResult<(String, Py<PyBytes>)> {
        let exporter = self.derive_exporter(v_ipc_df);
        let artifact = py
            .allow_threads(|| block_on_export(async { exporter.export_to_xlsx().await }))
            .map_err(convert_export_error)?;
        Ok((
            artifact.file_name,
            PyBytes::new(py, &artifact.bytes).unbind(),
        ))
    }

    /// Export rows of an Arrow IPC payload into `dir_out`; returns the file path.
    fn save_ipc(&self, py: Python<'_>, v_ipc_df: Vec<u8>, dir_out: PathBuf) -> PyResult<String> {
        let exporter = self.derive_exporter(v_ipc_df);
        let path = py
            .allow_threads(|| {
                block_on_export(async {
                    let artifact = exporter.export_to_xlsx().await?;
                    artifact.save_to_dir(&dir_out).await
                })
            })
            .map_err(convert_export_error)?;
        Ok(path.to_string_lossy().into_owned())
    }
}

impl PyDataExporter {
    fn derive_exporter(
        &self,
        v_ipc_df: Vec<u8>,
    ) -> DataExporter<PolarsIpcSource, EnumPyTemplateSource> {
        DataExporter::new(
            PolarsIpcSource::new(v_ipc_df),
            self.template_source.clone(),
            self.binding.clone(),
            self.settings.clone(),
        )
    }
}

fn block_on_export<T>(fut: impl Future<Output = ExportResult<T>>) -> ExportResult<T> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(fut)
}

fn convert_export_error(err: DataExportError) -> PyErr {
    match err {
        DataExportError::Binding(_) | DataExportError::Layout(_) => {
            PyValueError::new_err(err.to_string())
        }
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

fn parse_spec_column_descriptor(obj: &Bound<'_, PyAny>) -> PyResult<SpecColumnDescriptor> {
    let Some(c_field) = extract_optional_attr::<String>(obj, "field")? else {
        return Err(PyValueError::new_err("Column descriptor requires `field`."));
    };
    Ok(SpecColumnDescriptor {
        header: extract_optional_attr::<String>(obj, "header")?
            .unwrap_or_else(|| c_field.clone()),
        field: c_field,
        width: extract_optional_attr::<f64>(obj, "width")?,
        width_calculated: extract_optional_attr::<f64>(obj, "width_calculated")?,
        hidden: extract_optional_attr::<bool>(obj, "hidden")?.unwrap_or(false),
    })
}

fn parse_spec_directive_decl(obj: &Bound<'_, PyAny>) -> PyResult<SpecDirectiveDecl> {
    let c_kind = extract_optional_attr::<String>(obj, "type")?.unwrap_or_default();
    Ok(SpecDirectiveDecl {
        kind: parse_directive_kind(&c_kind),
        label: extract_optional_attr::<String>(obj, "label")?,
        text: extract_optional_attr::<String>(obj, "text")?,
        size: extract_optional_attr::<String>(obj, "size")?,
        align: extract_optional_attr::<String>(obj, "align")?,
    })
}

fn parse_directive_kind(value: &str) -> EnumDirectiveKind {
    match value.trim().to_ascii_lowercase().as_str() {
        "title" => EnumDirectiveKind::Title,
        "new-line" | "new_line" => EnumDirectiveKind::NewLine,
        "filter" => EnumDirectiveKind::Filter,
        _ => EnumDirectiveKind::Unknown,
    }
}

fn parse_spec_filter_item(obj: &Bound<'_, PyAny>) -> PyResult<SpecFilterItem> {
    if let Ok((c_label, value)) = obj.extract::<(String, Bound<'_, PyAny>)>() {
        return Ok(SpecFilterItem {
            label: c_label,
            value: Some(parse_field_value(&value)?),
        });
    }

    let Some(c_label) = extract_optional_attr::<String>(obj, "label")? else {
        return Err(PyValueError::new_err(
            "Filter item must be (label, value) or have a `label` attribute.",
        ));
    };
    let value = match extract_optional_attr_bound(obj, "value")? {
        Some(value) => Some(parse_field_value(&value)?),
        None => None,
    };
    Ok(SpecFilterItem {
        label: c_label,
        value,
    })
}

fn parse_field_value(value: &Bound<'_, PyAny>) -> PyResult<EnumFieldValue> {
    if value.is_none() {
        return Ok(EnumFieldValue::None);
    }
    // bool first: Python bools are ints.
    if let Ok(b) = value.extract::<bool>() {
        return Ok(EnumFieldValue::Boolean(b));
    }
    if let Ok(n) = value.extract::<f64>() {
        return Ok(EnumFieldValue::Number(n));
    }
    if let Ok(c_value) = value.extract::<String>() {
        return Ok(EnumFieldValue::String(c_value));
    }
    if value.hasattr("isoformat")? {
        let c_iso = value.call_method0("isoformat")?.extract::<String>()?;
        if let Ok(dt) = NaiveDateTime::parse_from_str(&c_iso, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(EnumFieldValue::DateTime(dt));
        }
        if let Ok(date) = NaiveDate::parse_from_str(&c_iso, "%Y-%m-%d") {
            return Ok(EnumFieldValue::Date(date));
        }
    }
    Ok(EnumFieldValue::String(value.str()?.to_string()))
}

/// Attribute of `obj`, or its key when `obj` is a dict.
fn extract_optional_attr<T>(obj: &Bound<'_, PyAny>, attr: &str) -> PyResult<Option<T>>
where
    for<'a> T: FromPyObject<'a>,
{
    match extract_optional_attr_bound(obj, attr)? {
        Some(val) => Ok(Some(val.extract::<T>()?)),
        None => Ok(None),
    }
}

fn extract_optional_attr_bound<'py>(
    obj: &Bound<'py, PyAny>,
    attr: &str,
) -> PyResult<Option<Bound<'py, PyAny>>> {
    let val = if let Ok(dict) = obj.downcast::<PyDict>() {
        dict.get_item(attr)?
    } else if obj.hasattr(attr)? {
        Some(obj.getattr(attr)?)
    } else {
        None
    };
    Ok(val.filter(|val| !val.is_none()))
}

/// Spreadsheet column letters of a zero-based index.
#[pyfunction]
fn column_name(index: usize) -> String {
    derive_column_name(index)
}

/// Plural form of `number`; defaults to the built-in "entry" forms.
#[pyfunction]
#[pyo3(signature = (number, forms = None))]
fn select_plural_form(number: u64, forms: Option<Vec<String>>) -> PyResult<String> {
    let forms = match forms {
        Some(l_forms) => <[String; 3]>::try_from(l_forms)
            .map_err(|_| PyValueError::new_err("`forms` must hold exactly 3 strings."))?,
        None => SpecExportLabels::default().entry_forms,
    };
    Ok(datexport_xlsx::select_plural_form(number, &forms).to_string())
}

/// Reference template workbook bytes.
#[pyfunction]
fn render_template(py: Python<'_>) -> PyResult<Py<PyBytes>> {
    let v_bytes =
        render_template_workbook(&SpecExportTemplate::default()).map_err(convert_export_error)?;
    Ok(PyBytes::new(py, &v_bytes).unbind())
}

#[pymodule]
fn _datexport_xlsx_rs(_py: Python<'_>, module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PyDataExporter>()?;
    module.add_function(wrap_pyfunction!(column_name, module)?)?;
    module.add_function(wrap_pyfunction!(select_plural_form, module)?)?;
    module.add_function(wrap_pyfunction!(render_template, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}
