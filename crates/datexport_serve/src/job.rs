use std::path::PathBuf;

use datexport_xlsx::source::derive_field_value_from_json;
use datexport_xlsx::spec::{
    EnumFieldValue, SpecColumnDescriptor, SpecDirectiveDecl, SpecExportLabels,
    SpecExportSettings, SpecFilterItem, SpecGridBinding, SpecTreeKeys,
};
use serde::Deserialize;
use serde_json::Value;

/// Filter line of a job file.
#[derive(Debug, Clone, Deserialize)]
pub struct SpecJobFilter {
    pub label: String,
    #[serde(default)]
    pub value: Value,
}

/// Export job file.
#[derive(Debug, Clone, Deserialize)]
pub struct SpecExportJob {
    /// Sheet name and file stem.
    pub sheet_name: String,
    #[serde(default)]
    pub export_title: Option<String>,
    pub columns: Vec<SpecColumnDescriptor>,
    #[serde(default)]
    pub tree: Option<SpecTreeKeys>,
    #[serde(default)]
    pub directives: Vec<SpecDirectiveDecl>,
    #[serde(default)]
    pub filters: Vec<SpecJobFilter>,
    #[serde(default)]
    pub labels: SpecExportLabels,
    /// Template workbook (`.xlsx`) or styling JSON, relative to the working directory.
    #[serde(default)]
    pub file_template: Option<PathBuf>,
    #[serde(default)]
    pub source_args: Value,
}

impl SpecExportJob {
    pub fn derive_grid_binding(&self) -> SpecGridBinding {
        SpecGridBinding {
            columns: self.columns.clone(),
            tree: self.tree.clone(),
        }
    }

    pub fn derive_export_settings(&self) -> SpecExportSettings {
        SpecExportSettings {
            sheet_name: self.sheet_name.clone(),
            export_title: self.export_title.clone(),
            filters: self
                .filters
                .iter()
                .map(|item| SpecFilterItem {
                    label: item.label.clone(),
                    value: match derive_field_value_from_json(&item.value) {
                        EnumFieldValue::None => None,
                        value => Some(value),
                    },
                })
                .collect(),
            directives: self.directives.clone(),
            labels: self.labels.clone(),
            source_args: self.source_args.clone(),
        }
    }
}
