//! `datexport_xlsx` v1:
//! Grid data export into styled XLSX workbooks.
//!
//! Architecture:
//! - `conf`     : constants and default presets
//! - `spec`     : specs/models/errors
//! - `util`     : pure helpers (value formatting, tree flattening, naming)
//! - `layout`   : section layout planner
//! - `source`   : data sources
//! - `template` : template sources (JSON, template workbook) and the reference workbook
//! - `writer`   : `rust_xlsxwriter` sheet writer
//! - `exporter` : export orchestrator
pub mod conf;
pub mod exporter;
pub mod layout;
pub mod source;
pub mod spec;
pub mod template;
pub mod util;
pub mod writer;

pub use conf::{
    C_MIME_XLSX, C_TEMPLATE_FILE_NAME, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX,
    derive_default_export_labels, derive_default_export_template,
};
pub use exporter::{DataExporter, SpecExportArtifact, build_export_payload, validate_grid_binding};
pub use layout::{derive_section_range_refs, plan_section_layout, validate_section_layout};
pub use source::{DataSource, JsonFileSource, MemorySource, PolarsIpcSource};
pub use spec::{
    DataExportError, EnumCellValue, EnumDirectiveKind, EnumFieldValue, EnumSectionKind,
    EnumTemplateDirective, EnumTextAlign, EnumTitleSize, Result, SpecCellFormat,
    SpecColumnDescriptor, SpecDirectiveDecl, SpecExecuteOptions, SpecExportLabels,
    SpecExportPayload, SpecExportReport, SpecExportSettings, SpecExportTemplate, SpecFilterItem,
    SpecGridBinding, SpecRecord, SpecSectionLayout, SpecSectionRange, SpecSourceResult,
    SpecTreeKeys,
};
pub use template::{
    BuiltinTemplateSource, JsonTemplateSource, TemplateSource, XlsxTemplateSource,
    derive_template_from_workbook, render_template_workbook,
};
pub use util::{
    collect_template_directives, derive_column_name, derive_export_file_name,
    derive_filter_summary, flatten_hierarchy, format_field_value, sanitize_sheet_name,
    select_plural_form,
};
pub use writer::XlsxExportWriter;
