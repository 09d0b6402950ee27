//! Shared export specification models and errors.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::conf::{
    C_FIELD_HAS_CHILDREN, derive_default_export_labels, derive_default_export_template,
};

////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Cell format specification.
///
/// Every property is optional so formats can be layered with [`Self::with_`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,
    /// Italic style.
    pub italic: Option<bool>,

    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Border style for all sides.
    pub border: Option<i64>,
    /// Text wrap.
    pub text_wrap: Option<bool>,

    /// Number format code.
    pub num_format: Option<String>,
    /// Background fill color.
    pub bg_color: Option<String>,
    /// Font color.
    pub font_color: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            italic: other.italic.or(self.italic),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            text_wrap: other.text_wrap.or(self.text_wrap),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
            font_color: other.font_color.clone().or_else(|| self.font_color.clone()),
        }
    }
}

/// Styling source of one export.
///
/// Section formats are named after the marker cells of the reference
/// template workbook (`[filterSection]`, `[headerSection]`, `[dataSection]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecExportTemplate {
    /// Merged filter summary block.
    pub fmt_filter_section: SpecCellFormat,
    /// Column header row.
    pub fmt_header_section: SpecCellFormat,
    /// Data rows.
    pub fmt_data_section: SpecCellFormat,
    /// `title` directive rows; font size comes from the heading level.
    pub fmt_title: SpecCellFormat,
    /// `filter` directive rows.
    pub fmt_directive_filter: SpecCellFormat,
    /// Row closing the directive block.
    pub fmt_separator: SpecCellFormat,
    /// Total line under the data rows.
    pub fmt_total: SpecCellFormat,
    /// Fixed pixel width of the counter column.
    pub width_px_counter: f64,
    /// Pixel width of columns without any width.
    pub width_px_default: f64,
    /// Pixels per Excel column-width unit.
    pub ratio_px_per_width_unit: f64,
}

impl Default for SpecExportTemplate {
    fn default() -> Self {
        derive_default_export_template()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RecordSpecification

/// Raw field value as delivered by a data source.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EnumFieldValue {
    /// Missing/null value.
    #[default]
    None,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Boolean(bool),
    /// Calendar date.
    Date(NaiveDate),
    /// Date with time of day.
    DateTime(NaiveDateTime),
}

impl EnumFieldValue {
    /// Truthiness as understood by the grid UI: null, empty text, `0`,
    /// `NaN` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::String(s) => !s.is_empty(),
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Boolean(b) => *b,
            Self::Date(_) | Self::DateTime(_) => true,
        }
    }

    /// Whether the value is null.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<&str> for EnumFieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for EnumFieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for EnumFieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for EnumFieldValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for EnumFieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<NaiveDate> for EnumFieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for EnumFieldValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

/// One source record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecRecord {
    /// Field values by field name.
    pub fields: BTreeMap<String, EnumFieldValue>,
    /// Hierarchical position label (`"2.3.1"`) assigned by flattening.
    pub position: Option<String>,
}

impl SpecRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: &str, value: impl Into<EnumFieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Field value, `None` when absent.
    pub fn get(&self, name: &str) -> Option<&EnumFieldValue> {
        self.fields.get(name)
    }

    /// Caller-supplied "has children" hint of tree grids.
    pub fn has_children(&self) -> bool {
        self.get(C_FIELD_HAS_CHILDREN)
            .is_some_and(EnumFieldValue::is_truthy)
    }
}

/// Normalized cell value written into the workbook.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Blank cell.
    None,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region GridBinding

/// One grid column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecColumnDescriptor {
    /// Record field rendered in the column.
    pub field: String,
    /// Header caption.
    pub header: String,
    /// Explicit pixel width.
    pub width: Option<f64>,
    /// Width computed by the grid layout when no explicit width is set.
    pub width_calculated: Option<f64>,
    /// Hidden columns are not exported.
    pub hidden: bool,
}

impl SpecColumnDescriptor {
    /// Visible column with an explicit width.
    pub fn new(field: &str, header: &str, width: f64) -> Self {
        Self {
            field: field.to_string(),
            header: header.to_string(),
            width: Some(width),
            ..Default::default()
        }
    }
}

/// Key field names of a tree grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecTreeKeys {
    /// Identifying key field.
    pub key: String,
    /// Parent key field.
    pub pkey: String,
}

/// Columns and hierarchy of the exported grid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecGridBinding {
    /// Ordered columns, hidden ones included.
    pub columns: Vec<SpecColumnDescriptor>,
    /// Present for tree grids.
    pub tree: Option<SpecTreeKeys>,
}

/// Fetch options passed to a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecExecuteOptions {
    /// Request only one page of data.
    pub partial_data: bool,
    /// Return data without committing it into the source's own state.
    pub return_only: bool,
}

impl Default for SpecExecuteOptions {
    /// Full, non-paginated, non-committing fetch.
    fn default() -> Self {
        Self {
            partial_data: false,
            return_only: true,
        }
    }
}

/// Data source reply.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecSourceResult {
    /// Fetched records.
    pub data: Vec<SpecRecord>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TemplateDirectives

/// Heading level of a `title` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumTitleSize {
    /// Largest heading (default).
    #[default]
    H1,
    /// Second level.
    H2,
    /// Third level.
    H3,
    /// Fourth level.
    H4,
}

impl EnumTitleSize {
    /// Parse `h1`..`h4` (case-insensitive); anything else yields `H1`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "h2" => Self::H2,
            "h3" => Self::H3,
            "h4" => Self::H4,
            _ => Self::H1,
        }
    }

    /// Font size in points.
    pub fn font_size(self) -> i64 {
        match self {
            Self::H1 => 12,
            Self::H2 => 10,
            Self::H3 => 9,
            Self::H4 => 8,
        }
    }
}

/// Horizontal alignment of a `filter` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumTextAlign {
    /// Left aligned (default).
    #[default]
    Left,
    /// Centered.
    Center,
    /// Right aligned.
    Right,
}

impl EnumTextAlign {
    /// Parse `left`/`center`/`right` (case-insensitive); anything else yields `Left`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "center" => Self::Center,
            "right" => Self::Right,
            _ => Self::Left,
        }
    }

    /// Alignment keyword understood by [`SpecCellFormat::align`].
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
        }
    }
}

/// Kind tag of a declared directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnumDirectiveKind {
    /// Heading row.
    Title,
    /// Empty row.
    NewLine,
    /// `label: text` row.
    Filter,
    /// Anything else; ignored by the collector.
    #[serde(other)]
    Unknown,
}

/// Directive as declared by a caller or a job file, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecDirectiveDecl {
    /// Directive kind.
    #[serde(rename = "type")]
    pub kind: EnumDirectiveKind,
    /// Title text or filter label.
    #[serde(default)]
    pub label: Option<String>,
    /// Filter text; empty filters are dropped.
    #[serde(default)]
    pub text: Option<String>,
    /// Heading level (`h1`..`h4`).
    #[serde(default)]
    pub size: Option<String>,
    /// Filter alignment (`left`/`center`/`right`).
    #[serde(default)]
    pub align: Option<String>,
}

impl SpecDirectiveDecl {
    /// `title` directive with default size.
    pub fn title(label: &str) -> Self {
        Self {
            kind: EnumDirectiveKind::Title,
            label: Some(label.to_string()),
            text: None,
            size: None,
            align: None,
        }
    }

    /// `new-line` directive.
    pub fn new_line() -> Self {
        Self {
            kind: EnumDirectiveKind::NewLine,
            label: None,
            text: None,
            size: None,
            align: None,
        }
    }

    /// `filter` directive with default alignment.
    pub fn filter(label: &str, text: &str) -> Self {
        Self {
            kind: EnumDirectiveKind::Filter,
            label: Some(label.to_string()),
            text: Some(text.to_string()),
            size: None,
            align: None,
        }
    }

    /// Set the `size` attribute.
    pub fn with_size(mut self, size: &str) -> Self {
        self.size = Some(size.to_string());
        self
    }

    /// Set the `align` attribute.
    pub fn with_align(mut self, align: &str) -> Self {
        self.align = Some(align.to_string());
        self
    }
}

/// Normalized directive: one row of non-tabular content above the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumTemplateDirective {
    /// Centered bold heading merged across all columns.
    Title {
        /// Heading text.
        label: String,
        /// Heading level.
        size: EnumTitleSize,
    },
    /// Empty row.
    NewLine,
    /// `label: text` row merged across all columns.
    Filter {
        /// Filter caption.
        label: String,
        /// Non-empty filter text.
        text: String,
        /// Horizontal alignment.
        align: EnumTextAlign,
    },
}

/// Filter value shown in the filter summary.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecFilterItem {
    /// Filter caption.
    pub label: String,
    /// Selected value; caption only when absent or empty.
    pub value: Option<EnumFieldValue>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SectionLayout

/// Row section kinds, in write order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnumSectionKind {
    /// Merged filter summary.
    Filters,
    /// Directive rows plus separator.
    Directives,
    /// Column header row.
    Headers,
    /// One row per record.
    Data,
    /// Pluralized record count.
    Total,
}

/// Contiguous 1-based row range of one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecSectionRange {
    /// Section kind.
    pub kind: EnumSectionKind,
    /// First row (1-based).
    pub row_start: usize,
    /// Number of rows; may be zero.
    pub n_rows: usize,
}

impl SpecSectionRange {
    /// Last row (1-based), `None` for empty sections.
    pub fn row_end_inclusive(&self) -> Option<usize> {
        (self.n_rows > 0).then(|| self.row_start + self.n_rows - 1)
    }

    /// First row of the following section.
    pub fn row_next(&self) -> usize {
        self.row_start + self.n_rows
    }

    /// Whether the section occupies no rows.
    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }
}

/// Planned layout of all sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSectionLayout {
    /// Sections in write order.
    pub sections: Vec<SpecSectionRange>,
}

impl SpecSectionLayout {
    /// Range of `kind`.
    pub fn section(&self, kind: EnumSectionKind) -> Option<&SpecSectionRange> {
        self.sections.iter().find(|section| section.kind == kind)
    }

    /// Rows used by all sections together.
    pub fn n_rows_total(&self) -> usize {
        self.sections.iter().map(|section| section.n_rows).sum()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ExportSettings

/// Localized captions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecExportLabels {
    /// Header of the counter column.
    pub counter_header: String,
    /// Caption of the export date line.
    pub export_date_label: String,
    /// Caption of the total line.
    pub total_label: String,
    /// Plural forms of "entry" for 1, 2–4 and 5–20.
    pub entry_forms: [String; 3],
    /// Display text of `true` and `false`.
    pub boolean_names: [String; 2],
}

impl Default for SpecExportLabels {
    fn default() -> Self {
        derive_default_export_labels()
    }
}

/// Per-exporter settings supplied by the caller.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecExportSettings {
    /// Workbook sheet name and file stem (the form title).
    pub sheet_name: String,
    /// First line of the filter summary.
    pub export_title: Option<String>,
    /// Filter values listed in the filter summary.
    pub filters: Vec<SpecFilterItem>,
    /// Declared template directives.
    pub directives: Vec<SpecDirectiveDecl>,
    /// Localized captions.
    pub labels: SpecExportLabels,
    /// Arguments forwarded to the data source.
    pub source_args: serde_json::Value,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PayloadAndReport

/// Everything the workbook writer needs for one export.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecExportPayload {
    /// Sheet name (unsanitized form title).
    pub sheet_name: String,
    /// Formatted rows, counter cell first.
    pub rows: Vec<Vec<EnumCellValue>>,
    /// Column captions, counter caption first.
    pub names: Vec<String>,
    /// Column fields, counter field first.
    pub fields: Vec<String>,
    /// Multi-line filter summary.
    pub filters: String,
    /// Pixel widths, counter width first.
    pub widths: Vec<f64>,
    /// Normalized directives.
    pub directives: Vec<EnumTemplateDirective>,
}

/// Per-export report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecExportReport {
    /// Worksheet name actually used.
    pub sheet_name: String,
    /// Planned sections.
    pub layout: SpecSectionLayout,
    /// A1 range of every non-empty section.
    pub ranges: Vec<(EnumSectionKind, String)>,
    /// Number of exported records.
    pub n_records: usize,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecExportReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Export failure. Every variant aborts the whole export.
#[derive(Debug, thiserror::Error)]
pub enum DataExportError {
    /// Grid binding is incomplete; raised before any fetch.
    #[error("invalid grid binding: {0}")]
    Binding(String),
    /// Data source failed to deliver records.
    #[error("data source fetch failed: {0}")]
    SourceFetch(String),
    /// Template could not be loaded.
    #[error("template fetch failed: {0}")]
    TemplateFetch(String),
    /// Planned rows/columns exceed worksheet limits.
    #[error("layout overflow: {0}")]
    Layout(String),
    /// Workbook writer error.
    #[error("xlsx write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON decode error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// DataFrame decode error.
    #[error(transparent)]
    Polars(#[from] polars::prelude::PolarsError),
}

/// Result alias of this crate.
pub type Result<T, E = DataExportError> = std::result::Result<T, E>;

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_format_merge_prefers_right_side() {
        let fmt_base = SpecCellFormat {
            font_size: Some(11),
            bold: Some(false),
            align: Some("left".to_string()),
            ..Default::default()
        };
        let fmt = fmt_base.with_(SpecCellFormat {
            bold: Some(true),
            ..Default::default()
        });

        assert_eq!(fmt.font_size, Some(11));
        assert_eq!(fmt.bold, Some(true));
        assert_eq!(fmt.align.as_deref(), Some("left"));
    }

    #[test]
    fn test_field_value_truthiness() {
        assert!(!EnumFieldValue::None.is_truthy());
        assert!(!EnumFieldValue::from("").is_truthy());
        assert!(!EnumFieldValue::from(0.0).is_truthy());
        assert!(!EnumFieldValue::Number(f64::NAN).is_truthy());
        assert!(!EnumFieldValue::from(false).is_truthy());
        assert!(EnumFieldValue::from("x").is_truthy());
        assert!(EnumFieldValue::from(-1.5).is_truthy());
    }

    #[test]
    fn test_record_has_children_hint() {
        assert!(SpecRecord::new().with_field("_haschilds", true).has_children());
        assert!(SpecRecord::new().with_field("_haschilds", 1_i64).has_children());
        assert!(!SpecRecord::new().with_field("_haschilds", false).has_children());
        assert!(!SpecRecord::new().has_children());
    }

    #[test]
    fn test_title_size_and_align_are_lenient() {
        assert_eq!(EnumTitleSize::parse_lenient("H3"), EnumTitleSize::H3);
        assert_eq!(EnumTitleSize::parse_lenient("huge"), EnumTitleSize::H1);
        assert_eq!(EnumTitleSize::H2.font_size(), 10);
        assert_eq!(EnumTextAlign::parse_lenient(" Right "), EnumTextAlign::Right);
        assert_eq!(EnumTextAlign::parse_lenient("middle"), EnumTextAlign::Left);
    }

    #[test]
    fn test_directive_decl_deserializes_unknown_kind() {
        let l_decls: Vec<SpecDirectiveDecl> = serde_json::from_str(
            r#"[
                {"type": "title", "label": "Report", "size": "h2"},
                {"type": "new-line"},
                {"type": "picture", "label": "logo"}
            ]"#,
        )
        .expect("decode directives");

        assert_eq!(l_decls[0].kind, EnumDirectiveKind::Title);
        assert_eq!(l_decls[0].size.as_deref(), Some("h2"));
        assert_eq!(l_decls[1].kind, EnumDirectiveKind::NewLine);
        assert_eq!(l_decls[2].kind, EnumDirectiveKind::Unknown);
    }

    #[test]
    fn test_template_json_falls_back_to_defaults() {
        let template: SpecExportTemplate =
            serde_json::from_str(r#"{"width_px_counter": 60.0}"#).expect("decode template");

        assert_eq!(template.width_px_counter, 60.0);
        assert_eq!(template.ratio_px_per_width_unit, 6.0);
        assert_eq!(template.fmt_header_section.bold, Some(true));
    }
}
