//! Template sources and the reference template workbook.

use std::future::Future;
use std::io::Cursor;
use std::path::PathBuf;

use log::debug;
use rust_xlsxwriter::Workbook;
use umya_spreadsheet::{
    Color, HorizontalAlignmentValues, Spreadsheet, Style, VerticalAlignmentValues,
};

use crate::conf::{C_MARKER_DATA_SECTION, C_MARKER_FILTER_SECTION, C_MARKER_HEADER_SECTION};
use crate::spec::{DataExportError, Result, SpecCellFormat, SpecExportTemplate};
use crate::util::convert_width_px_to_excel;
use crate::writer::{cast_col_num, derive_rust_xlsx_format, write_merged_text};

/// Sheet name of the reference template workbook.
const C_TEMPLATE_SHEET_NAME: &str = "Template";
/// Columns spanned by the sample blocks of the reference workbook.
const N_NCOLS_TEMPLATE_SAMPLE: usize = 4;

/// Provider of the export styling.
pub trait TemplateSource {
    /// Load the template for one export.
    fn fetch_template(&self) -> impl Future<Output = Result<SpecExportTemplate>> + Send;
}

/// Template compiled into the crate, optionally overridden in memory.
#[derive(Debug, Clone, Default)]
pub struct BuiltinTemplateSource {
    template: SpecExportTemplate,
}

impl BuiltinTemplateSource {
    /// Source returning the built-in template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Source returning `template`.
    pub fn with_template(template: SpecExportTemplate) -> Self {
        Self { template }
    }
}

impl TemplateSource for BuiltinTemplateSource {
    async fn fetch_template(&self) -> Result<SpecExportTemplate> {
        Ok(self.template.clone())
    }
}

/// Template read from a JSON file on every fetch; missing keys keep their
/// built-in values.
#[derive(Debug, Clone)]
pub struct JsonTemplateSource {
    path: PathBuf,
}

impl JsonTemplateSource {
    /// Source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TemplateSource for JsonTemplateSource {
    async fn fetch_template(&self) -> Result<SpecExportTemplate> {
        let c_text = tokio::fs::read_to_string(&self.path).await.map_err(|err| {
            DataExportError::TemplateFetch(format!("{}: {err}", self.path.display()))
        })?;
        let template = serde_json::from_str(&c_text).map_err(|err| {
            DataExportError::TemplateFetch(format!("{}: {err}", self.path.display()))
        })?;
        debug!("loaded template from {}", self.path.display());
        Ok(template)
    }
}

/// Template derived from the marker cells of a template workbook.
///
/// The workbook is read on every fetch, so the file served for download is
/// the one styling the exports. The `[filterSection]`, `[headerSection]` and
/// `[dataSection]` cells give the section formats; everything else keeps its
/// built-in value.
#[derive(Debug, Clone)]
pub struct XlsxTemplateSource {
    path: PathBuf,
}

impl XlsxTemplateSource {
    /// Source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TemplateSource for XlsxTemplateSource {
    async fn fetch_template(&self) -> Result<SpecExportTemplate> {
        let v_bytes = tokio::fs::read(&self.path).await.map_err(|err| {
            DataExportError::TemplateFetch(format!("{}: {err}", self.path.display()))
        })?;
        let template = derive_template_from_workbook(&v_bytes).map_err(|err| match err {
            DataExportError::TemplateFetch(msg) => {
                DataExportError::TemplateFetch(format!("{}: {msg}", self.path.display()))
            }
            other => other,
        })?;
        debug!("loaded template workbook {}", self.path.display());
        Ok(template)
    }
}

/// Build a template from workbook bytes holding the three marker cells.
///
/// Sheets are searched in order; a missing marker is an error.
pub fn derive_template_from_workbook(v_bytes: &[u8]) -> Result<SpecExportTemplate> {
    let book = umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(v_bytes), true)
        .map_err(|err| DataExportError::TemplateFetch(format!("unreadable workbook: {err}")))?;

    let mut template = SpecExportTemplate::default();
    template.fmt_filter_section = derive_marker_format(&book, C_MARKER_FILTER_SECTION)?;
    template.fmt_header_section = derive_marker_format(&book, C_MARKER_HEADER_SECTION)?;
    template.fmt_data_section = derive_marker_format(&book, C_MARKER_DATA_SECTION)?;
    Ok(template)
}

fn derive_marker_format(book: &Spreadsheet, marker: &str) -> Result<SpecCellFormat> {
    book.get_sheet_collection()
        .iter()
        .flat_map(|sheet| sheet.get_cell_collection())
        .find(|cell| cell.get_value().trim() == marker)
        .map(|cell| derive_cell_format_from_style(cell.get_style()))
        .ok_or_else(|| DataExportError::TemplateFetch(format!("marker cell {marker} not found")))
}

/// Convert a cell style read from a workbook into a [`SpecCellFormat`].
pub(crate) fn derive_cell_format_from_style(style: &Style) -> SpecCellFormat {
    let mut spec = SpecCellFormat::default();

    if let Some(font) = style.get_font() {
        let c_font_name = font.get_name();
        if !c_font_name.is_empty() {
            spec.font_name = Some(c_font_name.to_string());
        }
        let n_size = *font.get_size();
        if n_size > 0.0 {
            spec.font_size = Some(n_size.round() as i64);
        }
        spec.bold = Some(*font.get_bold());
        spec.italic = Some(*font.get_italic());
        spec.font_color = derive_hex_color(font.get_color());
    }

    spec.bg_color = style.get_background_color().and_then(derive_hex_color);

    if let Some(alignment) = style.get_alignment() {
        spec.align = match alignment.get_horizontal() {
            HorizontalAlignmentValues::Left => Some("left"),
            HorizontalAlignmentValues::Center => Some("center"),
            HorizontalAlignmentValues::Right => Some("right"),
            HorizontalAlignmentValues::Justify => Some("justify"),
            _ => None,
        }
        .map(str::to_string);
        spec.valign = match alignment.get_vertical() {
            VerticalAlignmentValues::Top => Some("top"),
            VerticalAlignmentValues::Center => Some("vcenter"),
            VerticalAlignmentValues::Bottom => Some("bottom"),
            _ => None,
        }
        .map(str::to_string);
        spec.text_wrap = Some(*alignment.get_wrap_text());
    }

    spec.border = Some(
        style
            .get_borders()
            .map(|borders| derive_border_index(borders.get_bottom().get_border_style()))
            .unwrap_or(0),
    );

    if let Some(number_format) = style.get_number_format() {
        let c_code = number_format.get_format_code();
        if !c_code.is_empty() && !c_code.eq_ignore_ascii_case("general") {
            spec.num_format = Some(c_code.to_string());
        }
    }

    spec
}

/// `#RRGGBB` of an ARGB color; `None` for theme or unset colors.
fn derive_hex_color(color: &Color) -> Option<String> {
    let c_argb = color.get_argb();
    let c_rgb = match c_argb.len() {
        8 => &c_argb[2..],
        6 => c_argb,
        _ => return None,
    };
    c_rgb
        .chars()
        .all(|ch| ch.is_ascii_hexdigit())
        .then(|| format!("#{}", c_rgb.to_ascii_uppercase()))
}

fn derive_border_index(border_style: &str) -> i64 {
    match border_style {
        "thin" => 1,
        "medium" => 2,
        "dashed" => 3,
        "dotted" => 4,
        "thick" => 5,
        "double" => 6,
        "hair" => 7,
        _ => 0,
    }
}

/// Render the reference workbook: one sheet with the `[filterSection]`,
/// `[headerSection]` and `[dataSection]` marker cells styled by `template`.
pub fn render_template_workbook(template: &SpecExportTemplate) -> Result<Vec<u8>> {
    let fmt_filter = derive_rust_xlsx_format(&template.fmt_filter_section);
    let fmt_header = derive_rust_xlsx_format(&template.fmt_header_section);
    let fmt_data = derive_rust_xlsx_format(&template.fmt_data_section);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(C_TEMPLATE_SHEET_NAME)?;

    worksheet.set_column_width(
        0,
        convert_width_px_to_excel(template.width_px_counter, template.ratio_px_per_width_unit),
    )?;
    for n_idx_col in 1..N_NCOLS_TEMPLATE_SAMPLE {
        worksheet.set_column_width(
            cast_col_num(n_idx_col)?,
            convert_width_px_to_excel(template.width_px_default, template.ratio_px_per_width_unit),
        )?;
    }

    write_merged_text(
        worksheet,
        1,
        2,
        N_NCOLS_TEMPLATE_SAMPLE,
        C_MARKER_FILTER_SECTION,
        &fmt_filter,
    )?;
    worksheet.write_string_with_format(2, 0, C_MARKER_HEADER_SECTION, &fmt_header)?;
    worksheet.write_string_with_format(3, 0, C_MARKER_DATA_SECTION, &fmt_data)?;
    for n_idx_col in 1..N_NCOLS_TEMPLATE_SAMPLE {
        let n_col = cast_col_num(n_idx_col)?;
        worksheet.write_blank(2, n_col, &fmt_header)?;
        worksheet.write_blank(3, n_col, &fmt_data)?;
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};

    use super::*;

    #[tokio::test]
    async fn test_builtin_source_returns_default_template() {
        let template = BuiltinTemplateSource::new()
            .fetch_template()
            .await
            .expect("fetch");

        assert_eq!(template, SpecExportTemplate::default());
    }

    #[tokio::test]
    async fn test_json_source_overlays_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("template.json");
        std::fs::write(&path, r#"{"width_px_default": 150.0}"#).expect("write template");

        let template = JsonTemplateSource::new(&path)
            .fetch_template()
            .await
            .expect("fetch");

        assert_eq!(template.width_px_default, 150.0);
        assert_eq!(template.width_px_counter, 40.0);
    }

    #[tokio::test]
    async fn test_json_source_failures_are_template_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{").expect("write template");

        let broken = JsonTemplateSource::new(&path).fetch_template().await;
        let missing = JsonTemplateSource::new(dir.path().join("absent.json"))
            .fetch_template()
            .await;

        assert!(matches!(broken, Err(DataExportError::TemplateFetch(_))));
        assert!(matches!(missing, Err(DataExportError::TemplateFetch(_))));
    }

    #[test]
    fn test_render_template_workbook_has_marker_cells() {
        let v_bytes = render_template_workbook(&SpecExportTemplate::default()).expect("render");

        let mut workbook: Xlsx<_> =
            open_workbook_from_rs(Cursor::new(v_bytes)).expect("open template");
        let range = workbook
            .worksheet_range(C_TEMPLATE_SHEET_NAME)
            .expect("template sheet");

        let markers = [
            (0, C_MARKER_FILTER_SECTION),
            (2, C_MARKER_HEADER_SECTION),
            (3, C_MARKER_DATA_SECTION),
        ];
        for (n_row, c_marker) in markers {
            assert_eq!(
                range.get_value((n_row, 0)),
                Some(&Data::String(c_marker.to_string()))
            );
        }
    }

    #[test]
    fn test_template_from_reference_workbook_keeps_section_styles() {
        let v_bytes = render_template_workbook(&SpecExportTemplate::default()).expect("render");

        let template = derive_template_from_workbook(&v_bytes).expect("derive");

        let fmt_header = &template.fmt_header_section;
        assert_eq!(fmt_header.font_name.as_deref(), Some("Times New Roman"));
        assert_eq!(fmt_header.font_size, Some(11));
        assert_eq!(fmt_header.bold, Some(true));
        assert_eq!(fmt_header.align.as_deref(), Some("center"));
        assert_eq!(fmt_header.valign.as_deref(), Some("vcenter"));
        assert_eq!(fmt_header.border, Some(1));
        assert_eq!(fmt_header.text_wrap, Some(true));
        assert_eq!(fmt_header.bg_color.as_deref(), Some("#D9E1F2"));

        assert_eq!(template.fmt_data_section.bold, Some(false));
        assert_eq!(template.fmt_data_section.border, Some(1));
        assert_eq!(template.fmt_filter_section.valign.as_deref(), Some("top"));
        assert_eq!(template.fmt_filter_section.border, Some(0));
        assert_eq!(template.fmt_separator, SpecExportTemplate::default().fmt_separator);
    }

    #[tokio::test]
    async fn test_xlsx_source_follows_edited_workbook() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reportTemplate.xlsx");
        let mut template = SpecExportTemplate::default();
        template.fmt_data_section = template.fmt_data_section.with_(SpecCellFormat {
            italic: Some(true),
            font_color: Some("#1F4E79".to_string()),
            ..Default::default()
        });
        std::fs::write(&path, render_template_workbook(&template).expect("render"))
            .expect("write template");

        let fetched = XlsxTemplateSource::new(&path)
            .fetch_template()
            .await
            .expect("fetch");

        assert_eq!(fetched.fmt_data_section.italic, Some(true));
        assert_eq!(
            fetched.fmt_data_section.font_color.as_deref(),
            Some("#1F4E79")
        );
    }

    #[tokio::test]
    async fn test_xlsx_source_requires_marker_cells() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plain.xlsx");
        let mut workbook = Workbook::new();
        workbook
            .add_worksheet()
            .write_string(0, 0, C_MARKER_HEADER_SECTION)
            .expect("write marker");
        std::fs::write(&path, workbook.save_to_buffer().expect("save")).expect("write");

        let missing_marker = XlsxTemplateSource::new(&path).fetch_template().await;
        let missing_file = XlsxTemplateSource::new(dir.path().join("absent.xlsx"))
            .fetch_template()
            .await;

        match missing_marker {
            Err(DataExportError::TemplateFetch(msg)) => {
                assert!(msg.contains(C_MARKER_FILTER_SECTION), "{msg}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            missing_file,
            Err(DataExportError::TemplateFetch(_))
        ));
    }

    #[test]
    fn test_border_index_matches_writer_styles() {
        assert_eq!(derive_border_index("thin"), 1);
        assert_eq!(derive_border_index("hair"), 7);
        assert_eq!(derive_border_index("none"), 0);
    }
}
