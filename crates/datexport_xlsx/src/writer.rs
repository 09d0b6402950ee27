//! Workbook writer that renders an export payload section by section.

use log::debug;
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};

use crate::conf::C_FILTER_LINE_SEPARATOR;
use crate::layout::{derive_section_range_refs, plan_section_layout, validate_section_layout};
use crate::spec::{
    DataExportError, EnumCellValue, EnumSectionKind, EnumTemplateDirective, Result,
    SpecCellFormat, SpecExportLabels, SpecExportPayload, SpecExportReport, SpecExportTemplate,
    SpecSectionLayout,
};
use crate::util::{convert_width_px_to_excel, derive_total_text, sanitize_sheet_name};

/// `rust_xlsxwriter` formats derived once per sheet from the template.
struct SpecSectionFormats {
    fmt_filter: Format,
    fmt_header: Format,
    fmt_data: Format,
    fmt_separator: Format,
    fmt_total: Format,
}

/// Stateful workbook writer for one export.
///
/// The workbook is buffered in memory until [`Self::save_to_buffer`].
pub struct XlsxExportWriter {
    workbook: Workbook,
    template: SpecExportTemplate,
}

impl XlsxExportWriter {
    /// Create writer styled by `template`.
    pub fn new(template: SpecExportTemplate) -> Self {
        Self {
            workbook: Workbook::new(),
            template,
        }
    }

    /// Write all sections of `payload` into a new worksheet.
    ///
    /// Sections are written strictly in layout order: filters, directives,
    /// headers, data, total.
    pub fn write_payload(
        &mut self,
        payload: &SpecExportPayload,
        labels: &SpecExportLabels,
    ) -> Result<SpecExportReport> {
        let n_cols = payload.names.len();
        let layout = plan_section_layout(&payload.filters, &payload.directives, payload.rows.len());
        validate_section_layout(&layout, n_cols)?;

        let c_sheet_name = sanitize_sheet_name(&payload.sheet_name, "_");
        let mut report = SpecExportReport {
            sheet_name: c_sheet_name.clone(),
            ranges: derive_section_range_refs(&layout, n_cols),
            layout: layout.clone(),
            n_records: payload.rows.len(),
            warnings: vec![],
        };
        if c_sheet_name != payload.sheet_name.trim() {
            report.warn(format!(
                "Sheet name {:?} sanitized to {c_sheet_name:?}.",
                payload.sheet_name
            ));
        }

        let formats = SpecSectionFormats {
            fmt_filter: derive_rust_xlsx_format(&self.template.fmt_filter_section),
            fmt_header: derive_rust_xlsx_format(&self.template.fmt_header_section),
            fmt_data: derive_rust_xlsx_format(&self.template.fmt_data_section),
            fmt_separator: derive_rust_xlsx_format(&self.template.fmt_separator),
            fmt_total: derive_rust_xlsx_format(&self.template.fmt_total),
        };
        let template = &self.template;
        let worksheet = self.workbook.add_worksheet();
        worksheet.set_name(&c_sheet_name)?;

        for (n_idx_col, width_px) in payload.widths.iter().enumerate() {
            worksheet.set_column_width(
                cast_col_num(n_idx_col)?,
                convert_width_px_to_excel(*width_px, template.ratio_px_per_width_unit),
            )?;
        }

        for section in &layout.sections {
            if section.is_empty() {
                continue;
            }
            match section.kind {
                EnumSectionKind::Filters => {
                    let c_text = payload.filters.replace(C_FILTER_LINE_SEPARATOR, "\n");
                    write_merged_text(
                        worksheet,
                        section.row_start,
                        section.row_start + section.n_rows - 1,
                        n_cols,
                        &c_text,
                        &formats.fmt_filter,
                    )?;
                }
                EnumSectionKind::Directives => {
                    write_directives(
                        worksheet,
                        section.row_start,
                        n_cols,
                        &payload.directives,
                        template,
                        &formats.fmt_separator,
                    )?;
                }
                EnumSectionKind::Headers => {
                    write_headers(
                        worksheet,
                        section.row_start,
                        &payload.names,
                        &layout,
                        &formats.fmt_header,
                    )?;
                }
                EnumSectionKind::Data => {
                    for (n_idx_row, row_values) in payload.rows.iter().enumerate() {
                        for (n_idx_col, value) in row_values.iter().enumerate() {
                            write_cell_with_format(
                                worksheet,
                                section.row_start + n_idx_row,
                                n_idx_col,
                                value,
                                &formats.fmt_data,
                            )?;
                        }
                    }
                }
                EnumSectionKind::Total => {
                    worksheet.write_string_with_format(
                        cast_row_num(section.row_start)?,
                        0,
                        derive_total_text(payload.rows.len(), labels),
                        &formats.fmt_total,
                    )?;
                }
            }
            debug!(
                "wrote section {:?} rows {}..={} on sheet {c_sheet_name:?}",
                section.kind,
                section.row_start,
                section.row_start + section.n_rows - 1
            );
        }

        Ok(report)
    }

    /// Serialize the workbook.
    pub fn save_to_buffer(&mut self) -> Result<Vec<u8>> {
        Ok(self.workbook.save_to_buffer()?)
    }
}

fn write_directives(
    worksheet: &mut Worksheet,
    row_start: usize,
    n_cols: usize,
    directives: &[EnumTemplateDirective],
    template: &SpecExportTemplate,
    fmt_separator: &Format,
) -> Result<()> {
    let mut n_row = row_start;
    for directive in directives {
        match directive {
            EnumTemplateDirective::Title { label, size } => {
                let fmt = derive_rust_xlsx_format(&template.fmt_title.with_(SpecCellFormat {
                    font_size: Some(size.font_size()),
                    ..Default::default()
                }));
                write_merged_text(worksheet, n_row, n_row, n_cols, label, &fmt)?;
            }
            EnumTemplateDirective::Filter { label, text, align } => {
                let fmt = derive_rust_xlsx_format(&template.fmt_directive_filter.with_(
                    SpecCellFormat {
                        align: Some(align.as_str().to_string()),
                        ..Default::default()
                    },
                ));
                write_merged_text(
                    worksheet,
                    n_row,
                    n_row,
                    n_cols,
                    &format!("{label}: {text}"),
                    &fmt,
                )?;
            }
            EnumTemplateDirective::NewLine => {}
        }
        n_row += 1;
    }

    for n_idx_col in 0..n_cols {
        worksheet.write_blank(cast_row_num(n_row)?, cast_col_num(n_idx_col)?, fmt_separator)?;
    }
    Ok(())
}

fn write_headers(
    worksheet: &mut Worksheet,
    row: usize,
    names: &[String],
    layout: &SpecSectionLayout,
    fmt_header: &Format,
) -> Result<()> {
    for (n_idx_col, c_name) in names.iter().enumerate() {
        worksheet.write_string_with_format(
            cast_row_num(row)?,
            cast_col_num(n_idx_col)?,
            c_name,
            fmt_header,
        )?;
    }

    let n_row_filter_end = layout
        .section(EnumSectionKind::Data)
        .and_then(|section| section.row_end_inclusive())
        .unwrap_or(row);
    worksheet.autofilter(
        cast_row_num(row)?,
        0,
        cast_row_num(n_row_filter_end)?,
        cast_col_num(names.len().saturating_sub(1))?,
    )?;
    Ok(())
}

/// Write `text` over rows `row_first..=row_last` (1-based) and all columns,
/// merging when the range covers more than one cell.
pub(crate) fn write_merged_text(
    worksheet: &mut Worksheet,
    row_first: usize,
    row_last: usize,
    n_cols: usize,
    text: &str,
    format: &Format,
) -> Result<()> {
    let n_col_last = n_cols.saturating_sub(1);
    if row_first == row_last && n_col_last == 0 {
        worksheet.write_string_with_format(cast_row_num(row_first)?, 0, text, format)?;
    } else {
        worksheet.merge_range(
            cast_row_num(row_first)?,
            0,
            cast_row_num(row_last)?,
            cast_col_num(n_col_last)?,
            text,
            format,
        )?;
    }
    Ok(())
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
) -> Result<()> {
    let n_row = cast_row_num(row)?;
    let n_col = cast_col_num(col_idx)?;
    match value {
        EnumCellValue::None => {
            worksheet.write_blank(n_row, n_col, format)?;
        }
        EnumCellValue::String(val) if val.is_empty() => {
            worksheet.write_blank(n_row, n_col, format)?;
        }
        EnumCellValue::String(val) => {
            worksheet.write_string_with_format(n_row, n_col, val, format)?;
        }
        EnumCellValue::Number(val) => {
            worksheet.write_number_with_format(n_row, n_col, *val, format)?;
        }
    }
    Ok(())
}

/// Convert a [`SpecCellFormat`] into a `rust_xlsxwriter` format.
pub(crate) fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = &spec.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }
    if spec.italic.unwrap_or(false) {
        format = format.set_italic();
    }

    for val in [&spec.align, &spec.valign].into_iter().flatten() {
        if let Some(align) = derive_format_align(val) {
            format = format.set_align(align);
        }
    }

    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }
    if let Some(val) = &spec.bg_color {
        format = format.set_background_color(val.as_str());
    }
    if let Some(val) = &spec.font_color {
        format = format.set_font_color(val.as_str());
    }
    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }
    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        7 => FormatBorder::Hair,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    let value = align.trim().to_ascii_lowercase();
    match value.as_str() {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "justify" => Some(FormatAlign::Justify),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        _ => None,
    }
}

/// Zero-based worksheet row of a 1-based layout row.
pub(crate) fn cast_row_num(row: usize) -> Result<u32> {
    row.checked_sub(1)
        .and_then(|n_row| u32::try_from(n_row).ok())
        .ok_or_else(|| DataExportError::Layout(format!("row index out of range: {row}")))
}

pub(crate) fn cast_col_num(value: usize) -> Result<u16> {
    u16::try_from(value)
        .map_err(|_| DataExportError::Layout(format!("column index overflow: {value}")))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::io::Cursor;

    use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};

    use super::*;
    use crate::conf::derive_default_export_labels;
    use crate::spec::{EnumTextAlign, EnumTitleSize};
    use crate::template::derive_cell_format_from_style;

    fn payload(directives: Vec<EnumTemplateDirective>) -> SpecExportPayload {
        SpecExportPayload {
            sheet_name: "Люди".to_string(),
            rows: vec![
                vec![
                    EnumCellValue::Number(1.0),
                    EnumCellValue::String("Ann".to_string()),
                    EnumCellValue::Number(30.0),
                ],
                vec![
                    EnumCellValue::Number(2.0),
                    EnumCellValue::String(String::new()),
                    EnumCellValue::Number(0.0),
                ],
            ],
            names: vec!["п/н".to_string(), "Name".to_string(), "Age".to_string()],
            fields: vec!["counter".to_string(), "name".to_string(), "age".to_string()],
            filters: "Test\r\nДата выгрузки: 01.02.2026".to_string(),
            widths: vec![40.0, 120.0, 60.0],
            directives,
        }
    }

    fn read_back(v_bytes: Vec<u8>, sheet_name: &str) -> calamine::Range<Data> {
        let mut workbook: Xlsx<_> =
            open_workbook_from_rs(Cursor::new(v_bytes)).expect("open written workbook");
        workbook
            .worksheet_range(sheet_name)
            .expect("read written sheet")
    }

    fn read_back_styles(v_bytes: Vec<u8>) -> umya_spreadsheet::Spreadsheet {
        umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(v_bytes), true)
            .expect("open written workbook")
    }

    fn text_at(range: &calamine::Range<Data>, row: u32, col: u32) -> Option<String> {
        match range.get_value((row, col)) {
            Some(Data::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_write_payload_without_directives() {
        let mut writer = XlsxExportWriter::new(SpecExportTemplate::default());
        let report = writer
            .write_payload(&payload(vec![]), &derive_default_export_labels())
            .expect("write payload");
        let range = read_back(writer.save_to_buffer().expect("save"), "Люди");

        assert_eq!(
            text_at(&range, 0, 0).as_deref(),
            Some("Test\nДата выгрузки: 01.02.2026")
        );
        assert_eq!(text_at(&range, 2, 1).as_deref(), Some("Name"));
        assert_eq!(range.get_value((3, 0)), Some(&Data::Float(1.0)));
        assert_eq!(text_at(&range, 3, 1).as_deref(), Some("Ann"));
        assert_eq!(range.get_value((4, 2)), Some(&Data::Float(0.0)));
        assert_eq!(text_at(&range, 5, 0).as_deref(), Some("Всего: 2 записи"));

        assert_eq!(report.n_records, 2);
        assert_eq!(report.layout.n_rows_total(), 6);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_write_payload_with_directives() {
        let directives = vec![
            EnumTemplateDirective::Title {
                label: "Отчёт".to_string(),
                size: EnumTitleSize::H2,
            },
            EnumTemplateDirective::NewLine,
            EnumTemplateDirective::Filter {
                label: "Статус".to_string(),
                text: "открыт".to_string(),
                align: EnumTextAlign::Right,
            },
        ];
        let mut writer = XlsxExportWriter::new(SpecExportTemplate::default());
        let report = writer
            .write_payload(&payload(directives), &derive_default_export_labels())
            .expect("write payload");
        let range = read_back(writer.save_to_buffer().expect("save"), "Люди");

        assert_eq!(text_at(&range, 2, 0).as_deref(), Some("Отчёт"));
        assert_eq!(text_at(&range, 4, 0).as_deref(), Some("Статус: открыт"));
        assert_eq!(text_at(&range, 6, 0).as_deref(), Some("п/н"));
        assert_eq!(text_at(&range, 7, 1).as_deref(), Some("Ann"));
        assert_eq!(text_at(&range, 9, 0), None);
        assert_eq!(
            report
                .layout
                .section(EnumSectionKind::Total)
                .map(|s| s.n_rows),
            Some(0)
        );
    }

    #[test]
    fn test_write_payload_sanitizes_sheet_name() {
        let mut payload = payload(vec![]);
        payload.sheet_name = "a/b".to_string();

        let mut writer = XlsxExportWriter::new(SpecExportTemplate::default());
        let report = writer
            .write_payload(&payload, &derive_default_export_labels())
            .expect("write payload");

        assert_eq!(report.sheet_name, "a_b");
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_single_column_single_line_filters_are_not_merged() {
        let payload = SpecExportPayload {
            sheet_name: "S".to_string(),
            rows: vec![],
            names: vec!["п/н".to_string()],
            fields: vec!["counter".to_string()],
            filters: "Дата выгрузки: 01.02.2026".to_string(),
            widths: vec![40.0],
            directives: vec![],
        };

        let mut writer = XlsxExportWriter::new(SpecExportTemplate::default());
        writer
            .write_payload(&payload, &derive_default_export_labels())
            .expect("write payload");
        let range = read_back(writer.save_to_buffer().expect("save"), "S");

        assert_eq!(
            text_at(&range, 0, 0).as_deref(),
            Some("Дата выгрузки: 01.02.2026")
        );
        assert_eq!(text_at(&range, 1, 0).as_deref(), Some("п/н"));
    }

    #[test]
    fn test_write_payload_merges_sections_and_sets_widths() {
        let directives = vec![
            EnumTemplateDirective::Title {
                label: "Отчёт".to_string(),
                size: EnumTitleSize::H1,
            },
            EnumTemplateDirective::NewLine,
            EnumTemplateDirective::Filter {
                label: "Статус".to_string(),
                text: "открыт".to_string(),
                align: EnumTextAlign::Left,
            },
        ];
        let mut writer = XlsxExportWriter::new(SpecExportTemplate::default());
        writer
            .write_payload(&payload(directives), &derive_default_export_labels())
            .expect("write payload");
        let book = read_back_styles(writer.save_to_buffer().expect("save"));
        let sheet = book.get_sheet_by_name("Люди").expect("sheet");

        let set_merges: BTreeSet<String> = sheet
            .get_merge_cells()
            .iter()
            .map(|range| range.get_range())
            .collect();
        let set_expected: BTreeSet<String> = ["A1:C2", "A3:C3", "A5:C5"]
            .into_iter()
            .map(str::to_string)
            .collect();
        assert_eq!(set_merges, set_expected);

        for c_cell in ["A6", "B6", "C6"] {
            let cell = sheet.get_cell(c_cell).expect("separator cell");
            assert_eq!(cell.get_value(), "");
            assert_eq!(
                derive_cell_format_from_style(cell.get_style())
                    .bg_color
                    .as_deref(),
                Some("#BFBFBF")
            );
        }

        let auto_filter = sheet.get_auto_filter().expect("autofilter");
        assert_eq!(auto_filter.get_range().get_range(), "A7:C9");

        for (n_col, n_width_expected) in [(2_u32, 20.0), (3, 10.0)] {
            let n_width = *sheet
                .get_column_dimension_by_number(&n_col)
                .expect("column width")
                .get_width();
            assert!(
                (n_width_expected..n_width_expected + 1.0).contains(&n_width),
                "column {n_col}: {n_width}"
            );
        }
    }

    #[test]
    fn test_write_payload_without_directives_filters_header_row() {
        let mut writer = XlsxExportWriter::new(SpecExportTemplate::default());
        writer
            .write_payload(&payload(vec![]), &derive_default_export_labels())
            .expect("write payload");
        let book = read_back_styles(writer.save_to_buffer().expect("save"));
        let sheet = book.get_sheet_by_name("Люди").expect("sheet");

        let l_merges: Vec<String> = sheet
            .get_merge_cells()
            .iter()
            .map(|range| range.get_range())
            .collect();
        assert_eq!(l_merges, vec!["A1:C2".to_string()]);
        let auto_filter = sheet.get_auto_filter().expect("autofilter");
        assert_eq!(auto_filter.get_range().get_range(), "A3:C5");
    }

    #[test]
    fn test_write_payload_accepts_names_excel_rejects() {
        for (c_name, c_sheet) in [("'Q1'", "Q1"), ("History", "History_")] {
            let mut payload = payload(vec![]);
            payload.sheet_name = c_name.to_string();

            let mut writer = XlsxExportWriter::new(SpecExportTemplate::default());
            let report = writer
                .write_payload(&payload, &derive_default_export_labels())
                .expect("write payload");
            let range = read_back(writer.save_to_buffer().expect("save"), c_sheet);

            assert_eq!(report.sheet_name, c_sheet);
            assert_eq!(report.warnings.len(), 1);
            assert_eq!(text_at(&range, 2, 1).as_deref(), Some("Name"));
        }
    }

    #[test]
    fn test_cast_row_num_is_one_based() {
        assert_eq!(cast_row_num(1).expect("row"), 0);
        assert!(cast_row_num(0).is_err());
        assert!(cast_col_num(70_000).is_err());
    }
}
