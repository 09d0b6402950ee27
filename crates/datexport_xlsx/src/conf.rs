//! Export constants and default preset factories.

use crate::spec::{SpecCellFormat, SpecExportLabels, SpecExportTemplate};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];
/// Sheet name reserved by Excel (case-insensitive).
pub const C_EXCEL_SHEET_NAME_RESERVED: &str = "History";
/// Characters replaced in the downloaded file name.
pub const TUP_FILE_NAME_ILLEGAL: [&str; 9] = ["<", ">", ":", "\"", "/", "\\", "|", "?", "*"];

/// Field name of the synthetic leading counter column.
pub const C_FIELD_COUNTER: &str = "counter";
/// Record field carrying the "has children" hint of tree grids.
pub const C_FIELD_HAS_CHILDREN: &str = "_haschilds";
/// Fixed pixel width of the counter column.
pub const N_WIDTH_PX_COUNTER: f64 = 40.0;
/// Pixel width used when a column has neither a width nor a calculated width.
pub const N_WIDTH_PX_DEFAULT: f64 = 100.0;
/// Pixels per Excel column-width unit.
pub const N_RATIO_PX_PER_WIDTH_UNIT: f64 = 6.0;

/// Line separator of the filter summary.
pub const C_FILTER_LINE_SEPARATOR: &str = "\r\n";
/// Display format of dates.
pub const C_DATE_DISPLAY_FORMAT: &str = "%d.%m.%Y";
/// Extension appended to the exported sheet name.
pub const C_EXPORT_FILE_EXTENSION: &str = ".xlsx";

/// Marker text of the filter section in the reference template workbook.
pub const C_MARKER_FILTER_SECTION: &str = "[filterSection]";
/// Marker text of the header section in the reference template workbook.
pub const C_MARKER_HEADER_SECTION: &str = "[headerSection]";
/// Marker text of the data section in the reference template workbook.
pub const C_MARKER_DATA_SECTION: &str = "[dataSection]";
/// File name of the reference template workbook.
pub const C_TEMPLATE_FILE_NAME: &str = "reportTemplate.xlsx";
/// MIME type of xlsx workbooks.
pub const C_MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Default localized labels (Russian, as rendered by the grid UI).
pub fn derive_default_export_labels() -> SpecExportLabels {
    SpecExportLabels {
        counter_header: "п/н".to_string(),
        export_date_label: "Дата выгрузки".to_string(),
        total_label: "Всего".to_string(),
        entry_forms: [
            "запись".to_string(),
            "записи".to_string(),
            "записей".to_string(),
        ],
        boolean_names: ["Да".to_string(), "Нет".to_string()],
    }
}

/// Build the built-in export template.
///
/// Mirrors the styling of the reference `reportTemplate.xlsx`: bordered
/// header/data cells, a borderless wrapped filter block, and a shaded
/// separator row under the directive block.
pub fn derive_default_export_template() -> SpecExportTemplate {
    let cfg_base_fmt_spec = SpecCellFormat {
        font_name: Some("Times New Roman".to_string()),
        font_size: Some(11),
        valign: Some("vcenter".to_string()),
        ..Default::default()
    };

    SpecExportTemplate {
        fmt_filter_section: cfg_base_fmt_spec.with_(SpecCellFormat {
            align: Some("left".to_string()),
            valign: Some("top".to_string()),
            text_wrap: Some(true),
            ..Default::default()
        }),
        fmt_header_section: cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            align: Some("center".to_string()),
            border: Some(1),
            text_wrap: Some(true),
            bg_color: Some("#D9E1F2".to_string()),
            ..Default::default()
        }),
        fmt_data_section: cfg_base_fmt_spec.with_(SpecCellFormat {
            align: Some("left".to_string()),
            border: Some(1),
            ..Default::default()
        }),
        fmt_title: cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            align: Some("center".to_string()),
            border: Some(0),
            ..Default::default()
        }),
        fmt_directive_filter: cfg_base_fmt_spec.with_(SpecCellFormat {
            font_size: Some(10),
            border: Some(0),
            ..Default::default()
        }),
        fmt_separator: SpecCellFormat {
            bg_color: Some("#BFBFBF".to_string()),
            ..Default::default()
        },
        fmt_total: cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            ..Default::default()
        }),
        width_px_counter: N_WIDTH_PX_COUNTER,
        width_px_default: N_WIDTH_PX_DEFAULT,
        ratio_px_per_width_unit: N_RATIO_PX_PER_WIDTH_UNIT,
    }
}
