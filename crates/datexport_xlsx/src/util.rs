//! Stateless helpers of the export pipeline: value formatting, tree
//! flattening, directive normalization and naming.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use log::debug;

use crate::conf::{
    C_DATE_DISPLAY_FORMAT, C_EXCEL_SHEET_NAME_RESERVED, C_EXPORT_FILE_EXTENSION, C_FIELD_COUNTER,
    C_FILTER_LINE_SEPARATOR, N_LEN_EXCEL_SHEET_NAME_MAX, TUP_EXCEL_ILLEGAL, TUP_FILE_NAME_ILLEGAL,
};
use crate::spec::{
    EnumCellValue, EnumDirectiveKind, EnumFieldValue, EnumTemplateDirective, EnumTextAlign,
    EnumTitleSize, SpecDirectiveDecl, SpecExportLabels, SpecFilterItem, SpecRecord,
};

////////////////////////////////////////////////////////////////////////////////
// #region ValueFormatting

/// Convert a raw field value into its display cell value.
///
/// Dates render as `DD.MM.YYYY`, booleans as `boolean_names[0]`/`[1]`,
/// numeric zero stays `0`, and every other falsy value becomes `""`.
pub fn format_field_value(
    value: Option<&EnumFieldValue>,
    boolean_names: &[String; 2],
) -> EnumCellValue {
    let Some(value) = value else {
        return EnumCellValue::String(String::new());
    };

    match value {
        EnumFieldValue::None => EnumCellValue::String(String::new()),
        EnumFieldValue::Date(date) => {
            EnumCellValue::String(date.format(C_DATE_DISPLAY_FORMAT).to_string())
        }
        EnumFieldValue::DateTime(dt) => {
            EnumCellValue::String(dt.format(C_DATE_DISPLAY_FORMAT).to_string())
        }
        EnumFieldValue::Boolean(b) => {
            let c_label = if *b {
                &boolean_names[0]
            } else {
                &boolean_names[1]
            };
            EnumCellValue::String(c_label.clone())
        }
        EnumFieldValue::Number(n) => {
            if n.is_nan() {
                EnumCellValue::String(String::new())
            } else {
                EnumCellValue::Number(*n)
            }
        }
        EnumFieldValue::String(s) => EnumCellValue::String(s.clone()),
    }
}

/// Cell value of the counter column for one record.
///
/// Flattened records carry their position label; otherwise a truthy
/// `counter` field is kept, and the sequential counter fills the rest.
pub fn derive_counter_cell(
    record: &SpecRecord,
    n_counter_next: &mut u64,
    boolean_names: &[String; 2],
) -> EnumCellValue {
    if let Some(c_position) = &record.position {
        return derive_position_cell(c_position);
    }

    match record.get(C_FIELD_COUNTER) {
        Some(value) if value.is_truthy() => format_field_value(Some(value), boolean_names),
        _ => {
            let n_counter = *n_counter_next;
            *n_counter_next += 1;
            EnumCellValue::Number(n_counter as f64)
        }
    }
}

/// Root labels (`"3"`) are written as numbers, nested labels as text.
pub fn derive_position_cell(position: &str) -> EnumCellValue {
    match position.parse::<u64>() {
        Ok(n) => EnumCellValue::Number(n as f64),
        Err(_) => EnumCellValue::String(position.to_string()),
    }
}

/// Plain text of a cell value.
pub fn derive_cell_text(value: &EnumCellValue) -> String {
    match value {
        EnumCellValue::None => String::new(),
        EnumCellValue::String(s) => s.clone(),
        EnumCellValue::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region HierarchyFlattening

/// Order tree records depth-first and assign dotted position labels.
///
/// Roots (null/absent `pkey`) are numbered `1, 2, ...` in input order.
/// Children of a node are looked up only when the node carries the
/// `_haschilds` hint; they are numbered `parent.1, parent.2, ...` in input
/// order. Records not reachable from a root are dropped.
pub fn flatten_hierarchy(records: &[SpecRecord], key: &str, pkey: &str) -> Vec<SpecRecord> {
    let mut l_roots_idx = Vec::new();
    let mut dict_children_idx: BTreeMap<String, Vec<usize>> = BTreeMap::new();

    for (n_idx, record) in records.iter().enumerate() {
        match record.get(pkey).and_then(derive_key_token) {
            None => l_roots_idx.push(n_idx),
            Some(c_token) => dict_children_idx.entry(c_token).or_default().push(n_idx),
        }
    }

    let mut l_result = Vec::with_capacity(records.len());
    let mut set_visited = BTreeSet::new();
    for (n_idx_root, n_idx) in l_roots_idx.into_iter().enumerate() {
        append_subtree(
            records,
            key,
            &dict_children_idx,
            n_idx,
            (n_idx_root + 1).to_string(),
            &mut set_visited,
            &mut l_result,
        );
    }

    if l_result.len() < records.len() {
        debug!(
            "flatten_hierarchy: {} of {} records unreachable from roots",
            records.len() - l_result.len(),
            records.len()
        );
    }
    l_result
}

fn append_subtree(
    records: &[SpecRecord],
    key: &str,
    dict_children_idx: &BTreeMap<String, Vec<usize>>,
    n_idx: usize,
    c_position: String,
    set_visited: &mut BTreeSet<usize>,
    l_result: &mut Vec<SpecRecord>,
) {
    // Duplicate keys can make a record its own descendant.
    if !set_visited.insert(n_idx) {
        return;
    }

    let record = &records[n_idx];
    let mut record_out = record.clone();
    record_out.position = Some(c_position.clone());
    l_result.push(record_out);

    if !record.has_children() {
        return;
    }
    let Some(l_children_idx) = record
        .get(key)
        .and_then(derive_key_token)
        .and_then(|c_token| dict_children_idx.get(&c_token))
    else {
        return;
    };

    for (n_idx_child, n_idx_record) in l_children_idx.iter().enumerate() {
        append_subtree(
            records,
            key,
            dict_children_idx,
            *n_idx_record,
            format!("{c_position}.{}", n_idx_child + 1),
            set_visited,
            l_result,
        );
    }
}

/// Comparable token of a key value; `None` for null keys.
///
/// Numbers and numeric text share a token, so `7` matches `"7"`.
pub fn derive_key_token(value: &EnumFieldValue) -> Option<String> {
    match value {
        EnumFieldValue::None => None,
        EnumFieldValue::Number(n) => Some(derive_cell_text(&EnumCellValue::Number(*n))),
        EnumFieldValue::String(s) => match s.trim().parse::<f64>() {
            Ok(n) if !s.trim().is_empty() => Some(derive_cell_text(&EnumCellValue::Number(n))),
            _ => Some(s.clone()),
        },
        EnumFieldValue::Boolean(b) => Some(b.to_string()),
        EnumFieldValue::Date(date) => Some(date.to_string()),
        EnumFieldValue::DateTime(dt) => Some(dt.to_string()),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TemplateDirectives

/// Normalize declared directives into renderable ones, preserving order.
///
/// Titles without a label, filters without text and unknown kinds are
/// skipped; missing or unparseable size/align fall back to `h1`/`left`.
pub fn collect_template_directives(decls: &[SpecDirectiveDecl]) -> Vec<EnumTemplateDirective> {
    decls
        .iter()
        .filter_map(|decl| match decl.kind {
            EnumDirectiveKind::Title => {
                let Some(c_label) = decl.label.clone() else {
                    debug!("skip title directive without label");
                    return None;
                };
                Some(EnumTemplateDirective::Title {
                    label: c_label,
                    size: decl
                        .size
                        .as_deref()
                        .map(EnumTitleSize::parse_lenient)
                        .unwrap_or_default(),
                })
            }
            EnumDirectiveKind::NewLine => Some(EnumTemplateDirective::NewLine),
            EnumDirectiveKind::Filter => {
                let c_text = decl.text.clone().filter(|s| !s.is_empty())?;
                Some(EnumTemplateDirective::Filter {
                    label: decl.label.clone().unwrap_or_default(),
                    text: c_text,
                    align: decl
                        .align
                        .as_deref()
                        .map(EnumTextAlign::parse_lenient)
                        .unwrap_or_default(),
                })
            }
            EnumDirectiveKind::Unknown => None,
        })
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SummaryText

/// Build the multi-line filter summary.
///
/// Lines: export title (when set), one `label: value` line per filter
/// (label only for falsy values), then the export date line.
pub fn derive_filter_summary(
    export_title: Option<&str>,
    filters: &[SpecFilterItem],
    date_export: NaiveDate,
    labels: &SpecExportLabels,
) -> String {
    let mut l_lines = Vec::with_capacity(filters.len() + 2);

    if let Some(c_title) = export_title.filter(|s| !s.is_empty()) {
        l_lines.push(c_title.to_string());
    }

    for item in filters {
        match &item.value {
            Some(value) if value.is_truthy() => {
                let c_value = derive_cell_text(&format_field_value(
                    Some(value),
                    &labels.boolean_names,
                ));
                l_lines.push(format!("{}: {c_value}", item.label));
            }
            _ => l_lines.push(item.label.clone()),
        }
    }

    l_lines.push(format!(
        "{}: {}",
        labels.export_date_label,
        date_export.format(C_DATE_DISPLAY_FORMAT)
    ));

    l_lines.join(C_FILTER_LINE_SEPARATOR)
}

/// Select the plural form for `number` by Slavic rules.
///
/// `forms` holds the forms for 1, for 2–4 and for 0/5–20.
pub fn select_plural_form(number: u64, forms: &[String; 3]) -> &str {
    let n_mod_100 = number % 100;
    let n_idx_form = if (5..20).contains(&n_mod_100) {
        2
    } else {
        match number % 10 {
            1 => 0,
            2..=4 => 1,
            _ => 2,
        }
    };
    &forms[n_idx_form]
}

/// Total line text, e.g. `Всего: 3 записи`.
pub fn derive_total_text(n_records: usize, labels: &SpecExportLabels) -> String {
    format!(
        "{}: {n_records} {}",
        labels.total_label,
        select_plural_form(n_records as u64, &labels.entry_forms)
    )
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Naming

/// Spreadsheet column letters of a zero-based index (`0 -> A`, `26 -> AA`).
pub fn derive_column_name(index: usize) -> String {
    let mut l_chars = Vec::new();
    let mut n_rest = index + 1;
    while n_rest > 0 {
        let n_rem = (n_rest - 1) % 26;
        l_chars.push(char::from(b'A' + n_rem as u8));
        n_rest = (n_rest - 1) / 26;
    }
    l_chars.iter().rev().collect()
}

/// A1-style range of 1-based rows and zero-based columns.
pub fn derive_range_ref(
    row_start: usize,
    col_start: usize,
    row_end: usize,
    col_end: usize,
) -> String {
    format!(
        "{}{row_start}:{}{row_end}",
        derive_column_name(col_start),
        derive_column_name(col_end)
    )
}

/// Convert a pixel width into Excel column-width units.
pub fn convert_width_px_to_excel(width_px: f64, ratio_px_per_width_unit: f64) -> f64 {
    width_px / ratio_px_per_width_unit
}

/// Replace invalid chars and trim to valid Excel sheet name.
///
/// Names may not start or end with an apostrophe, and `History` is
/// reserved by Excel in any letter case.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    let c_name: String = c_name
        .trim()
        .chars()
        .take(N_LEN_EXCEL_SHEET_NAME_MAX)
        .collect();
    let c_name = c_name.trim_matches('\'').trim();

    if c_name.is_empty() {
        "Sheet".to_string()
    } else if c_name.eq_ignore_ascii_case(C_EXCEL_SHEET_NAME_RESERVED) {
        format!("{c_name}{replace_to}")
    } else {
        c_name.to_string()
    }
}

/// File name of the exported workbook: sheet name plus `.xlsx`.
pub fn derive_export_file_name(sheet_name: &str) -> String {
    let mut c_stem = sheet_name.to_string();
    for c_illegal in TUP_FILE_NAME_ILLEGAL {
        c_stem = c_stem.replace(c_illegal, "_");
    }
    let c_stem = c_stem.trim();
    let c_stem = if c_stem.is_empty() { "export" } else { c_stem };

    format!("{c_stem}{C_EXPORT_FILE_EXTENSION}")
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
