//! Section layout planning: where each block of the sheet starts and ends.

use crate::conf::{C_FILTER_LINE_SEPARATOR, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX};
use crate::spec::{
    DataExportError, EnumSectionKind, EnumTemplateDirective, Result, SpecSectionLayout,
    SpecSectionRange,
};
use crate::util::derive_range_ref;

/// Plan contiguous 1-based row ranges for all sections.
///
/// Sections follow each other without gaps in the order Filters,
/// Directives, Headers, Data, Total:
/// - Filters: one row per summary line, starting at row 1.
/// - Directives: one row per directive plus a separator row; empty when
///   there are no directives.
/// - Headers: one row.
/// - Data: one row per record.
/// - Total: one row, only without directives and with at least one record.
pub fn plan_section_layout(
    filter_summary: &str,
    directives: &[EnumTemplateDirective],
    n_records: usize,
) -> SpecSectionLayout {
    let n_rows_filters = filter_summary.split(C_FILTER_LINE_SEPARATOR).count();
    let n_rows_directives = if directives.is_empty() {
        0
    } else {
        directives.len() + 1
    };
    let n_rows_total = usize::from(directives.is_empty() && n_records > 0);

    let l_row_counts = [
        (EnumSectionKind::Filters, n_rows_filters),
        (EnumSectionKind::Directives, n_rows_directives),
        (EnumSectionKind::Headers, 1),
        (EnumSectionKind::Data, n_records),
        (EnumSectionKind::Total, n_rows_total),
    ];

    let mut n_row_cursor = 1;
    let sections = l_row_counts
        .into_iter()
        .map(|(kind, n_rows)| {
            let section = SpecSectionRange {
                kind,
                row_start: n_row_cursor,
                n_rows,
            };
            n_row_cursor = section.row_next();
            section
        })
        .collect();

    SpecSectionLayout { sections }
}

/// Reject layouts that do not fit into one worksheet.
pub fn validate_section_layout(layout: &SpecSectionLayout, n_cols: usize) -> Result<()> {
    if n_cols == 0 || n_cols > N_NCOLS_EXCEL_MAX {
        return Err(DataExportError::Layout(format!(
            "column count {n_cols} outside 1..={N_NCOLS_EXCEL_MAX}"
        )));
    }
    let n_rows_total = layout.n_rows_total();
    if n_rows_total > N_NROWS_EXCEL_MAX {
        return Err(DataExportError::Layout(format!(
            "{n_rows_total} rows exceed the worksheet limit of {N_NROWS_EXCEL_MAX}"
        )));
    }
    Ok(())
}

/// A1 ranges of all non-empty sections over `n_cols` columns.
///
/// The total line only covers its first cell.
pub fn derive_section_range_refs(
    layout: &SpecSectionLayout,
    n_cols: usize,
) -> Vec<(EnumSectionKind, String)> {
    let n_col_last = n_cols.saturating_sub(1);
    layout
        .sections
        .iter()
        .filter_map(|section| {
            let n_row_end = section.row_end_inclusive()?;
            let n_col_end = if section.kind == EnumSectionKind::Total {
                0
            } else {
                n_col_last
            };
            Some((
                section.kind,
                derive_range_ref(section.row_start, 0, n_row_end, n_col_end),
            ))
        })
        .collect()
}
