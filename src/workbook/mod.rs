//! Workbook assembly: extracted tables → named sheets.
//!
//! Two layouts:
//!
//! * [`ExportMode::SeparateSheets`] — one sheet per table. Sheet names come
//!   from the table names, stripped of the characters spreadsheet
//!   applications reject, cut to 31 characters and made unique with `_1`,
//!   `_2`, … suffixes.
//! * [`ExportMode::MergeAll`] — one `"Combined Data"` sheet holding every
//!   row; its columns are the union of all headers in first-seen order.
//!
//! Assembly is pure and in-memory. [`xlsx`] turns the result into a file.

pub mod xlsx;

use crate::table::ExtractedTable;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

/// Longest sheet name spreadsheet applications accept.
pub const MAX_SHEET_NAME_CHARS: usize = 31;
/// Column width hints never exceed this many characters (plus padding).
pub const MAX_COLUMN_WIDTH: usize = 50;
/// Padding added to every width hint.
pub const COLUMN_WIDTH_PADDING: usize = 2;
/// Rows sampled for width hints in merge mode.
pub const MERGE_WIDTH_SAMPLE_ROWS: usize = 100;
/// Name of the single sheet produced in merge mode.
pub const MERGED_SHEET_NAME: &str = "Combined Data";

static FORBIDDEN_SHEET_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\\/?*\[\]:]").expect("valid sheet-name regex"));

/// How tables are laid out in the workbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    #[default]
    SeparateSheets,
    MergeAll,
}

/// One named sheet, rows aligned to `columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Display width hint per column, in characters.
    pub column_widths: Vec<usize>,
}

/// An in-memory workbook, ready for an encoder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// Lay out `tables` according to `mode`.
    pub fn assemble(tables: &[ExtractedTable], mode: ExportMode) -> Self {
        match mode {
            ExportMode::SeparateSheets => separate_sheets(tables),
            ExportMode::MergeAll => merged_sheet(tables),
        }
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

fn separate_sheets(tables: &[ExtractedTable]) -> Workbook {
    let names = plan_sheet_names(tables);
    let sheets = tables
        .iter()
        .zip(names)
        .map(|(table, name)| {
            let columns = unique_in_order(table.headers.iter());
            let rows = align_rows(std::iter::once(table), &columns);
            let column_widths = column_widths(&columns, &rows);
            Sheet {
                name,
                columns,
                rows,
                column_widths,
            }
        })
        .collect();
    Workbook { sheets }
}

fn merged_sheet(tables: &[ExtractedTable]) -> Workbook {
    if tables.is_empty() {
        return Workbook::default();
    }
    let columns = unique_in_order(tables.iter().flat_map(|t| t.headers.iter()));
    let rows = align_rows(tables.iter(), &columns);
    let sample = &rows[..rows.len().min(MERGE_WIDTH_SAMPLE_ROWS)];
    let column_widths = column_widths(&columns, sample);
    Workbook {
        sheets: vec![Sheet {
            name: MERGED_SHEET_NAME.to_string(),
            columns,
            rows,
            column_widths,
        }],
    }
}

/// Final sheet name for every table, in table order.
///
/// Names are unique (case-insensitively), at most 31 characters, and free of
/// `\ / ? * [ ] :`.
pub fn plan_sheet_names(tables: &[ExtractedTable]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    tables
        .iter()
        .enumerate()
        .map(|(index, table)| {
            let base = base_sheet_name(&table.table_name, index);
            let name = first_unused(&base, &used);
            used.insert(name.to_lowercase());
            name
        })
        .collect()
}

fn base_sheet_name(table_name: &str, index: usize) -> String {
    let cleaned = FORBIDDEN_SHEET_CHARS.replace_all(table_name, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        format!("Table {}", index + 1)
    } else {
        cleaned.to_string()
    }
}

fn first_unused(base: &str, used: &HashSet<String>) -> String {
    let candidate = truncate_chars(base, MAX_SHEET_NAME_CHARS);
    if !used.contains(&candidate.to_lowercase()) {
        return candidate;
    }
    (1..)
        .map(|n| {
            let suffix = format!("_{n}");
            let keep = MAX_SHEET_NAME_CHARS.saturating_sub(suffix.chars().count());
            format!("{}{}", truncate_chars(base, keep), suffix)
        })
        .find(|c| !used.contains(&c.to_lowercase()))
        .unwrap_or_default()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn unique_in_order<'a>(headers: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut columns = Vec::new();
    for h in headers {
        if seen.insert(h.as_str()) {
            columns.push(h.clone());
        }
    }
    columns
}

fn align_rows<'a>(
    tables: impl Iterator<Item = &'a ExtractedTable>,
    columns: &[String],
) -> Vec<Vec<String>> {
    tables
        .flat_map(|t| t.rows.iter())
        .map(|row| {
            columns
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or_default())
                .collect()
        })
        .collect()
}

/// `min(max(header, widest cell), 50) + 2` per column.
fn column_widths(columns: &[String], rows: &[Vec<String>]) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let widest = rows
                .iter()
                .filter_map(|r| r.get(i))
                .map(|v| v.chars().count())
                .fold(header.chars().count(), usize::max);
            widest.min(MAX_COLUMN_WIDTH) + COLUMN_WIDTH_PADDING
        })
        .collect()
}

/// Output file name derived from the source document.
///
/// `report.pdf` → `report_ocr.xlsx`, or `report_merged_ocr.xlsx` in merge
/// mode. URLs and paths are reduced to their last segment.
pub fn suggested_filename(source: &str, mode: ExportMode) -> String {
    let last = source
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source)
        .split(['?', '#'])
        .next()
        .unwrap_or("");
    let name = Path::new(last);
    let is_pdf = name
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    let stem = (if is_pdf { name.file_stem() } else { name.file_name() })
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = stem.as_str();
    let stem = if stem.trim().is_empty() {
        "extracted_data"
    } else {
        stem
    };
    let merged = match mode {
        ExportMode::MergeAll => "_merged",
        ExportMode::SeparateSheets => "",
    };
    format!("{stem}{merged}_ocr.xlsx")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, headers: &[&str], data: &[&[&str]]) -> ExtractedTable {
        let data: Vec<Vec<&str>> = data.iter().map(|r| r.to_vec()).collect();
        ExtractedTable::from_positional(
            name,
            headers.iter().map(|h| h.to_string()).collect(),
            &data,
        )
    }

    #[test]
    fn repeated_names_get_suffixes() {
        let tables = vec![
            table("Report", &["A"], &[]),
            table("Report", &["A"], &[]),
            table("Report", &["A"], &[]),
        ];
        assert_eq!(plan_sheet_names(&tables), vec!["Report", "Report_1", "Report_2"]);
    }

    #[test]
    fn forbidden_characters_are_removed() {
        let tables = vec![table("Q1/Q2 [draft]: sales*?", &["A"], &[])];
        assert_eq!(plan_sheet_names(&tables), vec!["Q1Q2 draft sales"]);
    }

    #[test]
    fn empty_name_falls_back_to_table_index() {
        let tables = vec![table("T", &["A"], &[]), table(" /?* ", &["A"], &[])];
        assert_eq!(plan_sheet_names(&tables), vec!["T", "Table 2"]);
    }

    #[test]
    fn long_names_stay_within_limit_after_suffixing() {
        let long = "Quarterly revenue by region and product line";
        let tables = vec![table(long, &["A"], &[]), table(long, &["A"], &[])];
        let names = plan_sheet_names(&tables);
        assert_eq!(names[0], "Quarterly revenue by region and");
        assert_eq!(names[0].chars().count(), 31);
        assert_eq!(names[1], "Quarterly revenue by region a_1");
        assert_eq!(names[1].chars().count(), 31);
    }

    #[test]
    fn names_differing_only_in_case_are_distinct_sheets() {
        let tables = vec![table("Sales", &["A"], &[]), table("SALES", &["A"], &[])];
        assert_eq!(plan_sheet_names(&tables), vec!["Sales", "SALES_1"]);
    }

    #[test]
    fn suffix_skips_names_already_taken() {
        let tables = vec![
            table("Report_1", &["A"], &[]),
            table("Report", &["A"], &[]),
            table("Report", &["A"], &[]),
        ];
        assert_eq!(plan_sheet_names(&tables), vec!["Report_1", "Report", "Report_2"]);
    }

    #[test]
    fn separate_sheets_follow_header_order_and_widths() {
        let tables = vec![table(
            "People",
            &["Name", "Age"],
            &[&["Alice", "30"], &["Bartholomew", "7"]],
        )];
        let wb = Workbook::assemble(&tables, ExportMode::SeparateSheets);
        let sheet = &wb.sheets[0];
        assert_eq!(sheet.columns, vec!["Name", "Age"]);
        assert_eq!(sheet.rows[1], vec!["Bartholomew", "7"]);
        assert_eq!(sheet.column_widths, vec![11 + 2, 3 + 2]);
    }

    #[test]
    fn width_is_capped() {
        let long = "x".repeat(80);
        let tables = vec![table("T", &["A"], &[&[long.as_str()]])];
        let wb = Workbook::assemble(&tables, ExportMode::SeparateSheets);
        assert_eq!(wb.sheets[0].column_widths, vec![52]);
    }

    #[test]
    fn merge_uses_header_union_in_first_seen_order() {
        let tables = vec![
            table("One", &["A", "B"], &[&["a1", "b1"]]),
            table("Two", &["B", "C"], &[&["b2", "c2"]]),
        ];
        let wb = Workbook::assemble(&tables, ExportMode::MergeAll);
        assert_eq!(wb.sheet_names(), vec![MERGED_SHEET_NAME]);
        let sheet = &wb.sheets[0];
        assert_eq!(sheet.columns, vec!["A", "B", "C"]);
        assert_eq!(sheet.rows[0], vec!["a1", "b1", ""]);
        assert_eq!(sheet.rows[1], vec!["", "b2", "c2"]);
    }

    #[test]
    fn merge_widths_sample_only_a_prefix() {
        let mut data: Vec<Vec<String>> = (0..MERGE_WIDTH_SAMPLE_ROWS).map(|_| vec!["x".into()]).collect();
        data.push(vec!["y".repeat(30)]);
        let t = ExtractedTable::from_positional("T", vec!["Col".into()], &data);
        let wb = Workbook::assemble(&[t], ExportMode::MergeAll);
        assert_eq!(wb.sheets[0].rows.len(), MERGE_WIDTH_SAMPLE_ROWS + 1);
        assert_eq!(wb.sheets[0].column_widths, vec![3 + 2]);
    }

    #[test]
    fn merge_of_nothing_is_empty() {
        assert!(Workbook::assemble(&[], ExportMode::MergeAll).sheets.is_empty());
    }

    #[test]
    fn duplicate_headers_become_one_column() {
        let tables = vec![table("T", &["A", "A", "B"], &[&["1", "2", "3"]])];
        let wb = Workbook::assemble(&tables, ExportMode::SeparateSheets);
        assert_eq!(wb.sheets[0].columns, vec!["A", "B"]);
        assert_eq!(wb.sheets[0].rows[0], vec!["2", "3"]);
    }

    #[test]
    fn filename_convention() {
        assert_eq!(suggested_filename("invoice.pdf", ExportMode::SeparateSheets), "invoice_ocr.xlsx");
        assert_eq!(
            suggested_filename("/tmp/docs/invoice.pdf", ExportMode::MergeAll),
            "invoice_merged_ocr.xlsx"
        );
        assert_eq!(
            suggested_filename("https://example.com/files/a.pdf?dl=1", ExportMode::SeparateSheets),
            "a_ocr.xlsx"
        );
        assert_eq!(suggested_filename("", ExportMode::SeparateSheets), "extracted_data_ocr.xlsx");
    }

    #[test]
    fn filename_extension_is_case_insensitive() {
        assert_eq!(suggested_filename("Report.Pdf", ExportMode::SeparateSheets), "Report_ocr.xlsx");
        assert_eq!(suggested_filename("SCAN.PDF", ExportMode::MergeAll), "SCAN_merged_ocr.xlsx");
        assert_eq!(
            suggested_filename("notes.v2.txt", ExportMode::SeparateSheets),
            "notes.v2.txt_ocr.xlsx"
        );
    }
}
