//! Report assembly: category buckets and missing records as sheet specs.

use std::path::{Path, PathBuf};

use tabel_xlsx::SheetSpec;

use crate::align::MissingRecord;
use crate::error::Side;
use crate::scan::{Category, DifferenceEntry};

pub const SHEET_VV: &str = "ВВ";
pub const SHEET_DP: &str = "ДП";
pub const SHEET_OTHER: &str = "Остальные";
pub const SHEET_MISSING: &str = "Отсутствующие";

const HEADER_VV_ARGB: &str = "FFFF0000";
const HEADER_DP_ARGB: &str = "FF0000FF";
const HEADER_OTHER_ARGB: &str = "FF008000";
const HEADER_MISSING_ARGB: &str = "FFFFA500";

const DIFF_COLUMNS: [&str; 5] = ["ID", "ФИО", "Дата", "Базовый файл", "Файл сравнения"];
const MISSING_COLUMNS: [&str; 3] = ["ID", "ФИО", "Статус"];

pub const STATUS_MISSING_FROM_BASE: &str = "Отсутствует в БАЗОВОМ файле";
pub const STATUS_MISSING_FROM_COMPARE: &str = "Отсутствует в ФАЙЛЕ СРАВНЕНИЯ";

/// Report location: beside the base file, `Сравнение_<base-stem>.xlsx`.
pub fn report_output_path(base_path: &Path) -> PathBuf {
    let stem = base_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    base_path.with_file_name(format!("Сравнение_{stem}.xlsx"))
}

/// Build the four report sheets: one per category (rows in detection order)
/// plus the missing-records sheet (absent-from-base ids first).
pub fn report_sheets(
    entries: &[DifferenceEntry],
    missing_from_base: &[MissingRecord],
    missing_from_compare: &[MissingRecord],
) -> Vec<SheetSpec> {
    let categories = [
        (Category::Vv, SHEET_VV, HEADER_VV_ARGB),
        (Category::Dp, SHEET_DP, HEADER_DP_ARGB),
        (Category::Other, SHEET_OTHER, HEADER_OTHER_ARGB),
    ];

    let mut sheets = Vec::with_capacity(categories.len() + 1);
    for (category, name, color) in categories {
        let rows = entries
            .iter()
            .filter(|e| e.category == category)
            .map(difference_row)
            .collect();
        sheets.push(SheetSpec {
            name: name.to_string(),
            header_color_argb: color.to_string(),
            columns: DIFF_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows,
        });
    }

    let rows = missing_from_base
        .iter()
        .chain(missing_from_compare)
        .map(missing_row)
        .collect();
    sheets.push(SheetSpec {
        name: SHEET_MISSING.to_string(),
        header_color_argb: HEADER_MISSING_ARGB.to_string(),
        columns: MISSING_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows,
    });
    sheets
}

fn difference_row(entry: &DifferenceEntry) -> Vec<String> {
    vec![
        entry.id.clone(),
        entry.name.clone(),
        entry.day_label.clone(),
        entry.base_value.clone(),
        entry.compare_value.clone(),
    ]
}

fn missing_row(record: &MissingRecord) -> Vec<String> {
    let status = match record.missing_from {
        Side::Base => STATUS_MISSING_FROM_BASE,
        Side::Compare => STATUS_MISSING_FROM_COMPARE,
    };
    vec![record.id.clone(), record.name.clone(), status.to_string()]
}
