//! Day-by-day difference scanning and classification.

use crate::align::AlignedRecord;
use crate::error::CompareError;
use crate::table::{day_columns, Table};
use crate::worker::CancelToken;

/// Semantic bucket of a single difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Vv,
    Dp,
    Other,
}

/// Ordered sentinel rules: the first sentinel matching either side of a
/// mismatch decides the category, everything else is [`Category::Other`].
#[derive(Debug, Clone)]
pub struct CategoryRules {
    sentinels: Vec<(String, Category)>,
}

impl CategoryRules {
    /// The production ruleset: `"ВВ"` before `"ДП"`.
    pub fn standard() -> Self {
        Self {
            sentinels: vec![
                ("ВВ".to_string(), Category::Vv),
                ("ДП".to_string(), Category::Dp),
            ],
        }
    }

    pub fn classify(&self, base_value: &str, compare_value: &str) -> Category {
        for (token, category) in &self.sentinels {
            if base_value == token || compare_value == token {
                return *category;
            }
        }
        Category::Other
    }
}

/// Renders a day-column label for display: day `d` of the configured month
/// and year as `DD.MM.YYYY`, non-day labels unchanged.
#[derive(Debug, Clone, Copy)]
pub struct DayLabeler {
    month: u32,
    year: i32,
}

impl DayLabeler {
    pub fn new(month: u32, year: i32) -> Self {
        Self { month, year }
    }

    pub fn label(&self, day_column: &str) -> String {
        match day_column.trim().parse::<u32>() {
            Ok(day) if (1..=31).contains(&day) => {
                format!("{day:02}.{:02}.{}", self.month, self.year)
            }
            _ => day_column.to_string(),
        }
    }
}

/// One differing day cell of one aligned record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifferenceEntry {
    pub id: String,
    pub name: String,
    /// The day column label, `"1"`..`"31"`.
    pub day_column: String,
    /// The display form of the day (`DD.MM.YYYY`).
    pub day_label: String,
    pub base_value: String,
    pub compare_value: String,
    pub category: Category,
    pub base_pos: usize,
    pub compare_pos: usize,
}

/// Scan every aligned record over the day columns in ascending numeric
/// order. Values are trimmed and compared with case-sensitive equality;
/// each mismatch yields one entry, in detection order.
///
/// `progress(done, total)` fires after each record; the cancellation token
/// is checked between records.
pub fn scan_differences(
    base: &Table,
    compare: &Table,
    aligned: &[AlignedRecord],
    rules: &CategoryRules,
    labeler: &DayLabeler,
    cancel: &CancelToken,
    mut progress: impl FnMut(usize, usize),
) -> Result<Vec<DifferenceEntry>, CompareError> {
    let total = aligned.len();
    let mut entries = Vec::new();
    for (done, record) in aligned.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(CompareError::Cancelled);
        }
        for day in day_columns() {
            let base_value = base.value(record.base_pos, &day).trim();
            let compare_value = compare.value(record.compare_pos, &day).trim();
            if base_value == compare_value {
                continue;
            }
            entries.push(DifferenceEntry {
                id: record.id.clone(),
                name: record.name.clone(),
                day_label: labeler.label(&day),
                day_column: day,
                base_value: base_value.to_string(),
                compare_value: compare_value.to_string(),
                category: rules.classify(base_value, compare_value),
                base_pos: record.base_pos,
                compare_pos: record.compare_pos,
            });
        }
        progress(done + 1, total);
    }
    Ok(entries)
}
