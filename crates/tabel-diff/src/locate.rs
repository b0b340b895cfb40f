//! Mapping differences back to source-cell addresses.

use std::collections::BTreeSet;

use crate::scan::DifferenceEntry;
use crate::table::{ColumnLayout, Table};

/// The cells to highlight per source file, as 1-based (row, column)
/// addresses in each file's own layout.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HighlightPlan {
    pub base: BTreeSet<(u32, u32)>,
    pub compare: BTreeSet<(u32, u32)>,
}

impl HighlightPlan {
    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.compare.is_empty()
    }
}

/// Compute both files' highlight targets for the scanned differences.
///
/// Each side uses its own source column layout and its own row position:
/// `row = position + 2`, `column = physical day-column index + 1`.
pub fn locate_differences(
    entries: &[DifferenceEntry],
    base_layout: &ColumnLayout,
    compare_layout: &ColumnLayout,
) -> HighlightPlan {
    let mut plan = HighlightPlan::default();
    for entry in entries {
        if let Some(col) = base_layout.position(&entry.day_column) {
            plan.base.insert((Table::sheet_row(entry.base_pos), col + 1));
        }
        if let Some(col) = compare_layout.position(&entry.day_column) {
            plan.compare
                .insert((Table::sheet_row(entry.compare_pos), col + 1));
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::Category;
    use crate::table::test_table;
    use pretty_assertions::assert_eq;

    fn entry(day: &str, base_pos: usize, compare_pos: usize) -> DifferenceEntry {
        DifferenceEntry {
            id: "1".to_string(),
            name: "Иванов".to_string(),
            day_column: day.to_string(),
            day_label: day.to_string(),
            base_value: "8".to_string(),
            compare_value: "ВВ".to_string(),
            category: Category::Vv,
            base_pos,
            compare_pos,
        }
    }

    #[test]
    fn uses_each_sides_own_layout_and_position() {
        // Base: day 1 is the 4th physical column; compare: the 5th.
        let base = test_table(&["id", "ФИО", "должность", "1", "2"], &[]);
        let compare = test_table(&["id", "ФИО", "должность", "экстра", "1"], &[]);

        let plan = locate_differences(
            &[entry("1", 0, 3)],
            base.layout(),
            compare.layout(),
        );
        assert_eq!(plan.base, [(2, 4)].into_iter().collect());
        assert_eq!(plan.compare, [(5, 5)].into_iter().collect());
    }

    #[test]
    fn no_entries_produce_an_empty_plan() {
        let base = test_table(&["id", "1"], &[]);
        let compare = test_table(&["id", "1"], &[]);
        let plan = locate_differences(&[], base.layout(), compare.layout());
        assert!(plan.is_empty());

        let plan = locate_differences(&[entry("1", 0, 0)], base.layout(), compare.layout());
        assert!(!plan.is_empty());
    }

    #[test]
    fn duplicate_targets_collapse() {
        let base = test_table(&["id", "1"], &[]);
        let compare = test_table(&["id", "1"], &[]);
        let plan = locate_differences(
            &[entry("1", 0, 0), entry("1", 0, 0)],
            base.layout(),
            compare.layout(),
        );
        assert_eq!(plan.base.len(), 1);
        assert_eq!(plan.compare.len(), 1);
    }
}
