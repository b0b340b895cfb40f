//! Required-column validation.

use crate::error::CompareError;
use crate::table::{day_columns, Table, COL_ID, COL_NAME, COL_ROLE};

/// The full required column set, in reporting order: identifier, name, role,
/// then the 31 day columns.
pub fn required_columns() -> Vec<String> {
    let mut columns = vec![
        COL_ID.to_string(),
        COL_NAME.to_string(),
        COL_ROLE.to_string(),
    ];
    columns.extend(day_columns());
    columns
}

/// Check both tables against the required column set. Both sides are always
/// checked so one error names every deficiency.
pub fn validate(base: &Table, compare: &Table) -> Result<(), CompareError> {
    let missing_base = missing_columns(base);
    let missing_compare = missing_columns(compare);
    if missing_base.is_empty() && missing_compare.is_empty() {
        return Ok(());
    }
    Err(CompareError::Schema {
        missing_base,
        missing_compare,
    })
}

fn missing_columns(table: &Table) -> Vec<String> {
    required_columns()
        .into_iter()
        .filter(|column| !table.layout().contains(column))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::test_table;
    use pretty_assertions::assert_eq;

    fn full_header() -> Vec<String> {
        required_columns()
    }

    #[test]
    fn complete_tables_validate() {
        let header = full_header();
        let columns: Vec<&str> = header.iter().map(String::as_str).collect();
        let table = test_table(&columns, &[]);
        assert!(validate(&table, &table).is_ok());
    }

    #[test]
    fn reports_missing_columns_per_side() {
        let header = full_header();
        let complete: Vec<&str> = header.iter().map(String::as_str).collect();
        let without_days: Vec<&str> = complete
            .iter()
            .copied()
            .filter(|c| *c != "7" && *c != "31")
            .collect();

        let base = test_table(&without_days, &[]);
        let compare = test_table(&complete, &[]);
        let err = validate(&base, &compare).expect_err("must fail");
        match err {
            CompareError::Schema {
                missing_base,
                missing_compare,
            } => {
                assert_eq!(missing_base, vec!["7".to_string(), "31".to_string()]);
                assert!(missing_compare.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn both_sides_are_checked() {
        let base = test_table(&["id", "ФИО"], &[]);
        let compare = test_table(&["id"], &[]);
        let err = validate(&base, &compare).expect_err("must fail");
        match err {
            CompareError::Schema {
                missing_base,
                missing_compare,
            } => {
                assert!(missing_base.contains(&"должность".to_string()));
                assert!(missing_compare.contains(&"ФИО".to_string()));
                assert!(missing_compare.contains(&"должность".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
