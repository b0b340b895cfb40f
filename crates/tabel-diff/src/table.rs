//! Loaded timesheet tables.
//!
//! A [`Table`] is the first worksheet of a workbook read as literal text:
//! row 1 is the header, data rows follow, and a data row's zero-based
//! position maps back to its sheet row as `position + 2`. The header also
//! yields a [`ColumnLayout`], the stable column-name to physical-column
//! mapping the cell locator later uses; it always reflects the source
//! sheet's own layout, never a merged or derived one.

use std::collections::BTreeMap;
use std::path::Path;

use tabel_xlsx::{read_first_sheet_grid, SheetGrid, XlsxPackage};

use crate::error::CompareError;

pub const COL_ID: &str = "id";
pub const COL_NAME: &str = "ФИО";
pub const COL_ROLE: &str = "должность";

/// The day-of-month column labels, `"1"` through `"31"`.
pub fn day_columns() -> impl Iterator<Item = String> {
    (1u32..=31).map(|d| d.to_string())
}

/// Column name -> zero-based physical column index of the source sheet.
#[derive(Debug, Clone, Default)]
pub struct ColumnLayout {
    positions: BTreeMap<String, u32>,
}

impl ColumnLayout {
    fn from_header(grid: &SheetGrid) -> Self {
        let mut positions = BTreeMap::new();
        for col in 1..=grid.max_col() {
            let name = grid.cell(1, col).trim();
            if name.is_empty() {
                continue;
            }
            // First occurrence wins on duplicate headers.
            positions.entry(name.to_string()).or_insert(col - 1);
        }
        Self { positions }
    }

    /// Zero-based physical index of a column, `None` when absent.
    pub fn position(&self, name: &str) -> Option<u32> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }
}

#[derive(Debug)]
pub struct Table {
    grid: SheetGrid,
    layout: ColumnLayout,
    row_count: usize,
}

impl Table {
    /// Load the first worksheet of the workbook at `path`.
    pub fn load(path: &Path) -> Result<Self, CompareError> {
        let load_err = |source| CompareError::Load {
            path: path.to_path_buf(),
            source,
        };
        let pkg = XlsxPackage::from_path(path).map_err(load_err)?;
        let grid = read_first_sheet_grid(&pkg).map_err(load_err)?;
        Ok(Self::from_grid(grid))
    }

    fn from_grid(grid: SheetGrid) -> Self {
        let layout = ColumnLayout::from_header(&grid);
        let row_count = grid.max_row().saturating_sub(1) as usize;
        Self {
            grid,
            layout,
            row_count,
        }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    /// Number of data rows (header excluded).
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Cell text at a zero-based data-row position, `""` when the column is
    /// absent or the cell is blank.
    pub fn value(&self, position: usize, column: &str) -> &str {
        match self.layout.position(column) {
            Some(col) => self.grid.cell(Self::sheet_row(position), col + 1),
            None => "",
        }
    }

    /// 1-based sheet row of a zero-based data-row position (header row plus
    /// 1-based numbering).
    pub fn sheet_row(position: usize) -> u32 {
        position as u32 + 2
    }
}

/// Build a table from an in-memory fixture workbook (test support).
#[cfg(test)]
pub(crate) fn test_table(columns: &[&str], rows: &[&[&str]]) -> Table {
    let bytes = tabel_xlsx::fixture::write_fixture_xlsx(columns, rows);
    let pkg = XlsxPackage::from_bytes(&bytes).expect("fixture package");
    Table::from_grid(read_first_sheet_grid(&pkg).expect("grid"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn load_fixture(columns: &[&str], rows: &[&[&str]]) -> Table {
        test_table(columns, rows)
    }

    #[test]
    fn layout_reflects_physical_column_order() {
        let table = load_fixture(&["id", "ФИО", "должность", "1", "2"], &[]);
        assert_eq!(table.layout().position("id"), Some(0));
        assert_eq!(table.layout().position("должность"), Some(2));
        assert_eq!(table.layout().position("2"), Some(4));
        assert_eq!(table.layout().position("32"), None);
    }

    #[test]
    fn values_are_literal_and_blanks_are_empty() {
        let table = load_fixture(
            &["id", "1", "2"],
            &[&["1", "08", ""], &["2", "", "ВВ"]],
        );
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.value(0, "1"), "08");
        assert_eq!(table.value(0, "2"), "");
        assert_eq!(table.value(1, "2"), "ВВ");
        assert_eq!(table.value(1, "нет"), "");
    }

    #[test]
    fn positions_map_to_sheet_rows() {
        let table = load_fixture(&["id"], &[&["1"], &["2"], &["3"]]);
        assert_eq!(Table::sheet_row(0), 2);
        assert_eq!(Table::sheet_row(table.row_count() - 1), 4);
    }

    #[test]
    fn loading_from_disk_reports_load_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("нет.xlsx");
        let err = Table::load(&missing).expect_err("must fail");
        assert!(matches!(err, CompareError::Load { .. }));
        assert!(err.to_string().contains("Ошибка чтения файла"));
    }
}
