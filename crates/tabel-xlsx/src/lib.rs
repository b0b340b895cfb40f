//! XLSX handling for the timesheet comparison pipeline.
//!
//! This crate intentionally operates at the ZIP/Open Packaging Convention
//! layer: a workbook is a part-name -> bytes map ([`XlsxPackage`]), and every
//! mutation rewrites only the parts it has to touch (`xl/styles.xml` plus the
//! affected worksheet XML), preserving everything else byte-for-byte. That is
//! what lets the highlighter recolor cells in a user's file without losing
//! formulas, formats, or extra sheets.
//!
//! Surface:
//! - [`XlsxPackage`]: OPC ZIP handling with atomic in-place saves.
//! - [`read_first_sheet_grid`]: every cell of the first worksheet as literal
//!   text (no type coercion, blanks as empty strings).
//! - [`highlight_cells`]: apply a solid fill to a set of cells in place.
//! - [`replace_report_sheets`]: inject styled report sheets into a workbook.

pub mod cell_ref;
pub mod fixture;
mod highlight;
mod package;
mod read;
mod report;
mod styles;

pub use highlight::{highlight_cells, solid_fill_cells, HIGHLIGHT_ARGB};
pub use package::{SheetInfo, XlsxError, XlsxPackage};
pub use read::{read_first_sheet_grid, SheetGrid};
pub use report::{replace_report_sheets, SheetSpec};
pub use styles::StylesEditor;
