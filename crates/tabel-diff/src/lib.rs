//! Timesheet workbook comparison.
//!
//! Two XLSX snapshots keyed by `id` with one column per day of the month are
//! aligned, scanned day-by-day for value differences, and classified into
//! the ВВ/ДП/Остальные categories. Differing day cells are highlighted in
//! both source files in place, and a categorized report workbook is written
//! beside the base file.
//!
//! The pipeline runs on a background worker ([`worker::spawn_compare`]) that
//! talks to its caller only through one-way [`worker::CompareEvent`]s; the
//! CLI in [`cli`] is one such caller.

pub mod align;
pub mod cli;
pub mod error;
pub mod locate;
pub mod report;
pub mod scan;
pub mod schema;
pub mod table;
pub mod worker;

pub use align::{AlignedRecord, Alignment, MissingRecord};
pub use error::{CompareError, Side};
pub use locate::HighlightPlan;
pub use scan::{Category, CategoryRules, DayLabeler, DifferenceEntry};
pub use table::{ColumnLayout, Table};
pub use worker::{
    run_compare, spawn_compare, CancelToken, CompareEvent, CompareHandle, CompareOptions,
    CompareSummary, EventSink,
};
