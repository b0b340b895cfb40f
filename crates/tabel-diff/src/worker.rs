//! Pipeline driver and background worker.
//!
//! [`run_compare`] executes the whole comparison on the calling thread and
//! owns every derived structure for the duration of the run. The caller
//! observes it only through one-way [`CompareEvent`]s: progress percentages,
//! log messages, and exactly one terminal `Completed`/`Failed` when driven
//! through [`spawn_compare`].
//!
//! Cancellation is cooperative: the token is checked between scanner rows
//! and before any file is written, so a cancelled run never leaves a
//! partially annotated source file or a partial report.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use tabel_xlsx::{highlight_cells, replace_report_sheets, XlsxPackage};

use crate::align::align;
use crate::error::CompareError;
use crate::locate::locate_differences;
use crate::report::{report_output_path, report_sheets};
use crate::scan::{scan_differences, Category, CategoryRules, DayLabeler};
use crate::schema;
use crate::table::Table;

/// Cooperative cancellation flag, cloneable across threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One-way notification from the worker to its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareEvent {
    /// Monotonically non-decreasing percentage, 0..=100.
    Progress(u8),
    Message(String),
    Completed(PathBuf),
    Failed(String),
}

/// Receiver of pipeline events. Implemented for closures.
pub trait EventSink {
    fn emit(&mut self, event: CompareEvent);
}

impl<F: FnMut(CompareEvent)> EventSink for F {
    fn emit(&mut self, event: CompareEvent) {
        self(event)
    }
}

#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub base_path: PathBuf,
    pub compare_path: PathBuf,
    /// Reporting month (1-12); display formatting only.
    pub month: u32,
    /// Reporting year; display formatting only.
    pub year: i32,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareSummary {
    pub output_path: PathBuf,
    pub vv: usize,
    pub dp: usize,
    pub other: usize,
    pub missing: usize,
}

/// Progress/message fan-out with monotonic clamping.
struct Reporter<'a> {
    sink: &'a mut dyn EventSink,
    last: u8,
}

impl Reporter<'_> {
    fn progress(&mut self, percent: u8) {
        let percent = percent.min(100);
        if percent > self.last {
            self.last = percent;
            self.sink.emit(CompareEvent::Progress(percent));
        }
    }

    fn message(&mut self, text: impl Into<String>) {
        self.sink.emit(CompareEvent::Message(text.into()));
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Run the full pipeline synchronously: load, validate, align, scan,
/// annotate both source files in place, and write the report beside the
/// base file.
pub fn run_compare(
    options: &CompareOptions,
    sink: &mut dyn EventSink,
    cancel: &CancelToken,
) -> Result<CompareSummary, CompareError> {
    if !(1..=12).contains(&options.month) {
        return Err(CompareError::Options(
            "Месяц должен быть в диапазоне от 1 до 12".to_string(),
        ));
    }

    let mut reporter = Reporter { sink, last: 0 };
    reporter.message("Инициализация процесса сравнения...");
    if cancel.is_cancelled() {
        return Err(CompareError::Cancelled);
    }

    reporter.message(format!("Загрузка {}...", file_name(&options.base_path)));
    let base = Table::load(&options.base_path)?;
    reporter.message(format!("Загрузка {}...", file_name(&options.compare_path)));
    let compare = Table::load(&options.compare_path)?;
    schema::validate(&base, &compare)?;

    reporter.message("Сопоставление данных...");
    let alignment = align(&base, &compare)?;
    reporter.progress(20);

    reporter.message("Поиск различий...");
    let rules = CategoryRules::standard();
    let labeler = DayLabeler::new(options.month, options.year);
    let entries = scan_differences(
        &base,
        &compare,
        &alignment.aligned,
        &rules,
        &labeler,
        cancel,
        |done, total| {
            let percent = 20 + (70 * done / total.max(1)) as u8;
            reporter.progress(percent);
        },
    )?;
    reporter.progress(90);

    if cancel.is_cancelled() {
        return Err(CompareError::Cancelled);
    }

    reporter.message("Формирование отчетов...");
    let plan = locate_differences(&entries, base.layout(), compare.layout());
    annotate(&options.base_path, &plan.base)?;
    annotate(&options.compare_path, &plan.compare)?;

    let output_path = report_output_path(&options.base_path);
    let sheets = report_sheets(
        &entries,
        &alignment.missing_from_base,
        &alignment.missing_from_compare,
    );
    // The annotated base file is the report template, so the report's data
    // sheet shows the highlights too.
    let report_err = |source| CompareError::Report {
        path: output_path.clone(),
        source,
    };
    let mut report_pkg = XlsxPackage::from_path(&options.base_path).map_err(report_err)?;
    replace_report_sheets(&mut report_pkg, &sheets).map_err(report_err)?;
    report_pkg.save_atomic(&output_path).map_err(report_err)?;

    reporter.progress(100);
    Ok(CompareSummary {
        output_path,
        vv: count(&entries, Category::Vv),
        dp: count(&entries, Category::Dp),
        other: count(&entries, Category::Other),
        missing: alignment.missing_from_base.len() + alignment.missing_from_compare.len(),
    })
}

fn count(entries: &[crate::scan::DifferenceEntry], category: Category) -> usize {
    entries.iter().filter(|e| e.category == category).count()
}

/// Apply the highlight plan to one source file in place. An empty plan
/// leaves the file untouched.
fn annotate(
    path: &Path,
    cells: &std::collections::BTreeSet<(u32, u32)>,
) -> Result<(), CompareError> {
    if cells.is_empty() {
        return Ok(());
    }
    let annotation_err = |source| CompareError::Annotation {
        path: path.to_path_buf(),
        source,
    };
    let mut pkg = XlsxPackage::from_path(path).map_err(annotation_err)?;
    highlight_cells(&mut pkg, cells).map_err(annotation_err)?;
    pkg.save_atomic(path).map_err(annotation_err)
}

/// Handle to a comparison running on its own thread. One run per handle.
pub struct CompareHandle {
    events: Receiver<CompareEvent>,
    cancel: CancelToken,
    thread: Option<JoinHandle<()>>,
}

impl CompareHandle {
    pub fn events(&self) -> &Receiver<CompareEvent> {
        &self.events
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker thread to finish. Remaining events stay readable
    /// from [`events`](Self::events) afterwards.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct ChannelSink(Sender<CompareEvent>);

impl EventSink for ChannelSink {
    fn emit(&mut self, event: CompareEvent) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.0.send(event);
    }
}

/// Run the pipeline on a dedicated thread. Exactly one terminal event
/// (`Completed` or `Failed`) is emitted per run.
pub fn spawn_compare(options: CompareOptions) -> CompareHandle {
    let (tx, rx) = std::sync::mpsc::channel();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let thread = std::thread::spawn(move || {
        let mut sink = ChannelSink(tx);
        match run_compare(&options, &mut sink, &worker_cancel) {
            Ok(summary) => sink.emit(CompareEvent::Completed(summary.output_path)),
            Err(err) => sink.emit(CompareEvent::Failed(err.to_string())),
        }
    });
    CompareHandle {
        events: rx,
        cancel,
        thread: Some(thread),
    }
}
