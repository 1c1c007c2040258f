//! Batch PageXML repair
//!
//! Finds every markup file below `<books_root>/*/<processed_dir>/` and
//! rewrites it in place: filename repair first, then scheme repair. Each file
//! is read, repaired in memory and written only if every enabled repair
//! succeeded, so a failing file is left untouched while its siblings go on.
//!
//! # Example
//!
//! ```rust,no_run
//! use ocrsegment::{fix_books, BookLayout, FixOptions, SilentProgress};
//!
//! let layout = BookLayout::new("books").with_processed_dir("processed");
//! let options = FixOptions::builder()
//!     .scheme(true)
//!     .filename(true)
//!     .orig_suffix(".orig")
//!     .build();
//!
//! let summary = fix_books(&layout, &options, &SilentProgress).unwrap();
//! println!("{} files fixed", summary.processed);
//! ```

use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use thiserror::Error;

use crate::kraken::DEFAULT_XML_SUFFIX;
use crate::layout::{BookLayout, LayoutError};
use crate::pagexml::{
    canonical_image_name, repair_image_filename, repair_scheme, Document, PageXmlError,
    ReadingOrderMode, SchemeReport,
};
use crate::progress::ProgressCallback;
use crate::util::{file_name_lossy, format_duration};

/// Fix error types
#[derive(Debug, Error)]
pub enum FixError {
    #[error(transparent)]
    PageXml(#[from] PageXmlError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FixError>;

// ============================================================
// Options
// ============================================================

/// Batch repair options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixOptions {
    /// Repair region types, ids, coordinates and reading order
    pub scheme: bool,
    /// Rewrite `imageFilename` to `<stem><orig_suffix>.png`
    pub filename: bool,
    pub xml_suffix: String,
    pub orig_suffix: String,
    pub reading_order: ReadingOrderMode,
    /// Worker threads; 1 processes files sequentially
    pub threads: usize,
}

impl Default for FixOptions {
    fn default() -> Self {
        Self {
            scheme: false,
            filename: false,
            xml_suffix: DEFAULT_XML_SUFFIX.to_string(),
            orig_suffix: String::new(),
            reading_order: ReadingOrderMode::default(),
            threads: num_cpus::get(),
        }
    }
}

impl FixOptions {
    /// Create a new options builder
    pub fn builder() -> FixOptionsBuilder {
        FixOptionsBuilder::default()
    }

    /// Whether any repair is enabled
    pub fn is_enabled(&self) -> bool {
        self.scheme || self.filename
    }
}

/// Builder for FixOptions
#[derive(Debug, Default)]
pub struct FixOptionsBuilder {
    options: FixOptions,
}

impl FixOptionsBuilder {
    pub fn scheme(mut self, enabled: bool) -> Self {
        self.options.scheme = enabled;
        self
    }

    pub fn filename(mut self, enabled: bool) -> Self {
        self.options.filename = enabled;
        self
    }

    pub fn xml_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.options.xml_suffix = suffix.into();
        self
    }

    pub fn orig_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.options.orig_suffix = suffix.into();
        self
    }

    pub fn reading_order(mut self, mode: ReadingOrderMode) -> Self {
        self.options.reading_order = mode;
        self
    }

    /// Set worker threads (minimum 1)
    pub fn threads(mut self, threads: usize) -> Self {
        self.options.threads = threads.max(1);
        self
    }

    /// Build the options
    pub fn build(self) -> FixOptions {
        self.options
    }
}

// ============================================================
// Summary
// ============================================================

/// A file that could not be repaired
#[derive(Debug, Clone, Serialize)]
pub struct FixFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Result of a batch run
#[derive(Debug, Clone, Default, Serialize)]
pub struct FixSummary {
    /// Markup files found
    pub total: usize,
    /// Files repaired and written
    pub processed: usize,
    /// Files left unchanged because of an error
    pub skipped: usize,
    pub failures: Vec<FixFailure>,
    /// Aggregated scheme repair counts
    pub scheme: SchemeReport,
    pub duration_ms: u64,
}

impl FixSummary {
    /// Write the summary as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

// ============================================================
// Repair
// ============================================================

/// Repair one markup file in place
///
/// Returns the scheme report if scheme repair ran. The file is not written
/// when no repair is enabled or any repair fails.
pub fn fix_file(path: &Path, options: &FixOptions) -> Result<Option<SchemeReport>> {
    if !options.is_enabled() {
        return Ok(None);
    }

    let mut document = Document::read(path)?;

    if options.filename {
        let image_name = canonical_image_name(
            &file_name_lossy(path),
            &options.xml_suffix,
            &options.orig_suffix,
        );
        document = repair_image_filename(&document, &image_name)?;
    }

    let mut report = None;
    if options.scheme {
        let (repaired, scheme) = repair_scheme(&document, options.reading_order)?;
        document = repaired;
        report = Some(scheme);
    }

    document.write(path)?;
    Ok(report)
}

/// Repair every markup file of every book
///
/// Per-file failures are logged and collected in the summary; only a
/// missing books root or a thread pool failure ends the run with an error.
pub fn fix_books<P: ProgressCallback>(
    layout: &BookLayout,
    options: &FixOptions,
    progress: &P,
) -> Result<FixSummary> {
    let start_time = Instant::now();

    if !options.is_enabled() {
        warn!("Nothing to fix: enable scheme (-s) and/or filename (-n) repair");
        return Ok(FixSummary::default());
    }

    let files = layout.markup_files(&options.xml_suffix)?;
    let total = files.len();
    progress.on_step_start(&format!("Fixing {} PageXML files...", total));
    if options.filename {
        info!("Fixing @imageFilename tags...");
    }
    if options.scheme {
        info!("Fixing PageXML scheme...");
    }

    let done = AtomicUsize::new(0);
    let process = |path: &PathBuf| {
        let outcome = fix_file(path, options);
        let current = done.fetch_add(1, Ordering::SeqCst) + 1;
        progress.on_step_progress(current, total);
        outcome
    };

    let outcomes: Vec<Result<Option<SchemeReport>>> = if options.threads > 1 && total > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .build()
            .map_err(|e| FixError::ThreadPool(e.to_string()))?;
        pool.install(|| files.par_iter().map(&process).collect())
    } else {
        files.iter().map(&process).collect()
    };

    let mut summary = FixSummary {
        total,
        ..Default::default()
    };
    for (path, outcome) in files.iter().zip(outcomes) {
        match outcome {
            Ok(report) => {
                summary.processed += 1;
                if let Some(report) = report {
                    debug!(
                        "{}: {} regions, {} types, {} lines repaired",
                        path.display(),
                        report.regions,
                        report.types_reclassified,
                        report.lines_repaired
                    );
                    summary.scheme.merge(&report);
                }
            }
            Err(e) => {
                error!("Failed to fix {}: {}", path.display(), e);
                summary.failures.push(FixFailure {
                    path: path.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    summary.skipped = summary.failures.len();
    summary.duration_ms = start_time.elapsed().as_millis() as u64;

    progress.on_step_complete(
        "Fixing",
        &format!(
            "{} fixed, {} skipped in {}",
            summary.processed,
            summary.skipped,
            format_duration(start_time.elapsed())
        ),
    );
    Ok(summary)
}
