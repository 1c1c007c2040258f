//! ocrsegment - Binarize, normalize and segment scanned books for OCR4all
//!
//! Prepares scanned books for OCR: rasterizes sources into per-book page
//! images, drives `ocropus-nlbin` and `kraken` as external tools, and
//! repairs the PageXML that kraken writes so OCR4all accepts it.
//!
//! # Features
//!
//! - **Ingestion** ([`ingest`]) - PDFs and images to PNG pages, one book per source directory
//! - **Binarization** ([`ocropy`]) - `ocropus-nlbin` per book
//! - **Segmentation** ([`kraken`]) - one `kraken` batch over all books, output renamed to page names
//! - **PageXML repair** ([`pagexml`], [`fix`]) - ids, region types, coordinates, reading order, image file names
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ocrsegment::{fix_books, BookLayout, FixOptions, SilentProgress};
//!
//! let layout = BookLayout::new("books").with_processed_dir("processed");
//! let options = FixOptions::builder().scheme(true).filename(true).build();
//! let summary = fix_books(&layout, &options, &SilentProgress).unwrap();
//! println!("{} of {} files fixed", summary.processed, summary.total);
//! ```
//!
//! # Architecture
//!
//! ```text
//! PDF / images -> ingest -> <book>/orig/NNNN.png
//!                              |
//!                         ocropus-nlbin -> <book>/processed/NNNN.bin.png, NNNN.nrm.png
//!                              |
//!                           kraken -> <book>/processed/NNNN.xml
//!                              |
//!                             fix -> repaired PageXML
//! ```

pub mod cli;
pub mod config;
pub mod fix;
pub mod ingest;
pub mod kraken;
pub mod layout;
pub mod ocropy;
pub mod pagexml;
pub mod progress;
pub mod tool;
pub mod util;

// Re-exports for convenience
pub use cli::{
    create_progress_bar, Cli, Commands, ExitCode, FixArgs, IngestArgs, NlbinArgs, SegmentArgs,
};
pub use config::{Config, ConfigError, KrakenConfig, OcropyConfig};
pub use fix::{fix_books, fix_file, FixError, FixFailure, FixOptions, FixOptionsBuilder, FixSummary};
pub use ingest::{
    image_to_png, pdf_to_png, ImageSuffix, IngestError, IngestOptions, IngestOptionsBuilder,
    IngestOutcome, IngestSummary, Ingestor, PdfRasterizer, PopplerRasterizer,
};
pub use kraken::{ImageVariant, KrakenSegmenter, SegmentOptions};
pub use layout::{Book, BookLayout, LayoutError};
pub use ocropy::OcropyNlbin;
pub use pagexml::{Document, PageXmlError, ReadingOrderMode, SchemeReport};
pub use progress::{ProgressCallback, SilentProgress};
pub use tool::{
    is_available, version_line, AdapterError, AdapterReport, SubprocessRunner, ToolCommand,
    ToolError, ToolRunner,
};
pub use util::format_duration;
