//! CLI interface module
//!
//! Provides command-line interface using clap derive macros.

use clap::{ArgGroup, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use std::path::PathBuf;

use crate::ingest::DEFAULT_DPI;
use crate::kraken::{ImageVariant, DEFAULT_XML_SUFFIX};

/// Exit codes for the CLI
///
/// Per-unit failures (one book, one file) are reported but do not change
/// the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    /// Run-level failure: configuration, unreadable books root, missing model
    GeneralError = 1,
    /// Command line could not be parsed
    InvalidArgs = 2,
}

impl ExitCode {
    /// Convert to process exit code
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code() as u8)
    }
}

/// Binarize, normalize and segment scanned books for OCR4all
#[derive(Parser, Debug)]
#[command(name = "ocrsegment")]
#[command(version)]
#[command(about = "Binarize, normalize and segment scanned books, output repaired PageXML", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ./ocrsegment.toml, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Log level from `-v`/`-q`
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert PDFs and images to PNG pages, one book per parent directory
    #[command(alias = "parse")]
    Ingest(IngestArgs),

    /// Binarize and normalize book pages with ocropus-nlbin
    #[command(alias = "binarize")]
    Nlbin(NlbinArgs),

    /// Segment binarized or normalized pages with kraken
    Segment(SegmentArgs),

    /// Repair kraken PageXML for OCR4all
    Fix(FixArgs),

    /// Show tool availability and config locations
    Info,
}

/// Arguments for the ingest command
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Directory searched recursively for source files
    pub input_path: PathBuf,

    /// Books root directory
    pub books_path: PathBuf,

    /// Directory name for original pages inside each book
    pub orig_dir: String,

    /// Convert PDF files
    #[arg(short = 'p', long = "pdf")]
    pub pdf: bool,

    /// Convert image files (png, jpg, jpeg, tif, tiff)
    #[arg(short = 'i', long = "images")]
    pub images: bool,

    /// Rasterization DPI for PDF pages
    #[arg(long, default_value_t = DEFAULT_DPI)]
    pub dpi: u32,

    /// Resize pages to this height in pixels
    #[arg(long, value_name = "HEIGHT")]
    pub size: Option<u32>,

    /// Suffix appended to page file stems, e.g. ".orig"
    #[arg(long, value_name = "SUFFIX")]
    pub orig: Option<String>,
}

/// Arguments for the nlbin command
#[derive(Args, Debug)]
pub struct NlbinArgs {
    /// Books root directory
    pub books_path: PathBuf,

    /// Directory name of original pages inside each book
    pub orig_dir: String,

    /// Output directory name inside each book
    pub processed_dir: String,
}

/// Arguments for the segment command
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("variant").required(true).args(["bin", "nrm"])))]
pub struct SegmentArgs {
    /// Books root directory
    pub books_path: PathBuf,

    /// Directory name of nlbin output inside each book
    pub processed_dir: String,

    /// Path to the kraken segmentation model
    pub kraken_model: PathBuf,

    /// Segment binarized images (*.bin.png)
    #[arg(long)]
    pub bin: bool,

    /// Segment normalized images (*.nrm.png)
    #[arg(long)]
    pub nrm: bool,

    /// Use the baseline segmenter
    #[arg(long)]
    pub bl: bool,

    /// Suffix of the written PageXML files
    #[arg(long, default_value = DEFAULT_XML_SUFFIX)]
    pub suffix: String,
}

impl SegmentArgs {
    pub fn variant(&self) -> ImageVariant {
        if self.nrm {
            ImageVariant::Normalized
        } else {
            ImageVariant::Binarized
        }
    }
}

/// Arguments for the fix command
#[derive(Args, Debug)]
pub struct FixArgs {
    /// Books root directory
    pub books_path: PathBuf,

    /// Directory name of the PageXML files inside each book
    pub processed_dir: String,

    /// Repair ids, region types, coordinates and reading order
    #[arg(short = 's', long = "scheme")]
    pub scheme: bool,

    /// Rewrite @imageFilename to the canonical page image name
    #[arg(short = 'n', long = "filename")]
    pub filename: bool,

    /// Suffix of the PageXML files
    #[arg(long, default_value = DEFAULT_XML_SUFFIX)]
    pub suffix: String,

    /// Page image suffix used for @imageFilename, e.g. ".orig"
    #[arg(long, value_name = "SUFFIX")]
    pub orig: Option<String>,

    /// Worker threads (default: number of CPUs)
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Add a new reading order in front of existing ones instead of replacing them
    #[arg(long)]
    pub keep_reading_order: bool,

    /// Write a JSON summary to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

impl FixArgs {
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Create a progress bar for batch processing
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .expect("Invalid progress bar template")
            .progress_chars("#>-"),
    );
    pb
}
