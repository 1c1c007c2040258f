//! Page segmentation with `kraken`
//!
//! One kraken invocation covers every book: the input is a glob over all
//! processed directories, which kraken expands itself. Kraken names its
//! output after the input image (`0001.bin.xml`), so a rename pass strips
//! the variant afterwards (`0001.xml`).

use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::time::Instant;

use crate::config::{ConfigError, KrakenConfig};
use crate::layout::BookLayout;
use crate::progress::ProgressCallback;
use crate::tool::{AdapterError, AdapterReport, SubprocessRunner, ToolCommand, ToolRunner};
use crate::util::format_duration;

/// Default markup suffix written by kraken
pub const DEFAULT_XML_SUFFIX: &str = ".xml";

const KRAKEN: &str = "kraken";

/// Which ocropy output kraken segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageVariant {
    /// `*.bin.png`
    #[default]
    Binarized,
    /// `*.nrm.png`
    Normalized,
}

impl ImageVariant {
    /// Variant segment of the file name
    pub fn infix(&self) -> &'static str {
        match self {
            ImageVariant::Binarized => ".bin",
            ImageVariant::Normalized => ".nrm",
        }
    }

    /// Image suffix, e.g. `.bin.png`
    pub fn image_suffix(&self) -> String {
        format!("{}.png", self.infix())
    }
}

/// Options for a segmentation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentOptions {
    pub model: PathBuf,
    pub variant: ImageVariant,
    /// Use the baseline segmenter (`-bl`)
    pub baseline: bool,
    pub xml_suffix: String,
}

impl SegmentOptions {
    pub fn new(model: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            variant: ImageVariant::default(),
            baseline: false,
            xml_suffix: DEFAULT_XML_SUFFIX.to_string(),
        }
    }

    pub fn with_variant(mut self, variant: ImageVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_baseline(mut self, baseline: bool) -> Self {
        self.baseline = baseline;
        self
    }

    pub fn with_xml_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.xml_suffix = suffix.into();
        self
    }
}

/// `kraken segment` adapter
pub struct KrakenSegmenter<R: ToolRunner = SubprocessRunner> {
    config: KrakenConfig,
    runner: R,
}

impl KrakenSegmenter<SubprocessRunner> {
    /// Create an adapter that runs real subprocesses
    pub fn new(config: KrakenConfig) -> Self {
        Self::with_runner(config, SubprocessRunner)
    }
}

impl<R: ToolRunner> KrakenSegmenter<R> {
    /// Create an adapter with a custom runner
    pub fn with_runner(config: KrakenConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Input glob covering every book's processed images
    pub fn input_pattern(layout: &BookLayout, variant: ImageVariant) -> PathBuf {
        layout
            .books_root
            .join("*")
            .join(&layout.processed_dir)
            .join(format!("*{}", variant.image_suffix()))
    }

    /// Command for the whole batch
    pub fn build_command(
        &self,
        layout: &BookLayout,
        options: &SegmentOptions,
    ) -> Result<ToolCommand, ConfigError> {
        let mut command = ToolCommand::with_prefix(&self.config.environment_prefix()?, KRAKEN)
            .arg("-x")
            .arg("-I")
            .arg(Self::input_pattern(layout, options.variant))
            .arg("-o")
            .arg(&options.xml_suffix)
            .arg("segment");
        if options.baseline {
            command = command.arg("-bl");
        }
        Ok(command
            .arg("--model")
            .arg(&options.model)
            .args(self.config.extra_args()?))
    }

    /// Segment every book, then normalize output names
    ///
    /// The rename pass runs even if kraken failed so partial output is
    /// picked up.
    pub fn run<P: ProgressCallback>(
        &self,
        layout: &BookLayout,
        options: &SegmentOptions,
        progress: &P,
    ) -> Result<AdapterReport, AdapterError> {
        let start_time = Instant::now();

        if !options.model.exists() {
            return Err(AdapterError::ModelNotFound(options.model.clone()));
        }
        if !layout.has_books() {
            return Err(AdapterError::NoBooks(layout.books_root.clone()));
        }

        let command = self.build_command(layout, options)?;
        let mut report = AdapterReport::default();
        let unit = layout.books_root.display().to_string();

        progress.on_step_start("Segmenting pages...");
        info!("{}", command);
        match self.runner.run(&command) {
            Ok(()) => report.processed.push(unit),
            Err(e) => {
                error!("Segmentation failed: {}", e);
                report.failed.push((unit, e.to_string()));
            }
        }

        progress.on_debug("Changing suffix of files...");
        report.renamed = normalize_output_names(layout, options.variant, &options.xml_suffix)?;

        report.duration = start_time.elapsed();
        progress.on_step_complete(
            "Segmenting",
            &format!(
                "{} files renamed in {}",
                report.renamed,
                format_duration(report.duration)
            ),
        );
        Ok(report)
    }
}

/// Target name for kraken output, `None` if the name has no variant segment
pub fn normalized_name(file_name: &str, variant: ImageVariant, xml_suffix: &str) -> Option<String> {
    let stem = file_name.strip_suffix(&format!("{}{}", variant.infix(), xml_suffix))?;
    Some(format!("{}{}", stem, xml_suffix))
}

/// Rename `NNNN<variant><xml_suffix>` to `NNNN<xml_suffix>` in every book
///
/// Returns the number of renamed files. An existing target is overwritten.
/// A file that cannot be renamed is logged and the pass continues.
pub fn normalize_output_names(
    layout: &BookLayout,
    variant: ImageVariant,
    xml_suffix: &str,
) -> Result<usize, AdapterError> {
    let produced_suffix = format!("{}{}", variant.infix(), xml_suffix);
    let mut renamed = 0;

    for book in layout.books()? {
        let files = match book.processed_files(&produced_suffix) {
            Ok(files) => files,
            Err(e) => {
                error!("Error listing output of book {}: {}", book.name, e);
                continue;
            }
        };
        for path in files {
            let Some(new_name) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| normalized_name(n, variant, xml_suffix))
            else {
                warn!("Skipping non UTF-8 file name: {}", path.display());
                continue;
            };
            let target = book.processed_path(&new_name);
            debug!("{} -> {}", path.display(), target.display());
            match std::fs::rename(&path, &target) {
                Ok(()) => renamed += 1,
                Err(e) => error!("Failed to rename {}: {}", path.display(), e),
            }
        }
    }

    Ok(renamed)
}
