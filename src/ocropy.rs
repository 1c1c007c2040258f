//! Binarization and normalization with `ocropus-nlbin`
//!
//! Runs once per book on the book's original PNG pages and writes
//! `NNNN.bin.png` and `NNNN.nrm.png` into the processed directory.
//!
//! # Example
//!
//! ```rust,no_run
//! use ocrsegment::{BookLayout, Config, OcropyNlbin, SilentProgress};
//!
//! let layout = BookLayout::new("books").with_processed_dir("processed");
//! let nlbin = OcropyNlbin::new(Config::default().ocropy);
//! let report = nlbin.run(&layout, &SilentProgress).unwrap();
//! println!("{} books binarized", report.processed.len());
//! ```

use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{ConfigError, OcropyConfig};
use crate::layout::{Book, BookLayout};
use crate::progress::ProgressCallback;
use crate::tool::{AdapterError, AdapterReport, SubprocessRunner, ToolCommand, ToolRunner};
use crate::util::{ensure_dir, format_duration};

/// Script name inside the ocropy checkout
pub const NLBIN_SCRIPT: &str = "ocropus-nlbin";

enum BookOutcome {
    Done,
    Empty,
}

/// `ocropus-nlbin` adapter
pub struct OcropyNlbin<R: ToolRunner = SubprocessRunner> {
    config: OcropyConfig,
    runner: R,
}

impl OcropyNlbin<SubprocessRunner> {
    /// Create an adapter that runs real subprocesses
    pub fn new(config: OcropyConfig) -> Self {
        Self::with_runner(config, SubprocessRunner)
    }
}

impl<R: ToolRunner> OcropyNlbin<R> {
    /// Create an adapter with a custom runner
    pub fn with_runner(config: OcropyConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Path of the `ocropus-nlbin` script
    pub fn script_path(&self) -> PathBuf {
        if self.config.ocropy_path.is_empty() {
            PathBuf::from(NLBIN_SCRIPT)
        } else {
            Path::new(&self.config.ocropy_path).join(NLBIN_SCRIPT)
        }
    }

    /// Command for one book
    pub fn build_command(
        &self,
        images: &[PathBuf],
        output_dir: &Path,
    ) -> Result<ToolCommand, ConfigError> {
        Ok(ToolCommand::with_prefix(&self.config.python_command()?, self.script_path())
            .arg("-n")
            .args(images)
            .arg("-o")
            .arg(output_dir)
            .args(["--maxskew", "0"])
            .args(self.config.extra_args()?))
    }

    /// Binarize every book under the layout's root
    ///
    /// Fails only on an unusable config or when there are no books;
    /// per-book problems land in the returned report.
    pub fn run<P: ProgressCallback>(
        &self,
        layout: &BookLayout,
        progress: &P,
    ) -> Result<AdapterReport, AdapterError> {
        let start_time = Instant::now();
        self.config.validate()?;
        let books = layout.books()?;
        if books.is_empty() {
            return Err(AdapterError::NoBooks(layout.books_root.clone()));
        }

        let mut report = AdapterReport::default();
        progress.on_step_start("Binarizing books...");

        for (index, book) in books.iter().enumerate() {
            progress.on_step_progress(index + 1, books.len());
            match self.process_book(book) {
                Ok(BookOutcome::Done) => report.processed.push(book.name.clone()),
                Ok(BookOutcome::Empty) => {
                    warn!("Book is empty: {}", book.name);
                    report
                        .skipped
                        .push((book.name.clone(), "Book is empty".to_string()));
                }
                Err(e) => {
                    error!("Error with book {}: {}", book.name, e);
                    report.failed.push((book.name.clone(), e.to_string()));
                }
            }
        }

        report.duration = start_time.elapsed();
        progress.on_step_complete(
            "Binarizing",
            &format!(
                "{} processed, {} skipped, {} failed in {}",
                report.processed.len(),
                report.skipped.len(),
                report.failed.len(),
                format_duration(report.duration)
            ),
        );
        Ok(report)
    }

    fn process_book(&self, book: &Book) -> Result<BookOutcome, AdapterError> {
        ensure_dir(&book.processed_dir)?;

        let images = book.orig_images()?;
        if images.is_empty() {
            return Ok(BookOutcome::Empty);
        }

        let command = self.build_command(&images, &book.processed_dir)?;
        info!("{}", command);
        self.runner.run(&command)?;
        Ok(BookOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::testing::RecordingProgress;
    use crate::progress::SilentProgress;
    use crate::tool::testing::RecordingRunner;
    use std::ffi::OsStr;

    fn config() -> OcropyConfig {
        OcropyConfig {
            python: "/venv/bin/python2".to_string(),
            ocropy_path: "/opt/ocropy/".to_string(),
            additional_args: "--threshold 0.6".to_string(),
        }
    }

    fn book_with_pages(root: &Path, name: &str, pages: &[&str]) {
        let orig = root.join(name).join("orig");
        std::fs::create_dir_all(&orig).unwrap();
        for page in pages {
            std::fs::write(orig.join(page), b"png").unwrap();
        }
    }

    #[test]
    fn test_script_path() {
        let nlbin = OcropyNlbin::new(config());
        assert_eq!(nlbin.script_path(), PathBuf::from("/opt/ocropy/ocropus-nlbin"));

        let nlbin = OcropyNlbin::new(OcropyConfig::default());
        assert_eq!(nlbin.script_path(), PathBuf::from("ocropus-nlbin"));
    }

    #[test]
    fn test_build_command() {
        let nlbin = OcropyNlbin::new(config());
        let images = vec![PathBuf::from("b/orig/0001.png"), PathBuf::from("b/orig/0002.png")];
        let command = nlbin
            .build_command(&images, Path::new("b/processed"))
            .unwrap();

        assert_eq!(command.program(), OsStr::new("/venv/bin/python2"));
        assert_eq!(
            command.argument_strings(),
            vec![
                "/opt/ocropy/ocropus-nlbin",
                "-n",
                "b/orig/0001.png",
                "b/orig/0002.png",
                "-o",
                "b/processed",
                "--maxskew",
                "0",
                "--threshold",
                "0.6",
            ]
        );
    }

    #[test]
    fn test_run_per_book() {
        let dir = tempfile::tempdir().unwrap();
        book_with_pages(dir.path(), "b2", &["0001.png"]);
        book_with_pages(dir.path(), "b1", &["0002.png", "0001.png", "cover.jpg"]);

        let nlbin = OcropyNlbin::with_runner(config(), RecordingRunner::default());
        let progress = RecordingProgress::default();
        let report = nlbin.run(&BookLayout::new(dir.path()), &progress).unwrap();

        assert_eq!(report.processed, vec!["b1", "b2"]);
        assert!(dir.path().join("b1/processed").is_dir());

        let commands = nlbin.runner.commands();
        assert_eq!(commands.len(), 2);
        let args = commands[0].argument_strings();
        assert!(args[2].ends_with("b1/orig/0001.png"));
        assert!(args[3].ends_with("b1/orig/0002.png"));
        assert_eq!(args[4], "-o");

        let events = progress.events();
        assert_eq!(events[0], "start:Binarizing books...");
        assert!(events.contains(&"progress:2/2".to_string()));
    }

    #[test]
    fn test_run_skips_empty_book() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("empty/orig")).unwrap();
        book_with_pages(dir.path(), "full", &["0001.png"]);

        let nlbin = OcropyNlbin::with_runner(config(), RecordingRunner::default());
        let report = nlbin.run(&BookLayout::new(dir.path()), &SilentProgress).unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, "empty");
        assert_eq!(report.processed, vec!["full"]);
        // Processed directory is created even for an empty book
        assert!(dir.path().join("empty/processed").is_dir());
    }

    #[test]
    fn test_run_continues_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        book_with_pages(dir.path(), "b1", &["0001.png"]);
        book_with_pages(dir.path(), "b2", &["0001.png"]);

        let nlbin = OcropyNlbin::with_runner(config(), RecordingRunner::failing());
        let report = nlbin.run(&BookLayout::new(dir.path()), &SilentProgress).unwrap();

        assert_eq!(report.failed.len(), 2);
        assert!(!report.is_success());
        assert_eq!(nlbin.runner.commands().len(), 2);
    }

    #[test]
    fn test_run_no_books() {
        let dir = tempfile::tempdir().unwrap();
        let nlbin = OcropyNlbin::with_runner(config(), RecordingRunner::default());
        let result = nlbin.run(&BookLayout::new(dir.path()), &SilentProgress);

        assert!(matches!(result, Err(AdapterError::NoBooks(_))));
    }

    #[test]
    fn test_build_command_quoted_python() {
        let config = OcropyConfig {
            python: "'/opt/my venv/bin/python2' -u".to_string(),
            ocropy_path: String::new(),
            additional_args: r#"--threshold "0.6""#.to_string(),
        };
        let nlbin = OcropyNlbin::new(config);
        let command = nlbin
            .build_command(&[PathBuf::from("0001.png")], Path::new("out"))
            .unwrap();

        assert_eq!(command.program(), OsStr::new("/opt/my venv/bin/python2"));
        let args = command.argument_strings();
        assert_eq!(args[..3], ["-u", "ocropus-nlbin", "-n"]);
        assert_eq!(args[args.len() - 2..], ["--threshold", "0.6"]);
    }

    #[test]
    fn test_run_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        book_with_pages(dir.path(), "b1", &["0001.png"]);
        let config = OcropyConfig {
            additional_args: "--threshold \"0.6".to_string(),
            ..config()
        };

        let nlbin = OcropyNlbin::with_runner(config, RecordingRunner::default());
        let result = nlbin.run(&BookLayout::new(dir.path()), &SilentProgress);

        assert!(matches!(result, Err(AdapterError::Config(_))));
        assert!(nlbin.runner.commands().is_empty());
    }
}
