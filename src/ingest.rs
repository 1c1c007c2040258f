//! Source ingestion
//!
//! Turns PDFs and raster images below an input directory into PNG page
//! images under `<books_root>/<book>/<orig_dir>/`. The book name is the
//! parent directory name of each source file.
//!
//! # Features
//!
//! - PDF rasterization with Poppler `pdftoppm`, page count via `lopdf`
//! - PNG, JPEG and TIFF conversion with the `image` crate
//! - Optional uniform page height (Lanczos3, aspect ratio kept)
//!
//! A PDF is skipped when its output directory already has files; an image
//! is written anyway with a warning.
//!
//! # Example
//!
//! ```rust,no_run
//! use ocrsegment::{BookLayout, IngestOptions, Ingestor, SilentProgress};
//! use std::path::Path;
//!
//! let options = IngestOptions::builder()
//!     .pdf(true)
//!     .dpi(300)
//!     .height(Some(2000))
//!     .orig_suffix(".orig")
//!     .build();
//!
//! let layout = BookLayout::new("books").with_orig_dir("orig");
//! let summary = Ingestor::new(options)
//!     .run(Path::new("input"), &layout, &SilentProgress)
//!     .unwrap();
//! println!("{} pages written", summary.pages_written);
//! ```

use image::imageops::FilterType;
use image::GenericImageView;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::layout::{page_file_name, BookLayout};
use crate::progress::ProgressCallback;
use crate::tool::{SubprocessRunner, ToolCommand, ToolError, ToolRunner};
use crate::util::{ensure_dir, is_dir_empty};

/// Default rasterization resolution
pub const DEFAULT_DPI: u32 = 300;

/// Supported DPI range
pub const MIN_DPI: u32 = 72;
pub const MAX_DPI: u32 = 1200;

/// Ingestion error types
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Cannot read page count of {path}: {reason}")]
    PageCount { path: PathBuf, reason: String },

    #[error("Rasterization failed for page {page}: {source}")]
    RasterizeFailed { page: usize, source: ToolError },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;

// ============================================================
// Source types
// ============================================================

/// Raster image formats accepted as input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSuffix {
    Png,
    Jpg,
    Jpeg,
    Tif,
    Tiff,
}

impl ImageSuffix {
    pub const ALL: [ImageSuffix; 5] = [
        ImageSuffix::Png,
        ImageSuffix::Jpg,
        ImageSuffix::Jpeg,
        ImageSuffix::Tif,
        ImageSuffix::Tiff,
    ];

    /// Extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            ImageSuffix::Png => "png",
            ImageSuffix::Jpg => "jpg",
            ImageSuffix::Jpeg => "jpeg",
            ImageSuffix::Tif => "tif",
            ImageSuffix::Tiff => "tiff",
        }
    }

    /// Detect from a path's extension, case-insensitive
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::ALL.into_iter().find(|s| s.extension() == ext)
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Files below `dir` (recursive) accepted by `filter`, sorted
///
/// Symlinked directories are not descended into; symlinked files are kept.
pub fn find_sources<F>(dir: &Path, filter: F) -> std::io::Result<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_dir() || !path.is_file() {
            continue;
        }
        if filter(path) {
            found.push(path.to_path_buf());
        }
    }
    found.sort();
    Ok(found)
}

fn book_name(source: &Path) -> String {
    source
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ============================================================
// Options
// ============================================================

/// Ingestion options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    /// Rasterization DPI for PDFs
    pub dpi: u32,
    /// Target page height in pixels, original size if `None`
    pub height: Option<u32>,
    /// Inserted before `.png`, e.g. `.orig` for `0001.orig.png`
    pub orig_suffix: String,
    /// Ingest `*.pdf`
    pub pdf: bool,
    /// Ingest raster images
    pub images: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            height: None,
            orig_suffix: String::new(),
            pdf: false,
            images: false,
        }
    }
}

impl IngestOptions {
    /// Create a new options builder
    pub fn builder() -> IngestOptionsBuilder {
        IngestOptionsBuilder::default()
    }
}

/// Builder for IngestOptions
#[derive(Debug, Default)]
pub struct IngestOptionsBuilder {
    options: IngestOptions,
}

impl IngestOptionsBuilder {
    /// Set rasterization DPI (clamped to 72-1200)
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.options.dpi = dpi.clamp(MIN_DPI, MAX_DPI);
        self
    }

    /// Set target page height (minimum 1)
    pub fn height(mut self, height: Option<u32>) -> Self {
        self.options.height = height.map(|h| h.max(1));
        self
    }

    pub fn orig_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.options.orig_suffix = suffix.into();
        self
    }

    pub fn pdf(mut self, enabled: bool) -> Self {
        self.options.pdf = enabled;
        self
    }

    pub fn images(mut self, enabled: bool) -> Self {
        self.options.images = enabled;
        self
    }

    /// Build the options
    pub fn build(self) -> IngestOptions {
        self.options
    }
}

// ============================================================
// PDF rasterization
// ============================================================

/// Renders PDF pages to PNG files
pub trait PdfRasterizer: Send + Sync {
    /// Number of pages in the document
    fn page_count(&self, pdf: &Path) -> Result<usize>;

    /// Render one page (1-based) to exactly `output`
    fn rasterize_page(&self, pdf: &Path, page: usize, dpi: u32, output: &Path) -> Result<()>;
}

/// Poppler `pdftoppm` rasterizer
#[derive(Debug, Default)]
pub struct PopplerRasterizer<R: ToolRunner = SubprocessRunner> {
    runner: R,
}

impl PopplerRasterizer<SubprocessRunner> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: ToolRunner> PopplerRasterizer<R> {
    pub fn with_runner(runner: R) -> Self {
        Self { runner }
    }

    /// `pdftoppm` command writing a single page to `output`
    ///
    /// `pdftoppm -singlefile` appends `.png` to the given root itself.
    pub fn build_command(pdf: &Path, page: usize, dpi: u32, output: &Path) -> ToolCommand {
        let page = page.to_string();
        ToolCommand::new("pdftoppm")
            .args(["-r".to_string(), dpi.to_string()])
            .args(["-f", page.as_str(), "-l", page.as_str()])
            .args(["-png", "-singlefile"])
            .arg(pdf)
            .arg(output.with_extension(""))
    }
}

impl<R: ToolRunner> PdfRasterizer for PopplerRasterizer<R> {
    fn page_count(&self, pdf: &Path) -> Result<usize> {
        let document = lopdf::Document::load(pdf).map_err(|e| IngestError::PageCount {
            path: pdf.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(document.get_pages().len())
    }

    fn rasterize_page(&self, pdf: &Path, page: usize, dpi: u32, output: &Path) -> Result<()> {
        let command = Self::build_command(pdf, page, dpi, output);
        self.runner
            .run(&command)
            .map_err(|source| IngestError::RasterizeFailed { page, source })
    }
}

// ============================================================
// Conversion
// ============================================================

/// Result of ingesting one PDF
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Pages written in order
    Written(Vec<PathBuf>),
    /// Output directory already had files
    SkippedNonEmpty,
}

/// Resize an image file in place to `height`, keeping the aspect ratio
pub fn resize_to_height(path: &Path, height: u32) -> Result<()> {
    let img = image::open(path)?;
    let (width, old_height) = img.dimensions();
    if old_height == 0 {
        return Ok(());
    }
    let new_width = ((height as u64 * width as u64) / old_height as u64).max(1) as u32;
    img.resize_exact(new_width, height, FilterType::Lanczos3)
        .save(path)?;
    Ok(())
}

/// Rasterize every page of a PDF into `out_dir` as `<NNNN><orig_suffix>.png`
pub fn pdf_to_png<P: PdfRasterizer + ?Sized>(
    rasterizer: &P,
    pdf: &Path,
    out_dir: &Path,
    options: &IngestOptions,
) -> Result<IngestOutcome> {
    if !pdf.is_file() {
        return Err(IngestError::SourceNotFound(pdf.to_path_buf()));
    }
    ensure_dir(out_dir)?;

    if !is_dir_empty(out_dir)? {
        warn!(
            "PDF skipped: output directory is not empty: {}",
            out_dir.display()
        );
        return Ok(IngestOutcome::SkippedNonEmpty);
    }

    let page_count = rasterizer.page_count(pdf)?;
    let mut written = Vec::with_capacity(page_count);
    for page in 1..=page_count {
        let output = out_dir.join(page_file_name(page, &options.orig_suffix));
        rasterizer.rasterize_page(pdf, page, options.dpi, &output)?;
        if let Some(height) = options.height {
            resize_to_height(&output, height)?;
        }
        written.push(output);
    }

    Ok(IngestOutcome::Written(written))
}

/// Write one image into `out_dir` as `<stem><orig_suffix>.png`
///
/// PNG input is copied unchanged (before any resize).
pub fn image_to_png(source: &Path, out_dir: &Path, options: &IngestOptions) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(IngestError::SourceNotFound(source.to_path_buf()));
    }
    let suffix = ImageSuffix::from_path(source)
        .ok_or_else(|| IngestError::UnsupportedFormat(source.to_path_buf()))?;
    ensure_dir(out_dir)?;

    if !is_dir_empty(out_dir)? {
        warn!(
            "Image overridden: output directory is not empty: {}",
            out_dir.display()
        );
    }

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let output = out_dir.join(format!("{}{}.png", stem, options.orig_suffix));

    if suffix == ImageSuffix::Png {
        std::fs::copy(source, &output)?;
    } else {
        image::open(source)?.save_with_format(&output, image::ImageFormat::Png)?;
    }

    if let Some(height) = options.height {
        resize_to_height(&output, height)?;
    }
    Ok(output)
}

// ============================================================
// Batch driver
// ============================================================

/// Counts for one ingestion run
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub pdfs: usize,
    pub pdfs_skipped: usize,
    pub images: usize,
    pub pages_written: usize,
    pub failed: Vec<(PathBuf, String)>,
}

/// Ingests an input tree into a book layout
pub struct Ingestor<P: PdfRasterizer = PopplerRasterizer> {
    rasterizer: P,
    options: IngestOptions,
}

impl Ingestor<PopplerRasterizer> {
    pub fn new(options: IngestOptions) -> Self {
        Self::with_rasterizer(PopplerRasterizer::new(), options)
    }
}

impl<P: PdfRasterizer> Ingestor<P> {
    pub fn with_rasterizer(rasterizer: P, options: IngestOptions) -> Self {
        Self {
            rasterizer,
            options,
        }
    }

    /// Ingest every enabled source type below `input`
    ///
    /// Failures on single files are collected and the batch continues.
    pub fn run<C: ProgressCallback>(
        &self,
        input: &Path,
        layout: &BookLayout,
        progress: &C,
    ) -> Result<IngestSummary> {
        if !input.is_dir() {
            return Err(IngestError::SourceNotFound(input.to_path_buf()));
        }
        ensure_dir(&layout.books_root)?;

        let mut summary = IngestSummary::default();

        if self.options.pdf {
            let pdfs = find_sources(input, is_pdf)?;
            progress.on_step_start(&format!("Parsing {} PDF files...", pdfs.len()));
            for (index, pdf) in pdfs.iter().enumerate() {
                progress.on_step_progress(index + 1, pdfs.len());
                info!("Parsing PDF file: {}", pdf.display());
                let out_dir = layout.book(&book_name(pdf)).orig_dir;
                match pdf_to_png(&self.rasterizer, pdf, &out_dir, &self.options) {
                    Ok(IngestOutcome::Written(pages)) => {
                        summary.pdfs += 1;
                        summary.pages_written += pages.len();
                    }
                    Ok(IngestOutcome::SkippedNonEmpty) => summary.pdfs_skipped += 1,
                    Err(e) => {
                        error!("Failed to parse {}: {}", pdf.display(), e);
                        summary.failed.push((pdf.clone(), e.to_string()));
                    }
                }
            }
            progress.on_step_complete(
                "Parsing PDF files",
                &format!("{} parsed, {} skipped", summary.pdfs, summary.pdfs_skipped),
            );
        }

        if self.options.images {
            let images = find_sources(input, |p| ImageSuffix::from_path(p).is_some())?;
            progress.on_step_start(&format!("Parsing {} image files...", images.len()));
            for (index, image) in images.iter().enumerate() {
                progress.on_step_progress(index + 1, images.len());
                info!("Parsing image file: {}", image.display());
                let out_dir = layout.book(&book_name(image)).orig_dir;
                match image_to_png(image, &out_dir, &self.options) {
                    Ok(_) => {
                        summary.images += 1;
                        summary.pages_written += 1;
                    }
                    Err(e) => {
                        error!("Failed to parse {}: {}", image.display(), e);
                        summary.failed.push((image.clone(), e.to_string()));
                    }
                }
            }
            progress.on_step_complete(
                "Parsing image files",
                &format!("{} parsed", summary.images),
            );
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use crate::tool::testing::RecordingRunner;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;

    /// Writes a blank page per call instead of running pdftoppm
    struct FakeRasterizer {
        pages: usize,
        calls: Mutex<Vec<(usize, u32)>>,
    }

    impl FakeRasterizer {
        fn new(pages: usize) -> Self {
            Self {
                pages,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl PdfRasterizer for FakeRasterizer {
        fn page_count(&self, _pdf: &Path) -> Result<usize> {
            Ok(self.pages)
        }

        fn rasterize_page(&self, _pdf: &Path, page: usize, dpi: u32, output: &Path) -> Result<()> {
            self.calls.lock().unwrap().push((page, dpi));
            RgbImage::from_pixel(200, 100, Rgb([255, 255, 255])).save(output)?;
            Ok(())
        }
    }

    fn write_image(path: &Path, width: u32, height: u32) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(width, height, Rgb([10, 20, 30]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_default_options() {
        let opts = IngestOptions::default();
        assert_eq!(opts.dpi, 300);
        assert_eq!(opts.height, None);
        assert_eq!(opts.orig_suffix, "");
        assert!(!opts.pdf);
        assert!(!opts.images);
    }

    #[test]
    fn test_builder_clamping() {
        let opts = IngestOptions::builder().dpi(10).height(Some(0)).build();
        assert_eq!(opts.dpi, 72);
        assert_eq!(opts.height, Some(1));

        let opts = IngestOptions::builder().dpi(5000).build();
        assert_eq!(opts.dpi, 1200);
    }

    #[test]
    fn test_image_suffix_detection() {
        assert_eq!(ImageSuffix::from_path(Path::new("a/p.PNG")), Some(ImageSuffix::Png));
        assert_eq!(ImageSuffix::from_path(Path::new("p.jpeg")), Some(ImageSuffix::Jpeg));
        assert_eq!(ImageSuffix::from_path(Path::new("p.tif")), Some(ImageSuffix::Tif));
        assert_eq!(ImageSuffix::from_path(Path::new("p.gif")), None);
        assert_eq!(ImageSuffix::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_pdftoppm_command() {
        let command = PopplerRasterizer::<RecordingRunner>::build_command(
            Path::new("in/b1/scan.pdf"),
            3,
            300,
            Path::new("books/b1/orig/0003.orig.png"),
        );

        assert_eq!(command.program(), std::ffi::OsStr::new("pdftoppm"));
        assert_eq!(
            command.argument_strings(),
            vec![
                "-r",
                "300",
                "-f",
                "3",
                "-l",
                "3",
                "-png",
                "-singlefile",
                "in/b1/scan.pdf",
                "books/b1/orig/0003.orig",
            ]
        );
    }

    #[test]
    fn test_poppler_rasterize_failure() {
        let dir = tempfile::tempdir().unwrap();
        let rasterizer = PopplerRasterizer::with_runner(RecordingRunner::failing());
        let result = rasterizer.rasterize_page(
            Path::new("scan.pdf"),
            1,
            300,
            &dir.path().join("0001.png"),
        );

        assert!(matches!(
            result,
            Err(IngestError::RasterizeFailed { page: 1, .. })
        ));
    }

    #[test]
    fn test_poppler_page_count() {
        use lopdf::{dictionary, Document, Object};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two.pdf");

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..2)
            .map(|_| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 2,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(&path).unwrap();

        let rasterizer = PopplerRasterizer::new();
        assert_eq!(rasterizer.page_count(&path).unwrap(), 2);
    }

    #[test]
    fn test_poppler_page_count_not_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let result = PopplerRasterizer::new().page_count(&path);
        assert!(matches!(result, Err(IngestError::PageCount { .. })));
    }

    #[test]
    fn test_find_sources_recursive_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b2/scans")).unwrap();
        std::fs::create_dir_all(dir.path().join("b1")).unwrap();
        std::fs::write(dir.path().join("b2/scans/a.pdf"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("b1/c.PDF"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("b1/notes.txt"), b"").unwrap();

        let found = find_sources(dir.path(), is_pdf).unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("b1/c.PDF"), dir.path().join("b2/scans/a.pdf")]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_find_sources_ignores_symlink_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let book = dir.path().join("b1");
        std::fs::create_dir_all(&book).unwrap();
        std::fs::write(book.join("0001.png"), b"png").unwrap();
        std::os::unix::fs::symlink(&book, book.join("loop")).unwrap();

        let found =
            find_sources(dir.path(), |p| ImageSuffix::from_path(p).is_some()).unwrap();
        assert_eq!(found, vec![book.join("0001.png")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_find_sources_keeps_symlinked_file() {
        let dir = tempfile::tempdir().unwrap();
        let book = dir.path().join("b1");
        std::fs::create_dir_all(&book).unwrap();
        let target = dir.path().join("scan.pdf");
        std::fs::write(&target, b"%PDF").unwrap();
        std::os::unix::fs::symlink(&target, book.join("linked.pdf")).unwrap();

        let found = find_sources(&book, is_pdf).unwrap();
        assert_eq!(found, vec![book.join("linked.pdf")]);
    }

    #[test]
    fn test_pdf_to_png_names_and_resize() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("scan.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        let out = dir.path().join("books/b1/orig");

        let rasterizer = FakeRasterizer::new(3);
        let options = IngestOptions::builder()
            .dpi(150)
            .height(Some(50))
            .orig_suffix(".orig")
            .build();
        let outcome = pdf_to_png(&rasterizer, &pdf, &out, &options).unwrap();

        let IngestOutcome::Written(pages) = outcome else {
            panic!("Expected pages to be written");
        };
        assert_eq!(pages.len(), 3);
        assert!(pages[0].ends_with("0001.orig.png"));
        assert!(pages[2].ends_with("0003.orig.png"));
        assert_eq!(
            *rasterizer.calls.lock().unwrap(),
            vec![(1, 150), (2, 150), (3, 150)]
        );

        let img = image::open(&pages[1]).unwrap();
        assert_eq!(img.dimensions(), (100, 50));
    }

    #[test]
    fn test_pdf_to_png_skips_non_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("scan.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        let out = dir.path().join("orig");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("0001.png"), b"existing").unwrap();

        let rasterizer = FakeRasterizer::new(2);
        let outcome = pdf_to_png(&rasterizer, &pdf, &out, &IngestOptions::default()).unwrap();

        assert_eq!(outcome, IngestOutcome::SkippedNonEmpty);
        assert!(rasterizer.calls.lock().unwrap().is_empty());
        assert_eq!(std::fs::read(out.join("0001.png")).unwrap(), b"existing");
    }

    #[test]
    fn test_pdf_to_png_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let result = pdf_to_png(
            &FakeRasterizer::new(1),
            &dir.path().join("missing.pdf"),
            dir.path(),
            &IngestOptions::default(),
        );
        assert!(matches!(result, Err(IngestError::SourceNotFound(_))));
    }

    #[test]
    fn test_image_to_png_copies_png() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in/b1/page7.png");
        write_image(&src, 40, 20);
        let out = dir.path().join("books/b1/orig");

        let options = IngestOptions::builder().orig_suffix(".orig").build();
        let written = image_to_png(&src, &out, &options).unwrap();

        assert_eq!(written, out.join("page7.orig.png"));
        assert_eq!(std::fs::read(&written).unwrap(), std::fs::read(&src).unwrap());
    }

    #[test]
    fn test_image_to_png_converts_jpeg_and_resizes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in/b1/0001.jpg");
        write_image(&src, 300, 200);
        let out = dir.path().join("orig");

        let options = IngestOptions::builder().height(Some(100)).build();
        let written = image_to_png(&src, &out, &options).unwrap();

        assert_eq!(written, out.join("0001.png"));
        let img = image::open(&written).unwrap();
        assert_eq!(img.dimensions(), (150, 100));
        let header = std::fs::read(&written).unwrap();
        assert_eq!(&header[1..4], b"PNG");
    }

    #[test]
    fn test_image_to_png_proceeds_in_non_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in/b1/0002.tif");
        write_image(&src, 10, 10);
        let out = dir.path().join("orig");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("0001.png"), b"existing").unwrap();

        let written = image_to_png(&src, &out, &IngestOptions::default()).unwrap();
        assert!(written.exists());
        assert!(out.join("0001.png").exists());
    }

    #[test]
    fn test_image_to_png_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("notes.txt");
        std::fs::write(&src, b"text").unwrap();

        let result = image_to_png(&src, dir.path(), &IngestOptions::default());
        assert!(matches!(result, Err(IngestError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_ingestor_run_books_from_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        write_image(&input.join("alpha/0001.png"), 20, 10);
        write_image(&input.join("alpha/0002.jpg"), 20, 10);
        write_image(&input.join("nested/beta/0001.png"), 20, 10);
        std::fs::write(input.join("alpha/scan.pdf"), b"%PDF").unwrap();
        std::fs::write(input.join("alpha/readme.txt"), b"").unwrap();

        let layout = BookLayout::new(dir.path().join("books"));
        let options = IngestOptions::builder().images(true).pdf(true).build();
        let ingestor = Ingestor::with_rasterizer(FakeRasterizer::new(2), options);
        let summary = ingestor.run(&input, &layout, &SilentProgress).unwrap();

        assert_eq!(summary.pdfs, 1);
        assert_eq!(summary.images, 3);
        assert_eq!(summary.pages_written, 5);
        assert!(summary.failed.is_empty());

        let alpha = layout.book("alpha").orig_images().unwrap();
        let names: Vec<_> = alpha
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["0001.png", "0002.png"]);
        assert!(layout.book("beta").orig_dir.join("0001.png").exists());
    }

    #[test]
    fn test_ingestor_collects_failures() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        std::fs::create_dir_all(input.join("b1")).unwrap();
        std::fs::write(input.join("b1/broken.jpg"), b"not a jpeg").unwrap();
        write_image(&input.join("b1/0001.png"), 4, 4);

        let layout = BookLayout::new(dir.path().join("books"));
        let options = IngestOptions::builder().images(true).build();
        let summary = Ingestor::with_rasterizer(FakeRasterizer::new(0), options)
            .run(&input, &layout, &SilentProgress)
            .unwrap();

        assert_eq!(summary.images, 1);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].0.ends_with("broken.jpg"));
    }

    #[test]
    fn test_ingestor_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BookLayout::new(dir.path().join("books"));
        let result = Ingestor::new(IngestOptions::default()).run(
            &dir.path().join("missing"),
            &layout,
            &SilentProgress,
        );
        assert!(matches!(result, Err(IngestError::SourceNotFound(_))));
    }
}
