//! Book directory layout
//!
//! Every stage reads and writes below a books root:
//!
//! ```text
//! <books_root>/<book>/<orig_dir>/0001.png
//! <books_root>/<book>/<processed_dir>/0001.bin.png
//! <books_root>/<book>/<processed_dir>/0001.xml
//! ```
//!
//! [`BookLayout`] resolves these paths once so call sites never rebuild them.

use std::path::PathBuf;
use thiserror::Error;

use crate::util::files_with_suffix;

/// Default directory for original page images
pub const DEFAULT_ORIG_DIR: &str = "orig";
/// Default directory for processed images and markup
pub const DEFAULT_PROCESSED_DIR: &str = "processed";

/// Layout error types
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Books root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LayoutError>;

/// Page image file name: `0001` + `.orig` -> `0001.orig.png`
pub fn page_file_name(page: usize, suffix: &str) -> String {
    format!("{:04}{}.png", page, suffix)
}

/// Directory convention for a set of books
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookLayout {
    pub books_root: PathBuf,
    pub orig_dir: String,
    pub processed_dir: String,
}

impl BookLayout {
    /// Create a layout with default stage directory names
    pub fn new(books_root: impl Into<PathBuf>) -> Self {
        Self {
            books_root: books_root.into(),
            orig_dir: DEFAULT_ORIG_DIR.to_string(),
            processed_dir: DEFAULT_PROCESSED_DIR.to_string(),
        }
    }

    /// Builder pattern: set the original image directory name
    pub fn with_orig_dir(mut self, name: impl Into<String>) -> Self {
        self.orig_dir = name.into();
        self
    }

    /// Builder pattern: set the processed directory name
    pub fn with_processed_dir(mut self, name: impl Into<String>) -> Self {
        self.processed_dir = name.into();
        self
    }

    /// Resolve a single book by directory name (need not exist yet)
    pub fn book(&self, name: &str) -> Book {
        let root = self.books_root.join(name);
        Book {
            name: name.to_string(),
            orig_dir: root.join(&self.orig_dir),
            processed_dir: root.join(&self.processed_dir),
            root,
        }
    }

    /// All books under the root, sorted by name
    pub fn books(&self) -> Result<Vec<Book>> {
        if !self.books_root.is_dir() {
            return Err(LayoutError::RootNotFound(self.books_root.clone()));
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.books_root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        Ok(names.iter().map(|name| self.book(name)).collect())
    }

    /// Whether the root contains at least one book directory
    pub fn has_books(&self) -> bool {
        self.books().map(|b| !b.is_empty()).unwrap_or(false)
    }

    /// Markup files of every book, books in name order, files sorted
    pub fn markup_files(&self, xml_suffix: &str) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for book in self.books()? {
            files.extend(book.processed_files(xml_suffix)?);
        }
        Ok(files)
    }
}

/// One book directory with its stage directories resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub name: String,
    pub root: PathBuf,
    pub orig_dir: PathBuf,
    pub processed_dir: PathBuf,
}

impl Book {
    /// Original page images (`*.png`), sorted
    pub fn orig_images(&self) -> Result<Vec<PathBuf>> {
        Ok(files_with_suffix(&self.orig_dir, ".png")?)
    }

    /// Processed files ending with `suffix`, sorted
    pub fn processed_files(&self, suffix: &str) -> Result<Vec<PathBuf>> {
        Ok(files_with_suffix(&self.processed_dir, suffix)?)
    }

    /// Path of a file in the processed directory
    pub fn processed_path(&self, file_name: &str) -> PathBuf {
        self.processed_dir.join(file_name)
    }
}
