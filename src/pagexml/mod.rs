//! PageXML module
//!
//! Reading, repairing and writing PAGE-XML documents produced by the
//! segmentation step.
//!
//! # Features
//!
//! - Owned element tree with namespace-agnostic lookups ([`tree`])
//! - Region type reclassification from the legacy `custom` field
//! - Canonical `r_XXXX` region ids and a synthesized reading order
//! - Negative coordinate repair on text lines
//! - Portable `imageFilename` rewriting
//!
//! # Example
//!
//! ```rust
//! use ocrsegment::pagexml::{repair_scheme, Document, ReadingOrderMode};
//!
//! let xml = r#"<PcGts><Page imageFilename="/tmp/0001.bin.png">
//!   <TextRegion id="x" custom="structure {type:heading;}"/>
//! </Page></PcGts>"#;
//!
//! let document = Document::parse(xml.as_bytes()).unwrap();
//! let (repaired, report) = repair_scheme(&document, ReadingOrderMode::Replace).unwrap();
//!
//! assert_eq!(report.regions, 1);
//! assert!(repaired.to_xml_string().unwrap().contains(r#"regionRef="r_0000""#));
//! ```

pub mod repair;
pub mod tree;

use std::path::PathBuf;
use thiserror::Error;

pub use repair::{
    canonical_image_name, image_filename, region_id, region_type_from_custom,
    repair_image_filename, repair_scheme, strip_negative_signs, ReadingOrderMode, SchemeReport,
};
pub use tree::{Declaration, Document, Element, Misc, Node};

// ============================================================
// Element and attribute names
// ============================================================

pub const PAGE: &str = "Page";
pub const TEXT_REGION: &str = "TextRegion";
pub const TEXT_LINE: &str = "TextLine";
pub const COORDS: &str = "Coords";
pub const READING_ORDER: &str = "ReadingOrder";
pub const ORDERED_GROUP: &str = "OrderedGroup";
pub const REGION_REF_INDEXED: &str = "RegionRefIndexed";

pub const ATTR_ID: &str = "id";
pub const ATTR_TYPE: &str = "type";
pub const ATTR_CUSTOM: &str = "custom";
pub const ATTR_POINTS: &str = "points";
pub const ATTR_IMAGE_FILENAME: &str = "imageFilename";
pub const ATTR_INDEX: &str = "index";
pub const ATTR_REGION_REF: &str = "regionRef";

/// PageXML error types
#[derive(Debug, Error)]
pub enum PageXmlError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("No Page element found")]
    MissingPage,

    #[error("Document not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PageXmlError>;
