//! Scheme and image filename repair
//!
//! Both repairs work on a copy of the parsed document; the caller decides
//! whether and where to write the result.

use serde::Serialize;
use std::path::Path;

use super::tree::{Document, Element};
use super::{
    PageXmlError, Result, ATTR_CUSTOM, ATTR_ID, ATTR_IMAGE_FILENAME, ATTR_INDEX, ATTR_POINTS,
    ATTR_REGION_REF, ATTR_TYPE, COORDS, ORDERED_GROUP, PAGE, READING_ORDER, REGION_REF_INDEXED,
    TEXT_LINE, TEXT_REGION,
};

/// Legacy region type encoding written by the segmenter into `custom`
pub const CUSTOM_TYPE_PREFIX: &str = "structure {type:";
pub const CUSTOM_TYPE_SUFFIX: &str = ";}";

/// Id of the synthesized ordered group
pub const ORDERED_GROUP_ID: &str = "g0";

/// What to do with a ReadingOrder already present under Page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadingOrderMode {
    /// Remove existing ReadingOrder elements before inserting the new one
    #[default]
    Replace,
    /// Insert the new ReadingOrder in front and keep existing ones
    Prepend,
}

/// Counts collected while repairing one or more documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SchemeReport {
    /// TextRegions renumbered
    pub regions: usize,
    /// TextRegions whose type was taken from `custom`
    pub types_reclassified: usize,
    /// TextLines whose coordinates contained `-`
    pub lines_repaired: usize,
    /// TextLines without Coords or without points
    pub lines_without_coords: usize,
    /// ReadingOrder elements removed before insertion
    pub reading_orders_replaced: usize,
}

impl SchemeReport {
    /// Add another report's counts to this one
    pub fn merge(&mut self, other: &SchemeReport) {
        self.regions += other.regions;
        self.types_reclassified += other.types_reclassified;
        self.lines_repaired += other.lines_repaired;
        self.lines_without_coords += other.lines_without_coords;
        self.reading_orders_replaced += other.reading_orders_replaced;
    }
}

/// Canonical region id for a zero-based document position
pub fn region_id(index: usize) -> String {
    format!("r_{:04}", index)
}

/// Extract `<value>` from `structure {type:<value>;}`
///
/// Only an exact prefix and suffix match counts; an empty value is no match.
pub fn region_type_from_custom(custom: &str) -> Option<&str> {
    custom
        .strip_prefix(CUSTOM_TYPE_PREFIX)
        .and_then(|rest| rest.strip_suffix(CUSTOM_TYPE_SUFFIX))
        .filter(|value| !value.is_empty())
}

/// Remove every `-` from a points string
///
/// Returns `None` when there is nothing to remove.
pub fn strip_negative_signs(points: &str) -> Option<String> {
    if points.contains('-') {
        Some(points.replace('-', ""))
    } else {
        None
    }
}

/// Image file name for a markup file: `0007.xml` + `.orig` -> `0007.orig.png`
pub fn canonical_image_name(file_name: &str, xml_suffix: &str, orig_suffix: &str) -> String {
    let stem = if xml_suffix.is_empty() {
        None
    } else {
        file_name.strip_suffix(xml_suffix)
    };
    let stem = stem.unwrap_or_else(|| {
        Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name)
    });
    format!("{}{}.png", stem, orig_suffix)
}

fn page(root: &Element) -> Result<&Element> {
    if root.is(PAGE) {
        Ok(root)
    } else {
        root.find(PAGE).ok_or(PageXmlError::MissingPage)
    }
}

fn page_mut(root: &mut Element) -> Result<&mut Element> {
    if root.is(PAGE) {
        Ok(root)
    } else {
        root.find_mut(PAGE).ok_or(PageXmlError::MissingPage)
    }
}

/// Repair region types, ids, line coordinates and the reading order
///
/// The steps run strictly in sequence over a copy of `document`:
///
/// 1. `type` is taken from a matching `custom` on every TextRegion
/// 2. TextRegions are renumbered `r_0000`, `r_0001`, ... in document order
/// 3. `-` is stripped from the Coords of TextLines directly under a region
/// 4. A ReadingOrder referencing every region is inserted as Page's first child
///
/// Fails with [`PageXmlError::MissingPage`] if the document has no Page.
pub fn repair_scheme(
    document: &Document,
    mode: ReadingOrderMode,
) -> Result<(Document, SchemeReport)> {
    let mut repaired = document.clone();
    let mut report = SchemeReport::default();
    let root = &mut repaired.root;

    // Region types
    root.for_each_mut(TEXT_REGION, &mut |region| {
        let value = region
            .attr(ATTR_CUSTOM)
            .and_then(region_type_from_custom)
            .map(str::to_owned);
        if let Some(value) = value {
            region.set_attr(ATTR_TYPE, value);
            report.types_reclassified += 1;
        }
    });

    // Region ids
    let mut ids = Vec::new();
    root.for_each_mut(TEXT_REGION, &mut |region| {
        let id = region_id(ids.len());
        region.set_attr(ATTR_ID, id.clone());
        ids.push(id);
    });
    report.regions = ids.len();

    // Line coordinates
    root.for_each_mut(TEXT_REGION, &mut |region| {
        for line in region.elements_mut().filter(|e| e.is(TEXT_LINE)) {
            let Some(coords) = line.child_mut(COORDS) else {
                report.lines_without_coords += 1;
                continue;
            };
            let Some(points) = coords.attr(ATTR_POINTS) else {
                report.lines_without_coords += 1;
                continue;
            };
            if let Some(fixed) = strip_negative_signs(points) {
                coords.set_attr(ATTR_POINTS, fixed);
                report.lines_repaired += 1;
            }
        }
    });

    // Reading order
    let page = page_mut(root)?;
    let prefix = page
        .prefix()
        .map(|p| format!("{}:", p))
        .unwrap_or_default();
    let qualified = |local: &str| format!("{}{}", prefix, local);

    if mode == ReadingOrderMode::Replace {
        report.reading_orders_replaced = page.remove_children(READING_ORDER);
    }

    let mut group = Element::new(qualified(ORDERED_GROUP)).with_attr(ATTR_ID, ORDERED_GROUP_ID);
    for (index, id) in ids.iter().enumerate() {
        group.push_element(
            Element::new(qualified(REGION_REF_INDEXED))
                .with_attr(ATTR_INDEX, index.to_string())
                .with_attr(ATTR_REGION_REF, id.as_str()),
        );
    }
    let mut reading_order = Element::new(qualified(READING_ORDER));
    reading_order.push_element(group);
    page.insert_element(0, reading_order);

    Ok((repaired, report))
}

/// Set Page `imageFilename` on a copy of `document`
///
/// The name is not checked against the filesystem.
pub fn repair_image_filename(document: &Document, image_name: &str) -> Result<Document> {
    let mut repaired = document.clone();
    page_mut(&mut repaired.root)?.set_attr(ATTR_IMAGE_FILENAME, image_name);
    Ok(repaired)
}

/// Current Page `imageFilename`, if any
pub fn image_filename(document: &Document) -> Result<Option<&str>> {
    Ok(page(&document.root)?.attr(ATTR_IMAGE_FILENAME))
}
