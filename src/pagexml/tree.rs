//! Owned XML tree for PageXML documents
//!
//! Documents are parsed with `quick-xml`'s pull reader into an owned tree so
//! that a repair can work on a copy and write the whole result back.
//! Element names are kept exactly as written; lookups compare local names so
//! that default-namespaced and prefixed documents behave the same.
//!
//! Whitespace-only text between child elements is treated as formatting and
//! dropped. The writer re-indents with two spaces, so writing a parsed
//! document twice yields identical bytes.

use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::path::Path;

use super::{PageXmlError, Result};

/// Indentation width used when writing documents
const INDENT_SIZE: usize = 2;

/// XML declaration (`<?xml version="1.0" encoding="UTF-8"?>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

impl Default for Declaration {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            encoding: Some("UTF-8".to_string()),
            standalone: None,
        }
    }
}

/// Markup outside the root element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Misc {
    Comment(String),
    ProcessingInstruction(String),
    DocType(String),
}

/// Child node of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Unescaped character data
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

/// XML element with ordered attributes and children
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Qualified name as written, e.g. `Page` or `pc:Page`
    pub name: String,
    /// Attributes in document order, values unescaped
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// Create an empty element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder pattern: add or replace an attribute
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Name without namespace prefix
    pub fn local_name(&self) -> &str {
        match self.name.rsplit_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    /// Namespace prefix, if the name is prefixed
    pub fn prefix(&self) -> Option<&str> {
        self.name.rsplit_once(':').map(|(prefix, _)| prefix)
    }

    /// Check the local name
    pub fn is(&self, local_name: &str) -> bool {
        self.local_name() == local_name
    }

    /// Get an attribute value
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, keeping its position if it already exists
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((key, value)),
        }
    }

    /// Child elements
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Child elements, mutable
    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First child element with the given local name
    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(local_name))
    }

    /// First child element with the given local name, mutable
    pub fn child_mut(&mut self, local_name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.is(local_name))
    }

    /// First descendant with the given local name (pre-order, self excluded)
    pub fn find(&self, local_name: &str) -> Option<&Element> {
        for child in self.elements() {
            if child.is(local_name) {
                return Some(child);
            }
            if let Some(found) = child.find(local_name) {
                return Some(found);
            }
        }
        None
    }

    /// First descendant with the given local name, mutable
    pub fn find_mut(&mut self, local_name: &str) -> Option<&mut Element> {
        for child in self.elements_mut() {
            if child.is(local_name) {
                return Some(child);
            }
            if let Some(found) = child.find_mut(local_name) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants with the given local name in document order
    pub fn descendants(&self, local_name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_descendants(local_name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, local_name: &str, found: &mut Vec<&'a Element>) {
        for child in self.elements() {
            if child.is(local_name) {
                found.push(child);
            }
            child.collect_descendants(local_name, found);
        }
    }

    /// Visit every descendant with the given local name in document order
    ///
    /// A matching element is visited before its own descendants.
    pub fn for_each_mut<F>(&mut self, local_name: &str, f: &mut F)
    where
        F: FnMut(&mut Element),
    {
        for child in self.elements_mut() {
            if child.is(local_name) {
                f(child);
            }
            child.for_each_mut(local_name, f);
        }
    }

    /// Append a child element
    pub fn push_element(&mut self, element: Element) {
        self.children.push(Node::Element(element));
    }

    /// Insert a child element at a node position
    pub fn insert_element(&mut self, index: usize, element: Element) {
        let index = index.min(self.children.len());
        self.children.insert(index, Node::Element(element));
    }

    /// Remove child elements with the given local name, returning the count
    pub fn remove_children(&mut self, local_name: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|node| !matches!(node, Node::Element(e) if e.is(local_name)));
        before - self.children.len()
    }

    fn has_element_children(&self) -> bool {
        self.children.iter().any(|n| matches!(n, Node::Element(_)))
    }

    /// Drop whitespace-only text used for indentation between elements
    fn strip_formatting(&mut self) {
        if self.has_element_children() {
            self.children
                .retain(|node| !matches!(node, Node::Text(text) if text.trim().is_empty()));
        }
    }
}

/// Parsed PageXML document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub declaration: Option<Declaration>,
    /// Comments, processing instructions and DOCTYPE before the root
    pub prolog: Vec<Misc>,
    pub root: Element,
    /// Comments and processing instructions after the root
    pub epilog: Vec<Misc>,
}

impl Document {
    /// Create a document with a default declaration around a root element
    pub fn new(root: Element) -> Self {
        Self {
            declaration: Some(Declaration::default()),
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }

    /// Parse a document from UTF-8 bytes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();

        let mut declaration = None;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Decl(decl)) => {
                    declaration = Some(read_declaration(&decl)?);
                }
                Ok(Event::Start(start)) => {
                    stack.push(read_element(&start)?);
                }
                Ok(Event::Empty(start)) => {
                    let element = read_element(&start)?;
                    close_element(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let mut element = stack.pop().ok_or_else(|| {
                        PageXmlError::Malformed("unexpected closing tag".to_string())
                    })?;
                    element.strip_formatting();
                    close_element(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(text)) => {
                    let text = text.unescape()?.into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Text(text)),
                        None if text.trim().is_empty() => {}
                        None => {
                            return Err(PageXmlError::Malformed(
                                "text outside the root element".to_string(),
                            ))
                        }
                    }
                }
                Ok(Event::CData(data)) => {
                    let data = String::from_utf8_lossy(&data).into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::CData(data)),
                        None => {
                            return Err(PageXmlError::Malformed(
                                "CDATA outside the root element".to_string(),
                            ))
                        }
                    }
                }
                Ok(Event::Comment(comment)) => {
                    let comment = String::from_utf8_lossy(&comment).into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Comment(comment)),
                        None if root.is_none() => prolog.push(Misc::Comment(comment)),
                        None => epilog.push(Misc::Comment(comment)),
                    }
                }
                Ok(Event::PI(pi)) => {
                    let pi = String::from_utf8_lossy(&pi).into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::ProcessingInstruction(pi)),
                        None if root.is_none() => prolog.push(Misc::ProcessingInstruction(pi)),
                        None => epilog.push(Misc::ProcessingInstruction(pi)),
                    }
                }
                Ok(Event::DocType(doctype)) => {
                    let doctype = String::from_utf8_lossy(&doctype).trim().to_string();
                    prolog.push(Misc::DocType(doctype));
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(PageXmlError::Malformed(format!(
                        "at position {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(PageXmlError::Malformed(format!(
                "unclosed element <{}>",
                open.name
            )));
        }

        let root = root
            .ok_or_else(|| PageXmlError::Malformed("document has no root element".to_string()))?;

        Ok(Self {
            declaration,
            prolog,
            root,
            epilog,
        })
    }

    /// Read and parse a document from disk
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PageXmlError::NotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    /// Serialize the document with two-space indentation
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT_SIZE);

        if let Some(decl) = &self.declaration {
            writer.write_event(Event::Decl(BytesDecl::new(
                &decl.version,
                decl.encoding.as_deref(),
                decl.standalone.as_deref(),
            )))?;
        }
        for misc in &self.prolog {
            write_misc(&mut writer, misc)?;
        }
        write_element(&mut writer, &self.root)?;
        for misc in &self.epilog {
            write_misc(&mut writer, misc)?;
        }

        let mut xml = String::from_utf8(writer.into_inner())
            .map_err(|e| PageXmlError::Malformed(e.to_string()))?;
        xml.push('\n');
        Ok(xml)
    }

    /// Serialize and overwrite a file
    pub fn write(&self, path: &Path) -> Result<()> {
        let xml = self.to_xml_string()?;
        std::fs::write(path, xml)?;
        Ok(())
    }
}

// ============================================================
// Reading helpers
// ============================================================

fn read_declaration(decl: &BytesDecl) -> Result<Declaration> {
    let version = String::from_utf8_lossy(&decl.version()?).into_owned();
    let encoding = decl
        .encoding()
        .transpose()?
        .map(|e| String::from_utf8_lossy(&e).into_owned());
    let standalone = decl
        .standalone()
        .transpose()?
        .map(|s| String::from_utf8_lossy(&s).into_owned());

    Ok(Declaration {
        version,
        encoding,
        standalone,
    })
}

fn read_element(start: &BytesStart) -> Result<Element> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attribute in start.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn close_element(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.push_element(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(PageXmlError::Malformed(
            "multiple root elements".to_string(),
        ));
    }
    *root = Some(element);
    Ok(())
}

// ============================================================
// Writing helpers
// ============================================================

fn write_misc(writer: &mut Writer<Vec<u8>>, misc: &Misc) -> Result<()> {
    match misc {
        Misc::Comment(comment) => {
            writer.write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))?
        }
        Misc::ProcessingInstruction(pi) => {
            writer.write_event(Event::PI(BytesText::from_escaped(pi.as_str())))?
        }
        Misc::DocType(doctype) => {
            writer.write_event(Event::DocType(BytesText::from_escaped(doctype.as_str())))?
        }
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            Node::Element(child) => write_element(writer, child)?,
            Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
            Node::CData(data) => writer.write_event(Event::CData(BytesCData::new(data.as_str())))?,
            Node::Comment(comment) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))?
            }
            Node::ProcessingInstruction(pi) => {
                writer.write_event(Event::PI(BytesText::from_escaped(pi.as_str())))?
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}
