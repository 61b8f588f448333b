//! Splitting structured documents into typed elements.
//!
//! The extractor only needs element categories and texts; anything that can
//! produce those for a PDF or DOCX can stand behind [`DocumentPartitioner`].

use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use super::ExtractionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementCategory {
    Title,
    NarrativeText,
    ListItem,
    Table,
    Image,
    Header,
    Footer,
    PageBreak,
}

impl ElementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "Title",
            Self::NarrativeText => "NarrativeText",
            Self::ListItem => "ListItem",
            Self::Table => "Table",
            Self::Image => "Image",
            Self::Header => "Header",
            Self::Footer => "Footer",
            Self::PageBreak => "PageBreak",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub category: ElementCategory,
    pub text: String,
}

impl Element {
    pub fn new(category: ElementCategory, text: impl Into<String>) -> Self {
        Self {
            category,
            text: text.into(),
        }
    }
}

/// Document partitioning abstraction (allows mocking for tests)
pub trait DocumentPartitioner {
    /// `extension` is the lower-cased suffix with its dot (`.pdf`, `.docx`).
    fn partition(&self, data: &[u8], extension: &str) -> Result<Vec<Element>, ExtractionError>;
}

/// DOCX through its OOXML parts, PDF through the embedded text layer.
pub struct DefaultPartitioner;

impl DocumentPartitioner for DefaultPartitioner {
    fn partition(&self, data: &[u8], extension: &str) -> Result<Vec<Element>, ExtractionError> {
        match extension {
            ".docx" => partition_docx(data),
            ".pdf" => partition_pdf(data),
            other => Err(ExtractionError::UnsupportedFormat(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// PDF
// ---------------------------------------------------------------------------

fn partition_pdf(data: &[u8]) -> Result<Vec<Element>, ExtractionError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(data))
        .map_err(|_| ExtractionError::Partition("PDF parser panicked".into()))?
        .map_err(|e| ExtractionError::Partition(format!("PDF parsing failed: {e}")))?;

    let mut elements = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            elements.push(Element::new(ElementCategory::PageBreak, ""));
        }
        elements.extend(
            paragraph_blocks(page)
                .into_iter()
                .map(|block| Element::new(ElementCategory::NarrativeText, block)),
        );
    }
    Ok(elements)
}

/// Blank-line separated blocks of a page, lines inside a block kept.
fn paragraph_blocks(page: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in page.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }
    blocks
}

// ---------------------------------------------------------------------------
// DOCX
// ---------------------------------------------------------------------------

const DOCUMENT_PART: &str = "word/document.xml";

fn partition_docx(data: &[u8]) -> Result<Vec<Element>, ExtractionError> {
    let mut package = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| ExtractionError::Partition(format!("invalid DOCX package: {e}")))?;

    let mut headers = Vec::new();
    let mut footers = Vec::new();
    for name in package.file_names().map(str::to_string).collect::<Vec<_>>() {
        let Some(stem) = name.strip_prefix("word/").and_then(|n| n.strip_suffix(".xml")) else {
            continue;
        };
        if stem.starts_with("header") {
            headers.push(name);
        } else if stem.starts_with("footer") {
            footers.push(name);
        }
    }
    headers.sort();
    footers.sort();

    let mut elements = Vec::new();
    for part in &headers {
        let xml = read_part(&mut package, part)?;
        elements.extend(relabel(parse_word_xml(&xml)?, ElementCategory::Header));
    }

    let body = read_part(&mut package, DOCUMENT_PART)?;
    elements.extend(parse_word_xml(&body)?);

    for part in &footers {
        let xml = read_part(&mut package, part)?;
        elements.extend(relabel(parse_word_xml(&xml)?, ElementCategory::Footer));
    }
    Ok(elements)
}

fn read_part(
    package: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<String, ExtractionError> {
    let mut part = package
        .by_name(name)
        .map_err(|e| ExtractionError::Partition(format!("missing {name} in DOCX: {e}")))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| ExtractionError::Encoding(format!("{name}: {e}")))?;
    Ok(xml)
}

/// Text-bearing elements of a header or footer part take the part's category.
fn relabel(elements: Vec<Element>, category: ElementCategory) -> Vec<Element> {
    elements
        .into_iter()
        .filter(|e| !e.text.is_empty())
        .map(|e| Element::new(category, e.text))
        .collect()
}

/// Paragraph state while walking WordprocessingML.
#[derive(Default)]
struct ParagraphState {
    text: String,
    style: Option<String>,
    numbered: bool,
    has_drawing: bool,
    page_break: bool,
}

impl ParagraphState {
    fn category(&self) -> ElementCategory {
        let style = self.style.as_deref().unwrap_or_default().to_ascii_lowercase();
        if style == "title" || style.starts_with("heading") {
            ElementCategory::Title
        } else if self.numbered || style.starts_with("list") {
            ElementCategory::ListItem
        } else {
            ElementCategory::NarrativeText
        }
    }
}

fn parse_word_xml(xml: &str) -> Result<Vec<Element>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut elements = Vec::new();
    let mut para = ParagraphState::default();
    let mut in_text = false;
    let mut table_depth = 0usize;
    let mut table_rows: Vec<String> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ExtractionError::Partition(format!("malformed DOCX XML: {e}")))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => para = ParagraphState::default(),
                b"t" => in_text = true,
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        table_rows.clear();
                    }
                }
                b"numPr" => para.numbered = true,
                b"drawing" | b"pict" => para.has_drawing = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => para.text.push('\t'),
                b"br" | b"cr" => {
                    if attr(&e, b"type").as_deref() == Some("page") {
                        para.page_break = true;
                    } else {
                        para.text.push('\n');
                    }
                }
                b"pStyle" => para.style = attr(&e, b"val"),
                b"numPr" => para.numbered = true,
                b"drawing" | b"pict" => para.has_drawing = true,
                _ => {}
            },
            Event::Text(t) if in_text => {
                let value = t
                    .unescape()
                    .map_err(|e| ExtractionError::Encoding(format!("DOCX text node: {e}")))?;
                para.text.push_str(&value);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let finished = std::mem::take(&mut para);
                    if table_depth > 0 {
                        if !finished.text.trim().is_empty() {
                            table_rows.push(finished.text);
                        }
                        continue;
                    }
                    if !finished.text.trim().is_empty() {
                        elements.push(Element::new(finished.category(), finished.text));
                    } else if finished.has_drawing {
                        elements.push(Element::new(ElementCategory::Image, ""));
                    }
                    if finished.page_break {
                        elements.push(Element::new(ElementCategory::PageBreak, ""));
                    }
                }
                b"tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 && !table_rows.is_empty() {
                        elements.push(Element::new(ElementCategory::Table, table_rows.join("\n")));
                        table_rows.clear();
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(elements)
}

/// Value of the attribute with local name `key`, namespace prefix ignored.
fn attr(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}
