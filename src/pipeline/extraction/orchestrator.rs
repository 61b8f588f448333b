use std::path::Path;
use std::sync::Arc;

use super::hwp::read_hwp_sections;
use super::partition::{DefaultPartitioner, DocumentPartitioner, ElementCategory};
use super::sanitize::clean_units;
use super::ExtractionError;
use crate::models::ReportFile;
use crate::pipeline::import::format::{get_suffix, DocumentKind};

/// Bytes + extension → plain text.
/// The partitioner is a trait object so tests can inject canned elements.
#[derive(Clone)]
pub struct TextExtractor {
    partitioner: Arc<dyn DocumentPartitioner + Send + Sync>,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new(Arc::new(DefaultPartitioner))
    }
}

impl TextExtractor {
    pub fn new(partitioner: Arc<dyn DocumentPartitioner + Send + Sync>) -> Self {
        Self { partitioner }
    }

    /// Extract the text of one document.
    ///
    /// With `clean` set, every extracted unit (section, element, line) goes
    /// through the cleaning pipeline before and after joining. Empty final
    /// text is an error.
    pub fn extract_text(
        &self,
        data: &[u8],
        extension: &str,
        clean: bool,
    ) -> Result<String, ExtractionError> {
        let extension = extension.to_ascii_lowercase();
        self.extract_inner(data, &extension, clean).inspect_err(|e| {
            tracing::warn!(
                extension = %extension,
                kind = e.kind(),
                error = %e,
                "Cannot extract text from document"
            );
        })
    }

    fn extract_inner(
        &self,
        data: &[u8],
        extension: &str,
        clean: bool,
    ) -> Result<String, ExtractionError> {
        let kind = DocumentKind::from_extension(extension)
            .ok_or_else(|| ExtractionError::UnsupportedFormat(extension.to_string()))?;

        let units = match kind {
            DocumentKind::PlainText => {
                let text = std::str::from_utf8(data)
                    .map_err(|e| ExtractionError::Encoding(e.to_string()))?;
                text.lines().map(|l| l.trim().to_string()).collect()
            }
            DocumentKind::LegacyBinary => read_hwp_sections(data)?,
            DocumentKind::StructuredDocument => self.structured_units(data, extension)?,
        };

        let text = if clean {
            clean_units(&units)
        } else {
            units.join("\n")
        };

        if text.trim().is_empty() {
            if units.iter().any(|u| !u.trim().is_empty()) {
                tracing::debug!(units = units.len(), "All text removed by cleaning");
            }
            return Err(ExtractionError::EmptyText);
        }

        tracing::debug!(
            kind = kind.as_str(),
            units = units.len(),
            chars = text.chars().count(),
            "Extracted document text"
        );
        Ok(text)
    }

    /// Text of the prose elements; layout furniture is dropped.
    fn structured_units(
        &self,
        data: &[u8],
        extension: &str,
    ) -> Result<Vec<String>, ExtractionError> {
        let elements = self.partitioner.partition(data, extension)?;
        let mut units = Vec::with_capacity(elements.len());
        for element in elements {
            match element.category {
                ElementCategory::Image | ElementCategory::PageBreak => {}
                ElementCategory::Table | ElementCategory::Header | ElementCategory::Footer => {
                    tracing::debug!(
                        category = element.category.as_str(),
                        text = %element.text,
                        "Dropped element"
                    );
                }
                _ => units.push(element.text),
            }
        }
        Ok(units)
    }

    /// Extract a named upload into a [`ReportFile`].
    pub fn extract_report(
        &self,
        name: &str,
        data: &[u8],
        clean: bool,
    ) -> Result<ReportFile, ExtractionError> {
        let extension = get_suffix(name);
        let text = self.extract_text(data, &extension, clean)?;
        ReportFile::new(name, &text).map_err(|e| ExtractionError::Format(e.to_string()))
    }

    /// Read a document from disk and extract it.
    pub fn extract_path(&self, path: &Path, clean: bool) -> Result<ReportFile, ExtractionError> {
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.extract_report(&name, &data, clean)
    }
}
