use std::path::Path;

use serde::{Deserialize, Serialize};

/// How a file's text is obtained. The extractor consults this once per file;
/// no other module matches on extension strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// HWP 5.0 compound binary document.
    LegacyBinary,
    /// PDF or DOCX, split into typed elements by a partitioner.
    StructuredDocument,
    /// UTF-8 text, read line by line.
    PlainText,
}

impl DocumentKind {
    /// Registry lookup by extension (leading dot, any case).
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            ".hwp" => Some(Self::LegacyBinary),
            ".pdf" | ".docx" => Some(Self::StructuredDocument),
            ".txt" => Some(Self::PlainText),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LegacyBinary => "legacy_binary",
            Self::StructuredDocument => "structured_document",
            Self::PlainText => "plain_text",
        }
    }
}

/// Extension of `name` including the dot, lower-cased, or `""`.
///
/// Only a final suffix of two or more characters containing an ASCII letter
/// counts, so serial-number style names like `SDRW2000000001.1` keep no
/// extension.
pub fn get_suffix(name: &str) -> String {
    let file_name = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(name);

    // A leading dot alone (".bashrc") is a hidden file, not an extension.
    let Some(dot) = file_name.rfind('.').filter(|&i| i > 0) else {
        return String::new();
    };
    let suffix = &file_name[dot + 1..];
    if suffix.chars().count() >= 2 && suffix.chars().any(|c| c.is_ascii_alphabetic()) {
        format!(".{}", suffix.to_ascii_lowercase())
    } else {
        String::new()
    }
}
