use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::import::format::get_suffix;

/// Characters included in [`ReportFile::summary`].
const SUMMARY_CHARS: usize = 1000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportFileError {
    #[error("File name must not be empty")]
    EmptyName,

    #[error("Filename '{0}' already exists.")]
    DuplicateName(String),
}

/// One extracted student report, the unit of work for scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportFile {
    pub name: String,
    pub content: String,
    pub extension: String,
    /// Set when the content was cut down to the character cap.
    #[serde(default)]
    pub truncated: bool,
}

/// Short view of a report used for previews.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub text: String,
    pub char_count: usize,
    pub word_count: usize,
}

impl ReportFile {
    pub fn new(name: &str, content: &str) -> Result<Self, ReportFileError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ReportFileError::EmptyName);
        }
        Ok(Self {
            name: name.to_string(),
            content: content.trim().to_string(),
            extension: get_suffix(name),
            truncated: false,
        })
    }

    /// Keep only the first `max_chars` characters. Returns whether anything
    /// was removed; content exactly at the cap is left alone.
    pub fn truncate_to(&mut self, max_chars: usize) -> bool {
        match self.content.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => {
                self.content.truncate(byte_idx);
                self.truncated = true;
                true
            }
            None => false,
        }
    }

    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            text: self.content.chars().take(SUMMARY_CHARS).collect(),
            char_count: self.char_count(),
            word_count: self.word_count(),
        }
    }
}

/// Ordered reports of one batch with unique names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReportFileList {
    files: Vec<ReportFile>,
}

impl ReportFileList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file: ReportFile) -> Result<(), ReportFileError> {
        if self.files.iter().any(|existing| existing.name == file.name) {
            return Err(ReportFileError::DuplicateName(file.name));
        }
        self.files.push(file);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReportFile> {
        self.files.iter()
    }

    pub fn into_vec(self) -> Vec<ReportFile> {
        self.files
    }
}
