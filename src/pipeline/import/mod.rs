pub mod archive;
pub mod collect;
pub mod format;

pub use archive::*;
pub use collect::*;
pub use format::*;

use thiserror::Error;

use crate::models::ReportFileError;

/// Upload-level failures. Any of these stops the whole batch before
/// extraction starts, since they point at a user input mistake.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("Unsupported file type '{extension}' for file: {member}")]
    UnsupportedFormat { member: String, extension: String },

    #[error("Not a valid zip archive: {0}")]
    InvalidArchive(String),

    #[error("Filename '{0}' already exists.")]
    DuplicateName(String),

    #[error("File name must not be empty")]
    EmptyName,

    #[error("No files were uploaded")]
    EmptyBatch,
}

impl From<ReportFileError> for ImportError {
    fn from(e: ReportFileError) -> Self {
        match e {
            ReportFileError::EmptyName => ImportError::EmptyName,
            ReportFileError::DuplicateName(name) => ImportError::DuplicateName(name),
        }
    }
}
