pub mod hwp;
pub mod orchestrator;
pub mod partition;
pub mod sanitize;

pub use orchestrator::*;
pub use partition::*;
pub use sanitize::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Not a valid HWP document: {0}")]
    Format(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Document partitioning failed: {0}")]
    Partition(String),

    #[error("Text encoding error: {0}")]
    Encoding(String),

    #[error("Decompression failed: {0}")]
    Decompress(String),

    #[error("No text could be extracted")]
    EmptyText,

    #[error("Extraction worker failed: {0}")]
    Worker(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractionError {
    /// Stable name of the failure class, used in logs and report notes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Format(_) => "FormatError",
            Self::UnsupportedFormat(_) => "UnsupportedFormatError",
            Self::Partition(_) => "PartitionError",
            Self::Encoding(_) => "EncodingError",
            Self::Decompress(_) => "DecompressError",
            Self::EmptyText => "EmptyTextError",
            Self::Worker(_) => "WorkerError",
            Self::Io(_) => "IoError",
        }
    }
}
