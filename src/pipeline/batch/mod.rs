//! Batch scoring
//!
//! Turns one upload set plus a rubric snapshot into an ordered report:
//! ```text
//! collect → extract (blocking pool) → truncate → score (concurrent) → rows
//! ```
//!
//! A single-file batch surfaces its failure as the batch error. In larger
//! batches each failed document becomes a placeholder row whose `note` says
//! what went wrong, and its siblings keep going.

pub mod report;
pub mod runner;

pub use report::*;
pub use runner::*;

use thiserror::Error;

use crate::pipeline::extraction::ExtractionError;
use crate::pipeline::import::ImportError;
use crate::pipeline::scoring::ScoringError;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("Rubric is invalid: {}", .0.join("; "))]
    InvalidRubric(Vec<String>),

    #[error("{file}: {source}")]
    Extraction {
        file: String,
        #[source]
        source: ExtractionError,
    },

    #[error("{file}: {source}")]
    Scoring {
        file: String,
        #[source]
        source: ScoringError,
    },
}

impl BatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Import(_) => "ImportError",
            Self::InvalidRubric(_) => "RubricValidationError",
            Self::Extraction { source, .. } => source.kind(),
            Self::Scoring { source, .. } => source.kind(),
        }
    }
}

/// `"Kind: message"`, the form failures take in a report row.
pub fn failure_note(kind: &str, message: &dyn std::fmt::Display) -> String {
    format!("{kind}: {message}")
}
