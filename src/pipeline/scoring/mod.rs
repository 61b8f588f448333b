pub mod budget;
pub mod client;
pub mod orchestrator;
pub mod prompt;
pub mod retry;
pub mod serializer;
pub mod types;

pub use budget::*;
pub use client::*;
pub use orchestrator::*;
pub use prompt::*;
pub use retry::*;
pub use serializer::*;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Prompt is too large: {0}")]
    PromptTooLarge(String),

    #[error("Prompt template error: {0}")]
    Template(String),

    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("LLM response is not in the expected form: {0}")]
    ResponseShape(String),

    #[error("No model variants configured")]
    NoModelVariants,

    #[error("Document text is empty")]
    EmptyInput,
}

impl ScoringError {
    /// Stable name of the failure class, used in logs and report notes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PromptTooLarge(_) => "PromptTooLargeError",
            Self::Template(_) => "TemplateError",
            Self::Llm(e) => e.kind(),
            Self::ResponseShape(_) => "ResponseShapeError",
            Self::NoModelVariants => "NoModelVariantsError",
            Self::EmptyInput => "EmptyInputError",
        }
    }
}

impl From<minijinja::Error> for ScoringError {
    fn from(e: minijinja::Error) -> Self {
        ScoringError::Template(e.to_string())
    }
}
