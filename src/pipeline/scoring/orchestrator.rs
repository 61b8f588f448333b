use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use super::budget::{select_model, TokenCounter};
use super::client::LlmClient;
use super::prompt::PromptBuilder;
use super::retry::with_retry;
use super::serializer::parse_score_response;
use super::types::{render_transcript, ChatRequest};
use super::ScoringError;
use crate::config::ScoringConfig;
use crate::models::{Rubric, ScoreSheet, TokenUsage};

/// Result of scoring one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentScore {
    pub sheet: ScoreSheet,
    pub model_name: String,
    pub usage: TokenUsage,
    /// The prompt as sent, one `role: content` block per message.
    pub prompt_text: String,
    /// Characters cut from the document text to fit the model context.
    pub removed_chars: usize,
}

/// Scores one document against one rubric:
/// prompt → model selection → LLM (with retry) → parse
#[derive(Clone)]
pub struct DocumentScorer {
    client: Arc<dyn LlmClient>,
    prompts: PromptBuilder,
    counter: Arc<dyn TokenCounter>,
    config: Arc<ScoringConfig>,
}

impl DocumentScorer {
    pub fn new(
        client: Arc<dyn LlmClient>,
        prompts: PromptBuilder,
        counter: Arc<dyn TokenCounter>,
        config: Arc<ScoringConfig>,
    ) -> Self {
        Self {
            client,
            prompts,
            counter,
            config,
        }
    }

    pub async fn score(&self, rubric: &Rubric, text: &str) -> Result<DocumentScore, ScoringError> {
        if text.trim().is_empty() {
            return Err(ScoringError::EmptyInput);
        }

        let llm = &self.config.llm;
        let mut built = self.prompts.build(rubric, text)?;
        let selection = select_model(
            &mut built.messages,
            built.reducible,
            &llm.model_variants,
            llm.max_output_tokens,
            &self.config.truncation,
            self.counter.as_ref(),
        )?;

        let request = ChatRequest {
            model: selection.model.clone(),
            messages: built.messages,
            temperature: llm.temperature,
            max_tokens: llm.max_output_tokens,
            json_mode: llm.json_mode,
        };

        let started = Instant::now();
        let response = with_retry(&llm.retry, "chat_completion", || self.client.chat(&request)).await?;
        let elapsed = started.elapsed();

        tracing::info!(
            model = %selection.model,
            category = %rubric.category_id,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            total_tokens = response.usage.total_tokens,
            response_secs = elapsed.as_secs_f64(),
            "LLM call complete"
        );

        let sheet = parse_score_response(&response.content, rubric)?;

        Ok(DocumentScore {
            sheet,
            model_name: selection.model,
            usage: response.usage,
            prompt_text: render_transcript(&request.messages),
            removed_chars: selection.removed_chars,
        })
    }
}
