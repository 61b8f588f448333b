use super::types::ChatMessage;
use super::ScoringError;
use crate::config::{ModelVariant, TruncationConfig};

/// Tokens added per message for role and separators.
const TOKENS_PER_MESSAGE: usize = 3;
/// Tokens priming the assistant reply.
const REPLY_PRIMING_TOKENS: usize = 3;
/// ASCII characters per token (English prose averages close to four).
const ASCII_CHARS_PER_TOKEN: usize = 4;

/// Token estimation abstraction (allows an exact tokenizer to be plugged in)
pub trait TokenCounter: Send + Sync {
    fn count_messages(&self, messages: &[ChatMessage]) -> usize;
}

/// Chat accounting with a character-class content estimate: every non-ASCII
/// character (Hangul in practice) is counted as a full token.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl HeuristicTokenCounter {
    pub fn estimate_text(text: &str) -> usize {
        let ascii = text.chars().filter(char::is_ascii).count();
        let other = text.chars().count() - ascii;
        ascii.div_ceil(ASCII_CHARS_PER_TOKEN) + other
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count_messages(&self, messages: &[ChatMessage]) -> usize {
        messages
            .iter()
            .map(|m| TOKENS_PER_MESSAGE + Self::estimate_text(&m.content))
            .sum::<usize>()
            + REPLY_PRIMING_TOKENS
    }
}

/// Outcome of model selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: String,
    /// Estimated prompt tokens after any truncation.
    pub prompt_tokens: usize,
    /// Characters cut from the tail of the reducible message.
    pub removed_chars: usize,
}

/// Choose the first variant whose window holds the prompt plus `reserved`
/// output tokens. When none does, shorten the reducible message from its
/// tail and try again.
pub fn select_model(
    messages: &mut [ChatMessage],
    reducible: Option<usize>,
    variants: &[ModelVariant],
    reserved: usize,
    truncation: &TruncationConfig,
    counter: &dyn TokenCounter,
) -> Result<ModelSelection, ScoringError> {
    let largest = variants
        .iter()
        .map(|v| v.max_tokens)
        .max()
        .ok_or(ScoringError::NoModelVariants)?;

    let mut removed_chars = 0usize;
    loop {
        let tokens = counter.count_messages(messages);
        let needed = tokens + reserved;

        if let Some(variant) = variants.iter().find(|v| needed <= v.max_tokens) {
            if removed_chars > 0 {
                tracing::info!(
                    model = %variant.name,
                    removed_chars,
                    prompt_tokens = tokens,
                    "Prompt shortened to fit model context"
                );
            }
            return Ok(ModelSelection {
                model: variant.name.clone(),
                prompt_tokens: tokens,
                removed_chars,
            });
        }

        let Some(index) = reducible.filter(|i| *i < messages.len()) else {
            return Err(ScoringError::PromptTooLarge(format!(
                "{tokens} prompt tokens plus {reserved} reserved exceed the largest context ({largest}) and no segment can be shortened"
            )));
        };

        let excess = needed - largest;
        let to_remove = ((excess as f64) * truncation.chars_per_excess_token).ceil() as usize;
        let to_remove = to_remove.max(1);
        tracing::warn!(
            prompt_tokens = tokens,
            reserved,
            largest,
            to_remove,
            "Prompt too large for every model, shortening document text"
        );

        let content = &mut messages[index].content;
        let length = content.chars().count();
        let keep = length.saturating_sub(to_remove);
        if let Some((byte_idx, _)) = content.char_indices().nth(keep) {
            content.truncate(byte_idx);
        }
        removed_chars += length - keep;

        if length == 0 || keep < truncation.min_segment_chars {
            return Err(ScoringError::PromptTooLarge(format!(
                "document text shrank to {keep} characters, below the minimum of {}",
                truncation.min_segment_chars
            )));
        }
    }
}
