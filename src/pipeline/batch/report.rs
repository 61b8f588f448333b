use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::{ReportFileList, ReportSchema, ScoreRow, TokenUsage};

/// Scored batch: one row per submitted file, in submission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub rubric_id: String,
    pub schema: ReportSchema,
    pub rows: Vec<ScoreRow>,
    /// User-facing notices (e.g. truncated documents).
    pub warnings: Vec<String>,
}

impl BatchReport {
    /// Rows laid out on the rubric's column set.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows.iter().map(|r| r.to_record(&self.schema)).collect()
    }

    pub fn failed_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.scores.is_none()).count()
    }

    /// Token usage summed over every scored row.
    pub fn total_usage(&self) -> TokenUsage {
        self.rows
            .iter()
            .filter_map(|r| r.usage)
            .fold(TokenUsage::default(), |acc, u| TokenUsage {
                prompt_tokens: acc.prompt_tokens + u.prompt_tokens,
                completion_tokens: acc.completion_tokens + u.completion_tokens,
                total_tokens: acc.total_tokens + u.total_tokens,
            })
    }

    /// Export shape: `{rubric_id, columns, rows, warnings}`.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "rubric_id": self.rubric_id,
            "columns": self.schema.columns,
            "rows": self.records(),
            "warnings": self.warnings,
        })
    }
}

/// A file that could not be extracted in a multi-file batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub name: String,
    pub note: String,
}

/// Extraction-only batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionReport {
    pub files: ReportFileList,
    pub failed: Vec<FailedFile>,
    pub warnings: Vec<String>,
}
