use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::rubric::Rubric;

/// Column holding the sequential student id.
pub const STUDENT_ID_COLUMN: &str = "student_id";
/// Grand total column.
pub const TOTAL_COLUMN: &str = "Total";
/// Fixed columns following the score columns.
pub const TRAILER_COLUMNS: [&str; 4] = ["source_filename", "source_content", "model_name", "note"];

/// Token counts reported by the completion endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Scores for one criterion, flattened from the model reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionScore {
    /// Lower-cased `title_en`.
    pub prefix: String,
    pub scores: Vec<i64>,
    pub total: i64,
    pub description: String,
}

/// All criterion scores of one document plus the grand total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreSheet {
    pub criteria: Vec<CriterionScore>,
    pub total: i64,
}

impl ScoreSheet {
    /// Column name → value pairs in column order.
    pub fn columns(&self) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        for c in &self.criteria {
            for (i, score) in c.scores.iter().enumerate() {
                out.push((format!("{}_{}", c.prefix, i + 1), Value::from(*score)));
            }
            out.push((format!("{}_total", c.prefix), Value::from(c.total)));
            out.push((format!("{}_descript", c.prefix), Value::from(c.description.clone())));
        }
        out.push((TOTAL_COLUMN.to_string(), Value::from(self.total)));
        out
    }
}

/// One export row. `scores` is `None` for documents that failed, in which
/// case `note` says why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRow {
    pub student_id: String,
    pub scores: Option<ScoreSheet>,
    pub source_filename: String,
    pub source_content: String,
    pub model_name: String,
    pub note: String,
    pub usage: Option<TokenUsage>,
}

impl ScoreRow {
    /// Row laid out on `schema`; missing score cells are null.
    pub fn to_record(&self, schema: &ReportSchema) -> Map<String, Value> {
        let mut cells: Map<String, Value> = self
            .scores
            .as_ref()
            .map(|sheet| sheet.columns().into_iter().collect())
            .unwrap_or_default();

        let mut record = Map::new();
        for column in &schema.columns {
            let value = match column.as_str() {
                STUDENT_ID_COLUMN => Value::from(self.student_id.clone()),
                "source_filename" => Value::from(self.source_filename.clone()),
                "source_content" => Value::from(self.source_content.clone()),
                "model_name" => Value::from(self.model_name.clone()),
                "note" => Value::from(self.note.clone()),
                other => cells.remove(other).unwrap_or(Value::Null),
            };
            record.insert(column.clone(), value);
        }
        record
    }
}

/// Export column set for one rubric. Recomputed per rubric because criterion
/// columns differ between rubrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSchema {
    pub columns: Vec<String>,
}

impl ReportSchema {
    pub fn for_rubric(rubric: &Rubric) -> Self {
        let mut columns = vec![STUDENT_ID_COLUMN.to_string()];
        for criterion in &rubric.criteria {
            let prefix = criterion.prefix();
            for i in 1..=criterion.sub_criteria.len() {
                columns.push(format!("{prefix}_{i}"));
            }
            columns.push(format!("{prefix}_total"));
            columns.push(format!("{prefix}_descript"));
        }
        columns.push(TOTAL_COLUMN.to_string());
        columns.extend(TRAILER_COLUMNS.iter().map(|c| c.to_string()));
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rubric::fixtures::communication_rubric;

    fn sheet() -> ScoreSheet {
        ScoreSheet {
            criteria: vec![
                CriterionScore {
                    prefix: "content".into(),
                    scores: vec![4, 5, 3],
                    total: 12,
                    description: "good".into(),
                },
                CriterionScore {
                    prefix: "structure".into(),
                    scores: vec![2, 3],
                    total: 5,
                    description: String::new(),
                },
                CriterionScore {
                    prefix: "grammar".into(),
                    scores: vec![4],
                    total: 4,
                    description: "clean".into(),
                },
            ],
            total: 21,
        }
    }

    #[test]
    fn schema_column_count_follows_rubric_shape() {
        let rubric = communication_rubric();
        let schema = ReportSchema::for_rubric(&rubric);
        let criteria = rubric.criteria.len();
        let expected = 1 // student_id
            + rubric.sub_criteria_count()
            + criteria // totals
            + criteria // descriptions
            + 1 // grand total
            + TRAILER_COLUMNS.len();
        assert_eq!(schema.len(), expected);
        assert_eq!(schema.columns[0], "student_id");
        assert_eq!(schema.columns[1], "content_1");
        assert_eq!(schema.columns[4], "content_total");
        assert_eq!(schema.columns[5], "content_descript");
        assert_eq!(schema.columns.last().map(String::as_str), Some("note"));
    }

    #[test]
    fn sheet_columns_match_schema_score_columns() {
        let schema = ReportSchema::for_rubric(&communication_rubric());
        let names: Vec<String> = sheet().columns().into_iter().map(|(k, _)| k).collect();
        let score_columns = &schema.columns[1..schema.len() - TRAILER_COLUMNS.len()];
        assert_eq!(names, score_columns);
    }

    #[test]
    fn record_fills_every_schema_column() {
        let schema = ReportSchema::for_rubric(&communication_rubric());
        let row = ScoreRow {
            student_id: "0001".into(),
            scores: Some(sheet()),
            source_filename: "a.pdf".into(),
            source_content: "text".into(),
            model_name: "gpt-4".into(),
            note: String::new(),
            usage: None,
        };
        let record = row.to_record(&schema);
        let keys: Vec<&String> = record.keys().collect();
        assert_eq!(keys.len(), schema.len());
        assert_eq!(record["content_2"], 5);
        assert_eq!(record["Total"], 21);
        assert_eq!(record["model_name"], "gpt-4");
    }

    #[test]
    fn failed_row_has_null_scores_and_note() {
        let schema = ReportSchema::for_rubric(&communication_rubric());
        let row = ScoreRow {
            student_id: "0003".into(),
            scores: None,
            source_filename: "c.hwp".into(),
            source_content: String::new(),
            model_name: String::new(),
            note: "FormatError: not a valid document".into(),
            usage: None,
        };
        let record = row.to_record(&schema);
        assert_eq!(record.len(), schema.len());
        assert!(record["content_1"].is_null());
        assert!(record["Total"].is_null());
        assert_eq!(record["note"], "FormatError: not a valid document");
    }
}
