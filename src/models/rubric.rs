use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A scoring rubric for one competency category.
///
/// Persisted as one TOML file per category; `category_id` is the file stem and
/// is not stored inside the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    #[serde(skip)]
    pub category_id: String,
    pub category_name_ko: String,
    pub category_name_en: String,
    pub criteria: Vec<Criterion>,
    /// Few-shot scoring examples. Older files have no such key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub example: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub title_ko: String,
    /// Unique within a rubric; lower-cased it becomes the output column prefix.
    pub title_en: String,
    pub sub_criteria: Vec<SubCriterion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubCriterion {
    pub description: String,
    pub scale_min: i64,
    pub scale_max: i64,
}

impl Criterion {
    /// Output column prefix for this criterion.
    pub fn prefix(&self) -> String {
        self.title_en.to_lowercase()
    }
}

impl Rubric {
    pub fn sub_criteria_count(&self) -> usize {
        self.criteria.iter().map(|c| c.sub_criteria.len()).sum()
    }

    /// Highest achievable grand total.
    pub fn max_total(&self) -> i64 {
        self.criteria
            .iter()
            .flat_map(|c| c.sub_criteria.iter())
            .map(|s| s.scale_max)
            .sum()
    }

    /// Check every structural rule a rubric must satisfy before it is saved or
    /// used for scoring. Returns all problems found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.category_name_ko.trim().is_empty() {
            problems.push("category_name_ko must not be empty".to_string());
        }
        if self.category_name_en.trim().is_empty() {
            problems.push("category_name_en must not be empty".to_string());
        }
        if self.criteria.is_empty() {
            problems.push("at least one criterion is required".to_string());
        }

        let mut seen_en = HashSet::new();
        let mut seen_ko = HashSet::new();
        for (i, criterion) in self.criteria.iter().enumerate() {
            let n = i + 1;
            if criterion.title_ko.trim().is_empty() || criterion.title_en.trim().is_empty() {
                problems.push(format!("criterion {n}: title_ko and title_en are both required"));
            }
            // Prefixes are lower-cased, so "Content" and "content" would share columns.
            if !criterion.title_en.trim().is_empty() && !seen_en.insert(criterion.prefix()) {
                problems.push(format!(
                    "criterion {n}: duplicate title_en '{}'",
                    criterion.title_en
                ));
            }
            if !criterion.title_ko.trim().is_empty()
                && !seen_ko.insert(criterion.title_ko.trim().to_string())
            {
                problems.push(format!(
                    "criterion {n}: duplicate title_ko '{}'",
                    criterion.title_ko
                ));
            }
            if criterion.sub_criteria.is_empty() {
                problems.push(format!("criterion {n}: at least one sub-criterion is required"));
            }
            for (j, sub) in criterion.sub_criteria.iter().enumerate() {
                let m = j + 1;
                if sub.description.trim().is_empty() {
                    problems.push(format!("sub-criterion {n}_{m}: description is required"));
                }
                if sub.scale_min >= sub.scale_max {
                    problems.push(format!(
                        "sub-criterion {n}_{m}: scale_min ({}) must be less than scale_max ({})",
                        sub.scale_min, sub.scale_max
                    ));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}
