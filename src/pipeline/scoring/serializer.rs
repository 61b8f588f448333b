use serde_json::{Map, Value};

use super::ScoringError;
use crate::models::{Criterion, CriterionScore, Rubric, ScoreSheet};

/// Parse the model's JSON reply into a score sheet laid out in rubric order.
///
/// Every rubric criterion must be present (exact key first, then a
/// case-insensitive match on `title_en`) with one integer per sub-criterion.
/// Keys the rubric does not know are logged and ignored.
pub fn parse_score_response(text: &str, rubric: &Rubric) -> Result<ScoreSheet, ScoringError> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        tracing::error!(error = %e, response = %text, "LLM response is not valid JSON");
        ScoringError::ResponseShape(format!("invalid JSON: {e}"))
    })?;

    let Value::Object(object) = value else {
        tracing::error!(response = %text, "LLM response is not a JSON object");
        return Err(ScoringError::ResponseShape("top-level value is not an object".into()));
    };

    let mut used_keys = Vec::with_capacity(rubric.criteria.len());
    let mut criteria = Vec::with_capacity(rubric.criteria.len());
    for criterion in &rubric.criteria {
        let (key, entry) = find_entry(&object, &criterion.title_en).ok_or_else(|| {
            tracing::error!(criterion = %criterion.title_en, response = %text, "Criterion missing from LLM response");
            ScoringError::ResponseShape(format!("missing criterion '{}'", criterion.title_en))
        })?;
        used_keys.push(key);
        let score = criterion_score(criterion, entry).inspect_err(|e| {
            tracing::error!(criterion = %criterion.title_en, error = %e, response = %text, "Malformed criterion in LLM response");
        })?;
        criteria.push(score);
    }

    for key in object.keys().filter(|k| !used_keys.contains(k)) {
        tracing::warn!(key = %key, "Ignoring unknown criterion in LLM response");
    }

    let total = criteria.iter().map(|c| c.total).sum();
    Ok(ScoreSheet { criteria, total })
}

fn find_entry<'a>(object: &'a Map<String, Value>, title: &str) -> Option<(&'a String, &'a Value)> {
    object
        .get_key_value(title)
        .or_else(|| object.iter().find(|(k, _)| k.eq_ignore_ascii_case(title)))
}

fn criterion_score(criterion: &Criterion, entry: &Value) -> Result<CriterionScore, ScoringError> {
    let title = &criterion.title_en;
    let scores = entry
        .get("score")
        .and_then(Value::as_array)
        .ok_or_else(|| ScoringError::ResponseShape(format!("'{title}' has no score array")))?;

    if scores.len() != criterion.sub_criteria.len() {
        return Err(ScoringError::ResponseShape(format!(
            "'{title}' has {} scores, rubric defines {}",
            scores.len(),
            criterion.sub_criteria.len()
        )));
    }

    let mut values = Vec::with_capacity(scores.len());
    for (i, (raw, sub)) in scores.iter().zip(&criterion.sub_criteria).enumerate() {
        let score = as_integer(raw).ok_or_else(|| {
            ScoringError::ResponseShape(format!("'{title}' score {} is not an integer: {raw}", i + 1))
        })?;
        if score < sub.scale_min || score > sub.scale_max {
            tracing::warn!(
                criterion = %title,
                index = i + 1,
                score,
                min = sub.scale_min,
                max = sub.scale_max,
                "Score outside rubric scale"
            );
        }
        values.push(score);
    }

    let description = match entry.get("description") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    Ok(CriterionScore {
        prefix: criterion.prefix(),
        total: values.iter().sum(),
        scores: values,
        description,
    })
}

/// Integers, or floats without a fractional part.
fn as_integer(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}
