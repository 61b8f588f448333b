//! Rubric-driven prompt construction.
//!
//! A prompt template is an ordered list of role-tagged jinja segments. Every
//! segment is rendered with the same variables:
//!
//! | variable        | value                                               |
//! |-----------------|-----------------------------------------------------|
//! | `category`      | Korean category name                                |
//! | `criteria`      | numbered criteria block                             |
//! | `example`       | `"Scoring examples:\n…"`, or empty                  |
//! | `input_text`    | the document text                                   |
//! | `output_format` | JSON object the model must fill in                  |

use std::path::Path;

use minijinja::{context, Environment};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::types::{ChatMessage, Role};
use super::ScoringError;
use crate::models::Rubric;

/// Variable holding the document text; the segment using it can be shortened.
const INPUT_VARIABLE: &str = "input_text";

const DEFAULT_SYSTEM_SEGMENT: &str = r#"당신은 학생 보고서를 평가하는 채점 전문가입니다.
아래는 "{{ category }}" 역량 평가 기준입니다.

{{ criteria }}
{% if example %}
{{ example }}
{% endif %}
사용자가 보내는 보고서 전문을 읽고 각 세부 기준의 점수를 괄호 안 범위의 정수로 매기세요.
description에는 기준별 채점 근거를 한국어로 두세 문장 적으세요.
반드시 아래 JSON 형식으로만 답하세요.
{{ output_format }}"#;

const DEFAULT_USER_SEGMENT: &str = "{{ input_text }}";

/// One template segment as written in the template file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PromptSegment {
    pub role: Role,
    pub content: String,
}

#[derive(Deserialize)]
struct TemplateFile {
    prompt: Vec<PromptSegment>,
}

/// Ordered prompt segments, validated at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    segments: Vec<PromptSegment>,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            segments: vec![
                PromptSegment {
                    role: Role::System,
                    content: DEFAULT_SYSTEM_SEGMENT.to_string(),
                },
                PromptSegment {
                    role: Role::User,
                    content: DEFAULT_USER_SEGMENT.to_string(),
                },
            ],
        }
    }
}

impl PromptTemplate {
    /// Parse a `[[prompt]]` TOML document and compile every segment.
    pub fn from_toml_str(raw: &str) -> Result<Self, ScoringError> {
        let file: TemplateFile =
            toml::from_str(raw).map_err(|e| ScoringError::Template(e.to_string()))?;
        Self::from_segments(file.prompt)
    }

    pub fn from_segments(segments: Vec<PromptSegment>) -> Result<Self, ScoringError> {
        if segments.is_empty() {
            return Err(ScoringError::Template("template has no segments".into()));
        }
        let env = Environment::new();
        for (i, segment) in segments.iter().enumerate() {
            env.template_from_str(&segment.content).map_err(|e| {
                ScoringError::Template(format!("segment {}: {e}", i + 1))
            })?;
        }
        Ok(Self { segments })
    }

    pub fn from_file(path: &Path) -> Result<Self, ScoringError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ScoringError::Template(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// The configured template file, or the built-in template.
    pub fn load(path: Option<&Path>) -> Result<Self, ScoringError> {
        match path {
            Some(p) => {
                tracing::info!(path = %p.display(), "Loading prompt template");
                Self::from_file(p)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn segments(&self) -> &[PromptSegment] {
        &self.segments
    }
}

/// Rendered prompt for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    pub messages: Vec<ChatMessage>,
    /// The JSON object the model is asked to fill in.
    pub output_format: String,
    /// Index into `messages` of the message carrying the document text.
    pub reducible: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    template: PromptTemplate,
}

impl PromptBuilder {
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }

    pub fn build(&self, rubric: &Rubric, input_text: &str) -> Result<BuiltPrompt, ScoringError> {
        let criteria = criteria_block(rubric);
        let output_format = output_format(rubric);
        let example = if rubric.example.trim().is_empty() {
            String::new()
        } else {
            format!("Scoring examples:\n{}", rubric.example)
        };

        let ctx = context! {
            category => rubric.category_name_ko.as_str(),
            criteria => criteria,
            example => example,
            input_text => input_text,
            output_format => output_format.as_str(),
        };

        let env = Environment::new();
        let mut messages = Vec::with_capacity(self.template.segments.len());
        let mut reducible = None;
        for segment in &self.template.segments {
            let rendered = env.render_str(&segment.content, &ctx)?;
            if rendered.is_empty() {
                continue;
            }
            if reducible.is_none() && segment.content.contains(INPUT_VARIABLE) {
                reducible = Some(messages.len());
            }
            messages.push(ChatMessage::new(segment.role, rendered.trim()));
        }

        Ok(BuiltPrompt {
            messages,
            output_format,
            reducible,
        })
    }
}

/// `"{i}. {title_ko}({Title_en})"` followed by one indented line per
/// sub-criterion with its score range.
pub fn criteria_block(rubric: &Rubric) -> String {
    let mut lines = Vec::new();
    for (i, criterion) in rubric.criteria.iter().enumerate() {
        let i = i + 1;
        lines.push(format!(
            "{i}. {}({})",
            criterion.title_ko,
            capitalize(&criterion.title_en)
        ));
        for (j, sub) in criterion.sub_criteria.iter().enumerate() {
            lines.push(format!(
                "  {i}_{}. {} ({}~{}점)",
                j + 1,
                sub.description,
                sub.scale_min,
                sub.scale_max
            ));
        }
    }
    lines.join("\n")
}

/// `{title_en: {"score": ["score_i_j", ...], "description": ""}}` in rubric order.
pub fn output_format(rubric: &Rubric) -> String {
    let mut schema = Map::new();
    for (i, criterion) in rubric.criteria.iter().enumerate() {
        let slots: Vec<Value> = (1..=criterion.sub_criteria.len())
            .map(|j| Value::from(format!("score_{}_{j}", i + 1)))
            .collect();
        schema.insert(
            criterion.title_en.clone(),
            json!({ "score": slots, "description": "" }),
        );
    }
    Value::Object(schema).to_string()
}

/// First character upper-cased, the rest lower-cased.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
