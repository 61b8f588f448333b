use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use tokio::sync::Semaphore;

use super::report::{BatchReport, ExtractionReport, FailedFile};
use super::{failure_note, BatchError};
use crate::config::ScoringConfig;
use crate::models::{ReportFile, ReportFileList, ReportSchema, Rubric, ScoreRow};
use crate::pipeline::extraction::{ExtractionError, TextExtractor};
use crate::pipeline::import::{collect_uploads, UploadedFile};
use crate::pipeline::scoring::DocumentScorer;

/// One collected file after the extraction phase.
struct Extracted {
    name: String,
    result: Result<ReportFile, ExtractionError>,
}

/// Runs upload sets through extraction and scoring.
#[derive(Clone)]
pub struct BatchRunner {
    extractor: TextExtractor,
    scorer: DocumentScorer,
    config: Arc<ScoringConfig>,
}

impl BatchRunner {
    pub fn new(extractor: TextExtractor, scorer: DocumentScorer, config: Arc<ScoringConfig>) -> Self {
        Self {
            extractor,
            scorer,
            config,
        }
    }

    /// Score every uploaded document against `rubric`.
    ///
    /// The rubric is a snapshot: edits saved while the batch runs are not seen.
    pub async fn run(
        &self,
        uploads: Vec<UploadedFile>,
        rubric: Arc<Rubric>,
    ) -> Result<BatchReport, BatchError> {
        rubric.validate().map_err(BatchError::InvalidRubric)?;
        let files = collect_uploads(uploads, &self.config)?;
        let single = files.len() == 1;
        let start = Instant::now();

        tracing::info!(
            rubric = %rubric.category_id,
            files = files.len(),
            "Starting scoring batch"
        );

        let mut warnings = Vec::new();
        let mut extracted = self.extract_all(files, &mut warnings).await;

        if single && matches!(extracted.first(), Some(Extracted { result: Err(_), .. })) {
            let Extracted { name, result } = extracted.remove(0);
            if let Err(source) = result {
                return Err(BatchError::Extraction { file: name, source });
            }
        }

        let scores = join_all(extracted.iter().map(|item| {
            let rubric = &rubric;
            async move {
                match &item.result {
                    Ok(file) => Some(self.scorer.score(rubric, &file.content).await),
                    Err(_) => None,
                }
            }
        }))
        .await;

        let mut rows = Vec::with_capacity(extracted.len());
        for (i, (item, score)) in extracted.into_iter().zip(scores).enumerate() {
            let student_id = format!("{:04}", i + 1);
            let row = match (item.result, score) {
                (Ok(file), Some(Ok(score))) => ScoreRow {
                    student_id,
                    scores: Some(score.sheet),
                    source_filename: file.name,
                    source_content: file.content,
                    model_name: score.model_name,
                    note: String::new(),
                    usage: Some(score.usage),
                },
                (Ok(file), Some(Err(e))) => {
                    tracing::warn!(file = %file.name, kind = e.kind(), error = %e, "Scoring failed");
                    if single {
                        return Err(BatchError::Scoring {
                            file: file.name,
                            source: e,
                        });
                    }
                    placeholder_row(student_id, file.name, file.content, failure_note(e.kind(), &e))
                }
                (Err(e), _) => placeholder_row(
                    student_id,
                    item.name,
                    String::new(),
                    failure_note(e.kind(), &e),
                ),
                (Ok(file), None) => placeholder_row(
                    student_id,
                    file.name,
                    file.content,
                    "ScoringError: document was not scored".into(),
                ),
            };
            rows.push(row);
        }

        let report = BatchReport {
            rubric_id: rubric.category_id.clone(),
            schema: ReportSchema::for_rubric(&rubric),
            rows,
            warnings,
        };

        tracing::info!(
            rubric = %report.rubric_id,
            rows = report.rows.len(),
            failed = report.failed_rows(),
            total_tokens = report.total_usage().total_tokens,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Scoring batch complete"
        );
        Ok(report)
    }

    /// Extract every uploaded document without scoring.
    pub async fn extract_batch(
        &self,
        uploads: Vec<UploadedFile>,
    ) -> Result<ExtractionReport, BatchError> {
        let files = collect_uploads(uploads, &self.config)?;
        let single = files.len() == 1;

        let mut warnings = Vec::new();
        let extracted = self.extract_all(files, &mut warnings).await;

        let mut report = ExtractionReport {
            files: ReportFileList::new(),
            failed: Vec::new(),
            warnings,
        };
        for item in extracted {
            match item.result {
                Ok(file) => report.files.push(file).map_err(|e| {
                    BatchError::Import(e.into())
                })?,
                Err(source) if single => {
                    return Err(BatchError::Extraction {
                        file: item.name,
                        source,
                    })
                }
                Err(e) => report.failed.push(FailedFile {
                    name: item.name,
                    note: failure_note(e.kind(), &e),
                }),
            }
        }
        Ok(report)
    }

    /// One blocking task per file, at most `extraction_parallelism` at once.
    /// Results come back in input order.
    async fn extract_all(
        &self,
        files: Vec<UploadedFile>,
        warnings: &mut Vec<String>,
    ) -> Vec<Extracted> {
        let semaphore = Arc::new(Semaphore::new(self.config.extraction_parallelism()));
        let clean = self.config.clean_text;

        let mut tasks = Vec::with_capacity(files.len());
        for file in files {
            let name = file.name.clone();
            let permit = semaphore.clone().acquire_owned().await;
            let extractor = self.extractor.clone();
            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit.map_err(|e| ExtractionError::Worker(e.to_string()))?;
                extractor.extract_report(&file.name, &file.bytes, clean)
            });
            tasks.push((name, task));
        }

        let max_chars = self.config.max_content_chars;
        let mut extracted = Vec::with_capacity(tasks.len());
        for (name, task) in tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(file = %name, error = %e, "Extraction task panicked");
                    Err(ExtractionError::Worker(e.to_string()))
                }
            };
            let result = result.map(|mut file| {
                if file.truncate_to(max_chars) {
                    tracing::warn!(file = %name, max_chars, "Document truncated");
                    warnings.push(format!(
                        "'{name}' is longer than {max_chars} characters; only the first {max_chars} were scored."
                    ));
                }
                file
            });
            if let Err(e) = &result {
                tracing::warn!(file = %name, kind = e.kind(), error = %e, "Extraction failed");
            }
            extracted.push(Extracted { name, result });
        }
        extracted
    }
}

fn placeholder_row(student_id: String, name: String, content: String, note: String) -> ScoreRow {
    ScoreRow {
        student_id,
        scores: None,
        source_filename: name,
        source_content: content,
        model_name: String::new(),
        note,
        usage: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::models::rubric::fixtures::communication_rubric;
    use crate::pipeline::extraction::orchestrator::mock::MockPartitioner;
    use crate::pipeline::import::archive::test_zip::build_zip;
    use crate::pipeline::import::ImportError;
    use crate::pipeline::scoring::client::mock::MockLlmClient;
    use crate::pipeline::scoring::{HeuristicTokenCounter, PromptBuilder};

    const REPLY: &str = r#"{"Content":{"score":[4,5,3],"description":"좋음"},"structure":{"score":[2,3],"description":""},"GRAMMAR":{"score":[4],"description":""}}"#;

    fn config() -> ScoringConfig {
        let mut config = ScoringConfig::default();
        config.llm.retry = RetryConfig::immediate(2);
        config.extraction_workers = Some(2);
        config
    }

    fn runner_with(client: Arc<MockLlmClient>, config: ScoringConfig) -> BatchRunner {
        let config = Arc::new(config);
        let extractor = TextExtractor::new(Arc::new(MockPartitioner::narrative("")));
        let scorer = DocumentScorer::new(
            client,
            PromptBuilder::default(),
            Arc::new(HeuristicTokenCounter),
            config.clone(),
        );
        BatchRunner::new(extractor, scorer, config)
    }

    fn upload(name: &str, body: &str) -> UploadedFile {
        UploadedFile::new(name, body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn failed_extraction_becomes_placeholder_row() {
        let client = Arc::new(MockLlmClient::new(REPLY));
        let runner = runner_with(client.clone(), config());
        let uploads = vec![
            upload("a.pdf", "first report"),
            upload("b.pdf", "second report"),
            upload("c.pdf", "FAIL broken"),
            upload("d.docx", "fourth report"),
            upload("e.pdf", "fifth report"),
        ];

        let report = runner
            .run(uploads, Arc::new(communication_rubric()))
            .await
            .unwrap();

        assert_eq!(report.rows.len(), 5);
        assert_eq!(client.calls(), 4);
        let ids: Vec<&str> = report.rows.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, vec!["0001", "0002", "0003", "0004", "0005"]);

        let failed = &report.rows[2];
        assert!(failed.scores.is_none());
        assert_eq!(failed.source_filename, "c.pdf");
        assert!(failed.note.starts_with("PartitionError: "), "{}", failed.note);

        for i in [0, 1, 3, 4] {
            let row = &report.rows[i];
            assert!(row.note.is_empty());
            assert!(!row.source_content.is_empty());
            assert_eq!(row.scores.as_ref().map(|s| s.total), Some(21));
            assert_eq!(row.model_name, "gpt-4");
        }

        let records = report.records();
        assert!(records[2]["Total"].is_null());
        assert_eq!(records[3]["Total"], 21);
    }

    #[tokio::test]
    async fn rows_follow_submission_order() {
        let client = Arc::new(MockLlmClient::from_fn(|request, _| {
            let text = &request.messages[1].content;
            let grammar = if text.contains("alpha") {
                0
            } else if text.contains("beta") {
                1
            } else {
                2
            };
            Ok(REPLY.replace("\"score\":[4]", &format!("\"score\":[{grammar}]")))
        }));
        let runner = runner_with(client, config());
        let report = runner
            .run(
                vec![
                    upload("3.pdf", "gamma text"),
                    upload("1.pdf", "alpha text"),
                    upload("2.pdf", "beta text"),
                ],
                Arc::new(communication_rubric()),
            )
            .await
            .unwrap();

        let names: Vec<&str> = report.rows.iter().map(|r| r.source_filename.as_str()).collect();
        assert_eq!(names, vec!["3.pdf", "1.pdf", "2.pdf"]);
        let grammar: Vec<i64> = report
            .rows
            .iter()
            .map(|r| r.scores.as_ref().unwrap().criteria[2].total)
            .collect();
        assert_eq!(grammar, vec![2, 0, 1]);
    }

    #[tokio::test]
    async fn single_file_scoring_failure_is_batch_error() {
        let client = Arc::new(MockLlmClient::new("not json"));
        let runner = runner_with(client, config());
        let err = runner
            .run(vec![upload("only.pdf", "some text")], Arc::new(communication_rubric()))
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::Scoring { ref file, .. } if file == "only.pdf"));
        assert_eq!(err.kind(), "ResponseShapeError");
    }

    #[tokio::test]
    async fn single_file_extraction_failure_is_batch_error() {
        let client = Arc::new(MockLlmClient::new(REPLY));
        let runner = runner_with(client.clone(), config());
        let err = runner
            .run(vec![upload("only.pdf", "FAIL")], Arc::new(communication_rubric()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "PartitionError");
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn multi_file_scoring_failure_keeps_siblings() {
        let client = Arc::new(MockLlmClient::from_fn(|request, _| {
            if request.messages[1].content.contains("bad") {
                Err(crate::pipeline::scoring::LlmError::Request {
                    status: 400,
                    body: "rejected".into(),
                })
            } else {
                Ok(REPLY.to_string())
            }
        }));
        let runner = runner_with(client, config());
        let report = runner
            .run(
                vec![upload("a.pdf", "good one"), upload("b.pdf", "bad one")],
                Arc::new(communication_rubric()),
            )
            .await
            .unwrap();
        assert!(report.rows[0].scores.is_some());
        assert!(report.rows[1].scores.is_none());
        assert!(report.rows[1].note.starts_with("RequestError: "));
        assert_eq!(report.rows[1].source_content, "bad one");
    }

    #[tokio::test]
    async fn oversized_document_truncated_with_warning() {
        let mut config = config();
        config.max_content_chars = 10;
        let client = Arc::new(MockLlmClient::new(REPLY));
        let runner = runner_with(client.clone(), config);
        let report = runner
            .run(
                vec![upload("long.pdf", &"가".repeat(25)), upload("short.pdf", "짧은 글")],
                Arc::new(communication_rubric()),
            )
            .await
            .unwrap();
        assert_eq!(report.rows[0].source_content.chars().count(), 10);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("long.pdf"));
        assert!(client.requests()[0].messages[1].content.chars().count() <= 10);
    }

    #[tokio::test]
    async fn disallowed_zip_member_stops_batch_before_extraction() {
        let client = Arc::new(MockLlmClient::new(REPLY));
        let runner = runner_with(client.clone(), config());
        let zip = build_zip(&[("a.pdf", b"text"), ("b.exe", b"bin")]);
        let err = runner
            .run(vec![UploadedFile::new("all.zip", zip)], Arc::new(communication_rubric()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BatchError::Import(ImportError::UnsupportedFormat { ref member, .. }) if member == "b.exe"
        ));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn invalid_rubric_rejected() {
        let client = Arc::new(MockLlmClient::new(REPLY));
        let runner = runner_with(client, config());
        let mut rubric = communication_rubric();
        rubric.criteria.clear();
        let err = runner
            .run(vec![upload("a.pdf", "x")], Arc::new(rubric))
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidRubric(_)));
    }

    #[tokio::test]
    async fn extract_batch_collects_files_and_failures() {
        let client = Arc::new(MockLlmClient::new(REPLY));
        let runner = runner_with(client.clone(), config());
        let report = runner
            .extract_batch(vec![
                upload("a.pdf", "alpha"),
                upload("b.pdf", "FAIL"),
                upload("c.docx", "gamma"),
            ])
            .await
            .unwrap();
        let names: Vec<&str> = report.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "c.docx"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "b.pdf");
        assert!(report.failed[0].note.starts_with("PartitionError"));
        assert_eq!(client.calls(), 0);
    }
}
