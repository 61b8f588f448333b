use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use thiserror::Error;

use rubric_scorer::config::{self, ConfigError, ScoringConfig};
use rubric_scorer::pipeline::batch::{BatchError, BatchRunner};
use rubric_scorer::models::ReportFile;
use rubric_scorer::pipeline::extraction::{ExtractionError, TextExtractor};
use rubric_scorer::pipeline::import::{get_suffix, ImportError, UploadedFile};
use rubric_scorer::pipeline::scoring::{
    DocumentScorer, HeuristicTokenCounter, LlmError, OpenAiClient, PromptBuilder, PromptTemplate,
    ScoringError,
};
use rubric_scorer::rubric_store::{load_rubric_file, RubricError, RubricRegistry};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short, global = true, env = "RUBRIC_SCORER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score documents against a rubric and print the report as JSON
    Score {
        /// Rubric category id
        #[arg(long, short)]
        rubric: String,

        /// Documents (.hwp, .docx, .pdf) or zip archives of them
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Extract document text without scoring
    Extract {
        /// Skip the text cleaning pipeline
        #[arg(long)]
        raw: bool,

        /// Print a preview (first characters and counts) instead of full text
        #[arg(long)]
        summary: bool,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List available rubrics
    Rubrics {
        /// Print only category ids
        #[arg(long)]
        ids: bool,
    },
    /// Check a rubric file and report every problem found
    ValidateRubric {
        #[arg(required = true)]
        file: PathBuf,
    },
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rubric(#[from] RubricError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn read_uploads(paths: &[PathBuf]) -> Result<Vec<UploadedFile>, CliError> {
    paths
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path).map_err(|source| CliError::Read {
                path: path.clone(),
                source,
            })?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(UploadedFile::new(name, bytes))
        })
        .collect()
}

fn build_runner(config: Arc<ScoringConfig>) -> Result<BatchRunner, CliError> {
    let client = OpenAiClient::new(&config.llm)?;
    let template = PromptTemplate::load(config.prompt_template_path.as_deref())?;
    let scorer = DocumentScorer::new(
        Arc::new(client),
        PromptBuilder::new(template),
        Arc::new(HeuristicTokenCounter),
        config.clone(),
    );
    Ok(BatchRunner::new(TextExtractor::default(), scorer, config))
}

/// One document straight from disk, without the batch machinery.
fn extract_single(path: &Path, config: &ScoringConfig) -> Result<ReportFile, CliError> {
    let extension = get_suffix(&path.to_string_lossy());
    if !config.is_allowed_extension(&extension) {
        return Err(ImportError::UnsupportedFormat {
            member: path.display().to_string(),
            extension,
        }
        .into());
    }
    let mut report = TextExtractor::default().extract_path(path, config.clean_text)?;
    if report.truncate_to(config.max_content_chars) {
        tracing::warn!(
            file = %report.name,
            max_chars = config.max_content_chars,
            "Document truncated to the character cap"
        );
    }
    Ok(report)
}

fn report_json(report: &ReportFile, summary: bool) -> Result<serde_json::Value, CliError> {
    if summary {
        Ok(serde_json::json!({ "name": report.name, "summary": report.summary() }))
    } else {
        Ok(serde_json::to_value(report)?)
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = ScoringConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Score { rubric, files } => {
            let registry = RubricRegistry::load(&config.rubric_dir, &config.rubric_archive_dir)?;
            let rubric = registry.get(&rubric)?;
            let uploads = read_uploads(&files)?;
            let runner = build_runner(Arc::new(config))?;
            let report = runner.run(uploads, rubric).await?;
            for warning in &report.warnings {
                tracing::warn!("{warning}");
            }
            print_json(&report.to_json())
        }
        Commands::Extract {
            raw,
            summary,
            files,
        } => {
            let mut config = config;
            if raw {
                config.clean_text = false;
            }
            if let [path] = files.as_slice() {
                if get_suffix(&path.to_string_lossy()) != ".zip" {
                    let report = extract_single(path, &config)?;
                    return print_json(&report_json(&report, summary)?);
                }
            }
            let uploads = read_uploads(&files)?;
            let runner = build_runner(Arc::new(config))?;
            let report = runner.extract_batch(uploads).await?;
            if summary {
                let files = report
                    .files
                    .iter()
                    .map(|f| report_json(f, true))
                    .collect::<Result<Vec<_>, _>>()?;
                print_json(&serde_json::json!({
                    "files": files,
                    "failed": report.failed,
                    "warnings": report.warnings,
                }))
            } else {
                print_json(&serde_json::to_value(&report)?)
            }
        }
        Commands::Rubrics { ids } => {
            let registry = RubricRegistry::load(&config.rubric_dir, &config.rubric_archive_dir)?;
            if ids {
                return print_json(&serde_json::Value::from(registry.ids()));
            }
            let listing: Vec<_> = registry
                .display_names()
                .into_iter()
                .map(|(id, name)| serde_json::json!({ "id": id, "name": name }))
                .collect();
            print_json(&serde_json::Value::from(listing))
        }
        Commands::ValidateRubric { file } => validate_rubric(&file),
    }
}

fn validate_rubric(path: &Path) -> Result<(), CliError> {
    let rubric = load_rubric_file(path)?;
    rubric.validate().map_err(RubricError::Validation)?;
    print_json(&serde_json::json!({
        "id": rubric.category_id,
        "criteria": rubric.criteria.len(),
        "sub_criteria": rubric.sub_criteria_count(),
        "max_total": rubric.max_total(),
    }))
}

#[tokio::main]
async fn main() -> ExitCode {
    rubric_scorer::init_tracing();
    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
