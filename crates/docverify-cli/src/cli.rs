//! Command-line parsing and command handlers.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use docverify_core::{classify, validate, DocumentType, FieldSet};
use docverify_runtime::store::{StoredPayload, DEFAULT_RECENT_LIMIT};
use docverify_runtime::{
    BinaryMarkerDetector, DocumentId, DocumentRecord, DocumentStatus, DocumentStore, ImageUpload,
    LlmFieldExtractor, Pipeline, PipelineRun, ProviderRegistry, RunOutcome, RuntimeConfig,
    SqliteStore, TesseractExtractor,
};

/// Exit code when any image did not reach COMPLETED.
const EXIT_INCOMPLETE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "docverify")]
#[command(about = "Classify identity-document images and score field plausibility")]
#[command(version)]
pub struct Cli {
    /// Config file path (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides config and DOCVERIFY_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run images through OCR, marker detection, extraction, and scoring
    Process {
        /// Image files (jpg, jpeg, png)
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },

    /// Classify OCR text without running the pipeline
    Classify {
        /// Raw OCR text
        #[arg(long, conflicts_with = "text_file", required_unless_present = "text_file")]
        text: Option<String>,

        /// File holding raw OCR text
        #[arg(long, value_name = "FILE")]
        text_file: Option<PathBuf>,

        /// Treat a QR marker as present
        #[arg(long)]
        qr: bool,
    },

    /// Score extracted fields for a document type
    Validate {
        /// AADHAAR_LIKELY, PAN_LIKELY, or UNKNOWN
        #[arg(long = "type", value_name = "TYPE")]
        document_type: DocumentType,

        /// JSON object with the extracted fields
        #[arg(long, value_name = "JSON-FILE")]
        fields: PathBuf,
    },

    /// Show a stored document and its latest audit payload
    Show {
        /// Document ID
        id: DocumentId,
    },

    /// List recent documents, newest first
    Recent {
        #[arg(short, long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
    },
}

/// Printed in place of a payload when a run halts.
#[derive(Debug, Serialize)]
struct HaltedRun<'a> {
    document_id: Option<DocumentId>,
    status: DocumentStatus,
    error: &'a str,
}

/// Printed when an image never made it into the pipeline.
#[derive(Debug, Serialize)]
struct RejectedImage {
    image: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    document: DocumentRecord,
    payload: Option<StoredPayload>,
}

pub async fn run(cli: Cli) -> Result<ExitCode> {
    match &cli.command {
        Commands::Process { images } => cmd_process(&cli, images).await,
        Commands::Classify { text, text_file, qr } => {
            let text = read_text(text.as_deref(), text_file.as_deref())?;
            print_json(&classify(&text, *qr), cli.pretty)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate {
            document_type,
            fields,
        } => {
            let raw = std::fs::read_to_string(fields)
                .with_context(|| format!("Failed to read {}", fields.display()))?;
            let fields = FieldSet::from_json_str(&raw)
                .with_context(|| format!("Invalid fields in {}", fields.display()))?;
            print_json(&validate(*document_type, &fields), cli.pretty)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show { id } => cmd_show(&cli, *id),
        Commands::Recent { limit } => {
            let store = open_store(&load_config(&cli)?)?;
            print_json(&store.recent_documents(*limit)?, cli.pretty)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_process(cli: &Cli, images: &[PathBuf]) -> Result<ExitCode> {
    let config = load_config(cli)?;
    let store: Arc<dyn DocumentStore> = Arc::new(open_store(&config)?);

    let pipeline = Pipeline::builder()
        .text_extractor(Arc::new(TesseractExtractor::new(config.ocr.clone())))
        .marker_detector(Arc::new(BinaryMarkerDetector::new(config.qr.clone())))
        .field_extractor(Arc::new(field_extractor(&config)))
        .store(store)
        .timeouts(config.stage_timeouts.clone())
        .build()
        .context("Failed to build pipeline")?;

    let mut all_completed = true;
    let mut uploads = Vec::with_capacity(images.len());
    for image in images {
        match stage_upload(&config.storage.uploads_dir, image) {
            Ok(upload) => uploads.push(upload),
            Err(e) => {
                all_completed = false;
                tracing::warn!(image = %image.display(), error = %e, "Image rejected");
                print_json(
                    &RejectedImage {
                        image: image.display().to_string(),
                        error: format!("{:#}", e),
                    },
                    cli.pretty,
                )?;
            }
        }
    }

    let runs = pipeline.process_many(&uploads).await;
    for run in &runs {
        all_completed &= run.is_completed();
        if !run.audit_complete() {
            tracing::warn!(
                document_id = ?run.document_id,
                failed_writes = run.audit.failures().count(),
                "Audit trail incomplete"
            );
        }
        print_run(run, cli.pretty)?;
    }

    Ok(ExitCode::from(exit_status(all_completed)))
}

fn cmd_show(cli: &Cli, id: DocumentId) -> Result<ExitCode> {
    let store = open_store(&load_config(cli)?)?;
    let Some(document) = store.get_document(id)? else {
        bail!("Document {} not found", id);
    };
    let payload = store.latest_payload(id)?;
    print_json(&ShowOutput { document, payload }, cli.pretty)?;
    Ok(ExitCode::SUCCESS)
}

fn load_config(cli: &Cli) -> Result<RuntimeConfig> {
    let mut config =
        RuntimeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = &cli.db {
        config.storage.database_path = db.clone();
    }
    Ok(config)
}

fn open_store(config: &RuntimeConfig) -> Result<SqliteStore> {
    let path = &config.storage.database_path;
    SqliteStore::open(path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Build the extraction collaborator. Missing credentials degrade to an
/// extractor that always returns empty fields.
fn field_extractor(config: &RuntimeConfig) -> LlmFieldExtractor {
    let registry = ProviderRegistry::with_defaults();
    match registry.create(&config.llm.provider, &config.llm.provider_json()) {
        Ok(provider) => LlmFieldExtractor::new(
            provider,
            config.llm.completion_config(config.stage_timeouts.llm),
        ),
        Err(e) => {
            tracing::warn!(
                provider = %config.llm.provider,
                error = %e,
                "Field extraction unavailable, fields will be empty"
            );
            LlmFieldExtractor::unavailable()
        }
    }
}

/// Copy an image into the uploads directory.
fn stage_upload(uploads_dir: &Path, image: &Path) -> Result<ImageUpload> {
    let Some(name) = image.file_name().and_then(|n| n.to_str()) else {
        bail!("{} has no usable file name", image.display());
    };
    let bytes =
        std::fs::read(image).with_context(|| format!("Failed to read {}", image.display()))?;
    Ok(ImageUpload::save(uploads_dir, name, &bytes)?)
}

fn read_text(text: Option<&str>, text_file: Option<&Path>) -> Result<String> {
    match (text, text_file) {
        (Some(text), _) => Ok(text.to_string()),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        (None, None) => bail!("Either --text or --text-file is required"),
    }
}

fn print_run(run: &PipelineRun, pretty: bool) -> Result<()> {
    match &run.outcome {
        RunOutcome::Completed(payload) => print_json(payload, pretty),
        RunOutcome::OcrFailed { message } | RunOutcome::Error { message } => print_json(
            &HaltedRun {
                document_id: run.document_id,
                status: run.final_status,
                error: message,
            },
            pretty,
        ),
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

fn exit_status(all_completed: bool) -> u8 {
    if all_completed {
        0
    } else {
        EXIT_INCOMPLETE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_process_with_globals() {
        let cli = Cli::try_parse_from([
            "docverify", "process", "a.png", "b.jpg", "--db", "/tmp/v.db", "--pretty",
        ])
        .unwrap();

        assert!(cli.pretty);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/v.db")));
        match cli.command {
            Commands::Process { images } => assert_eq!(images.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_process_requires_an_image() {
        assert!(Cli::try_parse_from(["docverify", "process"]).is_err());
    }

    #[test]
    fn test_classify_needs_exactly_one_text_source() {
        assert!(Cli::try_parse_from(["docverify", "classify"]).is_err());
        assert!(Cli::try_parse_from([
            "docverify", "classify", "--text", "x", "--text-file", "y.txt"
        ])
        .is_err());

        let cli = Cli::try_parse_from(["docverify", "classify", "--text", "PAN", "--qr"]).unwrap();
        match cli.command {
            Commands::Classify { text, qr, .. } => {
                assert_eq!(text.as_deref(), Some("PAN"));
                assert!(qr);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_validate_parses_document_type() {
        let cli = Cli::try_parse_from([
            "docverify", "validate", "--type", "pan_likely", "--fields", "f.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Validate { document_type, .. } => {
                assert_eq!(document_type, DocumentType::PanLikely)
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from([
            "docverify", "validate", "--type", "passport", "--fields", "f.json",
        ])
        .is_err());
    }

    #[test]
    fn test_recent_default_limit() {
        let cli = Cli::try_parse_from(["docverify", "recent"]).unwrap();
        match cli.command {
            Commands::Recent { limit } => assert_eq!(limit, DEFAULT_RECENT_LIMIT),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_halted_run_shape() {
        let halted = HaltedRun {
            document_id: Some(7),
            status: DocumentStatus::OcrFailed,
            error: "OCR failed",
        };
        let value = serde_json::to_value(&halted).unwrap();
        assert_eq!(value["document_id"], 7);
        assert_eq!(value["status"], "OCR_FAILED");
        assert_eq!(value["error"], "OCR failed");
    }

    #[test]
    fn test_stage_upload_copies_image() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("card.png");
        std::fs::write(&source, b"\x89PNG").unwrap();

        let upload = stage_upload(&dir.path().join("uploads"), &source).unwrap();
        assert!(upload.filename().ends_with("_card.png"));
        assert_eq!(std::fs::read(upload.path()).unwrap(), b"\x89PNG");
    }

    #[test]
    fn test_stage_upload_rejects_other_formats() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("card.gif");
        std::fs::write(&source, b"GIF89a").unwrap();

        let err = stage_upload(&dir.path().join("uploads"), &source).unwrap_err();
        assert!(format!("{:#}", err).contains("Unsupported"));
    }

    #[test]
    fn test_read_text_prefers_inline_text() {
        assert_eq!(read_text(Some("abc"), None).unwrap(), "abc");
        assert!(read_text(None, Some(Path::new("/nonexistent/ocr.txt"))).is_err());
    }

    #[test]
    fn test_exit_code_reflects_completion() {
        assert_eq!(exit_status(true), 0);
        assert_eq!(exit_status(false), 2);
    }
}
