//! Command-line interface for the game bundle ingestion pipeline.
//!
//! Hands local files to the ingestor the way an upload endpoint would, and
//! exposes the stored records for listing, serving, downloading and deletion.
//! Records are kept in a JSON document under the storage root.

use bundle_ingest::config::{DEFAULT_EXTRACTION_TIMEOUT, DEFAULT_MAX_UPLOAD_BYTES};
use bundle_ingest::extract::extract_archive_with_timeout;
use bundle_ingest::media::media_type_for_path;
use bundle_ingest::safety::validate_archive;
use bundle_ingest::{
    classify_paths, ContentResponse, ExtractOptions, GameFileRecord, IngestConfig, Ingestor,
    JsonFileRepository, UploadedArchive,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const RECORDS_FILE: &str = "records.json";

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "bundle")]
#[command(version, about = "Ingest and serve browser game bundles", long_about = None)]
struct Cli {
    /// Directory holding stored uploads and the record file
    #[arg(long, env = "BUNDLE_STORAGE_ROOT", default_value = "uploads", global = true)]
    storage_root: PathBuf,

    /// Largest accepted upload in bytes
    #[arg(long, env = "BUNDLE_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES, global = true)]
    max_upload_bytes: u64,

    /// Ceiling on decompressed archive content (defaults to the upload limit)
    #[arg(long, global = true)]
    max_extracted_bytes: Option<u64>,

    /// Wall-clock budget for one extraction, in seconds
    #[arg(long, env = "BUNDLE_EXTRACT_TIMEOUT_SECS", default_value_t = DEFAULT_EXTRACTION_TIMEOUT.as_secs(), global = true)]
    extract_timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a ZIP bundle, HTML page, Java archive, manifest or executable
    Ingest {
        /// File to ingest (left untouched; a copy is handed to the pipeline)
        path: PathBuf,

        /// Declared original filename (defaults to the file's name)
        #[arg(long)]
        name: Option<String>,

        /// Declared media type (defaults to one derived from the name)
        #[arg(long)]
        media_type: Option<String>,
    },

    /// List stored records, newest first
    List,

    /// Show one record
    Show { id: Uuid },

    /// Write the content the player would load for a record
    Content {
        id: Uuid,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Download one file out of a stored bundle
    Download {
        id: Uuid,

        /// Bundle-relative file path
        file: String,

        /// Output file (defaults to the file's own name)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Delete a record and its stored files
    Delete { id: Uuid },

    /// Run the archive safety checks on a file without storing it
    Validate { archive: PathBuf },

    /// Extract a ZIP into a scratch directory and print its classification
    Classify { archive: PathBuf },

    /// Remove extraction directories no record references
    Sweep {
        /// Only remove directories at least this old
        #[arg(long, default_value = "3600")]
        min_age_secs: u64,
    },
}

impl Cli {
    fn config(&self) -> IngestConfig {
        IngestConfig {
            max_upload_bytes: self.max_upload_bytes,
            max_extracted_bytes: self.max_extracted_bytes,
            extraction_timeout: Duration::from_secs(self.extract_timeout_secs),
            ..IngestConfig::new(&self.storage_root)
        }
    }
}

#[derive(Serialize)]
struct RecordSummary<'a> {
    id: Uuid,
    original_name: &'a str,
    media_type: &'a str,
    size: u64,
    uploaded_at: String,
    client_family: Option<&'a str>,
}

impl<'a> From<&'a GameFileRecord> for RecordSummary<'a> {
    fn from(record: &'a GameFileRecord) -> Self {
        Self {
            id: record.id,
            original_name: &record.original_name,
            media_type: &record.media_type,
            size: record.size,
            uploaded_at: record.uploaded_at.to_rfc3339(),
            client_family: record.compatibility.client_family.as_deref(),
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult {
    let config = cli.config();
    let repository = JsonFileRepository::new(config.storage_root.join(RECORDS_FILE));
    let ingestor = Ingestor::new(config, repository);

    match cli.command {
        Commands::Ingest {
            path,
            name,
            media_type,
        } => handle_ingest(&ingestor, &path, name, media_type).await,
        Commands::List => handle_list(&ingestor).await,
        Commands::Show { id } => print_json(&ingestor.get(id).await?),
        Commands::Content { id, out } => {
            let content = ingestor.content(id).await?;
            write_output(&content, out.as_deref())
        }
        Commands::Download { id, file, out } => {
            let content = ingestor.download(id, &file).await?;
            let target = out.unwrap_or_else(|| {
                Path::new(&file)
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("download"))
            });
            write_output(&content, Some(&target))
        }
        Commands::Delete { id } => print_json(&ingestor.delete(id).await?),
        Commands::Validate { archive } => handle_validate(&ingestor, &archive).await,
        Commands::Classify { archive } => handle_classify(&ingestor, &archive).await,
        Commands::Sweep { min_age_secs } => {
            let removed = ingestor
                .sweep_orphans(Duration::from_secs(min_age_secs))
                .await?;
            print_json(&removed)
        }
    }
}

async fn handle_ingest(
    ingestor: &Ingestor<JsonFileRepository>,
    path: &Path,
    name: Option<String>,
    media_type: Option<String>,
) -> CliResult {
    let filename = match name {
        Some(name) => name,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| format!("Not a file: {}", path.display()))?,
    };
    let media_type = media_type.unwrap_or_else(|| media_type_for_path(&filename));

    // The pipeline consumes its upload, so it gets a staged copy.
    let root = &ingestor.config().storage_root;
    tokio::fs::create_dir_all(root).await?;
    let staged = tempfile::Builder::new()
        .prefix(".upload-")
        .tempfile_in(root)?;
    tokio::fs::copy(path, staged.path()).await?;
    let (_, staged_path) = staged.keep()?;
    let size = tokio::fs::metadata(&staged_path).await?.len();
    debug!(source = %path.display(), staged = %staged_path.display(), "Staged upload");

    let cancel_flag = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel_flag.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner());
    spinner.set_message(format!("Ingesting {}", filename));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = ingestor
        .ingest_with_cancel(
            UploadedArchive {
                path: staged_path,
                media_type,
                filename,
                size,
            },
            cancel_flag,
        )
        .await;
    spinner.finish_and_clear();

    print_json(&result?)
}

async fn handle_list(ingestor: &Ingestor<JsonFileRepository>) -> CliResult {
    let records = ingestor.list().await?;
    let summaries: Vec<RecordSummary> = records.iter().map(RecordSummary::from).collect();
    print_json(&summaries)
}

async fn handle_validate(ingestor: &Ingestor<JsonFileRepository>, archive: &Path) -> CliResult {
    let declared = archive.file_name().map(|n| n.to_string_lossy().into_owned());
    let report = validate_archive(archive, declared.as_deref(), ingestor.config()).await;
    print_json(&report)?;
    if !report.is_valid {
        process::exit(2);
    }
    Ok(())
}

async fn handle_classify(ingestor: &Ingestor<JsonFileRepository>, archive: &Path) -> CliResult {
    let scratch = tempfile::TempDir::new()?;
    let config = ingestor.config();
    let options = ExtractOptions {
        size_limit_bytes: Some(config.extracted_limit()),
        timeout: config.extraction_timeout,
    };

    let stats = extract_archive_with_timeout(
        archive.to_path_buf(),
        scratch.path().to_path_buf(),
        options,
        Arc::new(AtomicBool::new(false)),
    )
    .await?;
    let classification = classify_paths(&stats.files);

    print_json(&serde_json::json!({
        "extraction": stats,
        "classification": classification,
    }))
}

fn write_output(content: &ContentResponse, out: Option<&Path>) -> CliResult {
    match out {
        Some(path) => {
            std::fs::write(path, &content.body)?;
            eprintln!(
                "Wrote {} bytes ({}) to {}",
                content.body.len(),
                content.media_type,
                path.display()
            );
        }
        None => std::io::stdout().write_all(&content.body)?,
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
