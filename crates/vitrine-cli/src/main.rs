//! Vitrine CLI: upload local files through the verified upload pipeline.
//!
//! Storage is configured from the environment (see `Config::from_env`);
//! AUTH_TOKEN, or the service key, is the bearer credential for writes.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use vitrine_cli::{failure_row, init_tracing, print_json, report_error, success_row};
use vitrine_core::{
    BatchStatus, ClassifiedError, CompressionPolicy, Config, CredentialProvider, Destination,
    StaticCredentialProvider, UploadRequest, UploadResult,
};
use vitrine_storage::create_storage;
use vitrine_upload::{BatchCoordinator, BatchProgress, PipelineConfig, ProgressCallback};

#[derive(Parser)]
#[command(name = "vitrine", about = "Verified asset uploads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files and verify that each one is readable
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Destination bucket (default: UPLOAD_BUCKET)
        #[arg(long)]
        bucket: Option<String>,
        /// Path prefix inside the bucket (default: UPLOAD_PREFIX)
        #[arg(long)]
        prefix: Option<String>,
        /// Files uploaded at the same time (default: UPLOAD_MAX_CONCURRENCY)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Upload images as they are
        #[arg(long)]
        no_compress: bool,
        /// Print the batch result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check files against the upload constraints without uploading
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct BatchSummary<'a> {
    status: BatchStatus,
    succeeded: &'a [UploadResult],
    failed: Vec<&'a ClassifiedError>,
}

#[derive(Serialize)]
struct ValidationRow {
    file_name: String,
    valid: bool,
    content_type: Option<String>,
    error: Option<ClassifiedError>,
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

async fn read_requests(
    config: &Config,
    files: &[PathBuf],
    destination: &Destination,
) -> anyhow::Result<Vec<UploadRequest>> {
    let mut requests = Vec::with_capacity(files.len());
    for path in files {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        requests.push(config.upload_request(file_name_of(path), data, destination.clone()));
    }
    Ok(requests)
}

fn progress_printer() -> ProgressCallback {
    Arc::new(|progress: &BatchProgress| {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(
            stderr,
            "\r[{:>3.0}%] {:<40}",
            progress.overall_percent,
            vitrine_cli::truncate_string(&progress.file.file_name, 40)
        );
        if progress.overall_percent >= 100.0 {
            let _ = writeln!(stderr);
        }
    })
}

async fn upload(
    files: Vec<PathBuf>,
    bucket: Option<String>,
    prefix: Option<String>,
    concurrency: Option<usize>,
    no_compress: bool,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let config = Config::from_env().context("Invalid configuration")?;
    let storage = create_storage(&config)
        .await
        .context("Failed to initialize storage backend")?;

    let token = config
        .auth_token
        .as_deref()
        .or(config.storage.service_key.as_deref());
    let credentials: Arc<dyn CredentialProvider> =
        Arc::new(StaticCredentialProvider::from_optional(token));

    let mut pipeline_config = PipelineConfig::from_settings(&config.pipeline);
    if let Some(concurrency) = concurrency {
        pipeline_config.max_concurrency = concurrency.max(1);
    }

    let defaults = config.destination();
    let destination = Destination::new(
        bucket.unwrap_or(defaults.bucket),
        prefix.unwrap_or(defaults.prefix),
    );
    let mut requests = read_requests(&config, &files, &destination).await?;
    if no_compress {
        requests = requests
            .into_iter()
            .map(|r| r.with_compression(CompressionPolicy::disabled()))
            .collect();
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling, waiting for in-flight uploads to stop...");
            trigger.cancel();
        }
    });

    let coordinator = BatchCoordinator::from_parts(storage, credentials, pipeline_config);
    let on_progress = (!json).then(progress_printer);
    let result = coordinator
        .upload_batch_with_cancel(requests, on_progress, cancel)
        .await;

    if json {
        print_json(&BatchSummary {
            status: result.status(),
            succeeded: &result.succeeded,
            failed: result.failed.iter().map(|f| &f.error).collect(),
        })?;
    } else {
        for uploaded in &result.succeeded {
            println!("{}", success_row(uploaded));
            for warning in &uploaded.warnings {
                println!("          warning: {}", warning);
            }
        }
        for failed in &result.failed {
            println!("{}", failure_row(&failed.error));
        }
        println!(
            "{} of {} uploaded",
            result.succeeded.len(),
            result.total()
        );
    }

    Ok(match result.status() {
        BatchStatus::Empty | BatchStatus::AllSucceeded => ExitCode::SUCCESS,
        BatchStatus::Partial => ExitCode::from(2),
        BatchStatus::AllFailed => ExitCode::FAILURE,
    })
}

async fn validate(files: Vec<PathBuf>, json: bool) -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    // Storage settings are irrelevant here, so skip Config::validate.
    let config = Config::from_lookup(|key| std::env::var(key).ok())
        .context("Invalid configuration")?;
    let requests = read_requests(&config, &files, &config.destination()).await?;

    let rows: Vec<ValidationRow> = requests
        .iter()
        .map(|request| match vitrine_processing::validate(request) {
            Ok(content_type) => ValidationRow {
                file_name: request.file_name.clone(),
                valid: true,
                content_type: Some(content_type),
                error: None,
            },
            Err(e) => ValidationRow {
                file_name: request.file_name.clone(),
                valid: false,
                content_type: None,
                error: Some(e.classify(&request.file_name)),
            },
        })
        .collect();

    if json {
        print_json(&rows)?;
    } else {
        for row in &rows {
            match (&row.content_type, &row.error) {
                (Some(content_type), _) => {
                    println!("  ok      {:<32} {}", row.file_name, content_type)
                }
                (_, Some(error)) => println!("{}", failure_row(error)),
                _ => {}
            }
        }
    }

    Ok(if rows.iter().all(|r| r.valid) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Upload {
            files,
            bucket,
            prefix,
            concurrency,
            no_compress,
            json,
        } => upload(files, bucket, prefix, concurrency, no_compress, json).await,
        Commands::Validate { files, json } => validate(files, json).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}
