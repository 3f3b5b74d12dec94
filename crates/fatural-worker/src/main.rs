//! fatural-worker: consumes bill-upload notifications and runs the pipeline.
//!
//! `pull` leases messages from a Pub/Sub subscription; `push` serves the
//! Pub/Sub push endpoint over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use fatural_core::defaults;
use fatural_db::{BlobStore, Database, FilesystemBlobStore, GcsBlobStore, PoolConfig};
use fatural_inference::{backends_from_env, InferenceProvider};
use fatural_jobs::{
    push, DeliveryAdapter, PipelineConfig, PipelineOrchestrator, PubSubSource, PullWorker,
    WorkerConfig,
};

#[derive(Parser)]
#[command(name = "fatural-worker")]
#[command(author, version, about = "Bill extraction and duplicate detection worker")]
struct Cli {
    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL", default_value = defaults::DATABASE_URL, hide_env_values = true)]
    database_url: String,

    /// Where uploaded documents are read from
    #[arg(long, env = "BLOB_BACKEND", value_enum, default_value_t = BlobBackend::Gcs)]
    blob_backend: BlobBackend,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Lease messages from the Pub/Sub subscription
    Pull,

    /// Serve the Pub/Sub push endpoint
    Push {
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: String,

        #[arg(long, env = "PORT", default_value_t = defaults::SERVER_PORT)]
        port: u16,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BlobBackend {
    Gcs,
    Filesystem,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // LOG_FORMAT: "json" or "text" (default "text")
    // LOG_FILE:   optional path, daily rotation
    // LOG_ANSI:   "true"/"false" override
    // RUST_LOG:   env filter (default "fatural_worker=debug,fatural_jobs=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "fatural_worker=debug,fatural_jobs=debug".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("fatural-worker.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let pipeline = PipelineConfig::from_env();
    info!(
        duplicate_threshold = pipeline.duplicate_threshold,
        embed_dimension = pipeline.embed_dimension,
        "Pipeline configured"
    );

    let limits = WorkerConfig::from_env();
    let db = Database::connect_with_config(
        &cli.database_url,
        PoolConfig::from_env(limits.max_in_flight),
    )
    .await?;
    db.migrate().await?;
    db.verify_fingerprint_dimension(pipeline.embed_dimension).await?;
    info!("Database ready");

    let blobs: Arc<dyn BlobStore> = match cli.blob_backend {
        BlobBackend::Gcs => Arc::new(GcsBlobStore::from_env(pipeline.blob_timeout)?),
        BlobBackend::Filesystem => Arc::new(FilesystemBlobStore::from_env()),
    };

    let provider = InferenceProvider::from_env()?;
    let backends = backends_from_env(provider)?;
    info!(
        provider = %provider,
        extract_model = backends.extraction.model_name(),
        embed_model = backends.embedding.model_name(),
        blob_backend = blobs.backend_name(),
        "Collaborators wired"
    );

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        &pipeline,
        Arc::new(db.bills.clone()),
        blobs,
        backends.extraction,
        backends.embedding,
    ));
    let adapter = Arc::new(DeliveryAdapter::new(orchestrator));

    match cli.mode {
        Mode::Pull => {
            let source = PubSubSource::from_env()?;
            info!(subscription = source.subscription(), "Starting pull worker");
            let handle = PullWorker::new(Arc::new(source), adapter, limits).start();
            shutdown_signal().await;
            handle.stop().await?;
        }
        Mode::Push { host, port } => {
            let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
            info!(
                max_in_flight = limits.max_in_flight,
                max_in_flight_bytes = limits.max_in_flight_bytes,
                "Starting push endpoint on {}",
                addr
            );
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, push::router(adapter, &limits))
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    db.close().await;
    info!("Worker stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received, draining");
}
