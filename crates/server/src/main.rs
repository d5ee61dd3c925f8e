use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use social_recipes_core::adapters::{
    build_exporters, build_image_selector, FfmpegImageExtractor, OpenAiRecipeGenerator,
    WhisperTranscriber, YtDlpFetcher,
};
use social_recipes_core::{
    load_config, run_recovery_sweep, validate_config, Collaborators, ConfirmationGate,
    ExtractionPipeline, HistoryStore, JobStore, PendingUploadStore, PipelineBody,
    ProgressPublisher, RuntimeSettings, Scheduler, SettingsService, SettingsStore,
    SqliteHistoryStore, SqliteJobStore, SqlitePendingUploadStore, SqliteSettingsStore,
};

use social_recipes_server::api::create_router;
use social_recipes_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("RECIPES_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        config_hash = &config_hash[..16],
        database = ?config.database.path,
        targets = ?config.export.targets,
        confirmation = config.confirmation.enabled,
        "Configuration loaded"
    );

    // Stores share one database file, one connection each
    let jobs: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to create job store")?,
    );
    let history: Arc<dyn HistoryStore> = Arc::new(
        SqliteHistoryStore::new(&config.database.path).context("Failed to create history store")?,
    );
    let uploads: Arc<dyn PendingUploadStore> = Arc::new(
        SqlitePendingUploadStore::new(&config.database.path)
            .context("Failed to create pending upload store")?,
    );
    let settings_store: Arc<dyn SettingsStore> = Arc::new(
        SqliteSettingsStore::new(&config.database.path)
            .context("Failed to create settings store")?,
    );
    info!("Stores initialized");

    let publisher = Arc::new(ProgressPublisher::new(jobs, Arc::clone(&history)));

    // Reconcile what a previous process left behind before admitting jobs
    let recovery =
        run_recovery_sweep(&publisher, uploads.as_ref()).context("Recovery sweep failed")?;

    let scheduler = Arc::new(Scheduler::new(config.scheduler.clone(), Arc::clone(&publisher)));
    let gate = Arc::new(
        ConfirmationGate::new(config.confirmation.clone(), uploads)
            .with_job_store(Arc::clone(publisher.jobs())),
    );

    let settings = Arc::new(SettingsService::new(
        settings_store,
        RuntimeSettings {
            confirm_before_upload: config.confirmation.enabled,
            language: config.pipeline.language.clone(),
            output_targets: config.export.targets.clone(),
        },
    ));
    let current = settings.current();
    info!(
        confirm_before_upload = current.confirm_before_upload,
        language = %current.language,
        output_targets = ?current.output_targets,
        "Runtime settings loaded"
    );

    let mut images = FfmpegImageExtractor::new(config.images.clone());
    if let Some(selector) = build_image_selector(&config) {
        info!(selector = selector.name(), "Dish frames chosen by vision model");
        images = images.with_selector(selector);
    }

    let download_dir = config.pipeline.work_dir.join("downloads");
    let collaborators = Collaborators {
        fetcher: Arc::new(YtDlpFetcher::new(config.fetcher.clone(), download_dir)),
        transcriber: Arc::new(WhisperTranscriber::new(config.transcriber.clone())),
        visual_text: None,
        images: Arc::new(images),
        generator: Arc::new(OpenAiRecipeGenerator::new(
            config.llm.clone(),
            config.pipeline.language.clone(),
        )),
        exporters: build_exporters(&config.export).context("Failed to create exporters")?,
    };
    let pipeline: Arc<dyn PipelineBody> = Arc::new(
        ExtractionPipeline::new(
            config.pipeline.clone(),
            collaborators,
            Arc::clone(&publisher),
            Arc::clone(&gate),
        )
        .with_settings(Arc::clone(&settings)),
    );
    info!(
        max_concurrent_jobs = config.scheduler.max_concurrent_jobs,
        "Scheduler started"
    );

    // Jobs submitted but never started by the previous process
    for job_id in &recovery.pending_jobs {
        if let Err(e) = scheduler.start(job_id, Arc::clone(&pipeline)) {
            warn!(job_id = %job_id, error = %e, "Failed to requeue pending job");
        }
    }

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&scheduler),
        history,
        gate,
        pipeline,
        settings,
        recovery,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    scheduler.shutdown();

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
