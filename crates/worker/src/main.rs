mod cli;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use harvest_core::{
    create_remote_backend, load_config, validate_config, CommandSession, Config,
    CoordinatorError, OptionSource, PortalTaskRunner, ProgressStore, RemoteBackend, RemoteSync,
    SanitizedConfig, SessionOptionSource, StaticCatalog, TaskCoordinator, WorkerContext,
};

use cli::{Cli, Command};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,harvest_core=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("igr-harvest {} starting", VERSION);

    // Load configuration
    info!("Loading configuration from {:?}", cli.config);
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = SanitizedConfig::from(&config);
    info!(
        "Configuration loaded: {}",
        serde_json::to_string(&sanitized).unwrap_or_default()
    );
    info!("Config hash: {}", config_hash(&config));

    let store = build_store(&config).await;
    let worker_id = cli
        .worker_id
        .clone()
        .or_else(|| config.progress.worker_id.clone())
        .unwrap_or_else(WorkerContext::generate_worker_id);
    let context = WorkerContext::new(worker_id, store);
    info!("Worker id: {}", context.worker_id());

    match cli.command() {
        Command::Status => status(&config, &context).await,
        Command::Reset { yes } => reset(&context, yes).await,
        Command::Run => process(&config, context).await,
    }
}

/// Short fingerprint of the effective configuration, for correlating logs
/// across machines.
fn config_hash(config: &Config) -> String {
    let config_json = serde_json::to_string(config).unwrap_or_default();
    let hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    hash[..16].to_string()
}

/// Local store, plus the shared remote when one is configured and can be
/// built. A remote that fails to initialize degrades to local-only.
async fn build_store(config: &Config) -> ProgressStore {
    let store = ProgressStore::new(config.progress.path.clone())
        .with_max_write_attempts(config.coordinator.max_write_attempts);

    match create_remote_backend(&config.remote).await {
        Ok(Some(backend)) => {
            info!(
                "Shared progress on {} at key {}",
                backend.name(),
                config.progress.remote_key
            );
            store.with_remote(backend, config.progress.remote_key.clone())
        }
        Ok(None) => {
            info!("No remote configured, progress is local only");
            store
        }
        Err(e) => {
            warn!("Remote progress unavailable, continuing local only: {}", e);
            store
        }
    }
}

async fn status(config: &Config, context: &WorkerContext) -> Result<()> {
    let record = context
        .store()
        .load()
        .await
        .context("Failed to load progress")?;
    let summary = record.summary(Utc::now(), config.coordinator.lease_timeout());
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn reset(context: &WorkerContext, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("refusing to reset progress without --yes");
    }

    match context
        .store()
        .reset()
        .await
        .context("Failed to reset progress")?
    {
        RemoteSync::Failed { reason } => {
            warn!("Local progress cleared but remote was not: {}", reason)
        }
        sync => info!("Progress reset ({:?})", sync),
    }
    Ok(())
}

async fn process(config: &Config, context: WorkerContext) -> Result<()> {
    let Some(driver) = &config.portal.driver else {
        bail!("portal.driver must be configured to process tasks");
    };

    let session = Arc::new(
        CommandSession::spawn(driver)
            .await
            .context("Failed to start the portal driver")?,
    );

    let options: Arc<dyn OptionSource> = match &config.portal.catalog {
        Some(path) => {
            let catalog = StaticCatalog::load(path)
                .await
                .context("Failed to load the option catalog")?;
            info!("Using option catalog {:?} ({} villages)", path, catalog.len());
            Arc::new(catalog)
        }
        None => {
            info!("Reading dropdown options from the portal");
            Arc::new(SessionOptionSource::new(session.clone()))
        }
    };
    let runner = Arc::new(PortalTaskRunner::new(
        session.clone(),
        config.portal.captcha_attempts,
    ));

    let result = match TaskCoordinator::start(
        context,
        config.coordinator.clone(),
        options,
        runner,
    )
    .await
    {
        Ok(mut coordinator) => coordinator.run().await,
        Err(e) => Err(e),
    };
    session.shutdown().await;

    match result {
        Ok(summary) => {
            info!(
                "Run finished: {} processed, {} failed, {} document(s), stop: {:?}",
                summary.processed, summary.failed, summary.documents, summary.stop
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(CoordinatorError::CollaboratorUnavailable(reason)) => {
            bail!("portal became unavailable: {}", reason)
        }
        Err(e) => Err(e).context("Run failed"),
    }
}
