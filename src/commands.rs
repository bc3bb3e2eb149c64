use chrono::Utc;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Cli, Commands, FetchArgs, RetryArgs, RunArgs, VerifyArgs};
use tilefetch::batch::{BatchError, BatchOptions, BatchResult, BatchRunner, TileOutcome, TileRange};
use tilefetch::config::{Config, ConfigError};
use tilefetch::observability::Metrics;
use tilefetch::pipeline::{PipelineSettings, TilePipeline};
use tilefetch::portal::{HttpPortal, HttpPortalConfig, PortalError, TileId};
use tilefetch::products::{Product, ProductRegistry, RegistryError};
use tilefetch::report::{BatchReport, ReportError};
use tilefetch::useragent::{FixedUserAgent, RandomUserAgent, UserAgentSource};

/// Exit code when the batch ran but at least one tile failed
const EXIT_TILES_FAILED: u8 = 2;

/// Errors that stop the command before or instead of a batch run
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Product(#[from] RegistryError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("cannot set up portal client: {0}")]
    Portal(#[from] PortalError),

    #[error("cannot render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

pub async fn dispatch(cli: Cli) -> Result<ExitCode, CommandError> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path.clone())?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Fetch(args) => fetch(config, args, cli.verbose).await,
        Commands::Retry(args) => retry(config, args, cli.verbose).await,
        Commands::Verify(args) => verify(config, args).await,
        Commands::Products => {
            let registry = ProductRegistry::with_defaults();
            for name in registry.names() {
                let product = registry.get(name)?;
                println!("{:<6} {}", product.name(), product.description());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn apply_overrides(config: &mut Config, run: &RunArgs) -> Result<(), ConfigError> {
    if let Some(root) = &run.root {
        config.staging.root = root.clone();
    }
    if let Some(concurrency) = run.concurrency {
        config.batch.concurrency = concurrency;
    }
    config.validate()
}

async fn fetch(mut config: Config, args: FetchArgs, verbose: bool) -> Result<ExitCode, CommandError> {
    apply_overrides(&mut config, &args.run)?;
    if args.inclusive {
        config.batch.inclusive_range = true;
    }

    let product = ProductRegistry::with_defaults().get(&args.product)?;
    let range = TileRange::new(args.start, args.end, config.batch.inclusive_range)?;
    if range.is_empty() {
        return Err(BatchError::EmptyInput.into());
    }

    run_batch(&config, product, range.tile_ids(), args.unpack, verbose).await
}

async fn retry(mut config: Config, args: RetryArgs, verbose: bool) -> Result<ExitCode, CommandError> {
    apply_overrides(&mut config, &args.run)?;

    let previous = BatchReport::load(&args.report).await?;
    let product = ProductRegistry::with_defaults().get(&previous.product)?;
    let tile_ids = previous.failed_tile_ids();

    if tile_ids.is_empty() {
        println!("{}: no failed tiles to retry", args.report.display());
        return Ok(ExitCode::SUCCESS);
    }

    info!(report = %args.report.display(), tiles = tile_ids.len(), "Retrying failed tiles");
    run_batch(&config, product, tile_ids, args.unpack, verbose).await
}

async fn verify(config: Config, args: VerifyArgs) -> Result<ExitCode, CommandError> {
    let report = BatchReport::load(&args.report).await?;
    let min_size = args.min_size.unwrap_or(config.verify.min_size);

    let checked = report
        .results
        .iter()
        .filter(|result| result.outcome.is_success())
        .count();
    let issues = report.verify(min_size).await;

    for issue in &issues {
        println!("{}: {} {}", issue.tile_id, issue.path.display(), issue.problem);
    }
    println!("{} archives checked, {} with problems", checked, issues.len());

    if issues.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_TILES_FAILED))
    }
}

async fn run_batch(
    config: &Config,
    product: Arc<dyn Product>,
    tile_ids: Vec<TileId>,
    unpack: bool,
    verbose: bool,
) -> Result<ExitCode, CommandError> {
    let verify_tls = config.verify_tls(product.name(), product.verify_tls_default());
    let portal = HttpPortal::new(HttpPortalConfig::from_settings(
        &config.portal,
        &config.fetch,
        verify_tls,
    ))?;

    let user_agents: Arc<dyn UserAgentSource> = match &config.portal.user_agent {
        Some(value) => Arc::new(FixedUserAgent::new(value.clone())),
        None => Arc::new(RandomUserAgent),
    };

    let metrics = Arc::new(Metrics::new());
    let pipeline = TilePipeline::new(
        Arc::new(portal),
        product.clone(),
        user_agents,
        PipelineSettings::from_config(config),
        metrics.clone(),
    );

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(token.clone()));
    let runner = BatchRunner::new(Arc::new(pipeline)).with_cancellation(token.clone());

    let options = BatchOptions::builder()
        .extract(unpack || verbose)
        .inspect(verbose)
        .concurrency(config.batch.concurrency)
        .build();

    let started_at = Utc::now();
    let results = runner.run(tile_ids, &options).await?;
    token.cancel();

    if verbose {
        print_payloads(&results);
    }

    let report = BatchReport::new(product.name(), started_at, results);
    save_report(&report, &config.staging.root).await;

    let summary = report.summary();
    println!("{}", summary);
    info!(metrics = ?metrics.snapshot(), "Batch finished");

    if summary.has_failures() {
        Ok(ExitCode::from(EXIT_TILES_FAILED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_payloads(results: &[BatchResult]) {
    for result in results {
        if let TileOutcome::Success {
            payload: Some(payload),
            ..
        } = &result.outcome
        {
            println!("--- tile {} ---", result.tile_id);
            println!("{}", payload);
        }
    }
}

async fn save_report(report: &BatchReport, root: &Path) {
    match report.save(root).await {
        Ok(path) => println!("report: {}", path.display()),
        Err(e) => warn!(error = %e, "Batch report not written"),
    }
}

/// Cancel `token` on Ctrl+C or SIGTERM; returns quietly once the token is cancelled elsewhere
async fn cancel_on_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = token.cancelled() => return,
    }

    warn!("Shutdown signal received, cancelling remaining tiles");
    token.cancel();
}
