//! autotune - unattended weekly parameter optimization
//!
//! Runs the optimize -> verify -> analyze -> propagate pipeline on a weekly
//! schedule with a daily health check. Metrics are pushed via structured JSON
//! logs to stdout.
//!
//! # Usage
//! ```sh
//! TRADING_BOT_URL=http://localhost:8080 autotune serve
//! autotune analyze results/verify_manifest.json
//! ```

use anyhow::{Context, Result};
use autotune::application::monitoring::HealthMonitor;
use autotune::application::pipeline::analysis::analyze_manifest;
use autotune::application::pipeline::{PipelineRunner, RunnerSettings};
use autotune::application::scheduler::{Scheduler, SchedulerSettings};
use autotune::config::{Config, EnvReader, ObservabilityEnvConfig, PipelineEnvConfig};
use autotune::domain::pipeline::run::{RunOutcome, StageKind};
use autotune::domain::ports::{HealthProbe, ParameterPropagator};
use autotune::infrastructure::monitoring::disk_probe::SystemDiskProbe;
use autotune::infrastructure::observability::logging::init_logging;
use autotune::infrastructure::observability::{Metrics, MetricsReporter};
use autotune::infrastructure::{
    CommandStage, HttpPropagationClient, ParameterStore, RunHistory, WebhookNotifier,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "autotune", version, about = "Automated weekly parameter optimization")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler loop (default)
    Serve,
    /// Execute a single pipeline run now
    RunOnce,
    /// Run the pre-flight health check and exit
    Health,
    /// Retry the pending set, or re-push the current accepted set
    Propagate,
    /// Print metrics and gate verdict for a verify manifest
    Analyze {
        /// Path to a verify manifest
        path: PathBuf,
    },
}

struct Components {
    config: Config,
    metrics: Metrics,
    notifier: Arc<WebhookNotifier>,
    runner: Arc<PipelineRunner>,
    health: Arc<HealthMonitor>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let env = EnvReader::process();
    let observability = ObservabilityEnvConfig::from_env(&env);
    if let Err(e) = init_logging(observability.log_dir.as_deref()) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("autotune {} starting...", env!("CARGO_PKG_VERSION"));

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Analyze { path } => analyze(&env, path).await,
        command => match Config::from_reader(&env) {
            Ok(config) => match build(config) {
                Ok(components) => dispatch(command, components).await,
                Err(e) => Err(e),
            },
            Err(e) => {
                error!("Configuration error: {}", e);
                return ExitCode::from(2);
            }
        },
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn build(config: Config) -> Result<Components> {
    let metrics = Metrics::new().context("Failed to create metrics registry")?;

    let notifier = Arc::new(
        WebhookNotifier::new(
            config.notification.webhook_url.clone(),
            config.notification.timeout(),
        )
        .with_metrics(metrics.clone()),
    );
    if !notifier.is_enabled() {
        info!("No webhook configured, notifications are logged only");
    }

    let propagator: Arc<dyn ParameterPropagator> = Arc::new(HttpPropagationClient::new(
        &config.propagation.base_url,
        &config.propagation.update_path,
        &config.propagation.health_path,
        config.pipeline.propagate_timeout(),
    ));

    let pipeline = &config.pipeline;
    let optimize = Arc::new(CommandStage::new(
        StageKind::Optimize,
        pipeline.optimize_command.clone(),
        pipeline.workdir.clone(),
        pipeline.optimize_manifest.clone(),
    ));
    let verify = Arc::new(CommandStage::new(
        StageKind::Verify,
        pipeline.verify_command.clone(),
        pipeline.workdir.clone(),
        pipeline.verify_manifest.clone(),
    ));

    let constraints = pipeline.load_constraints()?;
    info!(
        "Acceptance gate: {} constraints, {} required",
        constraints.constraints.len(),
        constraints.required_passes()
    );

    let store = Arc::new(ParameterStore::new(
        config.storage.parameter_store_path.clone(),
    ));
    let history = Arc::new(RunHistory::new(config.storage.run_history_path.clone()));

    let runner = Arc::new(
        PipelineRunner::new(
            optimize,
            verify,
            propagator.clone(),
            notifier.clone(),
            store,
            metrics.clone(),
        )
        .with_settings(RunnerSettings::from_config(pipeline, &config.propagation))
        .with_constraints(constraints)
        .with_history(history),
    );

    let mut health = HealthMonitor::from_config(&config.health, Arc::new(SystemDiskProbe));
    if config.health.check_connectivity {
        health = health.with_connectivity(propagator);
    }

    Ok(Components {
        config,
        metrics,
        notifier,
        runner,
        health: Arc::new(health),
    })
}

async fn dispatch(command: Command, components: Components) -> Result<ExitCode> {
    match command {
        Command::Serve => serve(components).await,
        Command::RunOnce => run_once(components).await,
        Command::Health => health(components).await,
        Command::Propagate => propagate(components).await,
        Command::Analyze { path } => analyze(&EnvReader::process(), path).await,
    }
}

async fn serve(components: Components) -> Result<ExitCode> {
    let Components {
        config,
        metrics,
        notifier,
        runner,
        health,
    } = components;

    let mut scheduler = Scheduler::new(
        SchedulerSettings::from(&config.scheduler),
        runner,
        health,
        notifier,
        metrics.clone(),
        chrono::Utc::now(),
    );
    if config.observability.enabled {
        scheduler = scheduler.with_reporter(Arc::new(MetricsReporter::new(metrics)));
        info!("Metrics reporter enabled (JSON to stdout after each job)");
    } else {
        info!("Metrics reporting disabled.");
    }

    let cancel = CancellationToken::new();
    tokio::spawn(await_shutdown(cancel.clone()));

    info!("Scheduler running. Press Ctrl+C to shutdown.");
    scheduler.run(cancel).await;
    Ok(ExitCode::SUCCESS)
}

async fn run_once(components: Components) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    tokio::spawn(await_shutdown(cancel.clone()));

    match components.runner.retry_pending().await {
        Ok(true) => info!("Pending parameters propagated"),
        Ok(false) => {}
        Err(e) => warn!("Pending parameters still not propagated: {:#}", e),
    }

    let report = components.health.check().await;
    let run = if report.healthy {
        components.runner.run_pipeline(&cancel).await
    } else {
        components.metrics.health_check_failures_total.inc();
        let reason = format!("Pre-flight health check failed:\n{}", report.summary());
        components.runner.abort_run(&reason).await
    };
    if components.config.observability.enabled {
        let reporter = MetricsReporter::new(components.metrics);
        reporter.record_run(&run);
        reporter.report();
    }

    Ok(match run.outcome() {
        Some(RunOutcome::Accepted) => ExitCode::SUCCESS,
        Some(RunOutcome::Rejected) => ExitCode::from(3),
        _ => ExitCode::FAILURE,
    })
}

async fn health(components: Components) -> Result<ExitCode> {
    let report = components.health.check().await;
    println!("{}", report.summary());
    Ok(if report.healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn propagate(components: Components) -> Result<ExitCode> {
    if components.runner.retry_pending().await? {
        println!("Pending parameters propagated");
        return Ok(ExitCode::SUCCESS);
    }
    let pushed = components.runner.propagate_current().await?;
    println!(
        "Propagated parameters from {} ({})",
        components.runner.store_path().display(),
        pushed.source
    );
    Ok(ExitCode::SUCCESS)
}

async fn analyze(env: &EnvReader, path: PathBuf) -> Result<ExitCode> {
    let pipeline = match PipelineEnvConfig::from_env(env) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return Ok(ExitCode::from(2));
        }
    };
    let constraints = pipeline.load_constraints()?;
    let periods = pipeline.annualization_periods;

    let analysis = tokio::task::spawn_blocking(move || analyze_manifest(&path, &constraints, periods))
        .await
        .context("Analysis task panicked")??;

    if analysis.malformed_trades > 0 {
        println!("Skipped {} malformed trade records", analysis.malformed_trades);
    }
    match (&analysis.metrics, &analysis.verdict) {
        (Some(metrics), Some(verdict)) => {
            println!("{}", metrics.summary());
            println!();
            println!("{}", verdict.summary());
            Ok(if verdict.accepted {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(3)
            })
        }
        _ => {
            println!("No metrics available: manifest has neither trades nor basic_metrics");
            Ok(ExitCode::from(3))
        }
    }
}

/// Cancels `token` on SIGINT, or SIGTERM on unix.
async fn await_shutdown(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot install SIGTERM handler: {}", e);
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }

    info!("Shutdown signal received. Cancelling...");
    token.cancel();
}
