use super::analysis::{Analysis, analyze_manifest};
use crate::config::{PipelineEnvConfig, PropagationEnvConfig};
use crate::domain::errors::{PropagationError, StageFailure};
use crate::domain::notification::{Notification, Severity};
use crate::domain::optimization::parameter_set::ParameterSet;
use crate::domain::pipeline::manifest::{OptimizeManifest, read_manifest};
use crate::domain::pipeline::run::{PipelineRun, RunOutcome, RunState, StageKind};
use crate::domain::pipeline::stage::StageOutcome;
use crate::domain::ports::{ExternalStage, Notifier, ParameterPropagator, PipelineExecutor};
use crate::domain::validation::constraints::ConstraintSet;
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::persistence::parameter_store::ParameterStore;
use crate::infrastructure::persistence::run_history::RunHistory;
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Diagnostics longer than this are cut in notifications (the log keeps all of it).
const NOTIFICATION_DIAGNOSTIC_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub optimize_timeout: Duration,
    pub verify_timeout: Duration,
    pub analyze_timeout: Duration,
    pub propagate_timeout: Duration,
    pub annualization_periods: f64,
    /// Source label stamped on accepted parameter sets.
    pub source: String,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            optimize_timeout: Duration::from_secs(1800),
            verify_timeout: Duration::from_secs(600),
            analyze_timeout: Duration::from_secs(60),
            propagate_timeout: Duration::from_secs(30),
            annualization_periods: 252.0,
            source: "weekly_auto_optimization".to_string(),
        }
    }
}

impl RunnerSettings {
    pub fn from_config(pipeline: &PipelineEnvConfig, propagation: &PropagationEnvConfig) -> Self {
        Self {
            optimize_timeout: pipeline.optimize_timeout(),
            verify_timeout: pipeline.verify_timeout(),
            analyze_timeout: pipeline.analyze_timeout(),
            propagate_timeout: pipeline.propagate_timeout(),
            annualization_periods: pipeline.annualization_periods,
            source: propagation.source.clone(),
        }
    }

    pub fn timeout_for(&self, stage: StageKind) -> Duration {
        match stage {
            StageKind::Optimize => self.optimize_timeout,
            StageKind::Verify => self.verify_timeout,
            StageKind::Analyze => self.analyze_timeout,
            StageKind::Propagate => self.propagate_timeout,
        }
    }
}

/// Drives one run through optimize, verify, analyze and propagate.
///
/// Every stage runs under its own budget and the shutdown token. A stage that
/// exceeds its budget or is cancelled is dropped mid-flight; command stages
/// kill their child process on drop.
pub struct PipelineRunner {
    optimize: Arc<dyn ExternalStage>,
    verify: Arc<dyn ExternalStage>,
    propagator: Arc<dyn ParameterPropagator>,
    notifier: Arc<dyn Notifier>,
    store: Arc<ParameterStore>,
    history: Option<Arc<RunHistory>>,
    constraints: ConstraintSet,
    settings: RunnerSettings,
    metrics: Metrics,
}

impl PipelineRunner {
    pub fn new(
        optimize: Arc<dyn ExternalStage>,
        verify: Arc<dyn ExternalStage>,
        propagator: Arc<dyn ParameterPropagator>,
        notifier: Arc<dyn Notifier>,
        store: Arc<ParameterStore>,
        metrics: Metrics,
    ) -> Self {
        Self {
            optimize,
            verify,
            propagator,
            notifier,
            store,
            history: None,
            constraints: ConstraintSet::default(),
            settings: RunnerSettings::default(),
            metrics,
        }
    }

    pub fn with_settings(mut self, settings: RunnerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_constraints(mut self, constraints: ConstraintSet) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_history(mut self, history: Arc<RunHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Executes one full run. Always returns a run in a terminal state.
    pub async fn run_pipeline(&self, cancel: &CancellationToken) -> PipelineRun {
        let mut run = PipelineRun::new();
        info!("Pipeline run {} started", run.id);
        self.notifier
            .notify(Notification::new(
                "🚀 Weekly optimization started",
                format!(
                    "Run {} started at {}",
                    run.short_id(),
                    run.started_at.format("%Y-%m-%d %H:%M UTC")
                ),
                Severity::Info,
            ))
            .await;

        self.drive(&mut run, cancel).await;
        self.finish(&mut run).await;
        run
    }

    async fn drive(&self, run: &mut PipelineRun, cancel: &CancellationToken) {
        // 1. Optimize
        let Ok(outcome) = self.run_external(run, self.optimize.as_ref(), cancel).await else {
            return;
        };
        let candidate = match self.read_candidate(&outcome) {
            Ok(candidate) => candidate,
            Err(e) => {
                self.record_failure(
                    run,
                    &StageFailure::Failed {
                        stage: StageKind::Optimize,
                        diagnostic: format!("{:#}", e),
                    },
                );
                return;
            }
        };
        info!(
            "Optimize produced {} parameters (score={:.4})",
            candidate.parameters.len(),
            candidate.score
        );
        run.parameters = Some(candidate.clone());
        run.succeed_stage(StageKind::Optimize, outcome.diagnostic);

        // 2. Verify
        let Ok(outcome) = self.run_external(run, self.verify.as_ref(), cancel).await else {
            return;
        };
        let Some(report) = outcome.artifact.clone() else {
            self.record_failure(
                run,
                &StageFailure::Failed {
                    stage: StageKind::Verify,
                    diagnostic: "verify stage produced no report".to_string(),
                },
            );
            return;
        };
        run.succeed_stage(StageKind::Verify, outcome.diagnostic);

        // 3. Analyze
        let constraints = self.constraints.clone();
        let periods = self.settings.annualization_periods;
        let work = async move {
            tokio::task::spawn_blocking(move || analyze_manifest(&report, &constraints, periods))
                .await
                .context("Analysis task aborted")?
        };
        let Ok(analysis) = self.guarded(run, StageKind::Analyze, cancel, work).await else {
            return;
        };
        let Some(score) = self.decide(run, analysis) else {
            return;
        };
        let accepted = candidate.with_provenance(&self.settings.source, score, Utc::now());
        if let Err(e) = self.store.save(&accepted) {
            self.record_failure(
                run,
                &StageFailure::Failed {
                    stage: StageKind::Analyze,
                    diagnostic: format!("Failed to persist accepted parameters: {:#}", e),
                },
            );
            return;
        }
        run.parameters = Some(accepted.clone());

        // 4. Propagate
        let work = async {
            push(self.propagator.as_ref(), &accepted)
                .await
                .map_err(anyhow::Error::from)
        };
        match self.guarded(run, StageKind::Propagate, cancel, work).await {
            Ok(()) => {
                run.succeed_stage(StageKind::Propagate, None);
                if let Err(e) = self.store.clear_pending() {
                    warn!("Failed to clear pending parameters: {:#}", e);
                }
                if let Err(e) = run.transition(RunState::Accepted) {
                    error!("{}", e);
                }
            }
            Err(_) => {
                self.metrics.propagation_failures_total.inc();
                if let Err(e) = self.store.save_pending(&accepted) {
                    error!("Failed to park parameters for retry: {:#}", e);
                }
            }
        }
    }

    /// Applies the gate result. Returns the composite score when accepted.
    fn decide(&self, run: &mut PipelineRun, analysis: Analysis) -> Option<f64> {
        run.metrics = analysis.metrics.clone();
        run.verdict = analysis.verdict.clone();

        let (Some(metrics), Some(verdict)) = (analysis.metrics, analysis.verdict) else {
            run.succeed_stage(StageKind::Analyze, Some("no metrics available".to_string()));
            self.reject(run, "No metrics available from verify report");
            return None;
        };

        self.metrics.last_composite_score.set(metrics.composite_score);
        for result in &verdict.results {
            debug!("{}", result);
        }
        info!(
            "Constraint gate: {} (composite={:.4})",
            verdict.summary(),
            metrics.composite_score
        );
        run.succeed_stage(StageKind::Analyze, Some(verdict.summary()));

        if verdict.accepted {
            Some(metrics.composite_score)
        } else {
            self.reject(run, &verdict.summary());
            None
        }
    }

    async fn run_external(
        &self,
        run: &mut PipelineRun,
        stage: &dyn ExternalStage,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome, StageFailure> {
        let kind = stage.kind();
        let outcome = self.guarded(run, kind, cancel, stage.run()).await?;
        if outcome.succeeded {
            return Ok(outcome);
        }
        let failure = StageFailure::Failed {
            stage: kind,
            diagnostic: outcome
                .diagnostic
                .unwrap_or_else(|| "stage reported failure".to_string()),
        };
        self.record_failure(run, &failure);
        Err(failure)
    }

    /// Runs `work` as stage `kind` under its timeout and the shutdown token.
    async fn guarded<T, F>(
        &self,
        run: &mut PipelineRun,
        kind: StageKind,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<T, StageFailure>
    where
        F: Future<Output = Result<T>> + Send,
    {
        if let Err(e) = run.begin_stage(kind) {
            let failure = StageFailure::Failed {
                stage: kind,
                diagnostic: e.to_string(),
            };
            self.record_failure(run, &failure);
            return Err(failure);
        }

        let budget = self.settings.timeout_for(kind);
        let started = Instant::now();
        info!("Stage {} running (budget {}s)", kind, budget.as_secs());

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StageFailure::Cancelled { stage: kind }),
            outcome = tokio::time::timeout(budget, work) => match outcome {
                Err(_) => Err(StageFailure::TimedOut {
                    stage: kind,
                    timeout_secs: budget.as_secs(),
                }),
                Ok(Err(e)) => Err(StageFailure::Failed {
                    stage: kind,
                    diagnostic: format!("{:#}", e),
                }),
                Ok(Ok(value)) => Ok(value),
            },
        };

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.observe_stage(kind.as_str(), elapsed);
        match &result {
            Ok(_) => info!("Stage {} finished in {:.1}s", kind, elapsed),
            Err(failure) => self.record_failure(run, failure),
        }
        result
    }

    fn read_candidate(&self, outcome: &StageOutcome) -> Result<ParameterSet> {
        let path = outcome
            .artifact
            .as_deref()
            .ok_or_else(|| anyhow!("optimize stage produced no artifact"))?;
        let manifest: OptimizeManifest = read_manifest(path)?;
        let candidate = manifest.into_parameter_set(&self.settings.source);

        if candidate.parameters.is_empty() {
            bail!("optimize manifest contains no parameters");
        }
        let non_finite = candidate.non_finite();
        if !non_finite.is_empty() {
            bail!("non-finite parameter values: {}", non_finite.join(", "));
        }
        Ok(candidate)
    }

    fn record_failure(&self, run: &mut PipelineRun, failure: &StageFailure) {
        error!("Run {}: {}", run.short_id(), failure);
        let reason = match failure {
            StageFailure::Failed { .. } => "failed",
            StageFailure::TimedOut { .. } => "timeout",
            StageFailure::Cancelled { .. } => "cancelled",
        };
        self.metrics
            .inc_stage_failure(failure.stage().as_str(), reason);
        if let Err(e) = run.fail_stage(failure) {
            error!("{}", e);
        }
    }

    fn reject(&self, run: &mut PipelineRun, reason: &str) {
        warn!("Run {} rejected: {}", run.short_id(), reason);
        if let Err(e) = run.reject(reason) {
            error!("{}", e);
        }
    }

    async fn finish(&self, run: &mut PipelineRun) {
        if !run.state.is_terminal() && run.abort("run ended in a non-terminal state").is_err() {
            error!("Run {} could not be finalized", run.id);
        }
        let outcome = run.outcome().unwrap_or(RunOutcome::Failed);

        self.metrics.inc_runs(outcome.as_str());
        self.metrics
            .last_run_timestamp
            .set(Utc::now().timestamp() as f64);

        if let Some(history) = &self.history {
            if let Err(e) = history.append(run) {
                warn!("Failed to record run history: {:#}", e);
            }
        }

        info!(
            "Pipeline run {} finished: {} in {:.1}s",
            run.id,
            outcome,
            run.duration_secs()
        );
        self.notifier.notify(outcome_notification(run, outcome)).await;
    }

    /// Creates a run and fails it from `Idle` without executing any stage.
    ///
    /// The run is counted, written to history and notified like any other.
    pub async fn abort_run(&self, reason: &str) -> PipelineRun {
        let mut run = PipelineRun::new();
        warn!("Pipeline run {} aborted before start: {}", run.id, reason);
        if let Err(e) = run.abort(reason) {
            error!("{}", e);
        }
        self.finish(&mut run).await;
        run
    }

    /// Re-propagates a set left in the pending slot by an earlier failed push.
    pub async fn retry_pending(&self) -> Result<bool> {
        let Some(pending) = self.store.load_pending()? else {
            return Ok(false);
        };
        info!(
            "Retrying propagation of pending parameters from {}",
            pending.timestamp
        );

        match tokio::time::timeout(
            self.settings.propagate_timeout,
            push(self.propagator.as_ref(), &pending),
        )
        .await
        {
            Ok(Ok(())) => {
                self.store.clear_pending()?;
                self.notifier
                    .notify(Notification::new(
                        "✅ Pending parameters propagated",
                        format!(
                            "Parameters accepted at {} (score {:.4}) are now live",
                            pending.timestamp.format("%Y-%m-%d %H:%M UTC"),
                            pending.score
                        ),
                        Severity::Success,
                    ))
                    .await;
                Ok(true)
            }
            Ok(Err(e)) => {
                self.metrics.propagation_failures_total.inc();
                Err(anyhow::Error::from(e).context("Pending propagation failed"))
            }
            Err(_) => {
                self.metrics.propagation_failures_total.inc();
                bail!(
                    "Pending propagation timed out after {}s",
                    self.settings.propagate_timeout.as_secs()
                )
            }
        }
    }

    /// Pushes the current accepted set again.
    pub async fn propagate_current(&self) -> Result<ParameterSet> {
        let current = self.store.load()?;
        if current.is_default() {
            warn!("No accepted parameters stored yet, pushing built-in defaults");
        }
        tokio::time::timeout(
            self.settings.propagate_timeout,
            push(self.propagator.as_ref(), &current),
        )
        .await
        .map_err(|_| anyhow!("Propagation timed out"))?
        .context("Propagation failed")?;
        Ok(current)
    }

    pub fn store_path(&self) -> &Path {
        self.store.path()
    }
}

#[async_trait]
impl PipelineExecutor for PipelineRunner {
    async fn execute_run(&self, cancel: &CancellationToken) -> Result<PipelineRun> {
        Ok(self.run_pipeline(cancel).await)
    }

    async fn retry_pending(&self) -> Result<bool> {
        PipelineRunner::retry_pending(self).await
    }

    async fn abort_run(&self, reason: &str) -> Result<PipelineRun> {
        Ok(PipelineRunner::abort_run(self, reason).await)
    }
}

async fn push(
    propagator: &dyn ParameterPropagator,
    parameters: &ParameterSet,
) -> Result<(), PropagationError> {
    let liveness = propagator.check_liveness().await?;
    debug!("Trading service status before update: {}", liveness.status);
    propagator.propagate(parameters).await
}

fn outcome_notification(run: &PipelineRun, outcome: RunOutcome) -> Notification {
    let mut lines = vec![format!(
        "Run {} finished in {:.0}s",
        run.short_id(),
        run.duration_secs()
    )];
    if let Some(metrics) = &run.metrics {
        lines.push(metrics.summary());
    }
    if let Some(verdict) = &run.verdict {
        lines.push(verdict.summary());
    }

    match outcome {
        RunOutcome::Accepted => {
            if let Some(params) = &run.parameters {
                lines.push(format!(
                    "New parameters are live (score {:.4})",
                    params.score
                ));
            }
            Notification::new(
                "✅ Weekly optimization accepted",
                lines.join("\n"),
                Severity::Success,
            )
        }
        RunOutcome::Rejected => {
            if let Some(verdict) = &run.verdict {
                lines.extend(verdict.failed_constraints().map(|r| r.to_string()));
            } else if let Some(reason) = &run.diagnostic {
                lines.push(reason.clone());
            }
            lines.push("Current parameters unchanged".to_string());
            Notification::new(
                "⚠️ Optimization rejected",
                lines.join("\n"),
                Severity::Warning,
            )
        }
        RunOutcome::Failed => {
            let diagnostic = run.diagnostic.as_deref().unwrap_or("unknown error");
            let short: String = diagnostic
                .chars()
                .take(NOTIFICATION_DIAGNOSTIC_CHARS)
                .collect();
            lines.push(format!("Error: {}", short));
            if run.verdict.as_ref().is_some_and(|v| v.accepted) {
                lines.push("Accepted parameters kept in the pending slot for retry".to_string());
            }
            Notification::new("❌ Pipeline run failed", lines.join("\n"), Severity::Error)
        }
    }
}
