//! Cooperative scheduler loop.
//!
//! One timeline: jobs run inline in the polling loop, so a pipeline run and a
//! health check can never overlap. A trigger whose own job is still running
//! when it fires again is skipped with a warning and rescheduled from the
//! moment that job finished. A fire of the other trigger is only delayed: it
//! runs on the next poll.

use crate::config::SchedulerEnvConfig;
use crate::domain::notification::{Notification, Severity};
use crate::domain::ports::{HealthProbe, Notifier, PipelineExecutor};
use crate::domain::schedule::trigger::Trigger;
use crate::infrastructure::observability::{Metrics, MetricsReporter};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Pipeline,
    HealthCheck,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub pipeline_trigger: Trigger,
    pub health_trigger: Trigger,
    pub poll_interval: Duration,
    pub cooldown: Duration,
}

impl From<&SchedulerEnvConfig> for SchedulerSettings {
    fn from(config: &SchedulerEnvConfig) -> Self {
        Self {
            pipeline_trigger: config.pipeline_trigger(),
            health_trigger: config.health_trigger(),
            poll_interval: config.poll_interval(),
            cooldown: config.cooldown(),
        }
    }
}

pub struct Scheduler {
    settings: SchedulerSettings,
    executor: Arc<dyn PipelineExecutor>,
    health: Arc<dyn HealthProbe>,
    notifier: Arc<dyn Notifier>,
    metrics: Metrics,
    reporter: Option<Arc<MetricsReporter>>,
    next_pipeline: DateTime<Utc>,
    next_health: DateTime<Utc>,
}

impl Scheduler {
    /// Fire times are computed from `now`; fires missed while the process was
    /// down are not replayed.
    pub fn new(
        settings: SchedulerSettings,
        executor: Arc<dyn PipelineExecutor>,
        health: Arc<dyn HealthProbe>,
        notifier: Arc<dyn Notifier>,
        metrics: Metrics,
        now: DateTime<Utc>,
    ) -> Self {
        let next_pipeline = settings.pipeline_trigger.next_after(now);
        let next_health = settings.health_trigger.next_after(now);
        Self {
            settings,
            executor,
            health,
            notifier,
            metrics,
            reporter: None,
            next_pipeline,
            next_health,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<MetricsReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn next_pipeline(&self) -> DateTime<Utc> {
        self.next_pipeline
    }

    pub fn next_health(&self) -> DateTime<Utc> {
        self.next_health
    }

    /// Runs until `cancel` fires. Job errors and panics are logged and
    /// followed by the cooldown; they never end the loop.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "Scheduler started: pipeline {}, health check {}, next run {}",
            self.settings.pipeline_trigger, self.settings.health_trigger, self.next_pipeline
        );
        self.notifier
            .notify(Notification::new(
                "🤖 Optimization scheduler started",
                format!(
                    "Pipeline: {}\nHealth check: {}\nNext run: {}",
                    self.settings.pipeline_trigger,
                    self.settings.health_trigger,
                    self.next_pipeline.format("%Y-%m-%d %H:%M UTC")
                ),
                Severity::Info,
            ))
            .await;

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = AssertUnwindSafe(self.poll_once(Utc::now(), &cancel))
                .catch_unwind()
                .await;
            let failure = match outcome {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some(format!("{:#}", e)),
                Err(panic) => Some(format!("panic: {}", panic_message(panic.as_ref()))),
            };

            if let Some(reason) = failure {
                self.metrics.scheduler_errors_total.inc();
                error!(
                    "Scheduler job failed: {}. Cooling down for {}s",
                    reason,
                    self.settings.cooldown.as_secs()
                );
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.cooldown) => {}
                }
            }
        }

        info!("Scheduler stopped");
        self.notifier
            .notify(Notification::new(
                "🛑 Optimization scheduler stopped",
                "Shutdown requested; no further runs will be scheduled",
                Severity::Warning,
            ))
            .await;
    }

    /// Runs whatever is due at `now`. Returns the job that ran, if any.
    pub async fn poll_once(
        &mut self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Option<JobKind>> {
        let pipeline_due = now >= self.next_pipeline;
        let health_due = now >= self.next_health;
        if !pipeline_due && !health_due {
            return Ok(None);
        }

        // Reschedule first so a failing job does not refire on the next poll.
        if pipeline_due {
            self.next_pipeline = self.settings.pipeline_trigger.next_after(now);
        }
        if health_due {
            self.next_health = self.settings.health_trigger.next_after(now);
        }

        let job = if pipeline_due {
            if health_due {
                info!("Daily health check covered by the pipeline pre-flight check");
            }
            JobKind::Pipeline
        } else {
            JobKind::HealthCheck
        };

        let started = Instant::now();
        let result = match job {
            JobKind::Pipeline => self.pipeline_job(cancel).await,
            JobKind::HealthCheck => self.health_job().await,
        };

        let finished = now
            + chrono::Duration::from_std(started.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.skip_overlapped(job, finished);

        if let Some(reporter) = &self.reporter {
            reporter.report();
        }
        result.map(|_| Some(job))
    }

    async fn pipeline_job(&self, cancel: &CancellationToken) -> Result<()> {
        let report = self.health.check().await;
        if !report.healthy {
            self.metrics.health_check_failures_total.inc();
            let reason = format!("Pre-flight health check failed:\n{}", report.summary());
            let run = self.executor.abort_run(&reason).await?;
            if let Some(reporter) = &self.reporter {
                reporter.record_run(&run);
            }
            return Ok(());
        }

        match self.executor.retry_pending().await {
            Ok(true) => info!("Pending parameters propagated"),
            Ok(false) => {}
            Err(e) => warn!("Pending parameters still not propagated: {:#}", e),
        }

        let run = self.executor.execute_run(cancel).await?;
        if let Some(reporter) = &self.reporter {
            reporter.record_run(&run);
        }
        Ok(())
    }

    async fn health_job(&self) -> Result<()> {
        let report = self.health.check().await;
        if !report.healthy {
            self.metrics.health_check_failures_total.inc();
            self.notifier
                .notify(Notification::new(
                    "⚠️ Daily health check failed",
                    report.summary(),
                    Severity::Warning,
                ))
                .await;
        }
        Ok(())
    }

    /// Skips a fire of `job`'s own trigger that came due while `job` ran.
    fn skip_overlapped(&mut self, job: JobKind, finished: DateTime<Utc>) {
        match job {
            JobKind::Pipeline if self.next_pipeline <= finished => {
                warn!(
                    "Pipeline fire at {} came due while the previous run was still going; skipping",
                    self.next_pipeline
                );
                self.next_pipeline = self.settings.pipeline_trigger.next_after(finished);
            }
            JobKind::HealthCheck if self.next_health <= finished => {
                warn!(
                    "Health check fire at {} came due while the previous check was still going; skipping",
                    self.next_health
                );
                self.next_health = self.settings.health_trigger.next_after(finished);
            }
            _ => {}
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::health::HealthReport;
    use crate::domain::pipeline::run::PipelineRun;
    use async_trait::async_trait;
    use chrono::{NaiveTime, TimeZone, Weekday};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeExecutor {
        runs: AtomicUsize,
        delay: Duration,
        fail: bool,
        panic: bool,
        aborts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PipelineExecutor for FakeExecutor {
        async fn execute_run(&self, _cancel: &CancellationToken) -> Result<PipelineRun> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("executor exploded");
            }
            tokio::time::sleep(self.delay).await;
            if self.fail {
                anyhow::bail!("stage workdir vanished");
            }
            let mut run = PipelineRun::new();
            run.abort("fake").ok();
            Ok(run)
        }

        async fn retry_pending(&self) -> Result<bool> {
            Ok(false)
        }

        async fn abort_run(&self, reason: &str) -> Result<PipelineRun> {
            self.aborts.lock().unwrap().push(reason.to_string());
            let mut run = PipelineRun::new();
            run.abort(reason).ok();
            Ok(run)
        }
    }

    struct FakeHealth {
        healthy: bool,
        delay: Duration,
        checks: AtomicUsize,
    }

    impl FakeHealth {
        fn new(healthy: bool) -> Self {
            Self {
                healthy,
                delay: Duration::ZERO,
                checks: AtomicUsize::new(0),
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(true)
            }
        }
    }

    #[async_trait]
    impl HealthProbe for FakeHealth {
        async fn check(&self) -> HealthReport {
            self.checks.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.healthy {
                HealthReport::from_failures(vec![])
            } else {
                HealthReport::from_failures(vec!["Missing required file: data.csv".to_string()])
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: Notification) {
            self.sent.lock().unwrap().push(notification);
        }
    }

    fn settings() -> SchedulerSettings {
        settings_with_health_at(NaiveTime::from_hms_opt(3, 0, 30).unwrap())
    }

    fn settings_with_health_at(health_time: NaiveTime) -> SchedulerSettings {
        SchedulerSettings {
            pipeline_trigger: Trigger::Weekly {
                weekday: Weekday::Wed,
                time: NaiveTime::from_hms_opt(3, 0, 0).unwrap(),
            },
            health_trigger: Trigger::Daily { time: health_time },
            poll_interval: Duration::from_secs(60),
            cooldown: Duration::from_secs(300),
        }
    }

    // Wednesday
    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 4, h, m, s).unwrap()
    }

    fn scheduler(
        executor: Arc<FakeExecutor>,
        health: Arc<FakeHealth>,
        notifier: Arc<RecordingNotifier>,
        now: DateTime<Utc>,
    ) -> Scheduler {
        Scheduler::new(
            settings(),
            executor,
            health,
            notifier,
            Metrics::new().unwrap(),
            now,
        )
    }

    #[tokio::test]
    async fn test_nothing_due() {
        let executor = Arc::new(FakeExecutor::default());
        let mut s = scheduler(
            executor.clone(),
            Arc::new(FakeHealth::new(true)),
            Arc::new(RecordingNotifier::default()),
            at(2, 0, 0),
        );
        let job = s.poll_once(at(2, 30, 0), &CancellationToken::new()).await.unwrap();
        assert_eq!(job, None);
        assert_eq!(executor.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_weekly_fire_runs_pipeline_once() {
        let executor = Arc::new(FakeExecutor::default());
        let mut s = scheduler(
            executor.clone(),
            Arc::new(FakeHealth::new(true)),
            Arc::new(RecordingNotifier::default()),
            at(2, 0, 0),
        );
        let cancel = CancellationToken::new();
        assert_eq!(
            s.poll_once(at(3, 0, 0), &cancel).await.unwrap(),
            Some(JobKind::Pipeline)
        );
        assert_eq!(s.next_pipeline(), Utc.with_ymd_and_hms(2025, 6, 11, 3, 0, 0).unwrap());
        assert_eq!(s.poll_once(at(3, 0, 10), &cancel).await.unwrap(), None);
        assert_eq!(executor.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unhealthy_preflight_aborts_run() {
        let executor = Arc::new(FakeExecutor::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let mut s = scheduler(
            executor.clone(),
            Arc::new(FakeHealth::new(false)),
            notifier.clone(),
            at(2, 0, 0),
        );
        s.poll_once(at(3, 0, 0), &CancellationToken::new()).await.unwrap();

        assert_eq!(executor.runs.load(Ordering::SeqCst), 0);
        // The aborted run is recorded through the executor.
        let aborts = executor.aborts.lock().unwrap();
        assert_eq!(aborts.len(), 1);
        assert!(aborts[0].contains("data.csv"));
        assert_eq!(s.next_pipeline(), Utc.with_ymd_and_hms(2025, 6, 11, 3, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_job_error_still_reschedules() {
        let executor = Arc::new(FakeExecutor {
            fail: true,
            ..FakeExecutor::default()
        });
        let mut s = scheduler(
            executor.clone(),
            Arc::new(FakeHealth::new(true)),
            Arc::new(RecordingNotifier::default()),
            at(2, 0, 0),
        );
        let cancel = CancellationToken::new();
        assert!(s.poll_once(at(3, 0, 0), &cancel).await.is_err());
        assert_eq!(s.poll_once(at(3, 1, 0), &cancel).await.unwrap(), None);
        assert_eq!(executor.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_fire_during_pipeline_runs_next_poll() {
        let executor = Arc::new(FakeExecutor {
            delay: Duration::from_secs(60),
            ..FakeExecutor::default()
        });
        let health = Arc::new(FakeHealth::new(true));
        let mut s = scheduler(
            executor.clone(),
            health.clone(),
            Arc::new(RecordingNotifier::default()),
            at(2, 59, 0),
        );
        let cancel = CancellationToken::new();

        // Health fire at 03:00:30 comes due while the pipeline runs until 03:01:00.
        s.poll_once(at(3, 0, 0), &cancel).await.unwrap();
        assert_eq!(s.next_health(), at(3, 0, 30));
        assert_eq!(
            s.poll_once(at(3, 1, 0), &cancel).await.unwrap(),
            Some(JobKind::HealthCheck)
        );
        assert_eq!(health.checks.load(Ordering::SeqCst), 2);
        assert_eq!(s.next_health(), Utc.with_ymd_and_hms(2025, 6, 5, 3, 0, 30).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_weekly_fire_during_health_check_is_not_lost() {
        let executor = Arc::new(FakeExecutor::default());
        let mut s = Scheduler::new(
            settings_with_health_at(NaiveTime::from_hms_opt(2, 59, 50).unwrap()),
            executor.clone(),
            Arc::new(FakeHealth::slow(Duration::from_secs(30))),
            Arc::new(RecordingNotifier::default()),
            Metrics::new().unwrap(),
            at(2, 59, 0),
        );
        let cancel = CancellationToken::new();

        // Health check runs 02:59:50 to 03:00:20, across the weekly fire.
        assert_eq!(
            s.poll_once(at(2, 59, 50), &cancel).await.unwrap(),
            Some(JobKind::HealthCheck)
        );
        assert_eq!(s.next_pipeline(), at(3, 0, 0));
        assert_eq!(
            s.poll_once(at(3, 1, 0), &cancel).await.unwrap(),
            Some(JobKind::Pipeline)
        );
        assert_eq!(executor.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_overrunning_its_own_fire_is_skipped() {
        let executor = Arc::new(FakeExecutor {
            delay: Duration::from_secs(7 * 24 * 3600 + 60),
            ..FakeExecutor::default()
        });
        let mut s = scheduler(
            executor.clone(),
            Arc::new(FakeHealth::new(true)),
            Arc::new(RecordingNotifier::default()),
            at(2, 59, 0),
        );

        // Runs from Wed 03:00 until the following Wed 03:01.
        s.poll_once(at(3, 0, 0), &CancellationToken::new()).await.unwrap();
        assert_eq!(s.next_pipeline(), Utc.with_ymd_and_hms(2025, 6, 18, 3, 0, 0).unwrap());
        assert_eq!(executor.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_panic_and_stops_on_cancel() {
        let executor = Arc::new(FakeExecutor {
            panic: true,
            ..FakeExecutor::default()
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let metrics = Metrics::new().unwrap();
        // Constructed a week in the past so the first poll is due.
        let s = Scheduler::new(
            settings(),
            executor.clone(),
            Arc::new(FakeHealth::new(true)),
            notifier.clone(),
            metrics.clone(),
            Utc::now() - chrono::Duration::days(8),
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(s.run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(900)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(executor.runs.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.scheduler_errors_total.get() as u64, 1);
        let sent = notifier.sent.lock().unwrap();
        assert!(sent.first().unwrap().title.contains("started"));
        assert!(sent.last().unwrap().title.contains("stopped"));
    }
}
