// Scheduler engine implementation

use super::runner::JobRunner;
use super::timer::{Callback, TimerEngine};
use super::trigger_table::{TriggerEntry, TriggerTable};
use crate::errors::{ExecutionError, ScheduleError, SchedulerError};
use crate::executor::ExecutorRegistry;
use crate::models::{Job, JobExecution};
use crate::schedule::{parse_timezone, Recurrence, ScheduleParser};
use crate::store::{ExecutionStore, JobStore};
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Capacity of the admission gate
    pub max_concurrent_jobs: usize,
    /// Deadline for one job execution
    pub job_execution_timeout: Duration,
    /// Period of the reconciliation loop
    pub reconcile_interval: Duration,
    /// Timezone cron expressions are evaluated in
    pub timezone: Tz,
    /// Accept six-field expressions with a leading seconds field
    pub cron_with_seconds: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 10,
            job_execution_timeout: Duration::from_secs(600),
            reconcile_interval: Duration::from_secs(300),
            timezone: chrono_tz::UTC,
            cron_with_seconds: false,
        }
    }
}

impl SchedulerConfig {
    pub fn from_settings(settings: &crate::config::SchedulerConfig) -> Result<Self, ScheduleError> {
        Ok(Self {
            max_concurrent_jobs: settings.max_concurrent_jobs,
            job_execution_timeout: Duration::from_secs(settings.job_execution_timeout_seconds),
            reconcile_interval: Duration::from_secs(settings.reconcile_interval_seconds),
            timezone: parse_timezone(&settings.timezone)?,
            cron_with_seconds: settings.cron_with_seconds,
        })
    }

    fn parser(&self) -> ScheduleParser {
        if self.cron_with_seconds {
            ScheduleParser::with_seconds()
        } else {
            ScheduleParser::standard()
        }
    }
}

/// Point-in-time view of the scheduler for health reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerHealth {
    pub is_running: bool,
    pub scheduled_jobs: usize,
    pub running_jobs: usize,
    pub max_concurrent_jobs: usize,
}

/// What a reconciliation pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub invalid: usize,
}

/// Scheduler trait for job scheduling operations
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Load active jobs, start firing and start periodic reconciliation
    async fn start(&self) -> Result<(), SchedulerError>;

    /// Stop firing and wait for callbacks that already started; idempotent
    async fn stop(&self);

    /// Register or replace the trigger for a job
    fn add_job(&self, job: &Job) -> Result<(), SchedulerError>;

    /// Remove the trigger for a job; returns false if there was none
    fn remove_job(&self, job_id: &Uuid) -> bool;

    /// Re-synchronise triggers with the active jobs in the store
    async fn reconcile(&self) -> Result<ReconcileReport, SchedulerError>;
}

#[derive(Default)]
struct Lifecycle {
    reconcile_loop: Option<(CancellationToken, JoinHandle<()>)>,
}

struct EngineInner {
    config: SchedulerConfig,
    parser: ScheduleParser,
    jobs: Arc<dyn JobStore>,
    runner: Arc<JobRunner>,
    timer: TimerEngine,
    triggers: Mutex<TriggerTable>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    running: AtomicBool,
}

/// Main scheduler engine implementation
///
/// Cheap to clone; clones share the same trigger table and timer.
#[derive(Clone)]
pub struct SchedulerEngine {
    inner: Arc<EngineInner>,
}

impl SchedulerEngine {
    /// Create a new scheduler engine
    pub fn new(
        config: SchedulerConfig,
        jobs: Arc<dyn JobStore>,
        executions: Arc<dyn ExecutionStore>,
        registry: ExecutorRegistry,
    ) -> Self {
        let runner = Arc::new(JobRunner::new(
            Arc::new(registry),
            executions,
            config.max_concurrent_jobs,
            config.job_execution_timeout,
        ));

        Self {
            inner: Arc::new(EngineInner {
                parser: config.parser(),
                timer: TimerEngine::new(config.timezone),
                config,
                jobs,
                runner,
                triggers: Mutex::new(TriggerTable::new()),
                lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
                running: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// The runner used for scheduled firings, for running a job on demand
    pub fn runner(&self) -> Arc<JobRunner> {
        self.inner.runner.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn scheduled_job_count(&self) -> usize {
        self.inner.triggers.lock().len()
    }

    pub fn running_job_count(&self) -> usize {
        self.inner.runner.running_count()
    }

    pub fn running_executions(&self) -> Vec<JobExecution> {
        self.inner.runner.running_executions()
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.inner.runner.max_concurrent_jobs()
    }

    /// Ids of every job with a live trigger
    pub fn trigger_ids(&self) -> Vec<Uuid> {
        let mut ids = self.inner.triggers.lock().job_ids();
        ids.sort();
        ids
    }

    /// Next time the job's trigger is due
    pub fn next_run(&self, job_id: &Uuid) -> Option<DateTime<Utc>> {
        let triggers = self.inner.triggers.lock();
        triggers
            .get(job_id)
            .and_then(|entry| self.inner.timer.next_fire_time(entry.entry_id))
    }

    pub fn health(&self) -> SchedulerHealth {
        SchedulerHealth {
            is_running: self.is_running(),
            scheduled_jobs: self.scheduled_job_count(),
            running_jobs: self.running_job_count(),
            max_concurrent_jobs: self.max_concurrent_jobs(),
        }
    }
}

impl EngineInner {
    /// Replace any existing trigger for the job with one on `schedule`
    ///
    /// Caller holds the trigger table lock.
    fn register_locked(&self, triggers: &mut TriggerTable, job: &Job, schedule: Recurrence) {
        if let Some(previous) = triggers.remove(&job.id) {
            self.timer.remove(previous.entry_id);
        }

        let entry_id = self
            .timer
            .register(schedule, trigger_callback(self.runner.clone(), job.clone()));
        triggers.insert(TriggerEntry {
            entry_id,
            job: job.clone(),
        });
        telemetry::update_scheduled_jobs(triggers.len());
    }

    fn unregister_locked(&self, triggers: &mut TriggerTable, job_id: &Uuid) -> bool {
        match triggers.remove(job_id) {
            Some(entry) => {
                self.timer.remove(entry.entry_id);
                telemetry::update_scheduled_jobs(triggers.len());
                true
            }
            None => false,
        }
    }

    fn add_job(&self, job: &Job) -> Result<(), SchedulerError> {
        if !job.is_active {
            debug!(job_id = %job.id, job_name = %job.name, "Skipping inactive job");
            return Ok(());
        }

        let schedule = self.parser.parse(&job.schedule)?;
        let mut triggers = self.triggers.lock();
        self.register_locked(&mut triggers, job, schedule);

        info!(
            job_id = %job.id,
            job_name = %job.name,
            schedule = %job.schedule,
            "Job added to scheduler"
        );
        Ok(())
    }

    fn remove_job(&self, job_id: &Uuid) -> bool {
        let removed = self.unregister_locked(&mut self.triggers.lock(), job_id);
        if removed {
            info!(job_id = %job_id, "Job removed from scheduler");
        }
        removed
    }

    async fn reconcile(&self) -> Result<ReconcileReport, SchedulerError> {
        let jobs = self.jobs.list_active_jobs().await?;
        let report = self.apply_active_jobs(jobs);

        info!(
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            unchanged = report.unchanged,
            invalid = report.invalid,
            scheduled_jobs = self.triggers.lock().len(),
            "Jobs reconciled"
        );
        Ok(report)
    }

    /// Diff the trigger table against the current active jobs under one lock
    fn apply_active_jobs(&self, jobs: Vec<Job>) -> ReconcileReport {
        let active: HashMap<Uuid, Job> = jobs
            .into_iter()
            .filter(|job| job.is_active)
            .map(|job| (job.id, job))
            .collect();

        let mut report = ReconcileReport::default();
        let mut triggers = self.triggers.lock();

        for job_id in triggers.job_ids() {
            if !active.contains_key(&job_id) {
                self.unregister_locked(&mut triggers, &job_id);
                debug!(job_id = %job_id, "Removed trigger for inactive or deleted job");
                report.removed += 1;
            }
        }

        for job in active.values() {
            if triggers.is_current(job) {
                report.unchanged += 1;
                continue;
            }

            let existed = triggers.contains(&job.id);
            match self.parser.parse(&job.schedule) {
                Ok(schedule) => {
                    self.register_locked(&mut triggers, job, schedule);
                    if existed {
                        report.updated += 1;
                    } else {
                        report.added += 1;
                    }
                }
                Err(e) => {
                    self.unregister_locked(&mut triggers, &job.id);
                    warn!(
                        job_id = %job.id,
                        job_name = %job.name,
                        error = %e,
                        "Failed to schedule job, leaving it unscheduled"
                    );
                    report.invalid += 1;
                }
            }
        }

        report
    }
}

/// Callback fired by the timer for one job
///
/// Captures a snapshot of the definition so later edits never race with a
/// firing that is already in flight.
fn trigger_callback(runner: Arc<JobRunner>, job: Job) -> Callback {
    let job = Arc::new(job);
    Arc::new(move || {
        let runner = runner.clone();
        let job = job.clone();
        async move {
            info!(job_id = %job.id, job_name = %job.name, "Executing scheduled job");
            match runner.execute_job(&job).await {
                Ok(_) | Err(ExecutionError::ConcurrencyLimitReached { .. }) => {}
                Err(e) => {
                    error!(job_id = %job.id, job_name = %job.name, error = %e, "Scheduled job failed");
                }
            }
        }.boxed()
    })
}

async fn reconcile_loop(inner: Arc<EngineInner>, cancel: CancellationToken) {
    let mut ticker = interval(inner.config.reconcile_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; start() has just loaded the jobs
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = inner.reconcile().await {
                    error!(error = %e, "Failed to reconcile jobs");
                }
            }
        }
    }

    debug!("Reconciliation loop stopped");
}

#[async_trait]
impl Scheduler for SchedulerEngine {
    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), SchedulerError> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if self.inner.running.load(Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!(
            max_concurrent_jobs = self.inner.config.max_concurrent_jobs,
            reconcile_interval_seconds = self.inner.config.reconcile_interval.as_secs(),
            timezone = %self.inner.config.timezone,
            "Starting scheduler engine"
        );

        self.inner.reconcile().await?;
        self.inner.timer.start();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(reconcile_loop(self.inner.clone(), cancel.clone()));
        lifecycle.reconcile_loop = Some((cancel, handle));
        self.inner.running.store(true, Ordering::SeqCst);

        info!(
            scheduled_jobs = self.scheduled_job_count(),
            "Scheduler engine started"
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if !self.inner.running.load(Ordering::SeqCst) {
            return;
        }

        info!("Stopping scheduler engine");

        if let Some((cancel, handle)) = lifecycle.reconcile_loop.take() {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Reconciliation loop ended abnormally");
            }
        }
        self.inner.timer.stop().await;
        self.inner.running.store(false, Ordering::SeqCst);

        info!("Scheduler engine stopped gracefully");
    }

    fn add_job(&self, job: &Job) -> Result<(), SchedulerError> {
        self.inner.add_job(job)
    }

    fn remove_job(&self, job_id: &Uuid) -> bool {
        self.inner.remove_job(job_id)
    }

    async fn reconcile(&self) -> Result<ReconcileReport, SchedulerError> {
        self.inner.reconcile().await
    }
}
