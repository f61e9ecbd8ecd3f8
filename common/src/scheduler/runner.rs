// Job runner: admission, execution record lifecycle and failure isolation

use super::gate::AdmissionGate;
use super::run_tracker::RunTracker;
use crate::errors::ExecutionError;
use crate::executor::ExecutorRegistry;
use crate::models::{Job, JobExecution};
use crate::store::ExecutionStore;
use crate::telemetry;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

/// Runs one job at a time under the admission gate and a deadline
///
/// Every execution error ends up on the execution record and in the returned
/// result; nothing raised by an executor escapes this type.
pub struct JobRunner {
    registry: Arc<ExecutorRegistry>,
    executions: Arc<dyn ExecutionStore>,
    gate: AdmissionGate,
    tracker: Arc<RunTracker>,
    timeout: Duration,
}

impl JobRunner {
    pub fn new(
        registry: Arc<ExecutorRegistry>,
        executions: Arc<dyn ExecutionStore>,
        max_concurrent_jobs: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            executions,
            gate: AdmissionGate::new(max_concurrent_jobs),
            tracker: Arc::new(RunTracker::new()),
            timeout,
        }
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.gate.capacity()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn running_count(&self) -> usize {
        self.tracker.count()
    }

    pub fn running_executions(&self) -> Vec<JobExecution> {
        self.tracker.snapshot()
    }

    /// Execute a job once
    ///
    /// Returns the completed execution record, or the error that failed it.
    /// A `ConcurrencyLimitReached` rejection creates no record at all.
    #[instrument(skip(self, job), fields(job_id = %job.id, job_name = %job.name, job_type = %job.job_type))]
    pub async fn execute_job(&self, job: &Job) -> Result<JobExecution, ExecutionError> {
        let permit = match self.gate.try_admit() {
            Ok(permit) => permit,
            Err(e) => {
                warn!(
                    max_concurrent_jobs = self.gate.capacity(),
                    "Maximum concurrent jobs reached, skipping job execution"
                );
                telemetry::record_job_skipped(&job.id, &job.name);
                return Err(e);
            }
        };

        let mut execution = JobExecution::new_pending(job.id);
        if let Err(e) = self.executions.create(&execution).await {
            error!(execution_id = %execution.id, error = %e, "Failed to create execution record");
        }
        let guard = self.tracker.track(&execution, permit);

        execution.mark_running();
        let started = Instant::now();
        guard.update(&execution);
        if let Err(e) = self.executions.update(&execution).await {
            error!(execution_id = %execution.id, error = %e, "Failed to update execution status to running");
        }

        info!(execution_id = %execution.id, "Starting job execution");

        let outcome = self.run_capability(job).await;
        let elapsed = started.elapsed();

        match &outcome {
            Ok(()) => {
                execution.mark_completed(elapsed);
                info!(
                    execution_id = %execution.id,
                    execution_duration = %execution.duration_string(),
                    "Job execution completed successfully"
                );
                telemetry::record_job_success(&job.id, &job.name);
            }
            Err(e) => {
                execution.mark_failed(e.to_string(), elapsed);
                error!(
                    execution_id = %execution.id,
                    execution_duration = %execution.duration_string(),
                    error = %e,
                    "Job execution failed"
                );
                telemetry::record_job_failure(&job.id, &job.name, e.reason());
            }
        }
        telemetry::record_job_duration(&job.id, &job.name, elapsed.as_secs_f64());

        guard.update(&execution);
        if let Err(e) = self.executions.update(&execution).await {
            error!(execution_id = %execution.id, error = %e, "Failed to update final execution status");
        }
        drop(guard);

        outcome.map(|()| execution)
    }

    /// Look up the executor and run it on its own task under the deadline
    ///
    /// The executor task is not aborted when the deadline passes; only the
    /// wait for it is abandoned.
    async fn run_capability(&self, job: &Job) -> Result<(), ExecutionError> {
        let executor = self
            .registry
            .get(&job.job_type)
            .ok_or_else(|| ExecutionError::UnknownJobKind(job.job_type.to_string()))?;

        let snapshot = job.clone();
        let handle = tokio::spawn(async move { executor.execute(&snapshot).await });

        match tokio::time::timeout(self.timeout, handle).await {
            Err(_) => Err(ExecutionError::Timeout(self.timeout.as_secs())),
            Ok(Err(join_error)) if join_error.is_panic() => {
                let message = panic_message(join_error.into_panic());
                error!(panic = %message, "Job execution panicked");
                Err(ExecutionError::CapabilityFault(message))
            }
            Ok(Err(join_error)) => Err(ExecutionError::CapabilityFault(format!(
                "execution task was cancelled: {}",
                join_error
            ))),
            Ok(Ok(result)) => result,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
