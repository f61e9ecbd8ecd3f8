// Executor module for job execution
// Provides the capability trait and one implementation per job kind

pub mod data_processing;
pub mod email;
pub mod health_check;
pub mod report;

use crate::config::Settings;
use crate::errors::ExecutionError;
use crate::models::{Job, JobType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use data_processing::DataProcessingExecutor;
pub use email::{EmailMessage, EmailNotificationExecutor, LogMailer, Mailer};
pub use health_check::HealthCheckExecutor;
pub use report::ReportGenerationExecutor;

/// JobExecutor performs the actual work of one job kind
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// The kind tag this executor is registered under
    fn job_type(&self) -> JobType;

    /// Run the job once
    async fn execute(&self, job: &Job) -> Result<(), ExecutionError>;
}

/// Fixed mapping from job kind to executor
///
/// Built once at startup and never mutated afterwards.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<JobType, Arc<dyn JobExecutor>>,
}

impl ExecutorRegistry {
    pub fn builder() -> ExecutorRegistryBuilder {
        ExecutorRegistryBuilder::default()
    }

    /// Registry with the built-in executor for every known job kind
    pub fn with_defaults(settings: &Settings) -> Result<Self, ExecutionError> {
        let health_check = HealthCheckExecutor::new(Duration::from_secs(
            settings.health_check.timeout_seconds,
        ))?;

        Ok(Self::builder()
            .register(Arc::new(EmailNotificationExecutor::new(Arc::new(LogMailer))))
            .register(Arc::new(DataProcessingExecutor::new()))
            .register(Arc::new(ReportGenerationExecutor::new(
                settings.reports.directory.clone(),
            )))
            .register(Arc::new(health_check))
            .build())
    }

    pub fn get(&self, job_type: &JobType) -> Option<Arc<dyn JobExecutor>> {
        self.executors.get(job_type).cloned()
    }

    pub fn contains(&self, job_type: &JobType) -> bool {
        self.executors.contains_key(job_type)
    }

    /// Registered kinds, sorted by tag
    pub fn job_types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.executors.keys().cloned().collect();
        types.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        types
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

#[derive(Default)]
pub struct ExecutorRegistryBuilder {
    executors: HashMap<JobType, Arc<dyn JobExecutor>>,
}

impl ExecutorRegistryBuilder {
    /// Register an executor under its own kind tag, replacing any previous one
    pub fn register(mut self, executor: Arc<dyn JobExecutor>) -> Self {
        self.executors.insert(executor.job_type(), executor);
        self
    }

    pub fn build(self) -> ExecutorRegistry {
        ExecutorRegistry {
            executors: self.executors,
        }
    }
}

/// Read a required, non-empty string from the job configuration
pub(crate) fn required_str<'a>(job: &'a Job, key: &str) -> Result<&'a str, ExecutionError> {
    match job.config_str(key).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ExecutionError::InvalidJobConfig(format!(
            "missing or empty '{}'",
            key
        ))),
    }
}
