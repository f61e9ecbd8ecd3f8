// Data processing executor

use super::JobExecutor;
use crate::errors::ExecutionError;
use crate::models::{Job, JobType};
use async_trait::async_trait;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// Upper bound on the simulated processing time of a single run
pub const MAX_PROCESSING_SECONDS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Transform,
    Aggregate,
    Validate,
    Cleanup,
}

impl FromStr for Operation {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transform" => Ok(Operation::Transform),
            "aggregate" => Ok(Operation::Aggregate),
            "validate" => Ok(Operation::Validate),
            "cleanup" => Ok(Operation::Cleanup),
            other => Err(ExecutionError::InvalidJobConfig(format!(
                "unsupported operation '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Transform => "transform",
            Operation::Aggregate => "aggregate",
            Operation::Validate => "validate",
            Operation::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Simulated batch processing
///
/// Config keys: `operation` (default `transform`), `processing_time_seconds`
/// (default 5) and `data_size`, which is only reported.
#[derive(Debug, Clone, Default)]
pub struct DataProcessingExecutor;

impl DataProcessingExecutor {
    pub fn new() -> Self {
        Self
    }

    fn plan(job: &Job) -> Result<(Operation, Duration), ExecutionError> {
        let operation = job
            .config_str("operation")
            .unwrap_or("transform")
            .parse::<Operation>()?;

        let seconds = match job.config.get("processing_time_seconds") {
            None => 5,
            Some(value) => value.as_u64().ok_or_else(|| {
                ExecutionError::InvalidJobConfig(
                    "'processing_time_seconds' must be a non-negative integer".to_string(),
                )
            })?,
        };
        if seconds > MAX_PROCESSING_SECONDS {
            return Err(ExecutionError::InvalidJobConfig(format!(
                "'processing_time_seconds' must not exceed {}",
                MAX_PROCESSING_SECONDS
            )));
        }

        Ok((operation, Duration::from_secs(seconds)))
    }
}

#[async_trait]
impl JobExecutor for DataProcessingExecutor {
    fn job_type(&self) -> JobType {
        JobType::DataProcessing
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, job_name = %job.name))]
    async fn execute(&self, job: &Job) -> Result<(), ExecutionError> {
        let (operation, duration) = Self::plan(job)?;
        let data_size = job.config_str("data_size").unwrap_or("unknown");

        info!(
            operation = %operation,
            data_size = data_size,
            processing_seconds = duration.as_secs(),
            "Processing data"
        );
        tokio::time::sleep(duration).await;
        info!(operation = %operation, "Data processing finished");

        Ok(())
    }
}
