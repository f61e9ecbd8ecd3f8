// Job and execution storage seams consumed by the scheduler core

pub mod memory;

use crate::errors::StorageError;
use crate::models::{Job, JobExecution};
use async_trait::async_trait;

pub use memory::{MemoryExecutionStore, MemoryJobStore};

/// Source of truth for job definitions
///
/// Read at scheduler start and on every reconciliation pass. Implementations
/// must tolerate being called concurrently with executions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// List every job whose active flag is set
    async fn list_active_jobs(&self) -> Result<Vec<Job>, StorageError>;
}

/// Persistence for execution records
///
/// Both operations are best-effort from the runner's point of view: a failure
/// is logged and the in-memory outcome stands.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create(&self, execution: &JobExecution) -> Result<(), StorageError>;

    async fn update(&self, execution: &JobExecution) -> Result<(), StorageError>;
}
