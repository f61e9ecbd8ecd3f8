// In-process stores for running without a database

use super::{ExecutionStore, JobStore};
use crate::errors::StorageError;
use crate::models::{Job, JobExecution};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Job definitions kept in a map keyed by job id
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with the given jobs
    pub fn with_jobs(jobs: impl IntoIterator<Item = Job>) -> Self {
        let store = Self::new();
        for job in jobs {
            store.put(job);
        }
        store
    }

    /// Insert or replace a job definition
    pub fn put(&self, job: Job) {
        self.jobs.write().insert(job.id, job);
    }

    pub fn remove(&self, id: &Uuid) -> Option<Job> {
        self.jobs.write().remove(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<Job> {
        self.jobs.read().get(id).cloned()
    }

    pub fn all(&self) -> Vec<Job> {
        self.jobs.read().values().cloned().collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn list_active_jobs(&self) -> Result<Vec<Job>, StorageError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .values()
            .filter(|job| job.is_active)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }
}

/// Execution records kept in a map keyed by execution id
#[derive(Debug, Default)]
pub struct MemoryExecutionStore {
    executions: RwLock<HashMap<Uuid, JobExecution>>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Uuid) -> Option<JobExecution> {
        self.executions.read().get(id).cloned()
    }

    pub fn all(&self) -> Vec<JobExecution> {
        let mut executions: Vec<JobExecution> =
            self.executions.read().values().cloned().collect();
        executions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        executions
    }

    /// Executions belonging to one job, oldest first
    pub fn for_job(&self, job_id: &Uuid) -> Vec<JobExecution> {
        self.all()
            .into_iter()
            .filter(|execution| execution.job_id == *job_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.executions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.read().is_empty()
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn create(&self, execution: &JobExecution) -> Result<(), StorageError> {
        self.executions
            .write()
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update(&self, execution: &JobExecution) -> Result<(), StorageError> {
        let mut executions = self.executions.write();
        match executions.get_mut(&execution.id) {
            Some(existing) => {
                *existing = execution.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(format!(
                "Execution not found: {}",
                execution.id
            ))),
        }
    }
}
