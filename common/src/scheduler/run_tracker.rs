// In-flight execution tracking

use super::gate::AdmissionPermit;
use crate::models::JobExecution;
use crate::telemetry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Executions that were admitted and have not finished yet
#[derive(Debug, Default)]
pub struct RunTracker {
    runs: RwLock<HashMap<Uuid, JobExecution>>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an execution
    ///
    /// The entry lives until the returned guard is dropped, which also
    /// releases the admission permit.
    pub fn track(self: &Arc<Self>, execution: &JobExecution, permit: AdmissionPermit) -> RunGuard {
        let count = {
            let mut runs = self.runs.write();
            runs.insert(execution.id, execution.clone());
            runs.len()
        };
        telemetry::update_running_jobs(count);

        RunGuard {
            tracker: Arc::clone(self),
            execution_id: execution.id,
            _permit: permit,
        }
    }

    pub fn count(&self) -> usize {
        self.runs.read().len()
    }

    /// Copies of every in-flight execution, oldest first
    pub fn snapshot(&self) -> Vec<JobExecution> {
        let mut runs: Vec<JobExecution> = self.runs.read().values().cloned().collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        runs
    }

    pub fn get(&self, execution_id: &Uuid) -> Option<JobExecution> {
        self.runs.read().get(execution_id).cloned()
    }

    fn update(&self, execution: &JobExecution) {
        if let Some(run) = self.runs.write().get_mut(&execution.id) {
            *run = execution.clone();
        }
    }

    fn finish(&self, execution_id: &Uuid) {
        let count = {
            let mut runs = self.runs.write();
            runs.remove(execution_id);
            runs.len()
        };
        telemetry::update_running_jobs(count);
    }
}

/// Scope of one tracked execution
///
/// Dropping the guard removes the tracker entry first and then returns the
/// permit, on every exit path including unwinding.
#[derive(Debug)]
pub struct RunGuard {
    tracker: Arc<RunTracker>,
    execution_id: Uuid,
    _permit: AdmissionPermit,
}

impl RunGuard {
    /// Refresh the tracked copy of the execution
    pub fn update(&self, execution: &JobExecution) {
        self.tracker.update(execution);
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.tracker.finish(&self.execution_id);
    }
}
