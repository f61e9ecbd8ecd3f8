// Trigger table: job id to live timer registration

use super::timer::EntryId;
use crate::models::Job;
use std::collections::HashMap;
use uuid::Uuid;

/// A live trigger and the job definition it was registered with
#[derive(Debug, Clone)]
pub struct TriggerEntry {
    pub entry_id: EntryId,
    /// Definition captured at registration time
    pub job: Job,
}

/// Bookkeeping of one trigger per scheduled job
///
/// Holds no lock of its own; the engine guards it together with the timer
/// registrations so the two never diverge.
#[derive(Debug, Default)]
pub struct TriggerTable {
    entries: HashMap<Uuid, TriggerEntry>,
}

impl TriggerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the one it replaced
    pub fn insert(&mut self, entry: TriggerEntry) -> Option<TriggerEntry> {
        self.entries.insert(entry.job.id, entry)
    }

    pub fn remove(&mut self, job_id: &Uuid) -> Option<TriggerEntry> {
        self.entries.remove(job_id)
    }

    pub fn get(&self, job_id: &Uuid) -> Option<&TriggerEntry> {
        self.entries.get(job_id)
    }

    pub fn contains(&self, job_id: &Uuid) -> bool {
        self.entries.contains_key(job_id)
    }

    /// True if the job is registered with exactly this definition
    pub fn is_current(&self, job: &Job) -> bool {
        self.entries
            .get(&job.id)
            .is_some_and(|entry| entry.job == *job)
    }

    pub fn job_ids(&self) -> Vec<Uuid> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
