// Scheduler module: cron triggers, admission and execution of due jobs

pub mod engine;
pub mod gate;
pub mod run_tracker;
pub mod runner;
pub mod timer;
pub mod trigger_table;

pub use engine::{ReconcileReport, Scheduler, SchedulerConfig, SchedulerEngine, SchedulerHealth};
pub use gate::{AdmissionGate, AdmissionPermit};
pub use run_tracker::{RunGuard, RunTracker};
pub use runner::JobRunner;
pub use timer::{Callback, EntryId, TimerEngine};
pub use trigger_table::{TriggerEntry, TriggerTable};
