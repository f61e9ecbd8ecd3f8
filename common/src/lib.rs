// Common library for the job scheduler: models, storage, executors and the scheduler core

pub mod config;
pub mod db;
pub mod errors;
pub mod executor;
pub mod models;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod telemetry;
