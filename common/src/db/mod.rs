// Database layer module

pub mod pool;
pub mod repositories;

pub use pool::{DbPool, PoolStatus};
