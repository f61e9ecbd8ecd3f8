// Error handling framework

use thiserror::Error;

/// Schedule-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// Structural scheduling errors returned synchronously from `start` and `add_job`
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(#[from] ScheduleError),

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Failed to load active jobs: {0}")]
    JobStore(#[from] StorageError),
}

/// Per-execution errors
///
/// Every variant ends up recorded on the execution record; none of them escape
/// the runner into the timer engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Maximum concurrent jobs ({limit}) reached")]
    ConcurrencyLimitReached { limit: usize },

    #[error("No executor found for job type: {0}")]
    UnknownJobKind(String),

    #[error("Job execution timed out after {0} seconds")]
    Timeout(u64),

    #[error("Job execution panicked: {0}")]
    CapabilityFault(String),

    #[error("Invalid job configuration: {0}")]
    InvalidJobConfig(String),

    #[error("HTTP request failed: {0}")]
    HttpRequestFailed(String),

    #[error("Unexpected status code: expected {expected}, got {actual}")]
    UnexpectedStatus { expected: u16, actual: u16 },

    #[error("File processing failed: {0}")]
    FileProcessingFailed(String),

    #[error("Notification delivery failed: {0}")]
    NotificationFailed(String),
}

impl ExecutionError {
    /// Short label used for the `reason` metric dimension
    pub fn reason(&self) -> &'static str {
        match self {
            ExecutionError::ConcurrencyLimitReached { .. } => "concurrency_limit",
            ExecutionError::UnknownJobKind(_) => "unknown_job_kind",
            ExecutionError::Timeout(_) => "timeout",
            ExecutionError::CapabilityFault(_) => "panic",
            ExecutionError::InvalidJobConfig(_) => "invalid_config",
            ExecutionError::HttpRequestFailed(_) | ExecutionError::UnexpectedStatus { .. } => {
                "http"
            }
            ExecutionError::FileProcessingFailed(_) => "file",
            ExecutionError::NotificationFailed(_) => "notification",
        }
    }
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Storage errors surfaced through the job and execution store traits
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

// Implement From for common external errors
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                // Check for specific database error codes
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => DatabaseError::DuplicateKey(db_err.message().to_string()),
                        "23503" => DatabaseError::ForeignKeyViolation(db_err.message().to_string()),
                        _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(err.to_string())
    }
}

impl From<DatabaseError> for StorageError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(what) => StorageError::NotFound(what),
            other => StorageError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
