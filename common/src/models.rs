use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Free-form per-job configuration, stored as a JSON object
pub type JobConfig = serde_json::Map<String, Value>;

// ============================================================================
// Job Models
// ============================================================================

/// Job represents a recurring task definition
///
/// The scheduler only ever reads jobs; callbacks capture a cloned snapshot so
/// later edits never race with a firing that is already in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Five-field cron expression (minute hour day-of-month month day-of-week)
    pub schedule: String,
    #[sqlx(try_from = "String")]
    pub job_type: JobType,
    #[sqlx(json)]
    pub config: JobConfig,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new active job with the default configuration for its type
    pub fn new(name: impl Into<String>, schedule: impl Into<String>, job_type: JobType) -> Self {
        let now = Utc::now();
        let config = job_type.default_config();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            schedule: schedule.into(),
            job_type,
            config,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the job configuration
    pub fn with_config(mut self, config: JobConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the active flag
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(Value::as_u64)
    }

    pub fn config_bool(&self, key: &str) -> Option<bool> {
        self.config.get(key).and_then(Value::as_bool)
    }
}

/// JobType is the kind tag used to dispatch a job to its executor
///
/// Unrecognised tags are preserved in `Other` so that a stored job with an
/// unsupported kind still loads and fails at execution time instead of
/// poisoning the whole active-job listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    EmailNotification,
    DataProcessing,
    ReportGeneration,
    HealthCheck,
    Other(String),
}

impl JobType {
    /// All job types with a built-in executor
    pub const KNOWN: [JobType; 4] = [
        JobType::EmailNotification,
        JobType::DataProcessing,
        JobType::ReportGeneration,
        JobType::HealthCheck,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            JobType::EmailNotification => "email_notification",
            JobType::DataProcessing => "data_processing",
            JobType::ReportGeneration => "report_generation",
            JobType::HealthCheck => "health_check",
            JobType::Other(tag) => tag,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, JobType::Other(_))
    }

    /// Default configuration applied when a job is created without one
    pub fn default_config(&self) -> JobConfig {
        let value = match self {
            JobType::EmailNotification => json!({
                "recipient": "user@example.com",
                "subject": "Scheduled Notification",
                "body": "This is a scheduled email notification.",
            }),
            JobType::DataProcessing => json!({
                "processing_time_seconds": 5,
                "data_size": "1MB",
                "operation": "transform",
            }),
            JobType::ReportGeneration => json!({
                "report_type": "daily_summary",
                "format": "txt",
                "include_charts": false,
            }),
            JobType::HealthCheck => json!({
                "url": "https://httpbin.org/status/200",
                "timeout_seconds": 30,
                "expected_status": 200,
            }),
            JobType::Other(_) => json!({}),
        };

        match value {
            Value::Object(map) => map,
            _ => JobConfig::new(),
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for JobType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "email_notification" => JobType::EmailNotification,
            "data_processing" => JobType::DataProcessing,
            "report_generation" => JobType::ReportGeneration,
            "health_check" => JobType::HealthCheck,
            _ => JobType::Other(s),
        }
    }
}

impl From<&str> for JobType {
    fn from(s: &str) -> Self {
        JobType::from(s.to_string())
    }
}

impl From<JobType> for String {
    fn from(job_type: JobType) -> Self {
        job_type.as_str().to_string()
    }
}

// ============================================================================
// JobExecution Models
// ============================================================================

/// JobExecution records one firing of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct JobExecution {
    pub id: Uuid,
    pub job_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Wall-clock duration in milliseconds, present only once a started execution is terminal
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl JobExecution {
    /// Create a new pending execution for a job
    pub fn new_pending(job_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            error_message: None,
            duration_ms: None,
            created_at: Utc::now(),
        }
    }

    /// Move a pending execution to running and stamp the start time
    ///
    /// Returns false if the execution is not pending.
    pub fn mark_running(&mut self) -> bool {
        if self.status != ExecutionStatus::Pending {
            return false;
        }
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Mark the execution completed after running for `elapsed`
    pub fn mark_completed(&mut self, elapsed: Duration) -> bool {
        self.finish(ExecutionStatus::Completed, None, elapsed)
    }

    /// Mark the execution failed with an error message
    pub fn mark_failed(&mut self, message: impl Into<String>, elapsed: Duration) -> bool {
        self.finish(ExecutionStatus::Failed, Some(message.into()), elapsed)
    }

    /// Mark the execution cancelled
    pub fn mark_cancelled(&mut self, elapsed: Duration) -> bool {
        self.finish(ExecutionStatus::Cancelled, None, elapsed)
    }

    fn finish(&mut self, status: ExecutionStatus, error: Option<String>, elapsed: Duration) -> bool {
        if self.is_terminal() {
            return false;
        }

        let elapsed_ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        self.status = status;
        self.error_message = error;

        match self.started_at {
            Some(started) => {
                self.completed_at = Some(started + chrono::Duration::milliseconds(elapsed_ms));
                self.duration_ms = Some(elapsed_ms);
            }
            None => {
                self.completed_at = Some(Utc::now());
                self.duration_ms = None;
            }
        }
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    /// Human-readable duration, "N/A" when not yet measured
    pub fn duration_string(&self) -> String {
        match self.duration_ms {
            Some(ms) if ms >= 1000 => format!("{:.3}s", ms as f64 / 1000.0),
            Some(ms) => format!("{}ms", ms),
            None => "N/A".to_string(),
        }
    }
}

/// ExecutionStatus represents the lifecycle state of a job execution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "pending"),
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            _ => Err(format!("Invalid execution status: {}", s)),
        }
    }
}

impl TryFrom<String> for ExecutionStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// Aggregated execution statistics for a single job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_executions: i64,
    pub successful_executions: i64,
    pub failed_executions: i64,
    pub average_duration_ms: Option<i64>,
    /// Percentage of completed executions, 0.0 when there are none
    pub success_rate: f64,
}

impl ExecutionStats {
    pub fn from_counts(total: i64, successful: i64, failed: i64, average: Option<i64>) -> Self {
        let success_rate = if total > 0 {
            successful as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total_executions: total,
            successful_executions: successful,
            failed_executions: failed,
            average_duration_ms: average,
            success_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_round_trips_known_tags() {
        for job_type in JobType::KNOWN {
            let tag: String = job_type.clone().into();
            assert_eq!(JobType::from(tag), job_type);
        }
    }

    #[test]
    fn test_job_type_preserves_unknown_tag() {
        let job_type = JobType::from("sms_notification");
        assert_eq!(job_type, JobType::Other("sms_notification".to_string()));
        assert!(!job_type.is_known());
        assert_eq!(job_type.to_string(), "sms_notification");
    }

    #[test]
    fn test_job_type_serde_uses_tag() {
        let value = serde_json::to_value(JobType::HealthCheck).unwrap();
        assert_eq!(value, json!("health_check"));
        let parsed: JobType = serde_json::from_value(json!("report_generation")).unwrap();
        assert_eq!(parsed, JobType::ReportGeneration);
    }

    #[test]
    fn test_new_job_gets_default_config() {
        let job = Job::new("nightly", "0 2 * * *", JobType::DataProcessing);
        assert!(job.is_active);
        assert_eq!(job.config_u64("processing_time_seconds"), Some(5));
        assert_eq!(job.config_str("operation"), Some("transform"));
    }

    #[test]
    fn test_execution_lifecycle_completed() {
        let mut execution = JobExecution::new_pending(Uuid::new_v4());
        assert_eq!(execution.status, ExecutionStatus::Pending);
        assert!(execution.duration_ms.is_none());

        assert!(execution.mark_running());
        assert!(execution.is_running());
        assert!(execution.started_at.is_some());

        assert!(execution.mark_completed(Duration::from_millis(1500)));
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.duration_ms, Some(1500));
        assert_eq!(
            execution.completed_at.unwrap() - execution.started_at.unwrap(),
            chrono::Duration::milliseconds(1500)
        );
        assert_eq!(execution.duration_string(), "1.500s");
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut execution = JobExecution::new_pending(Uuid::new_v4());
        execution.mark_running();
        assert!(execution.mark_failed("boom", Duration::from_millis(10)));

        assert!(!execution.mark_completed(Duration::from_millis(20)));
        assert!(!execution.mark_cancelled(Duration::from_millis(20)));
        assert!(!execution.mark_running());
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.error_message.as_deref(), Some("boom"));
        assert_eq!(execution.duration_ms, Some(10));
    }

    #[test]
    fn test_duration_requires_start() {
        let mut execution = JobExecution::new_pending(Uuid::new_v4());
        assert!(execution.mark_cancelled(Duration::from_secs(3)));
        assert!(execution.completed_at.is_some());
        assert!(execution.duration_ms.is_none());
        assert_eq!(execution.duration_string(), "N/A");
    }

    #[test]
    fn test_execution_status_parsing() {
        assert_eq!(
            ExecutionStatus::try_from("cancelled".to_string()),
            Ok(ExecutionStatus::Cancelled)
        );
        assert!(ExecutionStatus::from_str("success").is_err());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
    }

    #[test]
    fn test_execution_stats_success_rate() {
        let stats = ExecutionStats::from_counts(4, 3, 1, Some(250));
        assert_eq!(stats.success_rate, 75.0);

        let empty = ExecutionStats::from_counts(0, 0, 0, None);
        assert_eq!(empty.success_rate, 0.0);
    }
}
