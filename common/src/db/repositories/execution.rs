// Execution repository implementation

use super::job::page_bounds;
use crate::db::DbPool;
use crate::errors::{DatabaseError, StorageError};
use crate::models::{ExecutionStats, ExecutionStatus, JobExecution};
use crate::store::ExecutionStore;
use async_trait::async_trait;
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

const EXECUTION_COLUMNS: &str = r#"
    id, job_id, status, started_at, completed_at, error_message, duration_ms, created_at
"#;

/// Repository for job execution-related database operations
#[derive(Debug, Clone)]
pub struct ExecutionRepository {
    pool: DbPool,
}

impl ExecutionRepository {
    /// Create a new ExecutionRepository
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a new job execution record
    #[instrument(skip(self, execution), fields(execution_id = %execution.id, job_id = %execution.job_id))]
    pub async fn insert(&self, execution: &JobExecution) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO job_executions (
                id, job_id, status, started_at, completed_at,
                error_message, duration_ms, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(execution.id)
        .bind(execution.job_id)
        .bind(execution.status.to_string())
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(&execution.error_message)
        .bind(execution.duration_ms)
        .bind(execution.created_at)
        .execute(self.pool.pool())
        .await?;

        tracing::debug!(
            execution_id = %execution.id,
            job_id = %execution.job_id,
            "Execution created"
        );
        Ok(())
    }

    /// Update an existing job execution
    #[instrument(skip(self, execution), fields(execution_id = %execution.id))]
    pub async fn save(&self, execution: &JobExecution) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE job_executions
            SET status = $2,
                started_at = $3,
                completed_at = $4,
                error_message = $5,
                duration_ms = $6
            WHERE id = $1
            "#,
        )
        .bind(execution.id)
        .bind(execution.status.to_string())
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(&execution.error_message)
        .bind(execution.duration_ms)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Execution not found: {}",
                execution.id
            )));
        }

        tracing::debug!(
            execution_id = %execution.id,
            status = %execution.status,
            "Execution updated"
        );
        Ok(())
    }

    /// Find an execution by ID
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<JobExecution>, DatabaseError> {
        let execution = sqlx::query_as::<_, JobExecution>(&format!(
            "SELECT {} FROM job_executions WHERE id = $1",
            EXECUTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(execution)
    }

    /// Executions of one job, newest first, one page at a time
    #[instrument(skip(self))]
    pub async fn find_by_job(
        &self,
        job_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<JobExecution>, i64), DatabaseError> {
        let (limit, offset) = page_bounds(page, limit);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_executions WHERE job_id = $1")
            .bind(job_id)
            .fetch_one(self.pool.pool())
            .await?;

        let executions = sqlx::query_as::<_, JobExecution>(&format!(
            "SELECT {} FROM job_executions WHERE job_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            EXECUTION_COLUMNS
        ))
        .bind(job_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.pool())
        .await?;

        Ok((executions, total))
    }

    /// Executions currently marked running
    #[instrument(skip(self))]
    pub async fn find_running(&self) -> Result<Vec<JobExecution>, DatabaseError> {
        let executions = sqlx::query_as::<_, JobExecution>(&format!(
            "SELECT {} FROM job_executions WHERE status = $1 ORDER BY started_at",
            EXECUTION_COLUMNS
        ))
        .bind(ExecutionStatus::Running.to_string())
        .fetch_all(self.pool.pool())
        .await?;

        Ok(executions)
    }

    /// Most recent executions across all jobs
    #[instrument(skip(self))]
    pub async fn find_recent(&self, limit: u32) -> Result<Vec<JobExecution>, DatabaseError> {
        let (limit, _) = page_bounds(1, limit);

        let executions = sqlx::query_as::<_, JobExecution>(&format!(
            "SELECT {} FROM job_executions ORDER BY created_at DESC LIMIT $1",
            EXECUTION_COLUMNS
        ))
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(executions)
    }

    /// Aggregate statistics for one job
    ///
    /// The average duration only covers completed executions.
    #[instrument(skip(self))]
    pub async fn stats(&self, job_id: Uuid) -> Result<ExecutionStats, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'completed') AS successful,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                AVG(duration_ms) FILTER (
                    WHERE status = 'completed' AND duration_ms IS NOT NULL
                )::BIGINT AS average_duration_ms
            FROM job_executions
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(ExecutionStats::from_counts(
            row.try_get("total")?,
            row.try_get("successful")?,
            row.try_get("failed")?,
            row.try_get("average_duration_ms")?,
        ))
    }

    /// Delete an execution record
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM job_executions WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Execution not found: {}", id)));
        }

        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for ExecutionRepository {
    async fn create(&self, execution: &JobExecution) -> Result<(), StorageError> {
        Ok(self.insert(execution).await?)
    }

    async fn update(&self, execution: &JobExecution) -> Result<(), StorageError> {
        Ok(self.save(execution).await?)
    }
}
