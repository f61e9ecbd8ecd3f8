// Job repository implementation

use crate::db::DbPool;
use crate::errors::{DatabaseError, StorageError};
use crate::models::{Job, JobType};
use crate::store::JobStore;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use tracing::instrument;
use uuid::Uuid;

const JOB_COLUMNS: &str = r#"
    id, name, description, schedule, job_type, config, is_active, created_at, updated_at
"#;

/// Repository for job-related database operations
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: DbPool,
}

impl JobRepository {
    /// Create a new JobRepository
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a new job
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn create(&self, job: &Job) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, name, description, schedule, job_type, config,
                is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(&job.description)
        .bind(&job.schedule)
        .bind(job.job_type.as_str())
        .bind(Json(&job.config))
        .bind(job.is_active)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(job_id = %job.id, job_name = %job.name, "Job created");
        Ok(())
    }

    /// Find a job by ID
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, DatabaseError> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(job)
    }

    /// List jobs newest first, one page at a time
    ///
    /// Pages are 1-based. Returns the page and the total number of jobs.
    #[instrument(skip(self))]
    pub async fn list(&self, page: u32, limit: u32) -> Result<(Vec<Job>, i64), DatabaseError> {
        let (limit, offset) = page_bounds(page, limit);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(self.pool.pool())
            .await?;

        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            JOB_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.pool())
        .await?;

        Ok((jobs, total))
    }

    /// Update an existing job, refreshing its `updated_at` stamp
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn update(&self, job: &Job) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET name = $2,
                description = $3,
                schedule = $4,
                job_type = $5,
                config = $6,
                is_active = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(&job.description)
        .bind(&job.schedule)
        .bind(job.job_type.as_str())
        .bind(Json(&job.config))
        .bind(job.is_active)
        .bind(Utc::now())
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Job not found: {}", job.id)));
        }

        tracing::info!(job_id = %job.id, "Job updated");
        Ok(())
    }

    /// Delete a job; its executions go with it
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Job not found: {}", id)));
        }

        tracing::info!(job_id = %id, "Job deleted");
        Ok(())
    }

    /// Find all jobs of one kind
    #[instrument(skip(self))]
    pub async fn find_by_type(&self, job_type: &JobType) -> Result<Vec<Job>, DatabaseError> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs WHERE job_type = $1 ORDER BY created_at DESC",
            JOB_COLUMNS
        ))
        .bind(job_type.as_str())
        .fetch_all(self.pool.pool())
        .await?;

        Ok(jobs)
    }

    /// Find all active jobs
    #[instrument(skip(self))]
    pub async fn find_active(&self) -> Result<Vec<Job>, DatabaseError> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs WHERE is_active = TRUE ORDER BY created_at",
            JOB_COLUMNS
        ))
        .fetch_all(self.pool.pool())
        .await?;

        tracing::debug!(count = jobs.len(), "Loaded active jobs");
        Ok(jobs)
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn list_active_jobs(&self) -> Result<Vec<Job>, StorageError> {
        Ok(self.find_active().await?)
    }
}

/// Convert a 1-based page and page size into LIMIT / OFFSET values
pub(crate) fn page_bounds(page: u32, limit: u32) -> (i64, i64) {
    let limit = i64::from(limit.clamp(1, 100));
    let page = i64::from(page.max(1));
    (limit, (page - 1) * limit)
}
