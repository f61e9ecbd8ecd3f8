// Report generation executor

use super::JobExecutor;
use crate::errors::ExecutionError;
use crate::models::{Job, JobType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Txt,
    Json,
    Csv,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Txt => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(ReportFormat::Txt),
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            other => Err(ExecutionError::InvalidJobConfig(format!(
                "unsupported report format '{}'",
                other
            ))),
        }
    }
}

/// Writes a report file into the configured reports directory
///
/// Config keys: `report_type`, `format` (`txt`, `json` or `csv`) and
/// `include_charts`.
#[derive(Debug, Clone)]
pub struct ReportGenerationExecutor {
    directory: PathBuf,
}

impl ReportGenerationExecutor {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Generate the report and return the path of the written file
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn generate(&self, job: &Job) -> Result<PathBuf, ExecutionError> {
        let report_type = job.config_str("report_type").unwrap_or("summary");
        if !report_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ExecutionError::InvalidJobConfig(format!(
                "invalid report_type '{}'",
                report_type
            )));
        }
        let format = job.config_str("format").unwrap_or("txt").parse::<ReportFormat>()?;
        let include_charts = job.config_bool("include_charts").unwrap_or(false);
        let generated_at = Utc::now();

        let contents = match format {
            ReportFormat::Txt => render_text(job, report_type, include_charts, generated_at),
            ReportFormat::Json => render_json(job, report_type, include_charts, generated_at)?,
            ReportFormat::Csv => render_csv(job, report_type, include_charts, generated_at)?,
        };

        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| {
                ExecutionError::FileProcessingFailed(format!(
                    "Failed to create reports directory {}: {}",
                    self.directory.display(),
                    e
                ))
            })?;

        let file_name = format!(
            "{}_{}_{}.{}",
            report_type,
            job.id.simple(),
            generated_at.format("%Y%m%d_%H%M%S%3f"),
            format.extension()
        );
        let path = self.directory.join(file_name);

        tokio::fs::write(&path, contents).await.map_err(|e| {
            ExecutionError::FileProcessingFailed(format!(
                "Failed to write report {}: {}",
                path.display(),
                e
            ))
        })?;

        info!(path = %path.display(), report_type = report_type, "Report generated");
        Ok(path)
    }
}

fn render_text(
    job: &Job,
    report_type: &str,
    include_charts: bool,
    generated_at: DateTime<Utc>,
) -> Vec<u8> {
    let mut text = String::new();
    text.push_str(&format!("Report: {}\n", report_type));
    text.push_str(&format!("Job: {} ({})\n", job.name, job.id));
    text.push_str(&format!("Schedule: {}\n", job.schedule));
    text.push_str(&format!("Generated at: {}\n", generated_at.to_rfc3339()));
    text.push_str(&format!("Charts included: {}\n", include_charts));
    text.into_bytes()
}

fn render_json(
    job: &Job,
    report_type: &str,
    include_charts: bool,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, ExecutionError> {
    let report = json!({
        "report_type": report_type,
        "job_id": job.id,
        "job_name": job.name,
        "schedule": job.schedule,
        "generated_at": generated_at,
        "include_charts": include_charts,
    });

    serde_json::to_vec_pretty(&report).map_err(|e| {
        ExecutionError::FileProcessingFailed(format!("Failed to serialize report: {}", e))
    })
}

fn render_csv(
    job: &Job,
    report_type: &str,
    include_charts: bool,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, ExecutionError> {
    let mut buffer = Vec::new();
    let mut writer = WriterBuilder::new().from_writer(&mut buffer);

    let rows = [
        ["field", "value"].map(str::to_string),
        ["report_type".to_string(), report_type.to_string()],
        ["job_id".to_string(), job.id.to_string()],
        ["job_name".to_string(), job.name.clone()],
        ["schedule".to_string(), job.schedule.clone()],
        ["generated_at".to_string(), generated_at.to_rfc3339()],
        ["include_charts".to_string(), include_charts.to_string()],
    ];
    for row in &rows {
        writer.write_record(row).map_err(|e| {
            ExecutionError::FileProcessingFailed(format!("Failed to write CSV record: {}", e))
        })?;
    }

    writer.flush().map_err(|e| {
        ExecutionError::FileProcessingFailed(format!("Failed to flush CSV writer: {}", e))
    })?;
    drop(writer);

    Ok(buffer)
}

#[async_trait]
impl JobExecutor for ReportGenerationExecutor {
    fn job_type(&self) -> JobType {
        JobType::ReportGeneration
    }

    async fn execute(&self, job: &Job) -> Result<(), ExecutionError> {
        self.generate(job).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report_job(format: &str) -> Job {
        let mut job = Job::new("daily, summary", "0 6 * * *", JobType::ReportGeneration);
        job.config.insert("format".to_string(), json!(format));
        job
    }

    #[tokio::test]
    async fn test_generates_text_report() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ReportGenerationExecutor::new(dir.path().join("reports"));

        let path = executor.generate(&report_job("txt")).await.unwrap();
        assert!(path.starts_with(executor.directory()));
        assert_eq!(path.extension().unwrap(), "txt");

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("Report: daily_summary"));
        assert!(contents.contains("Charts included: false"));
    }

    #[tokio::test]
    async fn test_generates_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ReportGenerationExecutor::new(dir.path());
        let job = report_job("json");

        let path = executor.generate(&job).await.unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(value["job_id"], json!(job.id));
        assert_eq!(value["report_type"], json!("daily_summary"));
    }

    #[tokio::test]
    async fn test_csv_report_quotes_fields() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ReportGenerationExecutor::new(dir.path());

        let path = executor.generate(&report_job("csv")).await.unwrap();
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();

        let job_name = rows.iter().find(|row| &row[0] == "job_name").unwrap();
        assert_eq!(&job_name[1], "daily, summary");
    }

    #[tokio::test]
    async fn test_rejects_unknown_format_and_unsafe_type() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ReportGenerationExecutor::new(dir.path());

        let err = executor.execute(&report_job("pdf")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidJobConfig(_)));

        let mut job = report_job("txt");
        job.config.insert("report_type".to_string(), json!("../escape"));
        assert!(executor.execute(&job).await.is_err());
    }
}
