// HTTP health check executor

use super::{required_str, JobExecutor};
use crate::errors::ExecutionError;
use crate::models::{Job, JobType};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Requests a URL and compares the response status with the expected one
///
/// Config keys: `url`, `expected_status` (default 200) and `timeout_seconds`,
/// which overrides the executor's default request timeout.
#[derive(Debug, Clone)]
pub struct HealthCheckExecutor {
    client: Client,
    default_timeout: Duration,
}

impl HealthCheckExecutor {
    /// Create a new HealthCheckExecutor with the specified default timeout
    pub fn new(default_timeout: Duration) -> Result<Self, ExecutionError> {
        let client = Client::builder().build().map_err(|e| {
            ExecutionError::HttpRequestFailed(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            default_timeout,
        })
    }

    fn expected_status(job: &Job) -> Result<u16, ExecutionError> {
        match job.config.get("expected_status") {
            None => Ok(200),
            Some(value) => value
                .as_u64()
                .and_then(|code| u16::try_from(code).ok())
                .filter(|code| (100..=599).contains(code))
                .ok_or_else(|| {
                    ExecutionError::InvalidJobConfig(format!(
                        "invalid expected_status {}",
                        value
                    ))
                }),
        }
    }

    fn timeout(&self, job: &Job) -> Duration {
        job.config_u64("timeout_seconds")
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
    }
}

#[async_trait]
impl JobExecutor for HealthCheckExecutor {
    fn job_type(&self) -> JobType {
        JobType::HealthCheck
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, job_name = %job.name))]
    async fn execute(&self, job: &Job) -> Result<(), ExecutionError> {
        let url = required_str(job, "url")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ExecutionError::InvalidJobConfig(format!(
                "url must be http or https: {}",
                url
            )));
        }
        let expected = Self::expected_status(job)?;
        let timeout = self.timeout(job);

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExecutionError::HttpRequestFailed(format!(
                        "request to {} timed out after {}s",
                        url,
                        timeout.as_secs()
                    ))
                } else {
                    ExecutionError::HttpRequestFailed(format!("request to {} failed: {}", url, e))
                }
            })?;

        let actual = response.status().as_u16();
        if actual != expected {
            warn!(url = url, expected, actual, "Health check returned unexpected status");
            return Err(ExecutionError::UnexpectedStatus { expected, actual });
        }

        info!(url = url, status = actual, "Health check passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn health_job(url: String) -> Job {
        let mut job = Job::new("api health", "*/1 * * * *", JobType::HealthCheck);
        job.config.insert("url".to_string(), json!(url));
        job
    }

    fn executor() -> HealthCheckExecutor {
        HealthCheckExecutor::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_expected_status_passes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let job = health_job(format!("{}/health", server.uri()));
        executor().execute(&job).await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let job = health_job(format!("{}/health", server.uri()));
        let err = executor().execute(&job).await.unwrap_err();
        assert_eq!(
            err,
            ExecutionError::UnexpectedStatus {
                expected: 200,
                actual: 503
            }
        );
    }

    #[tokio::test]
    async fn test_custom_expected_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let mut job = health_job(server.uri());
        job.config.insert("expected_status".to_string(), json!(204));
        executor().execute(&job).await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let mut job = health_job(server.uri());
        job.config.insert("timeout_seconds".to_string(), json!(1));
        let err = executor().execute(&job).await.unwrap_err();
        assert!(matches!(err, ExecutionError::HttpRequestFailed(msg) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_invalid_config() {
        let mut job = health_job("ftp://example.com".to_string());
        assert!(matches!(
            executor().execute(&job).await,
            Err(ExecutionError::InvalidJobConfig(_))
        ));

        job.config.remove("url");
        assert!(executor().execute(&job).await.is_err());

        let mut job = health_job("http://localhost".to_string());
        job.config.insert("expected_status".to_string(), json!(99));
        assert!(matches!(
            executor().execute(&job).await,
            Err(ExecutionError::InvalidJobConfig(_))
        ));
    }
}
