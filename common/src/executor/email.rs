// Email notification executor

use super::{required_str, JobExecutor};
use crate::errors::ExecutionError;
use crate::models::{Job, JobType};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Delivery transport for email notifications
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), ExecutionError>;
}

/// Mailer that records messages in the structured log instead of sending them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), ExecutionError> {
        info!(
            recipient = %message.recipient,
            subject = %message.subject,
            body_length = message.body.len(),
            "Email notification delivered"
        );
        Ok(())
    }
}

/// Sends the notification configured on the job
///
/// Config keys: `recipient`, `subject`, `body`. The subject and body may use
/// the placeholders `{{job_name}}`, `{{job_id}}` and `{{fired_at}}`.
pub struct EmailNotificationExecutor {
    mailer: Arc<dyn Mailer>,
}

impl EmailNotificationExecutor {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    /// Validate the job configuration and render the message
    pub fn render(job: &Job) -> Result<EmailMessage, ExecutionError> {
        let recipient = required_str(job, "recipient")?;
        if !is_plausible_address(recipient) {
            return Err(ExecutionError::InvalidJobConfig(format!(
                "invalid recipient address '{}'",
                recipient
            )));
        }
        let subject = required_str(job, "subject")?;
        let body = job.config_str("body").unwrap_or_default();

        let fired_at = Utc::now().to_rfc3339();
        let fill = |template: &str| {
            template
                .replace("{{job_name}}", &job.name)
                .replace("{{job_id}}", &job.id.to_string())
                .replace("{{fired_at}}", &fired_at)
        };

        Ok(EmailMessage {
            recipient: recipient.to_string(),
            subject: fill(subject),
            body: fill(body),
        })
    }
}

fn is_plausible_address(address: &str) -> bool {
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !address.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[async_trait]
impl JobExecutor for EmailNotificationExecutor {
    fn job_type(&self) -> JobType {
        JobType::EmailNotification
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, job_name = %job.name))]
    async fn execute(&self, job: &Job) -> Result<(), ExecutionError> {
        let message = Self::render(job)?;
        self.mailer.send(&message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn email_job() -> Job {
        let mut job = Job::new("weekly digest", "0 9 * * 1", JobType::EmailNotification);
        job.config.insert("subject".to_string(), json!("Digest for {{job_name}}"));
        job.config.insert("body".to_string(), json!("Job {{job_id}} says hi"));
        job
    }

    #[test]
    fn test_render_fills_placeholders() {
        let job = email_job();
        let message = EmailNotificationExecutor::render(&job).unwrap();

        assert_eq!(message.recipient, "user@example.com");
        assert_eq!(message.subject, "Digest for weekly digest");
        assert_eq!(message.body, format!("Job {} says hi", job.id));
    }

    #[test]
    fn test_render_rejects_bad_recipient() {
        for recipient in ["", "nobody", "a@b", "@example.com", "a b@example.com"] {
            let mut job = email_job();
            job.config.insert("recipient".to_string(), json!(recipient));
            assert!(
                matches!(
                    EmailNotificationExecutor::render(&job),
                    Err(ExecutionError::InvalidJobConfig(_))
                ),
                "{} should be rejected",
                recipient
            );
        }
    }

    #[tokio::test]
    async fn test_execute_delivers_through_mailer() {
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .withf(|message| message.subject == "Digest for weekly digest")
            .times(1)
            .returning(|_| Ok(()));

        let executor = EmailNotificationExecutor::new(Arc::new(mailer));
        executor.execute(&email_job()).await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_surfaces_delivery_failure() {
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .returning(|_| Err(ExecutionError::NotificationFailed("relay down".to_string())));

        let executor = EmailNotificationExecutor::new(Arc::new(mailer));
        let err = executor.execute(&email_job()).await.unwrap_err();
        assert_eq!(err, ExecutionError::NotificationFailed("relay down".to_string()));
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_message() {
        let executor = EmailNotificationExecutor::new(Arc::new(LogMailer));
        assert!(executor.execute(&email_job()).await.is_ok());
    }
}
