// Configuration management with layered configuration (file, env)

use crate::schedule::parse_timezone;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the binary starts the scheduler at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Capacity of the admission gate
    pub max_concurrent_jobs: usize,
    /// Deadline for a single job execution
    #[serde(default = "default_job_execution_timeout_seconds")]
    pub job_execution_timeout_seconds: u64,
    /// Period of the active-job reconciliation loop
    #[serde(default = "default_reconcile_interval_seconds")]
    pub reconcile_interval_seconds: u64,
    /// Timezone cron expressions are evaluated in
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Accept six-field expressions with a leading seconds field
    #[serde(default)]
    pub cron_with_seconds: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_job_execution_timeout_seconds() -> u64 {
    600
}

fn default_reconcile_interval_seconds() -> u64 {
    300
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Request timeout used when a health check job does not set its own
    pub timeout_seconds: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    pub directory: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./reports"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Port for the Prometheus exporter, disabled when absent
    pub metrics_port: Option<u16>,
    pub tracing_endpoint: Option<String>,
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let defaults = Settings::default();

        let builder = Config::builder()
            // Built-in defaults so a bare environment still produces a usable config
            .set_default("database.url", defaults.database.url)?
            .set_default("database.max_connections", defaults.database.max_connections)?
            .set_default("database.min_connections", defaults.database.min_connections)?
            .set_default(
                "database.connect_timeout_seconds",
                defaults.database.connect_timeout_seconds,
            )?
            .set_default(
                "scheduler.max_concurrent_jobs",
                defaults.scheduler.max_concurrent_jobs as u64,
            )?
            .set_default("observability.log_level", defaults.observability.log_level)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.database.min_connections > self.database.max_connections {
            return Err("Database min_connections cannot exceed max_connections".to_string());
        }

        if self.scheduler.max_concurrent_jobs == 0 {
            return Err("Scheduler max_concurrent_jobs must be greater than 0".to_string());
        }
        if self.scheduler.job_execution_timeout_seconds == 0 {
            return Err(
                "Scheduler job_execution_timeout_seconds must be greater than 0".to_string(),
            );
        }
        if self.scheduler.reconcile_interval_seconds == 0 {
            return Err("Scheduler reconcile_interval_seconds must be greater than 0".to_string());
        }
        parse_timezone(&self.scheduler.timezone).map_err(|e| e.to_string())?;

        if self.health_check.timeout_seconds == 0 {
            return Err("Health check timeout_seconds must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/job_scheduler".to_string(),
                max_connections: 10,
                min_connections: 2,
                connect_timeout_seconds: 30,
            },
            scheduler: SchedulerConfig {
                enabled: true,
                max_concurrent_jobs: 10,
                job_execution_timeout_seconds: default_job_execution_timeout_seconds(),
                reconcile_interval_seconds: default_reconcile_interval_seconds(),
                timezone: default_timezone(),
                cron_with_seconds: false,
            },
            health_check: HealthCheckConfig::default(),
            reports: ReportsConfig::default(),
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_format: LogFormat::Json,
                metrics_port: None,
                tracing_endpoint: None,
            },
        }
    }
}
