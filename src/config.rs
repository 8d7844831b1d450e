use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Transition engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// State backend configuration
    pub state: StateConfig,

    /// SLA monitoring configuration
    #[serde(default)]
    pub sla: SlaConfig,

    /// Workflow definitions loaded at startup
    #[serde(default)]
    pub definitions: DefinitionsConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());

        let config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: INCIDENT_WF_)
            .add_source(
                config::Environment::with_prefix("INCIDENT_WF")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        self.engine.validate().map_err(config::ConfigError::Message)?;

        if self.sla.monitor_interval_secs == 0 {
            return Err(config::ConfigError::Message(
                "sla.monitor_interval_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            state: StateConfig {
                backend: StateBackend::Memory,
                path: None,
            },
            sla: SlaConfig::default(),
            definitions: DefinitionsConfig::default(),
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logs: false,
                service_name: default_service_name(),
                prometheus_enabled: true,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on the atomic commit of a transition (milliseconds)
    #[serde(default = "default_commit_timeout_ms")]
    pub commit_timeout_ms: u64,

    /// Fraction of an SLA after which an incident counts as at risk
    #[serde(default = "default_at_risk_ratio")]
    pub at_risk_ratio: f64,

    /// Upper bound on a single notification delivery (milliseconds)
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,
}

impl EngineConfig {
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.commit_timeout_ms == 0 {
            return Err("engine.commit_timeout_ms must be greater than zero".to_string());
        }
        if self.notify_timeout_ms == 0 {
            return Err("engine.notify_timeout_ms must be greater than zero".to_string());
        }
        // Negated so NaN is rejected too
        if !(self.at_risk_ratio > 0.0 && self.at_risk_ratio <= 1.0) {
            return Err(format!(
                "engine.at_risk_ratio must be in (0, 1], got {}",
                self.at_risk_ratio
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            commit_timeout_ms: default_commit_timeout_ms(),
            at_risk_ratio: default_at_risk_ratio(),
            notify_timeout_ms: default_notify_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// State backend type
    #[serde(default)]
    pub backend: StateBackend,

    /// Path for embedded database (sled)
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaConfig {
    /// Run the background SLA monitor
    #[serde(default = "default_true")]
    pub monitor_enabled: bool,

    /// Seconds between monitor scans
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            monitor_enabled: true,
            monitor_interval_secs: default_monitor_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DefinitionsConfig {
    /// Directory of YAML workflow specs imported and published at startup
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

// Default value functions
fn default_commit_timeout_ms() -> u64 {
    5_000
}

fn default_at_risk_ratio() -> f64 {
    0.8
}

fn default_notify_timeout_ms() -> u64 {
    2_000
}

fn default_monitor_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "incident-workflow".to_string()
}

fn default_true() -> bool {
    true
}
