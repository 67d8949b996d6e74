//! Configuration for the agent engine and its sensors.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("serialize error: {0}")]
    Serialize(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How much context sensors may attach to the events they emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    /// Full metadata: thresholds, load figures, state labels.
    #[default]
    Standard,
    /// Thresholds only; no load or state context.
    Strict,
    /// No metadata at all.
    Minimal,
}

/// Main configuration for the agent engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Whether the engine may be started at all.
    pub enabled: bool,

    /// Capacity of the engine's inbound and outbound event queues.
    pub event_buffer_size: usize,

    /// Batch timer interval: the latency bound on event processing.
    #[serde(with = "duration_serde")]
    pub process_interval: Duration,

    /// Batch size trigger: the throughput bound on event processing.
    pub max_events_per_batch: usize,

    /// Reserved. Recognized and persisted, consulted by nothing yet.
    #[serde(with = "duration_serde")]
    pub cooldown_period: Duration,

    /// Forwarded to sensors to gate the metadata they attach.
    pub privacy_level: PrivacyLevel,

    /// CPU sensor settings.
    pub cpu: CpuSensorConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            event_buffer_size: 1000,
            process_interval: Duration::from_secs(5),
            max_events_per_batch: 50,
            cooldown_period: Duration::from_secs(30),
            privacy_level: PrivacyLevel::default(),
            cpu: CpuSensorConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the default location, falling back to
    /// defaults when no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            let config: AgentConfig =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Path of the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vigil-agent")
            .join("config.json")
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "event_buffer_size must be non-zero".to_string(),
            ));
        }
        if self.max_events_per_batch == 0 {
            return Err(ConfigError::Invalid(
                "max_events_per_batch must be non-zero".to_string(),
            ));
        }
        if self.process_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "process_interval must be non-zero".to_string(),
            ));
        }
        self.cpu.validate()
    }
}

/// Configuration for the CPU sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuSensorConfig {
    pub enabled: bool,

    /// How often the sampling loop ticks.
    #[serde(with = "duration_serde")]
    pub sample_interval: Duration,

    /// Capacity of the sensor's outbound event queue.
    pub buffer_size: usize,

    /// Usage fraction above which a warning event is emitted.
    pub warning_threshold: f64,

    /// Usage fraction above which a critical event is emitted.
    pub critical_threshold: f64,

    /// How many derived statistics to retain.
    pub history_size: usize,
}

impl Default for CpuSensorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_interval: Duration::from_secs(1),
            buffer_size: 1000,
            warning_threshold: 0.7,
            critical_threshold: 0.9,
            history_size: 60,
        }
    }
}

impl CpuSensorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("warning_threshold", self.warning_threshold),
            ("critical_threshold", self.critical_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) || value == 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a fraction in (0, 1], got {value}"
                )));
            }
        }
        if self.warning_threshold > self.critical_threshold {
            return Err(ConfigError::Invalid(
                "warning_threshold must not exceed critical_threshold".to_string(),
            ));
        }
        if self.buffer_size == 0 || self.history_size == 0 {
            return Err(ConfigError::Invalid(
                "buffer_size and history_size must be non-zero".to_string(),
            ));
        }
        if self.sample_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "sample_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serde support for Duration as integer seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
