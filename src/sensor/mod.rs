//! Sensors: independent producers that sample a metric source and emit
//! events.
//!
//! Each sensor owns its sampling loop, rolling history, and bounded output
//! queue. Platform specifics are isolated behind [`PlatformReader`], with an
//! estimation fallback for targets without a native implementation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod cpu;
pub mod platform;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "macos")]
pub mod macos;

pub use cpu::CpuSensor;
pub use platform::{default_reader, FallbackReader, PlatformReader};

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor is already running")]
    AlreadyRunning,
    #[error("failed to read sample: {0}")]
    Sample(String),
    #[error("{0} not supported on this platform")]
    Unsupported(&'static str),
}

/// Raw cumulative CPU time counters at one instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CpuSample {
    pub total_time: u64,
    pub user_time: u64,
    pub system_time: u64,
    pub idle_time: u64,
    pub iowait_time: u64,
    pub timestamp: DateTime<Utc>,
}

/// Derived CPU statistics computed from two consecutive samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    pub usage_percent: f64,
    pub user_percent: f64,
    pub system_percent: f64,
    pub idle_percent: f64,
    pub iowait_percent: f64,
    pub load_average_1: f64,
    pub load_average_5: f64,
    pub load_average_15: f64,
    pub core_count: usize,
    pub thread_count: usize,
    /// Degrees Celsius; 0.0 when the platform does not expose it.
    pub temperature_c: f64,
    /// MHz; 0.0 when the platform does not expose it.
    pub frequency_mhz: f64,
    pub timestamp: DateTime<Utc>,
}

impl CpuStats {
    /// A zero-valued statistic stamped with the given time.
    pub fn zero(timestamp: DateTime<Utc>) -> Self {
        Self {
            usage_percent: 0.0,
            user_percent: 0.0,
            system_percent: 0.0,
            idle_percent: 0.0,
            iowait_percent: 0.0,
            load_average_1: 0.0,
            load_average_5: 0.0,
            load_average_15: 0.0,
            core_count: 0,
            thread_count: 0,
            temperature_c: 0.0,
            frequency_mhz: 0.0,
            timestamp,
        }
    }
}

/// Convenience for tests and synthetic producers.
impl CpuSample {
    pub fn at(
        total_time: u64,
        user_time: u64,
        system_time: u64,
        idle_time: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            total_time,
            user_time,
            system_time,
            idle_time,
            iowait_time: 0,
            timestamp,
        }
    }
}
