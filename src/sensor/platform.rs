//! Platform-specific CPU counter acquisition.
//!
//! A [`PlatformReader`] turns OS facilities into raw [`CpuSample`] counters.
//! One variant exists per supported operating system, plus a fallback that
//! synthesizes plausible samples so the pipeline keeps moving on platforms
//! (or in failure modes) where real counters are unavailable.

use crate::sensor::{CpuSample, SensorError};
use chrono::Utc;

/// Strategy for obtaining raw CPU counters and auxiliary readings.
///
/// Readers are injected at sensor construction, which keeps platform
/// selection explicit and lets tests substitute deterministic doubles.
pub trait PlatformReader: Send {
    /// Read the current cumulative CPU time counters.
    fn sample(&mut self) -> Result<CpuSample, SensorError>;

    /// Short/medium/long-term load averages.
    fn load_average(&mut self) -> Result<(f64, f64, f64), SensorError>;

    /// CPU temperature in degrees Celsius, where the platform exposes it.
    fn temperature(&mut self) -> Result<f64, SensorError>;

    /// Current CPU frequency in MHz, where the platform exposes it.
    fn frequency_mhz(&mut self) -> Result<f64, SensorError>;

    /// Short identifier of the backing platform mechanism.
    fn platform_name(&self) -> &'static str;
}

/// Pick the reader for the current target, falling back when no OS-specific
/// implementation exists.
pub fn default_reader() -> Box<dyn PlatformReader> {
    #[cfg(target_os = "linux")]
    {
        Box::new(crate::sensor::linux::LinuxReader::new())
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(crate::sensor::macos::MacosReader::new())
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Box::new(FallbackReader::new())
    }
}

/// Ticks added to the synthetic counters on every fallback sample.
const TICKS_PER_SAMPLE: u64 = 1000;

/// Estimation fallback for platforms without a native reader.
///
/// Usage is estimated from the machine's concurrency level and clamped to a
/// sane range. The counters are cumulative across calls so that consecutive
/// samples always show a positive total delta and the sensor never stalls
/// waiting for counter movement.
pub struct FallbackReader {
    total: u64,
    user: u64,
    system: u64,
    idle: u64,
}

impl FallbackReader {
    pub fn new() -> Self {
        Self {
            total: 0,
            user: 0,
            system: 0,
            idle: 0,
        }
    }

    fn estimated_usage() -> f64 {
        // Heuristic proxy: more hardware parallelism, more assumed activity.
        (num_cpus::get() as f64 / 32.0).clamp(0.10, 0.90)
    }
}

impl Default for FallbackReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformReader for FallbackReader {
    fn sample(&mut self) -> Result<CpuSample, SensorError> {
        let usage = Self::estimated_usage();
        // Split the estimate 70% user, 20% system, remainder idle.
        let user = (TICKS_PER_SAMPLE as f64 * usage * 0.7) as u64;
        let system = (TICKS_PER_SAMPLE as f64 * usage * 0.2) as u64;
        let idle = TICKS_PER_SAMPLE - user - system;

        self.total += TICKS_PER_SAMPLE;
        self.user += user;
        self.system += system;
        self.idle += idle;

        Ok(CpuSample {
            total_time: self.total,
            user_time: self.user,
            system_time: self.system,
            idle_time: self.idle,
            iowait_time: 0,
            timestamp: Utc::now(),
        })
    }

    fn load_average(&mut self) -> Result<(f64, f64, f64), SensorError> {
        let load = Self::estimated_usage() * num_cpus::get() as f64;
        Ok((load, load * 0.9, load * 0.8))
    }

    fn temperature(&mut self) -> Result<f64, SensorError> {
        Err(SensorError::Unsupported("temperature"))
    }

    fn frequency_mhz(&mut self) -> Result<f64, SensorError> {
        Err(SensorError::Unsupported("frequency"))
    }

    fn platform_name(&self) -> &'static str {
        "fallback"
    }
}
