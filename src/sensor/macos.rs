//! macOS CPU reader backed by command-line tools.
//!
//! macOS does not expose cumulative CPU tick counters through a stable file
//! interface, so this reader shells out: `iostat` for CPU time shares,
//! `uptime` for load averages, and `sysctl` for the nominal frequency.
//! The percentage readings are accumulated into synthetic cumulative
//! counters so consecutive samples always show counter movement.

use crate::sensor::platform::PlatformReader;
use crate::sensor::{CpuSample, SensorError};
use chrono::Utc;
use std::process::Command;

/// Each iostat reading contributes this many ticks to the running counters.
const TICKS_PER_READING: u64 = 100;

pub struct MacosReader {
    total: u64,
    user: u64,
    system: u64,
    idle: u64,
}

impl MacosReader {
    pub fn new() -> Self {
        Self {
            total: 0,
            user: 0,
            system: 0,
            idle: 0,
        }
    }
}

impl Default for MacosReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformReader for MacosReader {
    fn sample(&mut self) -> Result<CpuSample, SensorError> {
        let output = Command::new("iostat")
            .args(["-c", "2", "-n", "0"])
            .output()
            .map_err(|e| SensorError::Sample(format!("execute iostat: {e}")))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let (user, system, idle) = parse_iostat(&stdout)?;

        self.total += TICKS_PER_READING;
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
        let output = Command::new("uptime")
            .output()
            .map_err(|e| SensorError::Sample(format!("execute uptime: {e}")))?;
        parse_uptime(&String::from_utf8_lossy(&output.stdout))
    }

    fn temperature(&mut self) -> Result<f64, SensorError> {
        // Requires privileged powermetrics access; not available to an
        // unprivileged agent.
        Err(SensorError::Unsupported("temperature"))
    }

    fn frequency_mhz(&mut self) -> Result<f64, SensorError> {
        let output = Command::new("sysctl")
            .args(["-n", "hw.cpufrequency"])
            .output()
            .map_err(|e| SensorError::Sample(format!("execute sysctl: {e}")))?;
        let hz: f64 = String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse()
            .map_err(|e| SensorError::Sample(format!("parse cpu frequency: {e}")))?;
        Ok(hz / 1_000_000.0)
    }

    fn platform_name(&self) -> &'static str {
        "macos"
    }
}

/// Parse the second measurement block of `iostat -c 2 -n 0` output.
///
/// The first block reports averages since boot; the second is the interval
/// reading. Columns are `us sy id` followed by load averages.
fn parse_iostat(output: &str) -> Result<(u64, u64, u64), SensorError> {
    let lines: Vec<&str> = output.lines().collect();
    if lines.len() < 4 {
        return Err(SensorError::Sample(
            "unexpected iostat output format".to_string(),
        ));
    }

    let fields: Vec<&str> = lines[3].split_whitespace().collect();
    if fields.len() < 3 {
        return Err(SensorError::Sample(
            "insufficient fields in iostat output".to_string(),
        ));
    }

    let mut parse = |idx: usize, what: &str| -> Result<f64, SensorError> {
        fields[idx]
            .parse()
            .map_err(|e| SensorError::Sample(format!("parse {what} percentage: {e}")))
    };
    let user = parse(0, "user")?;
    let system = parse(1, "system")?;
    let idle = parse(2, "idle")?;

    Ok((user as u64, system as u64, idle as u64))
}

/// Extract the three load averages from `uptime` output.
///
/// Format: `14:30  up 2 days, 3:45, 2 users, load averages: 1.23 2.34 3.45`.
fn parse_uptime(output: &str) -> Result<(f64, f64, f64), SensorError> {
    let marker = "load averages:";
    let idx = output
        .find(marker)
        .or_else(|| output.find("load average:"))
        .ok_or_else(|| SensorError::Sample("no load averages in uptime output".to_string()))?;

    let tail = &output[idx..];
    let tail = tail.split(':').nth(1).unwrap_or("");
    let loads: Vec<f64> = tail
        .split([' ', ','])
        .filter(|s| !s.is_empty())
        .take(3)
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| SensorError::Sample(format!("parse load averages: {e}")))?;

    if loads.len() < 3 {
        return Err(SensorError::Sample(
            "failed to parse load averages from uptime output".to_string(),
        ));
    }
    Ok((loads[0], loads[1], loads[2]))
}
