//! Linux CPU reader backed by procfs and sysfs.

use crate::sensor::platform::PlatformReader;
use crate::sensor::{CpuSample, SensorError};
use chrono::Utc;
use std::fs;

const PROC_STAT: &str = "/proc/stat";
const PROC_LOADAVG: &str = "/proc/loadavg";
const CPUFREQ_CUR: &str = "/sys/devices/system/cpu/cpu0/cpufreq/scaling_cur_freq";
const THERMAL_GLOB_BASE: &str = "/sys/class/thermal";

pub struct LinuxReader;

impl LinuxReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LinuxReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformReader for LinuxReader {
    fn sample(&mut self) -> Result<CpuSample, SensorError> {
        let content = fs::read_to_string(PROC_STAT)
            .map_err(|e| SensorError::Sample(format!("read {PROC_STAT}: {e}")))?;
        parse_proc_stat(&content)
    }

    fn load_average(&mut self) -> Result<(f64, f64, f64), SensorError> {
        let content = fs::read_to_string(PROC_LOADAVG)
            .map_err(|e| SensorError::Sample(format!("read {PROC_LOADAVG}: {e}")))?;
        parse_loadavg(&content)
    }

    fn temperature(&mut self) -> Result<f64, SensorError> {
        // Thermal zones are not uniformly named; take the first one that
        // yields a parseable reading.
        let entries = fs::read_dir(THERMAL_GLOB_BASE)
            .map_err(|e| SensorError::Sample(format!("read {THERMAL_GLOB_BASE}: {e}")))?;
        for entry in entries.flatten() {
            let path = entry.path().join("temp");
            if let Ok(raw) = fs::read_to_string(&path) {
                if let Ok(millidegrees) = raw.trim().parse::<f64>() {
                    return Ok(millidegrees / 1000.0);
                }
            }
        }
        Err(SensorError::Unsupported("temperature"))
    }

    fn frequency_mhz(&mut self) -> Result<f64, SensorError> {
        let raw = fs::read_to_string(CPUFREQ_CUR)
            .map_err(|e| SensorError::Sample(format!("read {CPUFREQ_CUR}: {e}")))?;
        let khz: f64 = raw
            .trim()
            .parse()
            .map_err(|e| SensorError::Sample(format!("parse cpu frequency: {e}")))?;
        Ok(khz / 1000.0)
    }

    fn platform_name(&self) -> &'static str {
        "linux"
    }
}

/// Parse the aggregate `cpu` line of /proc/stat into cumulative counters.
///
/// Layout: `cpu user nice system idle iowait irq softirq steal ...`.
/// User time folds in nice; system time folds in irq and softirq.
fn parse_proc_stat(content: &str) -> Result<CpuSample, SensorError> {
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| SensorError::Sample("no aggregate cpu line in /proc/stat".to_string()))?;

    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|e| SensorError::Sample(format!("parse /proc/stat counters: {e}")))?;

    if fields.len() < 7 {
        return Err(SensorError::Sample(format!(
            "unexpected /proc/stat field count: {}",
            fields.len()
        )));
    }

    let user = fields[0] + fields[1];
    let system = fields[2] + fields[5] + fields[6];
    let idle = fields[3];
    let iowait = fields[4];
    let steal = fields.get(7).copied().unwrap_or(0);

    Ok(CpuSample {
        total_time: user + system + idle + iowait + steal,
        user_time: user,
        system_time: system,
        idle_time: idle,
        iowait_time: iowait,
        timestamp: Utc::now(),
    })
}

fn parse_loadavg(content: &str) -> Result<(f64, f64, f64), SensorError> {
    let mut fields = content.split_whitespace();
    let mut next = || -> Result<f64, SensorError> {
        fields
            .next()
            .ok_or_else(|| SensorError::Sample("truncated /proc/loadavg".to_string()))?
            .parse()
            .map_err(|e| SensorError::Sample(format!("parse /proc/loadavg: {e}")))
    };
    Ok((next()?, next()?, next()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proc_stat_line() {
        let content = "cpu  4705 150 1120 16250 520 30 50 0 0 0\ncpu0 1000 50 300 4000 130 10 20 0 0 0\n";
        let sample = parse_proc_stat(content).unwrap();
        assert_eq!(sample.user_time, 4855); // user + nice
        assert_eq!(sample.system_time, 1200); // system + irq + softirq
        assert_eq!(sample.idle_time, 16250);
        assert_eq!(sample.iowait_time, 520);
        assert_eq!(sample.total_time, 4855 + 1200 + 16250 + 520);
    }

    #[test]
    fn test_parse_proc_stat_rejects_garbage() {
        assert!(parse_proc_stat("intr 12345\n").is_err());
        assert!(parse_proc_stat("cpu one two three\n").is_err());
        assert!(parse_proc_stat("cpu 1 2 3\n").is_err());
    }

    #[test]
    fn test_parse_loadavg() {
        let (l1, l5, l15) = parse_loadavg("0.52 0.58 0.59 1/389 2047\n").unwrap();
        assert_eq!(l1, 0.52);
        assert_eq!(l5, 0.58);
        assert_eq!(l15, 0.59);
    }

    #[test]
    fn test_parse_loadavg_truncated() {
        assert!(parse_loadavg("0.52\n").is_err());
    }
}
