//! CPU sensor: periodic sampling, derived statistics, threshold events.
//!
//! The sampling loop runs on its own thread with its own shutdown channel,
//! independent of the engine. Readers of the current statistic and history
//! never block the loop for long; all shared state sits behind one RwLock.

use crate::config::{CpuSensorConfig, PrivacyLevel};
use crate::event::{Event, EventType};
use crate::sensor::platform::PlatformReader;
use crate::sensor::{CpuSample, CpuStats, SensorError};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TrySendError};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Source name stamped on every event this sensor emits.
pub const SENSOR_NAME: &str = "cpu_sensor";

#[derive(Default)]
struct SensorState {
    current: Option<CpuStats>,
    history: VecDeque<CpuStats>,
    samples_collected: u64,
    average_usage: f64,
    peak_usage: f64,
    last_sample_time: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct SensorCounters {
    events_generated: AtomicU64,
    warnings_issued: AtomicU64,
    criticals_issued: AtomicU64,
    errors_encountered: AtomicU64,
    events_dropped: AtomicU64,
}

/// Self-contained CPU usage producer.
pub struct CpuSensor {
    config: CpuSensorConfig,
    reader: Arc<Mutex<Box<dyn PlatformReader>>>,
    state: Arc<RwLock<SensorState>>,
    counters: Arc<SensorCounters>,
    running: Arc<AtomicBool>,
    privacy: PrivacyLevel,
    event_tx: Sender<Event>,
    event_rx: Receiver<Event>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CpuSensor {
    /// Create a sensor over an injected platform reader.
    pub fn new(
        config: CpuSensorConfig,
        reader: Box<dyn PlatformReader>,
        privacy: PrivacyLevel,
    ) -> Self {
        let (event_tx, event_rx) = bounded(config.buffer_size);
        Self {
            config,
            reader: Arc::new(Mutex::new(reader)),
            state: Arc::new(RwLock::new(SensorState::default())),
            counters: Arc::new(SensorCounters::default()),
            running: Arc::new(AtomicBool::new(false)),
            privacy,
            event_tx,
            event_rx,
            shutdown_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Start the sampling loop.
    ///
    /// Fails when the sensor is already running.
    pub fn start(&self) -> Result<(), SensorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SensorError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let shared = LoopShared {
            config: self.config.clone(),
            privacy: self.privacy,
            reader: Arc::clone(&self.reader),
            state: Arc::clone(&self.state),
            counters: Arc::clone(&self.counters),
            event_tx: self.event_tx.clone(),
        };
        let running = Arc::clone(&self.running);

        let handle = thread::spawn(move || {
            shared.run(shutdown_rx);
            running.store(false, Ordering::SeqCst);
        });

        *self.shutdown_tx.lock().expect("sensor lock poisoned") = Some(shutdown_tx);
        *self.handle.lock().expect("sensor lock poisoned") = Some(handle);
        debug!(interval = ?self.config.sample_interval, "cpu sensor started");
        Ok(())
    }

    /// Stop the sampling loop. A no-op success when not running.
    pub fn stop(&self) -> Result<(), SensorError> {
        if !self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Dropping the sender disconnects the loop's shutdown receiver.
        self.shutdown_tx.lock().expect("sensor lock poisoned").take();
        if let Some(handle) = self.handle.lock().expect("sensor lock poisoned").take() {
            let _ = handle.join();
        }
        self.running.store(false, Ordering::SeqCst);
        debug!("cpu sensor stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &'static str {
        SENSOR_NAME
    }

    /// Defensive copy of the latest derived statistic.
    pub fn current_stats(&self) -> CpuStats {
        let state = self.state.read().expect("sensor lock poisoned");
        state
            .current
            .clone()
            .unwrap_or_else(|| CpuStats::zero(Utc::now()))
    }

    /// Defensive copy of the retained history, oldest first.
    pub fn history(&self) -> Vec<CpuStats> {
        let state = self.state.read().expect("sensor lock poisoned");
        state.history.iter().cloned().collect()
    }

    /// The sensor's bounded event output.
    pub fn events(&self) -> &Receiver<Event> {
        &self.event_rx
    }

    /// Current load averages, zeros when unavailable.
    pub fn load_average(&self) -> (f64, f64, f64) {
        self.reader
            .lock()
            .expect("sensor lock poisoned")
            .load_average()
            .unwrap_or((0.0, 0.0, 0.0))
    }

    /// Counter snapshot for the statistics surface.
    pub fn stats(&self) -> Value {
        let state = self.state.read().expect("sensor lock poisoned");
        json!({
            "running": self.is_running(),
            "samples_collected": state.samples_collected,
            "average_usage": state.average_usage,
            "peak_usage": state.peak_usage,
            "last_sample_time": state.last_sample_time,
            "events_generated": self.counters.events_generated.load(Ordering::Relaxed),
            "warnings_issued": self.counters.warnings_issued.load(Ordering::Relaxed),
            "criticals_issued": self.counters.criticals_issued.load(Ordering::Relaxed),
            "errors_encountered": self.counters.errors_encountered.load(Ordering::Relaxed),
            "events_dropped": self.counters.events_dropped.load(Ordering::Relaxed),
        })
    }
}

impl Drop for CpuSensor {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Everything the sampling thread needs.
struct LoopShared {
    config: CpuSensorConfig,
    privacy: PrivacyLevel,
    reader: Arc<Mutex<Box<dyn PlatformReader>>>,
    state: Arc<RwLock<SensorState>>,
    counters: Arc<SensorCounters>,
    event_tx: Sender<Event>,
}

impl LoopShared {
    fn run(self, shutdown_rx: Receiver<()>) {
        let ticker = tick(self.config.sample_interval);

        // Seed the previous-sample pointer; a failed first read is a
        // transient error like any other.
        let mut prev = match self.read_sample() {
            Ok(sample) => Some(sample),
            Err(_) => None,
        };

        loop {
            select! {
                recv(shutdown_rx) -> _ => break,
                recv(ticker) -> _ => {
                    prev = self.collect(prev);
                }
            }
        }
    }

    fn read_sample(&self) -> Result<CpuSample, SensorError> {
        let mut reader = self.reader.lock().expect("sensor lock poisoned");
        reader.sample().map_err(|e| {
            self.counters.errors_encountered.fetch_add(1, Ordering::Relaxed);
            debug!("sample read failed: {e}");
            e
        })
    }

    /// One sampling tick. Returns the new previous-sample pointer.
    fn collect(&self, prev: Option<CpuSample>) -> Option<CpuSample> {
        let sample = match self.read_sample() {
            Ok(sample) => sample,
            // Skip the tick; keep the previous pointer so the next delta
            // spans the gap.
            Err(_) => return prev,
        };

        let Some(prev_sample) = prev else {
            return Some(sample);
        };

        let Some(pct) = derive_percentages(&prev_sample, &sample) else {
            // No counter movement: skip the statistic but advance the
            // pointer to the newest sample.
            return Some(sample);
        };

        let (load_1, load_5, load_15, temperature, frequency) = {
            let mut reader = self.reader.lock().expect("sensor lock poisoned");
            let (l1, l5, l15) = reader.load_average().unwrap_or((0.0, 0.0, 0.0));
            let temp = reader.temperature().unwrap_or(0.0);
            let freq = reader.frequency_mhz().unwrap_or(0.0);
            (l1, l5, l15, temp, freq)
        };

        let stats = CpuStats {
            usage_percent: pct.usage,
            user_percent: pct.user,
            system_percent: pct.system,
            idle_percent: pct.idle,
            iowait_percent: pct.iowait,
            load_average_1: load_1,
            load_average_5: load_5,
            load_average_15: load_15,
            core_count: num_cpus::get_physical(),
            thread_count: num_cpus::get(),
            temperature_c: temperature,
            frequency_mhz: frequency,
            timestamp: sample.timestamp,
        };

        self.record(&stats);
        self.check_thresholds(&stats);

        Some(sample)
    }

    /// Store the statistic and update the running aggregates.
    fn record(&self, stats: &CpuStats) {
        let mut state = self.state.write().expect("sensor lock poisoned");

        state.current = Some(stats.clone());
        state.history.push_back(stats.clone());
        while state.history.len() > self.config.history_size {
            state.history.pop_front();
        }

        state.samples_collected += 1;
        let n = state.samples_collected as f64;
        state.average_usage = if state.samples_collected == 1 {
            stats.usage_percent
        } else {
            (state.average_usage * (n - 1.0) + stats.usage_percent) / n
        };
        if stats.usage_percent > state.peak_usage {
            state.peak_usage = stats.usage_percent;
        }
        state.last_sample_time = Some(stats.timestamp);
    }

    /// Emit at most one threshold-crossing event; critical wins over warning.
    fn check_thresholds(&self, stats: &CpuStats) {
        let usage_fraction = stats.usage_percent / 100.0;

        if usage_fraction >= self.config.critical_threshold {
            self.emit_threshold_event(
                EventType::CpuCritical,
                stats,
                self.config.critical_threshold,
                "critical",
            );
            self.counters.criticals_issued.fetch_add(1, Ordering::Relaxed);
        } else if usage_fraction >= self.config.warning_threshold {
            self.emit_threshold_event(
                EventType::CpuWarning,
                stats,
                self.config.warning_threshold,
                "warning",
            );
            self.counters.warnings_issued.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn emit_threshold_event(
        &self,
        event_type: EventType,
        stats: &CpuStats,
        threshold: f64,
        level: &str,
    ) {
        let mut event = Event::new(event_type, SENSOR_NAME, stats.usage_percent / 100.0);

        // Privacy gating: Strict keeps only the crossed threshold, Minimal
        // attaches nothing.
        match self.privacy {
            PrivacyLevel::Standard => {
                event = event
                    .with_metadata("threshold", threshold)
                    .with_metadata("load_avg", stats.load_average_1)
                    .with_metadata("level", level);
            }
            PrivacyLevel::Strict => {
                event = event.with_metadata("threshold", threshold);
            }
            PrivacyLevel::Minimal => {}
        }

        match self.event_tx.try_send(event) {
            Ok(()) => {
                self.counters.events_generated.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                self.counters.events_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("cpu sensor event queue full, dropping {level} event");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

struct CpuPercentages {
    usage: f64,
    user: f64,
    system: f64,
    idle: f64,
    iowait: f64,
}

/// Percentage statistics from the delta of two consecutive raw samples.
///
/// Returns `None` when the total counter has not moved, which callers treat
/// as "skip this tick".
fn derive_percentages(prev: &CpuSample, curr: &CpuSample) -> Option<CpuPercentages> {
    let total = curr.total_time.saturating_sub(prev.total_time);
    if total == 0 {
        return None;
    }

    let pct = |curr_v: u64, prev_v: u64| curr_v.saturating_sub(prev_v) as f64 / total as f64 * 100.0;
    let user = pct(curr.user_time, prev.user_time);
    let system = pct(curr.system_time, prev.system_time);
    let idle = pct(curr.idle_time, prev.idle_time);
    let iowait = pct(curr.iowait_time, prev.iowait_time);

    Some(CpuPercentages {
        usage: 100.0 - idle,
        user,
        system,
        idle,
        iowait,
    })
}
