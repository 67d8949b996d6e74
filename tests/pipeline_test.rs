//! End-to-end pipeline tests: sensor -> bus -> engine -> outcomes.

use chrono::Utc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use vigil_agent::{
    config::{AgentConfig, CpuSensorConfig},
    engine::{Decision, Engine, InterventionType},
    event::{Event, EventBus, EventStore, EventType, MemoryEventStore},
    planner::Planner,
    sensor::{CpuSample, CpuSensor, PlatformReader, SensorError},
};

/// Deterministic reader producing a fixed usage level.
struct ScriptedReader {
    usage_fraction: f64,
    total: u64,
    busy: u64,
    idle: u64,
}

impl ScriptedReader {
    fn new(usage_fraction: f64) -> Self {
        Self {
            usage_fraction,
            total: 0,
            busy: 0,
            idle: 0,
        }
    }
}

impl PlatformReader for ScriptedReader {
    fn sample(&mut self) -> Result<CpuSample, SensorError> {
        let busy = (100.0 * self.usage_fraction) as u64;
        self.total += 100;
        self.busy += busy;
        self.idle += 100 - busy;
        Ok(CpuSample::at(self.total, self.busy, 0, self.idle, Utc::now()))
    }

    fn load_average(&mut self) -> Result<(f64, f64, f64), SensorError> {
        Ok((2.0, 1.5, 1.0))
    }

    fn temperature(&mut self) -> Result<f64, SensorError> {
        Err(SensorError::Unsupported("temperature"))
    }

    fn frequency_mhz(&mut self) -> Result<f64, SensorError> {
        Err(SensorError::Unsupported("frequency"))
    }

    fn platform_name(&self) -> &'static str {
        "scripted"
    }
}

fn fast_agent_config() -> AgentConfig {
    AgentConfig {
        process_interval: Duration::from_millis(50),
        cpu: CpuSensorConfig {
            sample_interval: Duration::from_millis(10),
            ..CpuSensorConfig::default()
        },
        ..AgentConfig::default()
    }
}

#[test]
fn sensor_events_flow_through_engine_to_outcomes() {
    let config = fast_agent_config();

    let sensor = CpuSensor::new(
        config.cpu.clone(),
        Box::new(ScriptedReader::new(0.95)),
        config.privacy_level,
    );
    let engine = Engine::with_defaults(config);

    engine.start().unwrap();
    sensor.start().unwrap();

    // Bridge a handful of sensor events into the engine.
    let sensor_rx = sensor.events().clone();
    let mut forwarded = 0;
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while forwarded < 3 && std::time::Instant::now() < deadline {
        if let Ok(event) = sensor_rx.recv_timeout(Duration::from_millis(100)) {
            assert_eq!(event.event_type, EventType::CpuCritical);
            engine.submit_event(event).unwrap();
            forwarded += 1;
        }
    }
    assert_eq!(forwarded, 3, "sensor produced too few events");

    // Critical severity matches the breathing-exercise rule.
    for _ in 0..3 {
        let outcome = engine
            .outcomes()
            .recv_timeout(Duration::from_secs(2))
            .expect("missing outcome");
        assert_eq!(outcome.decision, Decision::Execute);
        let intervention = outcome.intervention.expect("execute without intervention");
        assert_eq!(
            intervention.intervention_type,
            InterventionType::SuggestBreathingExercise
        );
    }

    sensor.stop().unwrap();
    engine.stop().unwrap();
}

#[test]
fn bus_subscribers_feed_the_event_store() {
    let bus = EventBus::new();
    let store = MemoryEventStore::new();
    let rx = bus.subscribe_all().unwrap();

    for value in [0.2, 0.5, 0.8] {
        bus.publish(&Event::new(EventType::KeyboardBurst, "kbd_watcher", value))
            .unwrap();
    }
    while let Ok(event) = rx.try_recv() {
        store.save(&event).unwrap();
    }

    assert_eq!(store.len(), 3);
    let recent = store.get_recent(2).unwrap();
    assert_eq!(recent.len(), 2);
    let bursts = store.get_by_type(EventType::KeyboardBurst, 10).unwrap();
    assert_eq!(bursts.len(), 3);
}

#[test]
fn default_policy_decides_per_event_type() {
    let config = AgentConfig {
        process_interval: Duration::from_millis(50),
        ..AgentConfig::default()
    };
    let engine = Engine::with_defaults(config);
    engine.start().unwrap();

    let burst = Event::new(EventType::KeyboardBurst, "kbd_watcher", 0.9);
    let commit = Event::new(EventType::GitCommit, "git_watcher", 1.0);
    let burst_id = burst.id.clone();
    let commit_id = commit.id.clone();

    engine.submit_event(burst).unwrap();
    engine.submit_event(commit).unwrap();

    let first = engine
        .outcomes()
        .recv_timeout(Duration::from_secs(2))
        .unwrap();
    let second = engine
        .outcomes()
        .recv_timeout(Duration::from_secs(2))
        .unwrap();

    assert_eq!(first.event_id, burst_id);
    assert_eq!(first.decision, Decision::Execute);
    assert_eq!(
        first.intervention.as_ref().unwrap().intervention_type,
        InterventionType::AskCognitiveQuestion
    );

    assert_eq!(second.event_id, commit_id);
    assert_eq!(second.decision, Decision::Ignore);
    assert_eq!(second.reason, "no matching rule");

    engine.stop().unwrap();
}

#[test]
fn planner_matching_is_safe_during_reload() {
    let planner = Arc::new(Planner::with_default_rules());

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let planner = Arc::clone(&planner);
            thread::spawn(move || {
                let mut ctx = vigil_agent::planner::PlanContext::new();
                ctx.insert("type".to_string(), "mood_drop".into());
                ctx.insert("severity".to_string(), "medium".into());
                for _ in 0..200 {
                    // Either the old or the new rule set answers; both are
                    // coherent snapshots.
                    let plan = planner.plan(&ctx).unwrap();
                    assert!(plan.is_noop() || plan.rule.is_some());
                }
            })
        })
        .collect();

    for _ in 0..20 {
        planner.reload(vigil_agent::planner::default_rules().rules());
        thread::sleep(Duration::from_millis(1));
    }

    for handle in readers {
        handle.join().unwrap();
    }
    assert_eq!(
        planner.rule_count(),
        vigil_agent::planner::default_rules().len()
    );
}
