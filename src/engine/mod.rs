//! The orchestrator: inbound queue, batch scheduling, per-event pipeline.
//!
//! The engine owns a bounded inbound event queue and drains it on a batching
//! schedule with both a latency bound (the process interval timer) and a
//! throughput bound (the maximum batch size). Each event runs through
//! analyze -> plan -> optional execute, and every analyzed event yields
//! exactly one [`Outcome`] on the outbound queue.

use crate::config::AgentConfig;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TrySendError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod managers;
pub mod types;

pub use managers::{
    ContextListener, ExecutorManager, ListenerManager, LoggingExecutor, PlannerManager,
    RulePlannerManager,
};
pub use types::{Decision, Intervention, InterventionType, Outcome, Timing, Urgency};

use crate::event::Event;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is already running")]
    AlreadyRunning,
    #[error("engine is disabled")]
    Disabled,
    #[error("engine is not running")]
    NotRunning,
    #[error("engine is shutting down")]
    ShuttingDown,
    #[error("engine is stopped and cannot be restarted")]
    Stopped,
    #[error("event buffer is full")]
    BufferFull,
    #[error("failed to start {manager}: {message}")]
    ManagerStart {
        manager: &'static str,
        message: String,
    },
    #[error("failed to analyze event: {0}")]
    Analyze(String),
    #[error("failed to plan intervention: {0}")]
    Plan(String),
    #[error("failed to execute intervention: {0}")]
    Execute(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Created,
    Running,
    Stopped,
}

#[derive(Default)]
struct EngineCounters {
    events_submitted: AtomicU64,
    events_processed: AtomicU64,
    events_failed: AtomicU64,
    batches_processed: AtomicU64,
}

/// Everything the batching thread shares with the engine handle.
struct EngineShared {
    listener: Box<dyn ListenerManager>,
    planner: Box<dyn PlannerManager>,
    executor: Box<dyn ExecutorManager>,
    outcome_tx: Sender<Outcome>,
    counters: EngineCounters,
    max_events_per_batch: usize,
    process_interval: std::time::Duration,
}

/// The agent engine. `created -> running -> stopped`; stopped is terminal.
pub struct Engine {
    config: AgentConfig,
    shared: Arc<EngineShared>,
    state: Mutex<EngineState>,
    shutting_down: Arc<AtomicBool>,
    event_tx: Sender<Event>,
    event_rx: Mutex<Option<Receiver<Event>>>,
    outcome_rx: Receiver<Outcome>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    started_at: Mutex<Option<DateTime<Utc>>>,
}

impl Engine {
    /// Wire an engine from its constituent managers.
    pub fn new(
        config: AgentConfig,
        listener: Box<dyn ListenerManager>,
        planner: Box<dyn PlannerManager>,
        executor: Box<dyn ExecutorManager>,
    ) -> Self {
        let (event_tx, event_rx) = bounded(config.event_buffer_size);
        let (outcome_tx, outcome_rx) = bounded(config.event_buffer_size);

        let shared = EngineShared {
            listener,
            planner,
            executor,
            outcome_tx,
            counters: EngineCounters::default(),
            max_events_per_batch: config.max_events_per_batch,
            process_interval: config.process_interval,
        };

        Self {
            config,
            shared: Arc::new(shared),
            state: Mutex::new(EngineState::Created),
            shutting_down: Arc::new(AtomicBool::new(false)),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            outcome_rx,
            shutdown_tx: Mutex::new(None),
            handle: Mutex::new(None),
            started_at: Mutex::new(None),
        }
    }

    /// An engine with the default manager stack.
    pub fn with_defaults(config: AgentConfig) -> Self {
        Self::new(
            config,
            Box::new(ContextListener::new()),
            Box::new(RulePlannerManager::with_default_rules()),
            Box::new(LoggingExecutor::new()),
        )
    }

    /// Start the managers and the batching loop.
    ///
    /// Manager startup is ordered with rollback: if the executor fails to
    /// start, the already-started listener is stopped before returning.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().expect("engine lock poisoned");
        match *state {
            EngineState::Running => return Err(EngineError::AlreadyRunning),
            EngineState::Stopped => return Err(EngineError::Stopped),
            EngineState::Created => {}
        }
        if !self.config.enabled {
            return Err(EngineError::Disabled);
        }

        self.shared
            .listener
            .start()
            .map_err(|e| EngineError::ManagerStart {
                manager: "listener",
                message: e.to_string(),
            })?;

        if let Err(e) = self.shared.executor.start() {
            let _ = self.shared.listener.stop();
            return Err(EngineError::ManagerStart {
                manager: "executor",
                message: e.to_string(),
            });
        }

        let event_rx = self
            .event_rx
            .lock()
            .expect("engine lock poisoned")
            .take()
            .expect("inbound queue already taken");
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let shared = Arc::clone(&self.shared);

        let handle = thread::spawn(move || {
            shared.run(event_rx, shutdown_rx);
        });

        *self.shutdown_tx.lock().expect("engine lock poisoned") = Some(shutdown_tx);
        *self.handle.lock().expect("engine lock poisoned") = Some(handle);
        *self.started_at.lock().expect("engine lock poisoned") = Some(Utc::now());
        *state = EngineState::Running;
        info!(
            batch = self.config.max_events_per_batch,
            interval = ?self.config.process_interval,
            "engine started"
        );
        Ok(())
    }

    /// Stop the engine. Idempotent; a second call is a no-op success.
    pub fn stop(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().expect("engine lock poisoned");
        if *state != EngineState::Running {
            return Ok(());
        }

        self.shutting_down.store(true, Ordering::SeqCst);

        // Dropping the sender cancels the batching loop.
        self.shutdown_tx.lock().expect("engine lock poisoned").take();
        if let Some(handle) = self.handle.lock().expect("engine lock poisoned").take() {
            let _ = handle.join();
        }

        if let Err(e) = self.shared.listener.stop() {
            warn!("listener stop failed: {e}");
        }
        if let Err(e) = self.shared.executor.stop() {
            warn!("executor stop failed: {e}");
        }

        *state = EngineState::Stopped;
        info!("engine stopped");
        Ok(())
    }

    /// Submit an event for processing. Never blocks the caller.
    pub fn submit_event(&self, event: Event) -> Result<(), EngineError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(EngineError::ShuttingDown);
        }
        if !self.is_running() {
            return Err(EngineError::NotRunning);
        }

        match self.event_tx.try_send(event) {
            Ok(()) => {
                self.shared
                    .counters
                    .events_submitted
                    .fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(EngineError::BufferFull),
            Err(TrySendError::Disconnected(_)) => Err(EngineError::ShuttingDown),
        }
    }

    /// The outbound stream of processing outcomes.
    pub fn outcomes(&self) -> &Receiver<Outcome> {
        &self.outcome_rx
    }

    pub fn is_running(&self) -> bool {
        *self.state.lock().expect("engine lock poisoned") == EngineState::Running
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Statistics surface: engine counters plus each manager's own blob.
    pub fn stats(&self) -> Value {
        let started_at = *self.started_at.lock().expect("engine lock poisoned");
        let uptime_secs = started_at
            .map(|t| (Utc::now() - t).num_seconds().max(0))
            .unwrap_or(0);
        let counters = &self.shared.counters;

        json!({
            "running": self.is_running(),
            "enabled": self.config.enabled,
            "start_time": started_at,
            "uptime_secs": uptime_secs,
            "events_submitted": counters.events_submitted.load(Ordering::Relaxed),
            "events_processed": counters.events_processed.load(Ordering::Relaxed),
            "events_failed": counters.events_failed.load(Ordering::Relaxed),
            "batches_processed": counters.batches_processed.load(Ordering::Relaxed),
            "listener_stats": self.shared.listener.stats(),
            "planner_stats": self.shared.planner.stats(),
            "executor_stats": self.shared.executor.stats(),
        })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl EngineShared {
    /// The batching loop: reacts to cancellation, inbound events, and the
    /// periodic timer.
    fn run(self: Arc<Self>, event_rx: Receiver<Event>, shutdown_rx: Receiver<()>) {
        let ticker = tick(self.process_interval);
        let mut batch: Vec<Event> = Vec::with_capacity(self.max_events_per_batch);

        loop {
            select! {
                recv(shutdown_rx) -> _ => break,
                recv(event_rx) -> msg => {
                    match msg {
                        Ok(event) => {
                            batch.push(event);
                            if batch.len() >= self.max_events_per_batch {
                                self.process_batch(&mut batch, &shutdown_rx);
                            }
                        }
                        Err(_) => break,
                    }
                }
                recv(ticker) -> _ => {
                    if !batch.is_empty() {
                        self.process_batch(&mut batch, &shutdown_rx);
                    }
                }
            }
        }
        debug!("batching loop exited");
    }

    /// Process and clear a batch. Events are handled independently and
    /// sequentially; one failure never aborts the rest.
    fn process_batch(&self, batch: &mut Vec<Event>, shutdown_rx: &Receiver<()>) {
        self.counters
            .batches_processed
            .fetch_add(1, Ordering::Relaxed);

        for event in batch.drain(..) {
            match self.process_event(event) {
                Ok(outcome) => {
                    self.counters
                        .events_processed
                        .fetch_add(1, Ordering::Relaxed);
                    // Outbound delivery may wait on backpressure but always
                    // races the cancellation signal.
                    select! {
                        send(self.outcome_tx, outcome) -> res => {
                            if res.is_err() {
                                return;
                            }
                        }
                        recv(shutdown_rx) -> _ => return,
                    }
                }
                Err(e) => {
                    self.counters.events_failed.fetch_add(1, Ordering::Relaxed);
                    warn!("event processing failed: {e}");
                }
            }
        }
    }

    /// Analyze, plan, and optionally hand off one event.
    fn process_event(&self, mut event: Event) -> Result<Outcome, EngineError> {
        let ctx = self.listener.analyze(&event)?;
        let outcome = self.planner.plan(&event, &ctx)?;

        if outcome.decision == Decision::Execute {
            if let Some(ref intervention) = outcome.intervention {
                self.executor
                    .execute(intervention)
                    .map_err(|e| EngineError::Execute(e.to_string()))?;
            }
        }

        event.processed = true;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::event::EventType;
    use crate::planner::PlanContext;
    use std::time::Duration;

    struct StubListener {
        started: Arc<AtomicBool>,
        stopped: Arc<AtomicBool>,
        analyze_delay: Duration,
    }

    impl StubListener {
        fn new() -> Self {
            Self {
                started: Arc::new(AtomicBool::new(false)),
                stopped: Arc::new(AtomicBool::new(false)),
                analyze_delay: Duration::ZERO,
            }
        }
    }

    impl ListenerManager for StubListener {
        fn start(&self) -> Result<(), EngineError> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) -> Result<(), EngineError> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn analyze(&self, event: &Event) -> Result<PlanContext, EngineError> {
            if !self.analyze_delay.is_zero() {
                thread::sleep(self.analyze_delay);
            }
            if event.value < 0.0 {
                return Err(EngineError::Analyze("negative value".to_string()));
            }
            let mut ctx = PlanContext::new();
            ctx.insert("value".to_string(), event.value.into());
            Ok(ctx)
        }

        fn stats(&self) -> Value {
            json!({})
        }
    }

    struct StubPlanner {
        decision: Decision,
    }

    impl PlannerManager for StubPlanner {
        fn plan(&self, event: &Event, _ctx: &PlanContext) -> Result<Outcome, EngineError> {
            let intervention = (self.decision == Decision::Execute).then(|| {
                Intervention::new(InterventionType::AskCognitiveQuestion, Urgency::Low)
            });
            Ok(Outcome {
                event_id: event.id.clone(),
                intervention,
                decision: self.decision,
                reason: "stubbed".to_string(),
                confidence: event.confidence,
                timestamp: Utc::now(),
            })
        }

        fn stats(&self) -> Value {
            json!({})
        }
    }

    struct StubExecutor {
        executed: AtomicU64,
        fail_start: bool,
    }

    impl StubExecutor {
        fn new(fail_start: bool) -> Self {
            Self {
                executed: AtomicU64::new(0),
                fail_start,
            }
        }
    }

    impl ExecutorManager for StubExecutor {
        fn start(&self) -> Result<(), EngineError> {
            if self.fail_start {
                return Err(EngineError::Execute("executor init failed".to_string()));
            }
            Ok(())
        }

        fn stop(&self) -> Result<(), EngineError> {
            Ok(())
        }

        fn execute(&self, _intervention: &Intervention) -> Result<(), EngineError> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stats(&self) -> Value {
            json!({ "executed": self.executed.load(Ordering::SeqCst) })
        }
    }

    fn test_config(process_interval: Duration, max_batch: usize) -> AgentConfig {
        AgentConfig {
            process_interval,
            max_events_per_batch: max_batch,
            event_buffer_size: 16,
            ..AgentConfig::default()
        }
    }

    fn stub_engine(config: AgentConfig, decision: Decision) -> Engine {
        Engine::new(
            config,
            Box::new(StubListener::new()),
            Box::new(StubPlanner { decision }),
            Box::new(StubExecutor::new(false)),
        )
    }

    #[test]
    fn test_lifecycle_errors() {
        let engine = stub_engine(
            test_config(Duration::from_secs(5), 10),
            Decision::Ignore,
        );

        // Not started yet.
        let err = engine
            .submit_event(Event::new(EventType::IdleStart, "test", 0.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::NotRunning));

        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::AlreadyRunning)));

        engine.stop().unwrap();
        engine.stop().unwrap(); // idempotent

        // Terminal: a stopped engine is not restartable.
        assert!(matches!(engine.start(), Err(EngineError::Stopped)));
        let err = engine
            .submit_event(Event::new(EventType::IdleStart, "test", 0.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::ShuttingDown));
    }

    #[test]
    fn test_disabled_engine_does_not_start() {
        let mut config = test_config(Duration::from_secs(5), 10);
        config.enabled = false;
        let engine = stub_engine(config, Decision::Ignore);
        assert!(matches!(engine.start(), Err(EngineError::Disabled)));
    }

    #[test]
    fn test_start_rolls_back_listener_on_executor_failure() {
        let listener = StubListener::new();
        let started = Arc::clone(&listener.started);
        let stopped = Arc::clone(&listener.stopped);
        let engine = Engine::new(
            test_config(Duration::from_secs(5), 10),
            Box::new(listener),
            Box::new(StubPlanner {
                decision: Decision::Ignore,
            }),
            Box::new(StubExecutor::new(true)),
        );

        let err = engine.start().unwrap_err();
        assert!(matches!(
            err,
            EngineError::ManagerStart {
                manager: "executor",
                ..
            }
        ));
        assert!(started.load(Ordering::SeqCst));
        assert!(stopped.load(Ordering::SeqCst));
        assert!(!engine.is_running());
    }

    #[test]
    fn test_full_batch_flushes_immediately() {
        // Timer far in the future: only the size trigger can flush.
        let engine = stub_engine(test_config(Duration::from_secs(3600), 3), Decision::Execute);
        engine.start().unwrap();

        for i in 0..3 {
            engine
                .submit_event(Event::new(EventType::CpuWarning, "test", 0.7 + i as f64 / 100.0))
                .unwrap();
        }

        for _ in 0..3 {
            let outcome = engine
                .outcomes()
                .recv_timeout(Duration::from_secs(2))
                .expect("outcome not delivered by size-triggered flush");
            assert_eq!(outcome.decision, Decision::Execute);
            assert!(outcome.intervention.is_some());
        }

        engine.stop().unwrap();
    }

    #[test]
    fn test_timer_flushes_partial_batch() {
        let engine = stub_engine(
            test_config(Duration::from_millis(50), 100),
            Decision::Ignore,
        );
        engine.start().unwrap();

        engine
            .submit_event(Event::new(EventType::KeyboardBurst, "test", 0.8))
            .unwrap();
        engine
            .submit_event(Event::new(EventType::KeyboardBurst, "test", 0.9))
            .unwrap();

        for _ in 0..2 {
            let outcome = engine
                .outcomes()
                .recv_timeout(Duration::from_secs(2))
                .expect("outcome not delivered by time-triggered flush");
            assert_eq!(outcome.decision, Decision::Ignore);
        }

        let stats = engine.stats();
        assert_eq!(stats["events_submitted"].as_u64(), Some(2));
        assert_eq!(stats["events_processed"].as_u64(), Some(2));
        assert_eq!(stats["events_failed"].as_u64(), Some(0));

        engine.stop().unwrap();
    }

    #[test]
    fn test_per_event_failure_does_not_abort_batch() {
        let engine = stub_engine(
            test_config(Duration::from_millis(50), 100),
            Decision::Ignore,
        );
        engine.start().unwrap();

        // The stub listener rejects negative values.
        engine
            .submit_event(Event::new(EventType::SystemLoad, "test", -1.0))
            .unwrap();
        engine
            .submit_event(Event::new(EventType::SystemLoad, "test", 0.5))
            .unwrap();

        let outcome = engine
            .outcomes()
            .recv_timeout(Duration::from_secs(2))
            .expect("surviving event not processed");
        assert_eq!(outcome.decision, Decision::Ignore);

        let stats = engine.stats();
        assert_eq!(stats["events_failed"].as_u64(), Some(1));
        assert_eq!(stats["events_processed"].as_u64(), Some(1));

        engine.stop().unwrap();
    }

    #[test]
    fn test_outcomes_preserve_submission_order() {
        let engine = stub_engine(
            test_config(Duration::from_millis(50), 100),
            Decision::Ignore,
        );
        engine.start().unwrap();

        let mut ids = Vec::new();
        for _ in 0..5 {
            let event = Event::new(EventType::MouseRapid, "test", 0.2);
            ids.push(event.id.clone());
            engine.submit_event(event).unwrap();
        }

        for expected in &ids {
            let outcome = engine
                .outcomes()
                .recv_timeout(Duration::from_secs(2))
                .expect("outcome missing");
            assert_eq!(&outcome.event_id, expected);
        }

        engine.stop().unwrap();
    }

    #[test]
    fn test_buffer_full_rejects_submission() {
        // Batch size 1 means every drained event is processed immediately,
        // and the slow analyze keeps the loop busy while we flood the queue.
        let mut config = test_config(Duration::from_secs(3600), 1);
        config.event_buffer_size = 2;
        let listener = StubListener {
            analyze_delay: Duration::from_millis(500),
            ..StubListener::new()
        };
        let engine = Engine::new(
            config,
            Box::new(listener),
            Box::new(StubPlanner {
                decision: Decision::Ignore,
            }),
            Box::new(StubExecutor::new(false)),
        );
        engine.start().unwrap();

        // The loop can drain at most one event before it parks in analyze;
        // five rapid submissions must overflow a two-slot queue.
        let mut rejected = false;
        for _ in 0..5 {
            match engine.submit_event(Event::new(EventType::IdleStart, "test", 0.0)) {
                Ok(()) => {}
                Err(EngineError::BufferFull) => {
                    rejected = true;
                    break;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(rejected, "full buffer never rejected a submission");

        engine.stop().unwrap();
    }
}
