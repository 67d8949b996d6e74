//! Vigil Agent CLI
//!
//! Behavioral monitoring and intervention engine.

use clap::{Parser, Subcommand};
use crossbeam_channel::select;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vigil_agent::{
    config::AgentConfig,
    engine::Engine,
    event::{EventBus, EventStore, MemoryEventStore},
    sensor::{default_reader, CpuSensor},
    VERSION,
};

#[derive(Parser)]
#[command(name = "vigil-agent")]
#[command(author = "Vigil")]
#[command(version = VERSION)]
#[command(about = "Behavioral monitoring and intervention engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent in the foreground
    Start,

    /// Show the resolved configuration and environment
    Status,

    /// Dump the resolved configuration as JSON
    Config,

    /// List the built-in planning rules
    Rules,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start => cmd_start(),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
        Commands::Rules => cmd_rules(),
    }
}

fn cmd_start() {
    let config = match AgentConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    info!(version = VERSION, "starting vigil agent");

    // The store keeps every signal seen on the bus this session.
    let bus = EventBus::new();
    let store = MemoryEventStore::new();
    let Some(bus_rx) = bus.subscribe_all() else {
        eprintln!("Error: event bus closed before startup");
        std::process::exit(1);
    };

    let engine = Engine::with_defaults(config.clone());
    if let Err(e) = engine.start() {
        eprintln!("Error starting engine: {e}");
        std::process::exit(1);
    }

    let reader = default_reader();
    info!(platform = reader.platform_name(), "cpu sensor platform");
    let sensor = CpuSensor::new(config.cpu.clone(), reader, config.privacy_level);
    if config.cpu.enabled {
        if let Err(e) = sensor.start() {
            warn!("cpu sensor failed to start: {e}");
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .expect("Error setting Ctrl+C handler");
    }

    info!("agent running, press Ctrl+C to stop");

    let sensor_rx = sensor.events().clone();
    let outcome_rx = engine.outcomes().clone();
    let idle = crossbeam_channel::tick(Duration::from_millis(200));

    while running.load(Ordering::SeqCst) {
        select! {
            recv(sensor_rx) -> msg => {
                let Ok(event) = msg else { break };
                if let Err(e) = bus.publish(&event) {
                    warn!("bus publish failed: {e}");
                }
                match engine.submit_event(event) {
                    Ok(()) => {}
                    Err(e) => warn!("event submission failed: {e}"),
                }
            }
            recv(bus_rx) -> msg => {
                if let Ok(event) = msg {
                    if let Err(e) = store.save(&event) {
                        warn!("event store save failed: {e}");
                    }
                }
            }
            recv(outcome_rx) -> msg => {
                if let Ok(outcome) = msg {
                    info!(
                        event = %outcome.event_id,
                        decision = %outcome.decision,
                        reason = %outcome.reason,
                        "outcome"
                    );
                }
            }
            recv(idle) -> _ => {}
        }
    }

    info!("shutting down");
    if let Err(e) = sensor.stop() {
        warn!("sensor stop failed: {e}");
    }
    if let Err(e) = engine.stop() {
        warn!("engine stop failed: {e}");
    }
    bus.close();

    println!();
    println!("Session statistics:");
    match serde_json::to_string_pretty(&engine.stats()) {
        Ok(stats) => println!("{stats}"),
        Err(e) => eprintln!("Error serializing stats: {e}"),
    }
    println!("Events stored: {}", store.len());
    println!("Bus drops: {}", bus.dropped_events());
}

fn cmd_status() {
    let config = AgentConfig::load().unwrap_or_default();
    let reader = default_reader();

    println!("Vigil Agent Status");
    println!("==================");
    println!();
    println!("Version: {VERSION}");
    println!("Platform reader: {}", reader.platform_name());
    println!();
    println!("Configuration:");
    println!("  Config file: {:?}", AgentConfig::config_path());
    println!("  Engine enabled: {}", config.enabled);
    println!(
        "  Process interval: {}s",
        config.process_interval.as_secs()
    );
    println!("  Max events per batch: {}", config.max_events_per_batch);
    println!("  Privacy level: {:?}", config.privacy_level);
    println!();
    println!("CPU sensor:");
    println!("  Enabled: {}", config.cpu.enabled);
    println!("  Sample interval: {}s", config.cpu.sample_interval.as_secs());
    println!(
        "  Thresholds: warning {:.0}%, critical {:.0}%",
        config.cpu.warning_threshold * 100.0,
        config.cpu.critical_threshold * 100.0
    );
    println!("  History size: {}", config.cpu.history_size);
}

fn cmd_config() {
    let config = AgentConfig::load().unwrap_or_default();

    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_rules() {
    let rules = vigil_agent::planner::default_rules();

    println!("Built-in rules ({}):", rules.len());
    println!();
    for rule in rules.rules() {
        println!(
            "  [{:>3}] {} -> {}",
            rule.priority, rule.name, rule.action
        );
        println!("        {}", rule.description);
    }
}
