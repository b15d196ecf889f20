//! replay-runner: headless driver for the transaction replay sentinel.
//!
//! Usage:
//!   replay-runner --config sentinel.json
//!   replay-runner --data upi_transactions.csv --model fraud_model.json --speed fast
//!   replay-runner --realtime
//!   replay-runner --ipc-mode

use anyhow::{Context, Result};
use sentinel_core::{
    clock::{Cadence, SimPhase},
    command::ControlCommand,
    config::SentinelConfig,
    engine::{SimStatus, StreamSimulator},
    event::{ClassifiedRecord, SimEvent},
    types::{Millis, RecordId},
};
use std::env;
use std::io::{self, BufRead, Write};
use std::time::{Duration, Instant};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Advance { ms: Millis },
    Control { command: ControlCommand },
    Inspect { record_id: RecordId },
    Quit,
}

#[derive(serde::Serialize)]
struct UiState<'a> {
    status:    SimStatus,
    events:    &'a [SimEvent],
    /// Newest first, capped for the wire.
    feed:      Vec<&'a ClassifiedRecord>,
    fraud_log: Vec<&'a ClassifiedRecord>,
}

const IPC_FEED_LIMIT: usize = 50;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let realtime = args.iter().any(|a| a == "--realtime");

    let mut config = match arg_value(&args, "--config") {
        Some(path) => SentinelConfig::load(path)?,
        None => SentinelConfig::default(),
    };
    if let Some(path) = arg_value(&args, "--data") {
        config.dataset_path = path.to_string();
    }
    if let Some(path) = arg_value(&args, "--model") {
        config.model_path = path.to_string();
    }
    if let Some(speed) = arg_value(&args, "--speed") {
        config.cadence = parse_cadence(speed)
            .with_context(|| format!("unknown --speed '{speed}' (fast|normal|slow)"))?;
    }
    // Headless runs always autoplay; only the IPC front-end may start idle.
    if !ipc_mode {
        config.autoplay = true;
    }

    if !ipc_mode {
        println!("UPI Sentinel replay-runner");
        println!("  dataset:  {}", config.dataset_path);
        println!("  model:    {}", config.model_path);
        println!("  cadence:  {:?}", config.cadence);
        println!();
    }

    let mut sim = StreamSimulator::from_config(&config).with_context(|| {
        format!(
            "failed to load assets ({}, {})",
            config.dataset_path, config.model_path
        )
    })?;

    if ipc_mode {
        run_ipc_loop(&mut sim)?;
    } else if realtime {
        run_realtime(&mut sim)?;
        print_summary(&sim);
    } else {
        let events = sim.run_until_ended();
        print_events(&events);
        print_summary(&sim);
    }

    Ok(())
}

/// Map wall-clock time onto the simulator's virtual clock.
fn run_realtime(sim: &mut StreamSimulator) -> Result<()> {
    let started = Instant::now();
    let origin = sim.now();
    while sim.phase() == SimPhase::Playing {
        let Some(due) = sim.next_deadline() else { break };
        let wall_due = Duration::from_millis(due - origin);
        if let Some(wait) = wall_due.checked_sub(started.elapsed()) {
            std::thread::sleep(wait);
        }
        let now = origin + started.elapsed().as_millis() as Millis;
        let events = sim.advance_to(now);
        print_events(&events);
        io::stdout().flush()?;
    }
    Ok(())
}

fn run_ipc_loop(sim: &mut StreamSimulator) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Bad IPC command: {e}");
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        match cmd {
            IpcCommand::Quit => break,
            IpcCommand::GetState => {
                writeln!(stdout, "{}", serde_json::to_string(&build_ui_state(sim, &[]))?)?;
            }
            IpcCommand::Advance { ms } => {
                let events = sim.advance(ms);
                writeln!(stdout, "{}", serde_json::to_string(&build_ui_state(sim, &events))?)?;
            }
            IpcCommand::Control { command } => {
                let events = sim.apply(command);
                writeln!(stdout, "{}", serde_json::to_string(&build_ui_state(sim, &events))?)?;
            }
            IpcCommand::Inspect { record_id } => match sim.inspect(record_id) {
                Some(view) => writeln!(stdout, "{}", serde_json::to_string(&view)?)?,
                None => {
                    let err_json = serde_json::json!({
                        "error": format!("record {record_id} has not been emitted")
                    });
                    writeln!(stdout, "{}", err_json)?;
                }
            },
        }
        stdout.flush()?;
    }
    Ok(())
}

fn build_ui_state<'a>(sim: &'a StreamSimulator, events: &'a [SimEvent]) -> UiState<'a> {
    UiState {
        status: sim.status(),
        events,
        feed: sim.feed().iter().take(IPC_FEED_LIMIT).collect(),
        fraud_log: sim
            .fraud_log()
            .iter()
            .take(IPC_FEED_LIMIT)
            .map(|e| e.record())
            .collect(),
    }
}

fn print_events(events: &[SimEvent]) {
    for event in events {
        match event {
            SimEvent::RecordClassified { record } => {
                let marker = if record.predicted_fraud { "!!" } else { "  " };
                println!("{marker} {}", record.record);
            }
            SimEvent::FraudAlert { message, .. } => println!("   {message}"),
            SimEvent::ClassificationFailed { record_id, error, .. } => {
                println!("   record {record_id} skipped: {error}");
            }
            SimEvent::EndOfStream { .. } => println!("End of Simulation."),
            _ => {}
        }
    }
}

fn print_summary(sim: &StreamSimulator) {
    let flagged = sim.fraud_log().len();
    let confirmed = sim
        .fraud_log()
        .iter()
        .filter(|e| e.record().record.ground_truth_fraud)
        .count();
    let labelled = sim
        .dataset()
        .records()
        .iter()
        .take(sim.cursor())
        .filter(|r| r.ground_truth_fraud)
        .count();
    let emitted = sim.feed().len();
    let skipped = sim.cursor().saturating_sub(emitted);

    println!();
    println!("=== RUN SUMMARY ===");
    println!("  replayed:          {}", sim.cursor());
    println!("  emitted:           {emitted}");
    println!("  skipped:           {skipped}");
    println!("  flagged:           {flagged}");
    println!("  flagged & labelled fraud: {confirmed}");
    println!("  labelled fraud:    {labelled}");
    println!("  virtual time:      {}ms", sim.now());
}

fn parse_cadence(value: &str) -> Option<Cadence> {
    match value {
        "fast" => Some(Cadence::Fast),
        "normal" => Some(Cadence::Normal),
        "slow" => Some(Cadence::Slow),
        other => other.parse().ok().and_then(Cadence::from_level),
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
