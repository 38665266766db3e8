//! `engineer-cli` – runs the engineer manual controller against the simulated
//! robot.
//!
//! The binary:
//!
//! 1. Loads `~/.engineer/config.toml`, writing the defaults on first run.
//! 2. Reads remote-control frames as JSON lines from stdin, e.g.
//!    `{"s_r":"mid","s_l":"down","ch_l_y":0.5}` or
//!    `{"s_r":"up","keys":["ctrl","x"]}`.
//! 3. Ticks [`EngineerManual`] at `tick_hz` on the latest frame.
//! 4. Prints mode changes, step progress and alerts from the event bus.
//! 5. Intercepts **Ctrl-C**, cancels any running step queue and exits.

mod config;

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use colored::Colorize;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use engineer_hal::sim::{
    SendLog, SimBinarySender, SimChassisSender, SimControllerManager, SimVelocitySender,
};
use engineer_middleware::sim::SimStepExecutor;
use engineer_middleware::{EventBus, StepQueueClient, Topic, TopicReceiver};
use engineer_runtime::telemetry::init_tracing;
use engineer_runtime::{EngineerManual, EngineerSenders};
use engineer_types::{ChassisMode, Event, EventPayload, InputFrame, ManualError};

use config::Config;

fn main() {
    // ── Configuration ─────────────────────────────────────────────────────
    let (cfg, config_note) = match config::load() {
        Ok(Some(cfg)) => (cfg, format!("Config loaded from {}", config::config_path().display())),
        Ok(None) => {
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            let note = match config::save(&cfg) {
                Ok(()) => format!("Default config written to {}", config::config_path().display()),
                Err(e) => format!("Using default configuration ({e})"),
            };
            (cfg, note)
        }
        Err(e) => {
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            (cfg, format!("{e}; using default configuration"))
        }
    };

    // ── Structured logging ────────────────────────────────────────────────
    let _guard = init_tracing("engineer", cfg.log_format);

    print_banner();
    println!("  {config_note}");

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – returning to MANUAL and exiting …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Control loop ──────────────────────────────────────────────────────
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to start the Tokio runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cfg, shutdown)) {
        println!("{}: {e}", "Engineer error".red());
        std::process::exit(1);
    }
    println!("{}", "  ✓ Engineer stopped.".green());
}

fn print_banner() {
    println!();
    println!("{}", "  ┌─────────────────────────────────────┐".cyan());
    println!("{}", "  │   ENGINEER  –  manual controller     │".cyan().bold());
    println!("{}", "  └─────────────────────────────────────┘".cyan());
    println!(
        "  {}",
        "Feed JSON input frames on stdin; right switch down/mid/up = passive/rc/pc.".dimmed()
    );
    println!();
}

async fn run(cfg: Config, shutdown: Arc<AtomicBool>) -> Result<(), ManualError> {
    let bus = EventBus::default();
    let printer = tokio::spawn(print_events(
        bus.subscribe_to(Topic::Mode),
        bus.subscribe_to(Topic::Status),
        bus.subscribe_to(Topic::SystemAlerts),
    ));

    // ── Simulated robot ───────────────────────────────────────────────────
    let executor: SimStepExecutor = cfg.sim.step_queues.iter().fold(
        SimStepExecutor::new(
            tokio::runtime::Handle::current(),
            Duration::from_millis(cfg.sim.step_ms),
        ),
        |executor, queue| executor.with_queue(queue.name.clone(), queue.steps.clone()),
    );
    let mut queues: Vec<&str> = executor.queue_names().collect();
    queues.sort_unstable();
    info!(?queues, step_ms = cfg.sim.step_ms, "Sim executor ready");
    let client = StepQueueClient::new(Arc::new(executor), bus.clone());

    let log = SendLog::default();
    let senders = EngineerSenders {
        chassis: SimChassisSender::new("chassis", ChassisMode::Follow, log.clone()),
        vel: SimVelocitySender::new("vel", log.clone()),
        mast: SimBinarySender::new("mast", log.clone()),
        card: SimBinarySender::new("card", log),
    };
    let controllers = SimControllerManager::new(cfg.sim.calibrate_after_queries);

    let mut manual = EngineerManual::new(
        cfg.engineer_settings(),
        senders,
        Box::new(controllers),
        client,
    )?;

    // ── Remote-control frames ─────────────────────────────────────────────
    let (frame_tx, frame_rx) = watch::channel(None);
    spawn_stdin_reader(frame_tx)?;

    info!(tick_hz = cfg.tick_hz, "Engineer manual controller running");

    let start = Instant::now();
    let mut interval = tokio::time::interval(cfg.tick_period());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !shutdown.load(Ordering::SeqCst) {
        interval.tick().await;
        let frame = frame_rx
            .borrow()
            .clone()
            .unwrap_or_else(|| InputFrame::at(start));
        if let Err(e) = manual.run(&frame, Instant::now()) {
            warn!(error = %e, "Control tick failed");
        }
    }

    manual.shutdown();
    // Let the printer drain what the shutdown published.
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();
    Ok(())
}

/// Parse stdin lines into frames on a plain thread so a blocked read never
/// holds up runtime shutdown.
fn spawn_stdin_reader(frames: watch::Sender<Option<InputFrame>>) -> Result<(), ManualError> {
    std::thread::Builder::new()
        .name("engineer-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "stdin read failed");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<InputFrame>(&line) {
                    Ok(frame) => {
                        if frames.send(Some(frame)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Ignoring malformed input frame"),
                }
            }
            debug!("stdin closed");
        })
        .map(|_| ())
        .map_err(|e| ManualError::Channel(format!("Failed to spawn stdin reader: {e}")))
}

// ── Operator output ──────────────────────────────────────────────────────

async fn print_events(mut mode: TopicReceiver, mut status: TopicReceiver, mut alerts: TopicReceiver) {
    loop {
        let received = tokio::select! {
            r = mode.recv() => r,
            r = status.recv() => r,
            r = alerts.recv() => r,
        };
        match received {
            Ok(event) => println!("{}", render(&event)),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!(skipped = n, "Printer lagged behind the event bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn render(event: &Event) -> String {
    match &event.payload {
        EventPayload::ModeChanged { mode } => format!("  mode → {}", mode.to_string().bold()),
        EventPayload::Status(cmd) => format!(
            "  {} {}/{} {}",
            "step".cyan(),
            cmd.finished_step,
            cmd.total_steps,
            cmd.current_step_name.dimmed()
        ),
        EventPayload::GoalFinished {
            step_queue,
            state,
            finish,
        } => {
            let line = format!("  {step_queue} finished: {state}");
            if *finish { line.green().to_string() } else { line.yellow().to_string() }
        }
        EventPayload::SubmissionRejected { step_queue, reason } => {
            format!("  {} {step_queue}: {reason}", "rejected".red())
        }
        EventPayload::HardwareFault { component, details } => {
            format!("  {} {component}: {details}", "fault".red().bold())
        }
    }
}
