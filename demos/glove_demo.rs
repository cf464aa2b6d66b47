//! Demonstration of a synchronized glove and trigger recording.
//!
//! This example shows how to:
//! 1. Launch a glove recorder and a trigger listener as worker processes
//! 2. Wait for both devices to open
//! 3. Block until the first (emulated) scanner pulse
//! 4. Log stimulus onsets against the same clock
//!
//! Run with: cargo run --example glove_demo
//!
//! Uses simulated devices, so no hardware is needed. The demo binary doubles
//! as its own worker: it is re-launched with `worker --spec <path>`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use labsync::device::{PeriodicKeyboardConfig, SimulatedGloveConfig};
use labsync::session::run_worker;
use labsync::stimulus::run_schedule;
use labsync::{
    ChannelLayout, ConsolePresenter, EventLog, GloveBackend, GloveRecorder, KeyboardBackend,
    Launcher, Schedule, TriggerSync,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("labsync=info"))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("worker") {
        let Some(spec) = args.get(3) else {
            eprintln!("usage: glove_demo worker --spec <path>");
            std::process::exit(2);
        };
        let ok = run_worker(&PathBuf::from(spec)).map(|r| r.succeeded());
        std::process::exit(if matches!(ok, Ok(true)) { 0 } else { 1 });
    }

    println!("labsync - Glove Demo");
    println!("====================");
    println!();

    let out_dir = std::env::temp_dir().join("labsync-demo");
    if let Err(e) = std::fs::create_dir_all(&out_dir) {
        eprintln!("Error creating {out_dir:?}: {e}");
        return;
    }

    let launcher = match Launcher::current_exe() {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error locating demo executable: {e}");
            return;
        }
    };

    let mut glove = GloveRecorder::new(
        out_dir.join("glove.tsv"),
        "USB0",
        ChannelLayout::five_dt_14(),
        GloveBackend::Simulated(SimulatedGloveConfig::default()),
        launcher.clone(),
    );
    let mut trigger = TriggerSync::new(
        out_dir.join("TRs.tsv"),
        "s",
        KeyboardBackend::Periodic(PeriodicKeyboardConfig {
            interval_secs: 1.0,
            start_after_secs: 2.0,
            ..Default::default()
        }),
        launcher,
    );

    if let Err(e) = glove.start().and_then(|_| trigger.start()) {
        eprintln!("Error starting recorders: {e}");
        return;
    }
    let ready = glove
        .wait_ready(Duration::from_secs(5))
        .and_then(|_| trigger.wait_ready(Duration::from_secs(5)));
    if let Err(e) = ready {
        eprintln!("Recorder failed to start: {e}");
        return;
    }

    println!("Waiting for the first TR...");
    if let Err(e) = trigger.wait_until_first_tr(Duration::from_millis(1)) {
        eprintln!("No TR: {e}");
        return;
    }
    println!("Synchronized: {:?}", trigger.sync_state());
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        eprintln!("Warning: could not set Ctrl+C handler: {e}");
    }

    let schedule = Schedule {
        labels: (1..=4).map(|i| format!("image_{i}.jpeg")).collect(),
        display: Duration::from_millis(500),
    };
    let result = EventLog::create(out_dir.join("events.tsv")).and_then(|mut events| {
        run_schedule(
            &mut ConsolePresenter::stdout(),
            &schedule,
            &mut events,
            &running,
        )?;
        events.finish()
    });
    if let Err(e) = result {
        eprintln!("Stimulus loop failed: {e}");
    }

    println!();
    println!("Stopping recorders...");
    trigger.stop();
    glove.stop();

    for report in [trigger.session().report(), glove.session().report()]
        .into_iter()
        .flatten()
    {
        println!("  {}", report.summary());
    }
    println!();
    println!("Logs written to {out_dir:?}");
}
