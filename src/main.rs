//! labsync CLI
//!
//! Synchronized glove, trigger, and stimulus logging for scanner experiments.

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use labsync::{
    session::run_worker, Acquisition, Clock, Config, ConsolePresenter, EventLog, GloveRecorder,
    Launcher, RecorderError, RunLayout, Schedule, VERSION,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Exit status after Ctrl+C, as a shell reports SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

const STDIN_POLL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "labsync")]
#[command(version = VERSION)]
#[command(about = "Synchronized data acquisition for scanner experiments", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one experiment block with glove and TR recording
    Run {
        /// Subject number
        #[arg(long)]
        subject: u32,

        /// Run number
        #[arg(long)]
        run: u32,

        /// Start without asking whether the scanner is ready
        #[arg(long, short)]
        yes: bool,
    },

    /// Record the glove alone until Enter or Ctrl+C
    Record {
        /// Output directory (defaults to the configured log directory)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show configuration
    Config,

    /// Print the current shared clock time
    Clock,

    /// Run a recorder worker (launched by the other commands)
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        spec: PathBuf,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { subject, run, yes } => cmd_run(cli.config.as_deref(), subject, run, yes),
        Commands::Record { output } => cmd_record(cli.config.as_deref(), output),
        Commands::Config => cmd_config(cli.config.as_deref()),
        Commands::Clock => {
            println!("{}", Clock::new().time());
            Ok(())
        }
        Commands::Worker { spec } => cmd_worker(&spec),
    };

    if let Err(e) = result {
        error!("{e:#}");
        let interrupted = matches!(
            e.downcast_ref::<RecorderError>(),
            Some(RecorderError::Interrupted)
        );
        std::process::exit(if interrupted { EXIT_INTERRUPTED } else { 1 });
    }
}

/// Log to stderr so worker output interleaves with the parent's.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("labsync=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(Config::config_path);
    Config::load_from(&path).with_context(|| format!("loading config {}", path.display()))
}

fn cmd_run(config_path: Option<&Path>, subject: u32, run: u32, yes: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let layout = RunLayout::new(&config.log_dir, subject, run);
    layout
        .create()
        .with_context(|| format!("sub-{subject:02}_run-{run:02}"))?;

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let launcher = Launcher::current_exe()?;
    let mut acquisition =
        Acquisition::start(&config, &layout, &launcher).context("starting recorders")?;
    if config.trigger.enabled {
        println!("\nListening for TRs!\n");
    }

    // A stdin trigger worker shares the terminal, so don't compete for it.
    if !yes && !config.trigger.backend.reads_stdin() {
        println!("Is the scanner ready? Press enter to begin.");
        wait_for_enter(&enter_lines()?, &running).context("waiting for confirmation")?;
    }

    info!("waiting for first TR");
    acquisition
        .wait_for_first_tr(&running)
        .context("waiting for first TR")?;

    let schedule = Schedule {
        labels: config.stimulus.labels.clone(),
        display: config.stimulus.display,
    };
    let mut events = EventLog::create(layout.events_log())?;
    let shown = labsync::stimulus::run_schedule(
        &mut ConsolePresenter::stdout(),
        &schedule,
        &mut events,
        &running,
    )?;
    events.finish()?;
    info!(shown, total = schedule.labels.len(), "block finished");

    acquisition.stop();
    for report in acquisition.reports() {
        println!("{}", report.summary());
    }
    if let Some(err) = acquisition.failure() {
        bail!("recorder failed during the run: {err}");
    }
    println!("\nRun saved to {}", layout.dir().display());
    Ok(())
}

fn cmd_record(config_path: Option<&Path>, output: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let output_dir = output.unwrap_or_else(|| config.log_dir.clone());
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    let log_path = output_dir.join(format!(
        "glove_{}.tsv",
        Local::now().format("%Y%m%d-%H%M%S")
    ));

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;
    let enter = enter_lines()?;

    let mut recorder = GloveRecorder::new(
        &log_path,
        config.glove.port.clone(),
        config.glove.channels.clone(),
        config.glove.backend.clone(),
        Launcher::current_exe()?,
    );
    recorder.start()?;
    recorder
        .wait_ready(config.ready_timeout)
        .context("starting data glove")?;
    println!("Recording glove to {}", log_path.display());
    println!("Press Enter or Ctrl+C to stop");

    let mut outcome = Ok(());
    while running.load(Ordering::SeqCst) {
        if let Err(e) = recorder.session_mut().check_alive() {
            outcome = Err(e);
            break;
        }
        // A closed stdin leaves Ctrl+C as the only way out.
        if enter.try_recv().is_ok() {
            info!("stopped from the keyboard");
            break;
        }
        thread::sleep(STDIN_POLL);
    }

    recorder.stop();
    outcome.context("glove recording")?;
    if let Some(report) = recorder.session().report() {
        println!("{}", report.summary());
    }
    Ok(())
}

fn cmd_config(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::config_path);

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", path);
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_worker(spec: &Path) -> Result<()> {
    // Ctrl+C reaches the whole process group; the parent decides when to stop.
    if let Err(e) = ctrlc::set_handler(|| {}) {
        warn!("could not ignore Ctrl+C in worker: {e}");
    }
    let report = run_worker(spec)?;
    if !report.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

/// One message per line typed on stdin, read on a background thread so the
/// caller can keep watching the Ctrl+C flag. Disconnects at end of input.
fn enter_lines() -> Result<Receiver<()>> {
    let (sender, receiver) = bounded(16);
    thread::Builder::new()
        .name("stdin-enter".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                if line.is_err() || sender.send(()).is_err() {
                    break;
                }
            }
        })
        .context("starting stdin reader")?;
    Ok(receiver)
}

/// Block until a line arrives on `enter`, or fail with `Interrupted` once
/// `running` is cleared.
fn wait_for_enter(enter: &Receiver<()>, running: &AtomicBool) -> Result<()> {
    loop {
        if !running.load(Ordering::SeqCst) {
            return Err(RecorderError::Interrupted.into());
        }
        match enter.recv_timeout(STDIN_POLL) {
            Ok(()) => return Ok(()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => bail!("stdin closed"),
        }
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")
}
