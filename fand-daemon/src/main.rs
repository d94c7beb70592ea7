//! fand: shelf fan control server
//!
//! Monitors the temperature of the devices in each configured shelf and
//! serves the resulting fan speed to the agents driving the fans.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use fand_core::{
    init_logging, load_config, remove_pid_file, write_pid_file, CommonArgs, ConnectionRegistry, Probe,
    SystemProbe, Terminator,
};
use fand_daemon::{build_shelves, spawn_shelf_threads, Server};
use fand_error::FandError;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "fand", version, about = "Fan control server for storage shelves")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    // PHASE 0: Log panics with their location before unwinding
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("PANIC at {}: {}", location, message);
        error!("PANIC at {}: {}", location, message);
    }));

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("fand: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    // PHASE 1: Logging
    let sink = init_logging(cli.common.level(), cli.common.logfile.as_deref(), true)?;
    info!("STARTUP: fand {} starting", VERSION);
    info!("STARTUP: Logging to {}", sink);

    // PHASE 2: PID file
    let pidfile = cli.common.pidfile.clone();
    if let Some(path) = &pidfile {
        write_pid_file(path).context("Could not write PID file")?;
    }

    let result = serve(&cli);

    // PHASE 7: Cleanup
    if let Some(path) = &pidfile {
        remove_pid_file(path);
    }
    result
}

fn serve(cli: &Cli) -> anyhow::Result<ExitCode> {
    let terminator = Terminator::new();

    // PHASE 3: Signal handlers
    let signal_terminator = terminator.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM, shutting down");
        signal_terminator.terminate(None);
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    // PHASE 4: Configuration and shelves
    let probe: Arc<dyn Probe> = Arc::new(SystemProbe::new());
    let shelves = match load_config(cli.config.as_deref()).and_then(|config| build_shelves(&config, probe.as_ref())) {
        Ok(shelves) => Arc::new(shelves),
        Err(e) => {
            error!("Error while reading configuration: {}", e);
            terminator.terminate(Some("Cannot continue without configuration".to_string()));
            return Err(anyhow::Error::new(e).context("Cannot continue without configuration"));
        }
    };

    // PHASE 5: Shelf control threads
    let workers = spawn_shelf_threads(&shelves, probe, &terminator)?;
    info!("Started {} shelf control thread(s)", workers.len());

    // PHASE 6: Serve until terminated
    let connections = ConnectionRegistry::new(terminator.clone());
    let server = Arc::new(Server::new(shelves, connections));
    let address = cli.common.address();
    let result = server
        .bind(&address, cli.common.port)
        .and_then(|listener| server.serve(listener));

    terminator.terminate(None);
    for worker in workers {
        if worker.join().is_err() {
            error!("Shelf thread panicked");
        }
    }

    match result {
        Ok(()) | Err(FandError::Terminating) => {}
        Err(e) => return Err(anyhow::Error::new(e).context(format!("Cannot serve on {}:{}", address, cli.common.port))),
    }
    match terminator.error() {
        Some(e) => {
            error!("SHUTDOWN: {}", e);
            Ok(ExitCode::FAILURE)
        }
        None => {
            info!("SHUTDOWN: fand terminated gracefully");
            Ok(ExitCode::SUCCESS)
        }
    }
}
