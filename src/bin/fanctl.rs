/*
 * This file is part of fand.
 *
 * Copyright (C) 2025 fand contributors
 *
 * fand is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * fand is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with fand. If not, see <https://www.gnu.org/licenses/>.
 */

//! fanctl: query and override shelf fan speeds on a fand server

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use fand::{execute, Action};
use fand_core::{init_logging, remove_pid_file, write_pid_file, CommonArgs, ConnectionRegistry, Terminator};

#[derive(Parser, Debug)]
#[command(name = "fanctl", version, about = "Query and override fand shelf fan speeds")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    action: Action,
}

fn run(cli: &Cli, connections: &std::sync::Arc<ConnectionRegistry>) -> anyhow::Result<String> {
    let address = cli.common.address();
    let conn = connections
        .connect(&address, cli.common.port)
        .with_context(|| format!("Cannot connect to server {}:{}", address, cli.common.port))?;
    let output = execute(&conn, &cli.action).with_context(|| format!("{:?} failed", cli.action))?;
    Ok(output)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.common.level(), cli.common.logfile.as_deref(), false) {
        eprintln!("fanctl: {}", e);
        return ExitCode::FAILURE;
    }
    info!("Started with {:?}", cli);

    if let Some(path) = &cli.common.pidfile {
        if let Err(e) = write_pid_file(path) {
            eprintln!("fanctl: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let terminator = Terminator::new();
    let signal_terminator = terminator.clone();
    if let Err(e) = ctrlc::set_handler(move || signal_terminator.terminate(None)) {
        warn!("Failed to set signal handler: {}", e);
    }
    let connections = ConnectionRegistry::new(terminator.clone());

    let result = run(&cli, &connections);
    terminator.terminate(None);
    if let Some(path) = &cli.common.pidfile {
        remove_pid_file(path);
    }

    match result {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("fanctl: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
