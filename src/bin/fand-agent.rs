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

//! fand-agent: drive one shelf fan from the fand server

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use fand::{Agent, AgentSettings, HwmonPwm, HwmonTach};
use fand_core::{
    init_logging, local_hostname, remove_pid_file, write_pid_file, CommonArgs, ConnectionRegistry, Terminator,
};

#[derive(Parser, Debug)]
#[command(name = "fand-agent", version, about = "Apply the shelf PWM from fand and report the fan RPM")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Shelf name, defaults to the hostname
    name: Option<String>,

    /// hwmon PWM channel, e.g. /sys/class/hwmon/hwmon2/pwm1
    #[arg(long)]
    pwm: PathBuf,

    /// hwmon tachometer, e.g. /sys/class/hwmon/hwmon2/fan1_input
    #[arg(long)]
    rpm: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.common.level(), cli.common.logfile.as_deref(), false) {
        eprintln!("fand-agent: {}", e);
        return ExitCode::FAILURE;
    }
    info!("Started with {:?}", cli);

    if let Some(path) = &cli.common.pidfile {
        if let Err(e) = write_pid_file(path) {
            eprintln!("fand-agent: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let terminator = Terminator::new();
    let signal_terminator = terminator.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received SIGINT/SIGTERM, shutting down");
        signal_terminator.terminate(None);
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    let shelf = cli.name.clone().unwrap_or_else(local_hostname);
    let settings = AgentSettings::new(shelf, cli.common.address(), cli.common.port);
    let connections = ConnectionRegistry::new(terminator.clone());
    let mut agent = Agent::new(settings, HwmonPwm::new(&cli.pwm), HwmonTach::new(&cli.rpm), connections);

    let result = agent.run();
    terminator.terminate(None);
    if let Some(path) = &cli.common.pidfile {
        remove_pid_file(path);
    }

    match (result, terminator.error()) {
        (Ok(()), None) => ExitCode::SUCCESS,
        (Err(e), _) => {
            error!("{}", e);
            eprintln!("fand-agent: {}", e);
            ExitCode::FAILURE
        }
        (Ok(()), Some(reason)) => {
            eprintln!("fand-agent: {}", reason);
            ExitCode::FAILURE
        }
    }
}
