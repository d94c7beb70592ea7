//! Command line options shared by every fand binary

use std::path::PathBuf;

use clap::{ArgAction, Args};
use tracing::level_filters::LevelFilter;

use crate::constants::network::DEFAULT_PORT;
use crate::system::local_hostname;

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct CommonArgs {
    /// Server address, defaults to the hostname
    #[arg(short, long)]
    pub address: Option<String>,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Increase verbosity (-v warnings, -vv info, -vvv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only report errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Append logs to this file
    #[arg(short, long)]
    pub logfile: Option<PathBuf>,

    /// Write the process ID to this file
    #[arg(short = 'P', long)]
    pub pidfile: Option<PathBuf>,
}

impl CommonArgs {
    /// Address to bind or connect to
    pub fn address(&self) -> String {
        self.address.clone().unwrap_or_else(local_hostname)
    }

    pub fn level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::ERROR;
        }
        match self.verbose {
            0 => LevelFilter::ERROR,
            1 => LevelFilter::WARN,
            2 => LevelFilter::INFO,
            _ => LevelFilter::DEBUG,
        }
    }
}
