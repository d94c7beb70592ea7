//! fand Core Library
//!
//! Shared building blocks of the fand server, agent and operator tool.
//!
//! # Module Structure
//!
//! - `hw/` - Hardware boundary (SMART disks, hwmon sensors and PWM channels)
//! - `engine/` - Temperature curves, devices and the shelf state machine
//! - `data/` - Configuration file
//! - `connection` - Registry of live sockets
//! - `shutdown` - Process-wide termination token
//!
//! # Example
//!
//! ```no_run
//! use fand_core::{load_config, Shelf, ShelfRegistry, SystemProbe};
//!
//! let config = load_config(None).unwrap();
//! let probe = SystemProbe::new();
//! let mut shelves = ShelfRegistry::new();
//! for shelf in &config.shelves {
//!     shelves.insert(Shelf::from_config(shelf, &probe).unwrap()).unwrap();
//! }
//! ```

// Grouped modules
pub mod data;
pub mod engine;
pub mod hw;

// Standalone modules
pub mod cli;
pub mod connection;
pub mod constants;
pub mod logging;
pub mod shutdown;
pub mod system;

pub use fand_error::{ErrorKind, FandError, Result};

pub use cli::CommonArgs;
pub use connection::{Connection, ConnectionId, ConnectionRegistry, Listener, Registered};
pub use data::{find_config_file, load_config, read_config, Config, DeviceConfig, ShelfConfig};
pub use engine::{CurveSet, Device, Shelf, ShelfRegistry, ShelfState, TemperatureCurve};
pub use hw::{Backend, CpuSensor, DeviceKind, Disk, Probe, SystemProbe};
pub use logging::{init_logging, LogSink};
pub use shutdown::Terminator;
pub use system::{local_hostname, remove_pid_file, write_pid_file};
