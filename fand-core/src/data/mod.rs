//! Configuration data

pub mod config;

pub use config::{
    find_config_file, load_config, read_config, resolve_config_path, Config, CurveConfig,
    DeviceConfig, ShelfConfig,
};
