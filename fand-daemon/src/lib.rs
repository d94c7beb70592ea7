//! fand server library
//!
//! The `fand` binary wires these together: [`control`] runs one thread per
//! shelf, [`server`] answers agents and operators over TCP.

pub mod control;
pub mod server;

pub use control::{build_shelves, run_shelf, spawn_shelf_threads};
pub use server::{handler_for, Handler, Server};
