//! Shelf control engine

pub mod curve;
pub mod device;
pub mod shelf;

pub use curve::{CurveSet, TemperatureCurve};
pub use device::Device;
pub use shelf::{Shelf, ShelfRegistry, ShelfState};
