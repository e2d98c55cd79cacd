//! Sensor subsystem.

pub mod pressure;

pub use pressure::{PressureReading, PressureSensor};
