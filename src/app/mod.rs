//! Application core: session orchestration over port traits.
//!
//! [`service::Engine`] runs one measurement session at a time: it takes
//! the calibration lease, drives the FSM tick loop, and leaves the cuff
//! vented.  All interaction with hardware happens through the **port
//! traits** in [`ports`], so the whole loop runs against the simulator.

pub mod events;
pub mod ports;
pub mod service;
