//! Oscillometric cuff blood-pressure engine.
//!
//! Drives a pump and a normally-open bleed valve to inflate a cuff and
//! deflate it at a controlled rate, digitises cuff pressure through a
//! bit-banged HX710, and extracts SYS/DIA/MAP from the oscillation
//! envelope recorded during deflation.
//!
//! ```text
//!  drivers::hx710 ─▶ sensors::pressure ─┐
//!                                       ▼
//!  app::service::Engine ── fsm (Idle → Inflating → Settling → Deflating
//!        │   ▲                 → Analyzing → Complete | Aborted)
//!        │   └── safety           │
//!        ▼                        ▼
//!  drivers::actuator            dsp ─▶ measurement::MeasurementResult
//! ```
//!
//! Hardware is reached only through `embedded-hal` pins and the
//! [`hal::Clock`] trait, so everything above the drivers runs on the host
//! against [`sim`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod calibration;
pub mod config;
pub mod control;
pub mod drivers;
pub mod dsp;
pub mod error;
pub mod fsm;
pub mod hal;
pub mod measurement;
pub mod pins;
pub mod safety;
pub mod sensors;
pub mod sim;
