//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements                  | Connects to                 |
//! |------------|-----------------------------|-----------------------------|
//! | `hardware` | PressurePort, ActuatorPort  | HX710 + pump/valve drivers  |
//! | `log_sink` | EventSink                   | `log` output                |
//! | `time`     | Clock                       | `std::time::Instant`        |
//! | `gpio`     | (pin provider)              | Raspberry Pi GPIO (`rpi`)   |

#[cfg(feature = "rpi")]
pub mod gpio;
pub mod hardware;
pub mod log_sink;
pub mod time;
