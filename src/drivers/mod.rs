//! GPIO-level drivers: the HX710 converter and the cuff actuators.

pub mod actuator;
pub mod hx710;
pub mod pump;
pub mod valve;
