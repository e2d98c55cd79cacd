//! Default GPIO assignments (BCM numbering) for the cuff controller HAT.
//!
//! These are only defaults: the `gpio` section of the engine config
//! overrides every line.  Change a default here and it propagates to
//! [`EngineConfig::default`](crate::config::EngineConfig::default) and to
//! configs that omit the field.

// ---------------------------------------------------------------------------
// HX710 pressure ADC (bit-banged serial)
// ---------------------------------------------------------------------------

/// Digital input: HX710 DOUT.  LOW = conversion ready.
pub const ADC_DOUT_GPIO: u8 = 5;
/// Digital output: HX710 PD_SCK.  Held HIGH > 60 µs the chip powers down,
/// so it must idle LOW.
pub const ADC_SCK_GPIO: u8 = 6;

// ---------------------------------------------------------------------------
// Pneumatics
// ---------------------------------------------------------------------------

/// Digital output: pump MOSFET gate.  HIGH = running.
pub const PUMP_GPIO: u8 = 17;
/// Digital output: bleed-valve driver.  The valve is normally open;
/// HIGH energises the coil and closes it.  Any reset or loss of the
/// control thread leaves the line LOW and the cuff venting.
pub const VALVE_GPIO: u8 = 27;
