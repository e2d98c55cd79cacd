//! Engine configuration.
//!
//! Loaded once at startup from YAML (or JSON), validated, and then treated
//! as read-only.  Invalid values (non-positive slope, unordered LUT bins,
//! target above the soft limit, ...) fail at load time with
//! [`ConfigError::ValidationFailed`] rather than mid-session.
//!
//! ```yaml
//! gpio: { dout: 5, sck: 6, pump: 17, valve: 27 }
//! mode: 40sps
//! read_timeout_ms: 500
//! calibration: { offset_counts: 120000, slope_mmhg_per_count: 0.0001, adc_inverted: false }
//! control:
//!   inflate_target_mmhg: 170
//!   ...
//!   deflate_lut: [ { bin: 160, duty: 18 }, { bin: 140, duty: 20 } ]
//! estimate: { sys_frac: 0.55, dia_frac: 0.80 }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calibration::{DeflateLut, LutEntry};
use crate::drivers::hx710::Mode;
use crate::error::ConfigError;
use crate::pins;

// ───────────────────────────────────────────────────────────────
// Sections
// ───────────────────────────────────────────────────────────────

/// GPIO line numbers (BCM).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpioConfig {
    pub dout: u8,
    pub sck: u8,
    #[serde(default = "default_pump_gpio")]
    pub pump: u8,
    #[serde(default = "default_valve_gpio")]
    pub valve: u8,
}

fn default_pump_gpio() -> u8 {
    pins::PUMP_GPIO
}

fn default_valve_gpio() -> u8 {
    pins::VALVE_GPIO
}

/// HX710 output data rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpsMode {
    #[serde(rename = "10sps")]
    Sps10,
    #[default]
    #[serde(rename = "40sps")]
    Sps40,
}

impl SpsMode {
    /// Differential-input ADC mode for this data rate.
    pub fn adc_mode(self) -> Mode {
        match self {
            Self::Sps10 => Mode::Diff10Hz,
            Self::Sps40 => Mode::Diff40Hz,
        }
    }

    /// Nominal samples per second.
    pub fn rate_hz(self) -> f64 {
        match self {
            Self::Sps10 => 10.0,
            Self::Sps40 => 40.0,
        }
    }
}

/// Counts → mmHg conversion, written by the offline calibration tool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSection {
    pub offset_counts: i32,
    pub slope_mmhg_per_count: f64,
    #[serde(default)]
    pub adc_inverted: bool,
}

/// Inflate / deflate control-loop parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    // --- Inflate ---
    /// Pressure at which inflation stops (mmHg).
    pub inflate_target_mmhg: f64,
    /// Any reading at or above this aborts the session (mmHg).
    pub inflate_soft_limit_mmhg: f64,
    /// Maximum time to reach the target (s).
    pub inflate_timeout_s: f64,
    /// Equilibration wait between inflate and deflate (s).
    pub inflate_grace_s: f64,
    /// Length of one pump burst (s).
    pub inflate_pulse_s: f64,
    /// Inflation stops once pressure ≥ target − hysteresis (mmHg).
    #[serde(default = "default_hysteresis")]
    pub inflate_hysteresis_mmhg: f64,

    // --- Deflate ---
    /// Valve PWM period (s).  One trace sample is recorded per period.
    pub deflate_pwm_period_s: f64,
    /// Maximum deflate duration (s).
    pub deflate_timeout_s: f64,
    /// Deflation ends below this pressure (mmHg).
    #[serde(default = "default_cutoff")]
    pub deflate_cutoff_mmhg: f64,
    /// Pressure → valve duty policy, bins strictly descending.
    pub deflate_lut: DeflateLut,

    // --- Sensor ---
    /// Consecutive bad reads (timeout or saturated) tolerated before abort.
    #[serde(default = "default_read_retries")]
    pub max_read_retries: u32,
}

fn default_hysteresis() -> f64 {
    2.0
}

fn default_cutoff() -> f64 {
    40.0
}

fn default_read_retries() -> u32 {
    3
}

/// Signal-processor tuning.
///
/// `sys_frac` and `dia_frac` have no serde default: they are fitted per
/// device and cuff against a reference sphygmomanometer and must come from
/// the deployment's config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimateConfig {
    /// SYS threshold as a fraction of the peak envelope amplitude.
    pub sys_frac: f64,
    /// DIA threshold as a fraction of the peak envelope amplitude.
    pub dia_frac: f64,
    /// Bandpass lower edge (Hz).
    #[serde(default = "default_passband_low")]
    pub passband_low_hz: f64,
    /// Bandpass upper edge (Hz), clamped to 0.45 × sample rate.
    #[serde(default = "default_passband_high")]
    pub passband_high_hz: f64,
    /// Savitzky–Golay polynomial degree for envelope smoothing.
    #[serde(default = "default_savgol_degree")]
    pub savgol_degree: usize,
    /// Envelope peaks below this are treated as "no oscillations" (mmHg).
    #[serde(default = "default_min_peak")]
    pub min_peak_amplitude_mmhg: f64,
    #[serde(default = "default_min_pp")]
    pub min_pulse_pressure_mmhg: f64,
    #[serde(default = "default_max_pp")]
    pub max_pulse_pressure_mmhg: f64,
    /// Runs shorter than this are rejected without analysis.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

fn default_passband_low() -> f64 {
    0.5
}

fn default_passband_high() -> f64 {
    5.0
}

fn default_savgol_degree() -> usize {
    2
}

fn default_min_peak() -> f64 {
    0.1
}

fn default_min_pp() -> f64 {
    20.0
}

fn default_max_pp() -> f64 {
    80.0
}

fn default_min_samples() -> usize {
    32
}

impl Default for EstimateConfig {
    fn default() -> Self {
        Self {
            sys_frac: 0.55,
            dia_frac: 0.80,
            passband_low_hz: default_passband_low(),
            passband_high_hz: default_passband_high(),
            savgol_degree: default_savgol_degree(),
            min_peak_amplitude_mmhg: default_min_peak(),
            min_pulse_pressure_mmhg: default_min_pp(),
            max_pulse_pressure_mmhg: default_max_pp(),
            min_samples: default_min_samples(),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// EngineConfig
// ───────────────────────────────────────────────────────────────

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub gpio: GpioConfig,
    pub mode: SpsMode,
    pub read_timeout_ms: u32,
    pub calibration: CalibrationSection,
    pub control: ControlConfig,
    pub estimate: EstimateConfig,
}

impl Default for EngineConfig {
    /// Bench defaults matched to the built-in cuff simulator.  Real devices
    /// load measured values from their config file.
    fn default() -> Self {
        let lut = [
            (160.0, 18),
            (140.0, 20),
            (120.0, 23),
            (100.0, 27),
            (80.0, 33),
            (60.0, 43),
            (40.0, 60),
        ]
        .into_iter()
        .map(|(bin_mmhg, duty)| LutEntry { bin_mmhg, duty });

        Self {
            gpio: GpioConfig {
                dout: pins::ADC_DOUT_GPIO,
                sck: pins::ADC_SCK_GPIO,
                pump: pins::PUMP_GPIO,
                valve: pins::VALVE_GPIO,
            },
            mode: SpsMode::Sps40,
            read_timeout_ms: 500,
            calibration: CalibrationSection {
                offset_counts: 120_000,
                slope_mmhg_per_count: 1.0e-4,
                adc_inverted: false,
            },
            control: ControlConfig {
                inflate_target_mmhg: 170.0,
                inflate_soft_limit_mmhg: 250.0,
                inflate_timeout_s: 30.0,
                inflate_grace_s: 1.0,
                inflate_pulse_s: 0.3,
                inflate_hysteresis_mmhg: default_hysteresis(),
                deflate_pwm_period_s: 0.05,
                deflate_timeout_s: 120.0,
                deflate_cutoff_mmhg: default_cutoff(),
                // Seven bins always fit.
                deflate_lut: DeflateLut::from_entries(lut).unwrap_or_default(),
                max_read_retries: default_read_retries(),
            },
            estimate: EstimateConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else
    /// as YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    /// Reject values that would make a session unsafe or meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cal = &self.calibration;
        let ctl = &self.control;
        let est = &self.estimate;

        if self.gpio.dout == self.gpio.sck
            || self.gpio.pump == self.gpio.valve
            || [self.gpio.dout, self.gpio.sck].contains(&self.gpio.pump)
            || [self.gpio.dout, self.gpio.sck].contains(&self.gpio.valve)
        {
            return Err(ConfigError::ValidationFailed("gpio: lines must be distinct"));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("read_timeout_ms must be > 0"));
        }

        if !(cal.slope_mmhg_per_count.is_finite() && cal.slope_mmhg_per_count > 0.0) {
            return Err(ConfigError::ValidationFailed(
                "calibration.slope_mmhg_per_count must be > 0",
            ));
        }

        for (value, msg) in [
            (ctl.inflate_target_mmhg, "control.inflate_target_mmhg must be finite"),
            (ctl.inflate_soft_limit_mmhg, "control.inflate_soft_limit_mmhg must be finite"),
            (ctl.inflate_hysteresis_mmhg, "control.inflate_hysteresis_mmhg must be finite"),
            (ctl.deflate_cutoff_mmhg, "control.deflate_cutoff_mmhg must be finite"),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::ValidationFailed(msg));
            }
        }
        if ctl.inflate_target_mmhg <= 0.0 {
            return Err(ConfigError::ValidationFailed("control.inflate_target_mmhg must be > 0"));
        }
        if ctl.inflate_target_mmhg >= ctl.inflate_soft_limit_mmhg {
            return Err(ConfigError::ValidationFailed(
                "control.inflate_target_mmhg must be below inflate_soft_limit_mmhg",
            ));
        }
        if !(ctl.inflate_hysteresis_mmhg >= 0.0)
            || ctl.inflate_hysteresis_mmhg >= ctl.inflate_target_mmhg
        {
            return Err(ConfigError::ValidationFailed(
                "control.inflate_hysteresis_mmhg must be in [0, target)",
            ));
        }
        for (value, msg) in [
            (ctl.inflate_timeout_s, "control.inflate_timeout_s must be > 0"),
            (ctl.inflate_pulse_s, "control.inflate_pulse_s must be > 0"),
            (ctl.deflate_pwm_period_s, "control.deflate_pwm_period_s must be > 0"),
            (ctl.deflate_timeout_s, "control.deflate_timeout_s must be > 0"),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::ValidationFailed(msg));
            }
        }
        if !(ctl.inflate_grace_s.is_finite() && ctl.inflate_grace_s >= 0.0) {
            return Err(ConfigError::ValidationFailed("control.inflate_grace_s must be >= 0"));
        }
        if !(ctl.deflate_cutoff_mmhg > 0.0 && ctl.deflate_cutoff_mmhg < ctl.inflate_target_mmhg) {
            return Err(ConfigError::ValidationFailed(
                "control.deflate_cutoff_mmhg must be in (0, inflate_target_mmhg)",
            ));
        }
        ctl.deflate_lut.validate()?;

        for (value, msg) in [
            (est.passband_low_hz, "estimate.passband_low_hz must be finite"),
            (est.passband_high_hz, "estimate.passband_high_hz must be finite"),
            (est.min_peak_amplitude_mmhg, "estimate.min_peak_amplitude_mmhg must be finite"),
            (est.min_pulse_pressure_mmhg, "estimate.min_pulse_pressure_mmhg must be finite"),
            (est.max_pulse_pressure_mmhg, "estimate.max_pulse_pressure_mmhg must be finite"),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::ValidationFailed(msg));
            }
        }
        if !(est.sys_frac > 0.0 && est.sys_frac < 1.0) {
            return Err(ConfigError::ValidationFailed("estimate.sys_frac must be in (0, 1)"));
        }
        if !(est.dia_frac > 0.0 && est.dia_frac < 1.0) {
            return Err(ConfigError::ValidationFailed("estimate.dia_frac must be in (0, 1)"));
        }
        if !(est.passband_low_hz > 0.0 && est.passband_low_hz < est.passband_high_hz) {
            return Err(ConfigError::ValidationFailed(
                "estimate: passband must satisfy 0 < low < high",
            ));
        }
        if est.min_peak_amplitude_mmhg < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "estimate.min_peak_amplitude_mmhg must be >= 0",
            ));
        }
        if est.savgol_degree == 0 || est.savgol_degree > 5 {
            return Err(ConfigError::ValidationFailed("estimate.savgol_degree must be in 1..=5"));
        }
        if !(est.min_pulse_pressure_mmhg >= 0.0
            && est.min_pulse_pressure_mmhg < est.max_pulse_pressure_mmhg)
        {
            return Err(ConfigError::ValidationFailed(
                "estimate: pulse-pressure bounds must satisfy 0 <= min < max",
            ));
        }
        if est.min_samples < 8 {
            return Err(ConfigError::ValidationFailed("estimate.min_samples must be >= 8"));
        }

        Ok(())
    }
}
