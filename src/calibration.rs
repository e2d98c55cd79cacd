//! Pressure calibration and the deflate duty policy.
//!
//! Both are produced offline by the calibration tool and loaded with the
//! engine config.  During a session they are frozen: the engine takes a
//! [`SessionLease`] from the [`CalibrationStore`] and works from an
//! `Arc<Calibration>` snapshot, and [`CalibrationStore::replace`] is refused
//! until the lease is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, SpsMode};
use crate::error::{CalibrationError, ConfigError};

// ───────────────────────────────────────────────────────────────
// Counts ↔ mmHg
// ───────────────────────────────────────────────────────────────

/// Linear counts → mmHg mapping plus the ADC options it was measured with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    /// Raw count reading at 0 mmHg (cuff open to atmosphere).
    pub offset_counts: i32,
    /// mmHg per count.  Always > 0.
    pub slope_mmhg_per_count: f64,
    /// The bridge is wired so that pressure decreases counts.
    pub adc_inverted: bool,
    pub sps_mode: SpsMode,
}

impl CalibrationParams {
    /// `(counts − offset) × slope`.
    pub fn counts_to_mmhg(&self, counts: i32) -> f64 {
        (f64::from(counts) - f64::from(self.offset_counts)) * self.slope_mmhg_per_count
    }

    /// Inverse of [`counts_to_mmhg`](Self::counts_to_mmhg), rounded to the
    /// nearest count.
    pub fn mmhg_to_counts(&self, mmhg: f64) -> i32 {
        let counts = f64::from(self.offset_counts) + mmhg / self.slope_mmhg_per_count;
        counts.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
    }
}

// ───────────────────────────────────────────────────────────────
// Deflate LUT
// ───────────────────────────────────────────────────────────────

/// Maximum number of LUT bins.
pub const LUT_CAPACITY: usize = 16;

/// One pressure bin: applies from `bin_mmhg` up to the next-higher bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LutEntry {
    /// Lower bound of the bin (mmHg).
    #[serde(rename = "bin")]
    pub bin_mmhg: f64,
    /// Valve-open duty for this bin, 0–100 %.
    pub duty: u8,
}

/// Pressure → valve duty policy.  Bins are strictly descending.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeflateLut {
    entries: heapless::Vec<LutEntry, LUT_CAPACITY>,
}

impl DeflateLut {
    /// Build from entries.  Fails if there are more than [`LUT_CAPACITY`].
    /// Call [`validate`](Self::validate) before use.
    pub fn from_entries(entries: impl IntoIterator<Item = LutEntry>) -> Result<Self, ConfigError> {
        let mut lut = Self::default();
        for e in entries {
            lut.entries.push(e).map_err(|_| {
                ConfigError::ValidationFailed("control.deflate_lut: more than 16 bins")
            })?;
        }
        Ok(lut)
    }

    pub fn entries(&self) -> &[LutEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Duty of the first entry whose bin is ≤ `pressure_mmhg`.  Below every
    /// bin the lowest bin's duty applies.  An empty table yields 100 %
    /// (valve fully open).
    pub fn lookup(&self, pressure_mmhg: f64) -> u8 {
        self.entries
            .iter()
            .find(|e| e.bin_mmhg <= pressure_mmhg)
            .or_else(|| self.entries.last())
            .map_or(100, |e| e.duty)
    }

    /// Index of the bin `pressure_mmhg` falls in (same rule as
    /// [`lookup`](Self::lookup)).
    pub fn bin_index(&self, pressure_mmhg: f64) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.bin_mmhg <= pressure_mmhg)
            .or_else(|| self.entries.len().checked_sub(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entries.is_empty() {
            return Err(ConfigError::ValidationFailed("control.deflate_lut must not be empty"));
        }
        if self.entries.iter().any(|e| e.duty > 100 || !e.bin_mmhg.is_finite()) {
            return Err(ConfigError::ValidationFailed(
                "control.deflate_lut: duty must be 0..=100 and bins finite",
            ));
        }
        if self
            .entries
            .windows(2)
            .any(|w| w[1].bin_mmhg >= w[0].bin_mmhg)
        {
            return Err(ConfigError::ValidationFailed(
                "control.deflate_lut: bins must be strictly descending",
            ));
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Calibration snapshot + store
// ───────────────────────────────────────────────────────────────

/// Everything a session needs from calibration, frozen for its duration.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub params: CalibrationParams,
    pub lut: DeflateLut,
}

impl Calibration {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            params: CalibrationParams {
                offset_counts: cfg.calibration.offset_counts,
                slope_mmhg_per_count: cfg.calibration.slope_mmhg_per_count,
                adc_inverted: cfg.calibration.adc_inverted,
                sps_mode: cfg.mode,
            },
            lut: cfg.control.deflate_lut.clone(),
        }
    }
}

/// Holds the active calibration and arbitrates updates against sessions.
#[derive(Debug)]
pub struct CalibrationStore {
    current: RwLock<Arc<Calibration>>,
    session_active: AtomicBool,
}

impl CalibrationStore {
    pub fn new(calibration: Calibration) -> Self {
        Self {
            current: RwLock::new(Arc::new(calibration)),
            session_active: AtomicBool::new(false),
        }
    }

    /// Current calibration.  Cheap: clones the `Arc`.
    pub fn snapshot(&self) -> Arc<Calibration> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install a new calibration.  Refused while a session holds the lease.
    pub fn replace(&self, calibration: Calibration) -> Result<(), CalibrationError> {
        if self.session_active.load(Ordering::Acquire) {
            return Err(CalibrationError::SessionActive);
        }
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(calibration);
        log::info!("Calibration replaced");
        Ok(())
    }

    /// Mark a session as running.  Only one lease may exist at a time.
    pub fn lease(&self) -> Result<SessionLease<'_>, CalibrationError> {
        self.session_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CalibrationError::SessionActive)?;
        Ok(SessionLease {
            store: self,
            calibration: self.snapshot(),
        })
    }

    pub fn is_session_active(&self) -> bool {
        self.session_active.load(Ordering::Acquire)
    }
}

/// Proof that a session is running; releases the store on drop.
#[derive(Debug)]
pub struct SessionLease<'a> {
    store: &'a CalibrationStore,
    calibration: Arc<Calibration>,
}

impl SessionLease<'_> {
    /// The calibration frozen when the lease was taken.
    pub fn calibration(&self) -> &Arc<Calibration> {
        &self.calibration
    }
}

impl Drop for SessionLease<'_> {
    fn drop(&mut self) {
        self.store.session_active.store(false, Ordering::Release);
    }
}
