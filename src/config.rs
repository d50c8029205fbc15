//! Engine configuration.
//!
//! # Example
//!
//! ```
//! use scurve_otg::OtgConfig;
//!
//! let config = OtgConfig::new(0.001, 6)
//!     .unwrap()
//!     .with_check_current_state(true);
//! assert_eq!(config.dof, 6);
//! assert!(OtgConfig::new(0.0, 6).is_err());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{OtgError, Result};

/// Settings of one [`Otg`](crate::Otg) instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OtgConfig {
    /// Control period in seconds; `update` advances time by this much.
    pub delta_time: f64,

    /// Number of degrees of freedom every Input must have.
    pub dof: usize,

    /// Reject inputs whose current state violates the limits instead of
    /// braking back into them.
    pub check_current_state: bool,

    /// Relative position accuracy of the numeric peak-velocity search.
    /// Less the value -> more bisection steps are used (up to a fixed depth).
    pub precision: f64,
}

impl Default for OtgConfig {
    fn default() -> Self {
        Self {
            delta_time: 0.01,
            dof: 1,
            check_current_state: false,
            precision: Self::DEFAULT_PRECISION,
        }
    }
}

impl OtgConfig {
    pub const DEFAULT_PRECISION: f64 = 1e-12;

    /// Smallest accepted precision, below f64 resolution the search cannot
    /// do better anyway.
    const MIN_PRECISION: f64 = 1e-15;

    /// Configuration for `dof` axes driven every `delta_time` seconds.
    pub fn new(delta_time: f64, dof: usize) -> Result<Self> {
        let config = Self {
            delta_time,
            dof,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_check_current_state(mut self, check: bool) -> Self {
        self.check_current_state = check;
        self
    }

    /// Sets the search precision, clamped to what f64 can resolve.
    #[must_use]
    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = if precision.is_finite() && precision > Self::MIN_PRECISION {
            precision
        } else {
            Self::MIN_PRECISION
        };
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.delta_time > 0.0 && self.delta_time.is_finite()) {
            return Err(OtgError::invalid_config(format!(
                "control period must be positive and finite, got {}",
                self.delta_time
            )));
        }
        if self.dof < 1 {
            return Err(OtgError::invalid_config(
                "at least one degree of freedom is required",
            ));
        }
        if !(self.precision > 0.0 && self.precision < 1.0) {
            return Err(OtgError::invalid_config(format!(
                "precision must be in (0, 1), got {}",
                self.precision
            )));
        }
        Ok(())
    }
}
