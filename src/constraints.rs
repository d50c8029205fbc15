use serde::{Deserialize, Serialize};

use crate::error::{OtgError, Result};
use crate::state::KinematicState;

/// Kinematic limits of one degree of freedom.
///
/// Velocity and acceleration limits are symmetric unless `min_velocity` /
/// `min_acceleration` are given. `max_jerk` may be infinite, which turns the
/// DOF into an acceleration-limited (second order) axis; `max_acceleration`
/// may be infinite, leaving a jerk-limited axis. Not both.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Velocity limit that must never be exceeded.
    pub max_velocity: f64,
    /// Acceleration limit that must never be exceeded.
    pub max_acceleration: f64,
    /// Jerk limit that must never be exceeded.
    pub max_jerk: f64,
    /// Negative velocity bound, defaults to `-max_velocity`.
    #[serde(default)]
    pub min_velocity: Option<f64>,
    /// Negative acceleration bound, defaults to `-max_acceleration`.
    #[serde(default)]
    pub min_acceleration: Option<f64>,
    #[serde(default)]
    pub min_position: Option<f64>,
    #[serde(default)]
    pub max_position: Option<f64>,
}

impl Default for Constraints {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

impl Constraints {
    /// Symmetric limits without positional bounds.
    pub const fn new(max_velocity: f64, max_acceleration: f64, max_jerk: f64) -> Self {
        Self {
            max_velocity,
            max_acceleration,
            max_jerk,
            min_velocity: None,
            min_acceleration: None,
            min_position: None,
            max_position: None,
        }
    }

    pub fn with_min_velocity(mut self, min_velocity: f64) -> Self {
        self.min_velocity = Some(min_velocity);
        self
    }

    pub fn with_min_acceleration(mut self, min_acceleration: f64) -> Self {
        self.min_acceleration = Some(min_acceleration);
        self
    }

    pub fn with_position_limits(mut self, min_position: f64, max_position: f64) -> Self {
        self.min_position = Some(min_position);
        self.max_position = Some(max_position);
        self
    }

    /// `(min, max)` velocity.
    pub fn velocity_bounds(&self) -> (f64, f64) {
        (
            self.min_velocity.unwrap_or(-self.max_velocity),
            self.max_velocity,
        )
    }

    /// `(min, max)` acceleration.
    pub fn acceleration_bounds(&self) -> (f64, f64) {
        (
            self.min_acceleration.unwrap_or(-self.max_acceleration),
            self.max_acceleration,
        )
    }

    /// `(min, max)` position; unbounded sides are infinite.
    pub fn position_bounds(&self) -> (f64, f64) {
        (
            self.min_position.unwrap_or(f64::NEG_INFINITY),
            self.max_position.unwrap_or(f64::INFINITY),
        )
    }

    /// Checks that the limits describe a usable axis.
    pub fn validate(&self, dof: usize) -> Result<()> {
        let positive = |v: f64| v > 0.0 && !v.is_nan();
        if !(positive(self.max_velocity) && self.max_velocity.is_finite()) {
            return Err(OtgError::invalid_input(format!(
                "DOF {dof}: max velocity {} must be positive and finite",
                self.max_velocity
            )));
        }
        if !positive(self.max_acceleration) {
            return Err(OtgError::invalid_input(format!(
                "DOF {dof}: max acceleration {} must be positive",
                self.max_acceleration
            )));
        }
        if !positive(self.max_jerk) {
            return Err(OtgError::invalid_input(format!(
                "DOF {dof}: max jerk {} must be positive",
                self.max_jerk
            )));
        }
        if self.max_acceleration.is_infinite() && self.max_jerk.is_infinite() {
            return Err(OtgError::invalid_input(format!(
                "DOF {dof}: acceleration and jerk cannot both be unlimited"
            )));
        }
        if let Some(v) = self.min_velocity {
            if !(v < 0.0 && v.is_finite()) {
                return Err(OtgError::invalid_input(format!(
                    "DOF {dof}: min velocity {v} must be negative and finite"
                )));
            }
        }
        if let Some(a) = self.min_acceleration {
            if !(a < 0.0 && !a.is_nan()) {
                return Err(OtgError::invalid_input(format!(
                    "DOF {dof}: min acceleration {a} must be negative"
                )));
            }
            if a.is_infinite() && self.max_jerk.is_infinite() {
                return Err(OtgError::invalid_input(format!(
                    "DOF {dof}: acceleration and jerk cannot both be unlimited"
                )));
            }
        }
        let (p_min, p_max) = self.position_bounds();
        if p_min.is_nan() || p_max.is_nan() || p_min > p_max {
            return Err(OtgError::invalid_input(format!(
                "DOF {dof}: position limits {p_min} .. {p_max} are empty"
            )));
        }
        Ok(())
    }

    /// True when velocity and acceleration of `state` are inside the limits.
    pub fn contains(&self, state: &KinematicState, tol: f64) -> bool {
        let (v_min, v_max) = self.velocity_bounds();
        let (a_min, a_max) = self.acceleration_bounds();
        state.velocity >= v_min - tol
            && state.velocity <= v_max + tol
            && state.acceleration >= a_min - tol
            && state.acceleration <= a_max + tol
    }

    /// Velocity reached when the acceleration of `state` is ramped to zero
    /// with full jerk. Equals the current velocity for infinite jerk.
    pub fn velocity_at_zero_acceleration(&self, state: &KinematicState) -> f64 {
        if self.max_jerk.is_finite() {
            state.velocity + state.acceleration * state.acceleration.abs() / (2.0 * self.max_jerk)
        } else {
            state.velocity
        }
    }

    /// Velocity a target state must be approached from: the acceleration of
    /// the target can only be built up with full jerk.
    pub fn velocity_before_acceleration(&self, state: &KinematicState) -> f64 {
        if self.max_jerk.is_finite() {
            state.velocity - state.acceleration * state.acceleration.abs() / (2.0 * self.max_jerk)
        } else {
            state.velocity
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_default_to_symmetric() {
        let c = Constraints::new(3.0, 2.0, 1.0);
        assert_eq!(c.velocity_bounds(), (-3.0, 3.0));
        assert_eq!(c.acceleration_bounds(), (-2.0, 2.0));
        let c = c.with_min_velocity(-1.0).with_min_acceleration(-0.5);
        assert_eq!(c.velocity_bounds(), (-1.0, 3.0));
        assert_eq!(c.acceleration_bounds(), (-0.5, 2.0));
    }

    #[test]
    fn test_validate_rejects_zero_and_nan() {
        assert!(Constraints::new(1.0, 1.0, 1.0).validate(0).is_ok());
        assert!(Constraints::new(0.0, 1.0, 1.0).validate(0).is_err());
        assert!(Constraints::new(1.0, 0.0, 1.0).validate(0).is_err());
        assert!(Constraints::new(1.0, 1.0, f64::NAN).validate(0).is_err());
        assert!(Constraints::new(f64::INFINITY, 1.0, 1.0).validate(0).is_err());
        assert!(Constraints::new(1.0, 1.0, 1.0)
            .with_min_velocity(0.5)
            .validate(0)
            .is_err());
        assert!(Constraints::new(1.0, 1.0, 1.0)
            .with_position_limits(2.0, -2.0)
            .validate(0)
            .is_err());
    }

    #[test]
    fn test_infinite_limits() {
        assert!(Constraints::new(1.0, 1.0, f64::INFINITY).validate(0).is_ok());
        assert!(Constraints::new(1.0, f64::INFINITY, 1.0).validate(0).is_ok());
        assert!(Constraints::new(1.0, f64::INFINITY, f64::INFINITY)
            .validate(0)
            .is_err());
    }

    #[test]
    fn test_velocity_at_zero_acceleration() {
        let c = Constraints::new(3.0, 2.0, 4.0);
        let s = KinematicState::new(0.0, 1.0, 2.0);
        assert_eq!(c.velocity_at_zero_acceleration(&s), 1.5);
        assert_eq!(c.velocity_before_acceleration(&s), 0.5);
    }
}
