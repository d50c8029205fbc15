use serde::{Deserialize, Serialize};

use crate::constraints::Constraints;
use crate::error::{OtgError, Result};
use crate::state::KinematicState;

/// What the target state prescribes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlInterface {
    /// Reach the full target state, position included.
    #[default]
    Position,
    /// Reach the target velocity and acceleration; position is free.
    Velocity,
}

/// How the DOFs are coordinated in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Synchronization {
    /// All DOFs arrive at the same time.
    #[default]
    Time,
    /// Every DOF moves time-optimally and coasts once it arrived.
    None,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationDiscretization {
    #[default]
    Continuous,
    /// Round the duration up to a multiple of the control period.
    Discrete,
}

/// Everything the generator needs for one cycle.
///
/// The engine compares each Input with the last one it planned for; any
/// difference (including the options) triggers a new calculation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub current: Vec<KinematicState>,
    pub target: Vec<KinematicState>,
    pub constraints: Vec<Constraints>,
    #[serde(default)]
    pub control_interface: ControlInterface,
    #[serde(default)]
    pub synchronization: Synchronization,
    #[serde(default)]
    pub duration_discretization: DurationDiscretization,
    /// Lower bound on the trajectory duration.
    #[serde(default)]
    pub minimum_duration: Option<f64>,
}

impl Input {
    /// Slack on limit checks of the current and target state.
    const TOLERANCE: f64 = 1e-12;

    /// `dof` axes at rest at zero, with default limits.
    pub fn new(dof: usize) -> Self {
        Self {
            current: vec![KinematicState::default(); dof],
            target: vec![KinematicState::default(); dof],
            constraints: vec![Constraints::default(); dof],
            ..Self::default()
        }
    }

    pub fn from_states(
        current: Vec<KinematicState>,
        target: Vec<KinematicState>,
        constraints: Vec<Constraints>,
    ) -> Self {
        Self {
            current,
            target,
            constraints,
            ..Self::default()
        }
    }

    /// Number of degrees of freedom, taken from the current state.
    pub fn dof(&self) -> usize {
        self.current.len()
    }

    // -----------------------------------------------------------------
    //  Array setters, one value per DOF
    // -----------------------------------------------------------------

    pub fn set_current_position(&mut self, values: &[f64]) {
        assign(&mut self.current, values, |s, v| s.position = v);
    }

    pub fn set_current_velocity(&mut self, values: &[f64]) {
        assign(&mut self.current, values, |s, v| s.velocity = v);
    }

    pub fn set_current_acceleration(&mut self, values: &[f64]) {
        assign(&mut self.current, values, |s, v| s.acceleration = v);
    }

    pub fn set_target_position(&mut self, values: &[f64]) {
        assign(&mut self.target, values, |s, v| s.position = v);
    }

    pub fn set_target_velocity(&mut self, values: &[f64]) {
        assign(&mut self.target, values, |s, v| s.velocity = v);
    }

    pub fn set_target_acceleration(&mut self, values: &[f64]) {
        assign(&mut self.target, values, |s, v| s.acceleration = v);
    }

    pub fn set_max_velocity(&mut self, values: &[f64]) {
        assign(&mut self.constraints, values, |c, v| c.max_velocity = v);
    }

    pub fn set_max_acceleration(&mut self, values: &[f64]) {
        assign(&mut self.constraints, values, |c, v| c.max_acceleration = v);
    }

    pub fn set_max_jerk(&mut self, values: &[f64]) {
        assign(&mut self.constraints, values, |c, v| c.max_jerk = v);
    }

    /// Checks shape, limits and, on request, the current and target state.
    ///
    /// The current state is only checked against the limits when
    /// `check_current` is set; otherwise an out-of-limit current state is
    /// braked back into them. The target check also rejects target
    /// accelerations that can only be reached by violating the velocity
    /// limits.
    pub fn validate(&self, check_current: bool, check_target: bool) -> Result<()> {
        let dof = self.dof();
        if dof == 0 {
            return Err(OtgError::invalid_input(
                "at least one degree of freedom is required",
            ));
        }
        if self.target.len() != dof {
            return Err(OtgError::dof_mismatch("target", dof, self.target.len()));
        }
        if self.constraints.len() != dof {
            return Err(OtgError::dof_mismatch(
                "constraints",
                dof,
                self.constraints.len(),
            ));
        }
        if let Some(min) = self.minimum_duration {
            if !(min >= 0.0 && min.is_finite()) {
                return Err(OtgError::invalid_input(format!(
                    "minimum duration must be non-negative and finite, got {min}"
                )));
            }
        }

        let tol = Self::TOLERANCE;
        for (i, ((current, target), limits)) in self
            .current
            .iter()
            .zip(&self.target)
            .zip(&self.constraints)
            .enumerate()
        {
            limits.validate(i)?;
            if !current.is_finite() {
                return Err(OtgError::invalid_input(format!(
                    "DOF {i}: current state is not finite"
                )));
            }
            if !target.is_finite() {
                return Err(OtgError::invalid_input(format!(
                    "DOF {i}: target state is not finite"
                )));
            }

            if check_current && !limits.contains(current, tol) {
                return Err(OtgError::invalid_input(format!(
                    "DOF {i}: current state {current:?} exceeds the limits"
                )));
            }

            if check_target {
                if !limits.contains(target, tol) {
                    return Err(OtgError::invalid_input(format!(
                        "DOF {i}: target state {target:?} exceeds the limits"
                    )));
                }
                let (v_min, v_max) = limits.velocity_bounds();
                let v_before = limits.velocity_before_acceleration(target);
                if v_before < v_min - tol || v_before > v_max + tol {
                    return Err(OtgError::invalid_input(format!(
                        "DOF {i}: target acceleration {} cannot be reached within the velocity limits",
                        target.acceleration
                    )));
                }
                if self.control_interface == ControlInterface::Position {
                    let (p_min, p_max) = limits.position_bounds();
                    if target.position < p_min || target.position > p_max {
                        return Err(OtgError::invalid_input(format!(
                            "DOF {i}: target position {} outside {p_min} .. {p_max}",
                            target.position
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Boolean form of [`validate`](Self::validate).
    pub fn is_valid(&self, check_current: bool, check_target: bool) -> bool {
        self.validate(check_current, check_target).is_ok()
    }
}

/// Replaces the per-DOF field of `items` with `values`; the vector takes
/// the length of `values`, mismatches surface in validation.
fn assign<T: Default + Clone>(items: &mut Vec<T>, values: &[f64], set: impl Fn(&mut T, f64)) {
    items.resize(values.len(), T::default());
    for (item, value) in items.iter_mut().zip(values) {
        set(item, *value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_dof() -> Input {
        let mut input = Input::new(3);
        input.set_target_position(&[1.0, 2.0, 3.0]);
        input.set_max_velocity(&[1.0, 1.0, 1.0]);
        input.set_max_acceleration(&[1.0, 1.0, 1.0]);
        input.set_max_jerk(&[1.0, 1.0, 1.0]);
        input
    }

    #[test]
    fn test_setters() {
        let mut input = three_dof();
        input.set_current_velocity(&[0.1, 0.2, 0.3]);
        assert_eq!(input.current[2].velocity, 0.3);
        assert_eq!(input.target[1].position, 2.0);
        assert!(input.is_valid(true, true));
    }

    #[test]
    fn test_mismatched_lengths() {
        let mut input = three_dof();
        input.set_target_velocity(&[0.0, 0.0]);
        assert_eq!(
            input.validate(false, false),
            Err(OtgError::dof_mismatch("target", 3, 2))
        );
    }

    #[test]
    fn test_zero_limit_is_invalid() {
        let mut input = three_dof();
        input.set_max_acceleration(&[1.0, 0.0, 1.0]);
        assert!(!input.is_valid(false, false));
    }

    #[test]
    fn test_current_state_only_checked_on_request() {
        let mut input = three_dof();
        input.set_current_velocity(&[-10.0, 0.0, 0.0]);
        assert!(input.is_valid(false, true));
        assert!(!input.is_valid(true, true));
    }

    #[test]
    fn test_target_acceleration_reachability() {
        let mut input = three_dof();
        // velocity before ramping up 1.0 acceleration: 1.0 - 0.5 = 0.5
        input.set_target_velocity(&[1.0, 0.0, 0.0]);
        input.set_target_acceleration(&[1.0, 0.0, 0.0]);
        assert!(input.is_valid(false, true));
        // -1.0 acceleration at full speed: approached from 1.5 > 1
        input.set_target_acceleration(&[-1.0, 0.0, 0.0]);
        assert!(!input.is_valid(false, true));
        assert!(input.is_valid(false, false));
    }

    #[test]
    fn test_target_position_limits() {
        let mut input = three_dof();
        input.constraints[0] = input.constraints[0].with_position_limits(-0.5, 0.5);
        assert!(!input.is_valid(false, true));
        input.control_interface = ControlInterface::Velocity;
        assert!(input.is_valid(false, true));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let input: Input = serde_json::from_value(serde_json::json!({
            "current": [{"position": 0.0, "velocity": 0.0, "acceleration": 0.0}],
            "target": [{"position": 1.0, "velocity": 0.0, "acceleration": 0.0}],
            "constraints": [{"max_velocity": 1.0, "max_acceleration": 2.0, "max_jerk": 3.0}]
        }))
        .unwrap();
        assert_eq!(input.control_interface, ControlInterface::Position);
        assert_eq!(input.synchronization, Synchronization::Time);
        assert_eq!(input.constraints[0].velocity_bounds(), (-1.0, 1.0));
        assert!(input.is_valid(true, true));
    }
}
