//! Multi-DOF synchronization.
//!
//! 1. Every DOF is solved time-optimally on its own.
//! 2. The common duration is the longest of those, raised to the requested
//!    minimum and rounded up to the control period if asked to.
//! 3. With time synchronization every faster DOF is re-solved to last
//!    exactly as long; without it, faster DOFs coast once they arrived.
//! 4. The result is checked against the position limits.

use crate::error::{OtgError, Result};
use crate::input::{ControlInterface, DurationDiscretization, Input, Synchronization};
use crate::profile::{Profile, ProfileSolver};
use crate::segment::Segment;
use crate::state::KinematicState;
use crate::trajectory::Trajectory;
use crate::velocity_change::{T_MAX, T_MIN};

pub struct Synchronizer<'a> {
    input: &'a Input,
    delta_time: f64,
    precision: f64,
}

impl<'a> Synchronizer<'a> {
    /// Slack on the position limit check.
    const POSITION_TOLERANCE: f64 = 1e-9;

    /// Slack when rounding the duration up to whole control periods, so
    /// a duration that already is a multiple is not pushed one further.
    const DISCRETE_TOLERANCE: f64 = 1e-9;

    /// `input` is expected to be validated.
    pub fn new(input: &'a Input, delta_time: f64, precision: f64) -> Self {
        Self {
            input,
            delta_time,
            precision,
        }
    }

    pub fn synchronize(&self) -> Result<Trajectory> {
        let input = self.input;
        let interface = input.control_interface;
        let solvers: Vec<ProfileSolver<'_>> = input
            .constraints
            .iter()
            .map(|c| ProfileSolver::new(c, self.precision))
            .collect();

        // 1) time-optimal profile per DOF
        let mut optimal = Vec::with_capacity(solvers.len());
        for (dof, solver) in solvers.iter().enumerate() {
            let profile = solver
                .time_optimal(&input.current[dof], &input.target[dof], interface)
                .ok_or(OtgError::NoProfile { dof })?;
            optimal.push(profile);
        }
        let min_durations: Vec<f64> = optimal.iter().map(|p| p.duration).collect();

        // 2) common duration
        let duration = self.common_duration(&min_durations)?;

        // 3) synchronize
        let mut segments = Vec::with_capacity(optimal.len());
        let mut final_states = Vec::with_capacity(optimal.len());
        let mut shapes = Vec::with_capacity(optimal.len());
        for (dof, (solver, profile)) in solvers.iter().zip(&optimal).enumerate() {
            let current = &input.current[dof];
            let target = &input.target[dof];
            let profile = match input.synchronization {
                Synchronization::Time if duration - profile.duration > T_MIN => solver
                    .with_duration(current, target, interface, profile, duration)
                    .ok_or(OtgError::Synchronization { dof, duration })?,
                _ => *profile,
            };
            let (dof_segments, final_state) =
                Self::finish(&profile, current, target, interface, duration);
            segments.push(dof_segments);
            final_states.push(final_state);
            shapes.push(profile.shape);
        }

        let trajectory =
            Trajectory::new(segments, final_states, shapes, min_durations, duration);

        // 4) position limits
        for (dof, (extrema, limits)) in trajectory
            .position_extrema()
            .iter()
            .zip(&input.constraints)
            .enumerate()
        {
            let (p_min, p_max) = limits.position_bounds();
            if extrema.min < p_min - Self::POSITION_TOLERANCE
                || extrema.max > p_max + Self::POSITION_TOLERANCE
            {
                return Err(OtgError::PositionalLimits {
                    dof,
                    min: extrema.min,
                    max: extrema.max,
                });
            }
        }

        Ok(trajectory)
    }

    fn common_duration(&self, min_durations: &[f64]) -> Result<f64> {
        let mut duration = min_durations.iter().copied().fold(0.0, f64::max);
        if let Some(minimum) = self.input.minimum_duration {
            duration = duration.max(minimum);
        }
        if self.input.duration_discretization == DurationDiscretization::Discrete {
            let steps = (duration / self.delta_time - Self::DISCRETE_TOLERANCE).ceil();
            duration = steps.max(0.0) * self.delta_time;
        }
        if !(duration <= T_MAX) {
            return Err(OtgError::TrajectoryDuration(duration));
        }
        Ok(duration)
    }

    /// Segments of one DOF padded to `duration`, and the state it ends in.
    ///
    /// A DOF that fills the duration ends exactly on its target; one that
    /// arrives early coasts with zero jerk from where it arrived.
    fn finish(
        profile: &Profile,
        current: &KinematicState,
        target: &KinematicState,
        interface: ControlInterface,
        duration: f64,
    ) -> (Vec<Segment>, KinematicState) {
        let mut segments = profile.segments(*current);
        let end = segments.last().map_or(*current, Segment::end);

        let pad = duration - profile.duration;
        if pad > T_MIN {
            let coast = Segment::new(0.0, pad, end);
            segments.push(coast);
            return (segments, coast.end());
        }

        let position = match interface {
            ControlInterface::Position => target.position,
            ControlInterface::Velocity => end.position,
        };
        let final_state = KinematicState::new(position, target.velocity, target.acceleration);
        (segments, final_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::Constraints;
    use crate::profile::ProfileShape;
    use approx::assert_abs_diff_eq;

    const DT: f64 = 0.01;

    fn input(targets: &[f64]) -> Input {
        let dof = targets.len();
        let mut input = Input::new(dof);
        input.set_target_position(targets);
        input
    }

    fn synchronize(input: &Input) -> Result<Trajectory> {
        Synchronizer::new(input, DT, 1e-12).synchronize()
    }

    #[test]
    fn test_all_dofs_share_the_duration() {
        let traj = synchronize(&input(&[1.0, 3.0, -0.5])).unwrap();
        // DOF 1: 2 s up, 1 s cruise, 2 s down
        assert_abs_diff_eq!(traj.duration(), 5.0, epsilon = 1e-9);
        assert_eq!(traj.limiting_dof(), Some(1));
        for dof in 0..3 {
            let total: f64 = traj.segments(dof).iter().map(|s| s.duration).sum();
            assert_abs_diff_eq!(total, 5.0, epsilon = 1e-8);
            let end = traj.segments(dof).last().unwrap().end();
            assert!(end.approx_eq(&traj.final_states()[dof], 1e-8));
        }
        assert_eq!(traj.final_states()[2], KinematicState::at_rest(-0.5));
    }

    #[test]
    fn test_without_synchronization_dofs_coast() {
        let mut input = input(&[1.0, 3.0]);
        input.synchronization = Synchronization::None;
        let traj = synchronize(&input).unwrap();
        assert!(matches!(traj.shapes()[0], ProfileShape::Peak { .. }));
        // 7 profile segments and the coast
        assert_eq!(traj.segments(0).len(), 8);
        assert!(traj.independent_min_durations()[0] < 4.0);
        assert_abs_diff_eq!(traj.state_at(0, 4.0).position, 1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_discrete_duration() {
        let mut input = input(&[1.0]);
        input.duration_discretization = DurationDiscretization::Discrete;
        let traj = synchronize(&input).unwrap();
        let steps = traj.duration() / DT;
        assert_abs_diff_eq!(steps, steps.round(), epsilon = 1e-6);
        assert!(traj.duration() >= traj.independent_min_durations()[0]);
    }

    #[test]
    fn test_minimum_duration() {
        let mut input = input(&[1.0, 0.0]);
        input.minimum_duration = Some(8.0);
        let traj = synchronize(&input).unwrap();
        assert_eq!(traj.duration(), 8.0);
        assert_eq!(traj.final_states()[1], KinematicState::at_rest(0.0));
        assert_abs_diff_eq!(traj.state_at(0, 8.0 - 1e-6).position, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_position_limits_violated() {
        // the shortest stop from full speed takes 0.958 before turning back
        let mut input = input(&[0.9]);
        input.current[0] = KinematicState::new(0.0, 1.0, 0.0);
        input.constraints[0] = Constraints::new(1.0, 1.0, 1.0).with_position_limits(-1.0, 0.95);
        let err = synchronize(&input).unwrap_err();
        assert!(matches!(err, OtgError::PositionalLimits { dof: 0, .. }));
    }

    #[test]
    fn test_velocity_interface_final_position_is_free() {
        let mut input = input(&[100.0]);
        input.control_interface = ControlInterface::Velocity;
        input.target[0].velocity = 0.5;
        let traj = synchronize(&input).unwrap();
        let end = traj.final_states()[0];
        assert_eq!(end.velocity, 0.5);
        assert!(end.position < 100.0);
    }
}
