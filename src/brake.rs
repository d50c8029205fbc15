//! Pre-trajectory for a current state that lies outside the limits.
//!
//! A state whose acceleration exceeds its limit, or whose velocity would
//! overshoot the velocity limit while the acceleration is ramped to zero,
//! cannot be handled by the regular profile family. The brake first pulls the
//! acceleration back to the limit and then changes the velocity to the
//! nearest admissible value with zero acceleration. Limits may be violated
//! during the brake itself; that is unavoidable from such a state.

use crate::constraints::Constraints;
use crate::segment::Segment;
use crate::state::KinematicState;
use crate::velocity_change::{safe_t, VelocityChange};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Brake {
    /// Jerk pulling the acceleration back towards its limits.
    pub jerk: f64,
    /// Duration of the acceleration ramp.
    pub ramp: f64,
    /// Acceleration at the end of the ramp.
    pub acc_limit: f64,
    /// Velocity change following the ramp, if the velocity needs one.
    pub change: Option<VelocityChange>,
    pub duration: f64,
}

impl Brake {
    /// Slack on the limit checks, keeps states sitting exactly on a limit
    /// from triggering a brake.
    const TOLERANCE: f64 = 1e-9;

    /// True when `state` cannot be planned from without braking first.
    pub fn is_required(state: &KinematicState, constraints: &Constraints) -> bool {
        let (a_min, a_max) = constraints.acceleration_bounds();
        let (v_min, v_max) = constraints.velocity_bounds();
        let acc = state.acceleration;
        if acc > a_max + Self::TOLERANCE || acc < a_min - Self::TOLERANCE {
            return true;
        }
        let v_stop = constraints.velocity_at_zero_acceleration(state);
        v_stop > v_max + Self::TOLERANCE || v_stop < v_min - Self::TOLERANCE
    }

    /// Plans the brake. `None` when no velocity change can be found, which
    /// only happens for inconsistent limits.
    pub fn plan(state: &KinematicState, constraints: &Constraints) -> Option<Self> {
        let (a_min, a_max) = constraints.acceleration_bounds();
        let (v_min, v_max) = constraints.velocity_bounds();
        let jerk_max = constraints.max_jerk;
        let acc = state.acceleration;

        // 1) acceleration back onto its limit
        let (jerk, acc_limit) = if acc > a_max {
            (-jerk_max, a_max)
        } else if acc < a_min {
            (jerk_max, a_min)
        } else {
            (0.0, acc)
        };
        let ramp = if jerk != 0.0 && jerk.is_finite() {
            safe_t((acc_limit - acc) / jerk)
        } else {
            0.0
        };
        let ramped = Self::ramp_end(state, jerk, ramp, acc_limit);

        // 2) velocity back inside its limits, ending with zero acceleration
        let v_stop = constraints.velocity_at_zero_acceleration(&ramped);
        let change = if v_stop > v_max + Self::TOLERANCE || v_stop < v_min - Self::TOLERANCE {
            Some(VelocityChange::time_optimal(
                ramped.velocity,
                ramped.acceleration,
                v_stop.clamp(v_min, v_max),
                0.0,
                jerk_max,
                (a_min, a_max),
            )?)
        } else {
            None
        };

        let duration = ramp + change.map_or(0.0, |c| c.duration);
        log::trace!(
            "brake from v={:.6} a={:.6}: ramp {ramp:.6} s, total {duration:.6} s",
            state.velocity,
            state.acceleration
        );
        Some(Self {
            jerk,
            ramp,
            acc_limit,
            change,
            duration,
        })
    }

    fn ramp_end(state: &KinematicState, jerk: f64, ramp: f64, acc_limit: f64) -> KinematicState {
        let jerk = if jerk.is_finite() { jerk } else { 0.0 };
        let mut end = state.integrate(jerk, ramp);
        end.acceleration = acc_limit;
        end
    }

    /// Appends the brake segments to `out` and returns the braked state.
    pub fn append_segments(&self, start: KinematicState, out: &mut Vec<Segment>) -> KinematicState {
        let jerk = if self.jerk.is_finite() { self.jerk } else { 0.0 };
        out.push(Segment::new(jerk, self.ramp, start));
        let ramped = Self::ramp_end(&start, self.jerk, self.ramp, self.acc_limit);
        match &self.change {
            Some(change) => {
                out.extend(change.segments(ramped));
                change.end_state(ramped)
            }
            None => ramped,
        }
    }

    /// State at the end of the brake.
    pub fn end_state(&self, start: &KinematicState) -> KinematicState {
        let ramped = Self::ramp_end(start, self.jerk, self.ramp, self.acc_limit);
        match &self.change {
            Some(change) => change.end_state(ramped),
            None => ramped,
        }
    }
}
