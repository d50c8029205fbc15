use crate::segment::Segment;
use crate::state::KinematicState;

/// Durations below this are numeric noise and clamped to zero.
pub(crate) const T_MIN: f64 = 1e-12;
/// Upper bound on any duration: 1 year in seconds.
pub(crate) const T_MAX: f64 = 31556736.0;
/// Slack accepted on phase durations that come out slightly negative.
pub(crate) const T_TOL: f64 = 1e-10;

/// Ensures time `t` is within [0.0 ... T_MAX], or zero if < T_MIN
pub(crate) fn safe_t(t: f64) -> f64 {
    if t >= T_MAX {
        T_MAX
    } else if t >= T_MIN {
        t
    } else {
        0.0
    }
}

/// Jerk-limited change from one (velocity, acceleration) pair to another.
///
/// Three phases:
///  Phase1: ramp the acceleration with `jerk` up (or down) to `acc_peak`
///  Phase2: hold `acc_peak` (only when it sits on the acceleration limit)
///  Phase3: ramp with `-jerk` to `acc_exit`
///
/// With infinite jerk the ramps have zero length and the acceleration steps.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VelocityChange {
    /// Signed jerk of phase 1; phase 3 uses `-jerk`.
    pub jerk: f64,
    pub durations: [f64; 3],
    pub vel_init: f64,
    pub acc_init: f64,
    pub acc_peak: f64,
    pub acc_exit: f64,
    /// Sum of the phase durations.
    pub duration: f64,
    /// Distance covered during the change.
    pub distance: f64,
}

impl VelocityChange {
    /// A change that takes no time: the state already has `vel`, `acc`.
    pub fn hold(vel: f64, acc: f64) -> Self {
        Self::from_phases(vel, acc, acc, acc, 0.0, [0.0; 3])
    }

    /// Minimal time change from (`v_init`, `a_init`) to (`v_exit`, `a_exit`)
    /// with jerk magnitude `jerk_max` and accelerations inside `acc_bounds`
    /// (`(min, max)`, min negative).
    ///
    /// Both jerk signs and both roots of
    /// `a_peak^2 = J*dv + (a_init^2 + a_exit^2) / 2` are tried; a peak beyond
    /// the acceleration limit becomes a plateau on the limit. The shortest
    /// valid candidate wins, near-ties go to the one with fewer active
    /// phases. Returns `None` when no candidate has non-negative phase
    /// durations, which happens when `a_init` lies beyond the limit it would
    /// have to be held at.
    pub fn time_optimal(
        v_init: f64,
        a_init: f64,
        v_exit: f64,
        a_exit: f64,
        jerk_max: f64,
        acc_bounds: (f64, f64),
    ) -> Option<Self> {
        if !jerk_max.is_finite() {
            return Self::with_acceleration_steps(v_init, a_init, v_exit, a_exit, acc_bounds);
        }

        let mut best: Option<Self> = None;
        for jerk in [jerk_max, -jerk_max] {
            for peak_sign in [1.0, -1.0] {
                let Some(candidate) =
                    Self::directed(v_init, a_init, v_exit, a_exit, jerk, peak_sign, acc_bounds)
                else {
                    continue;
                };
                if best.map_or(true, |b| candidate.is_preferred_to(&b)) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    /// Change whose first phase ramps with the signed, finite `jerk`, using
    /// the root of the peak acceleration on the side of `peak_sign`.
    pub(crate) fn directed(
        v_init: f64,
        a_init: f64,
        v_exit: f64,
        a_exit: f64,
        jerk: f64,
        peak_sign: f64,
        acc_bounds: (f64, f64),
    ) -> Option<Self> {
        let dv = v_exit - v_init;
        let acc_sq = 0.5 * (a_init * a_init + a_exit * a_exit);
        let acc_lim = if jerk > 0.0 { acc_bounds.1 } else { acc_bounds.0 };
        let x = jerk * dv + acc_sq;
        let slack = 1e-12 * (1.0 + acc_sq + (jerk * dv).abs());
        if x < -slack {
            return None;
        }
        let acc_peak = peak_sign * x.max(0.0).sqrt();
        Self::with_peak(v_init, a_init, a_exit, dv, jerk, acc_peak, acc_lim)
    }

    /// A single phase ramping the acceleration from `acc_init` to
    /// `acc_exit` with `jerk`. The caller guarantees the direction matches.
    pub(crate) fn ramp(vel_init: f64, acc_init: f64, acc_exit: f64, jerk: f64) -> Self {
        let t = safe_t((acc_exit - acc_init) / jerk);
        Self::from_phases(vel_init, acc_init, acc_exit, acc_exit, jerk, [t, 0.0, 0.0])
    }

    /// Shorter than `other`, or as long within `T_MIN` but with fewer
    /// active phases.
    pub(crate) fn is_preferred_to(&self, other: &Self) -> bool {
        self.duration < other.duration - T_MIN
            || (self.duration <= other.duration + T_MIN
                && self.active_phases() < other.active_phases())
    }

    /// Builds the change around a given peak acceleration, clipping it to
    /// `acc_lim` with a constant-acceleration phase when it overshoots.
    fn with_peak(
        v_init: f64,
        a_init: f64,
        a_exit: f64,
        dv: f64,
        jerk: f64,
        acc_peak: f64,
        acc_lim: f64,
    ) -> Option<Self> {
        let overshoot = if jerk > 0.0 {
            acc_peak > acc_lim
        } else {
            acc_peak < acc_lim
        };

        let (acc_peak, t_hold) = if overshoot {
            // velocity gained on both ramps, the rest is made up at the limit
            let dv_ramps = (2.0 * acc_lim * acc_lim - a_init * a_init - a_exit * a_exit) / (2.0 * jerk);
            (acc_lim, (dv - dv_ramps) / acc_lim)
        } else {
            (acc_peak, 0.0)
        };

        let t_up = (acc_peak - a_init) / jerk;
        let t_down = (acc_peak - a_exit) / jerk;
        if !(t_up >= -T_TOL && t_hold >= -T_TOL && t_down >= -T_TOL) {
            return None;
        }

        Some(Self::from_phases(
            v_init,
            a_init,
            acc_peak,
            a_exit,
            jerk,
            [safe_t(t_up), safe_t(t_hold), safe_t(t_down)],
        ))
    }

    /// Second order change: the acceleration steps to its limit, holds it
    /// until the velocity is reached and steps to `a_exit`.
    fn with_acceleration_steps(
        v_init: f64,
        a_init: f64,
        v_exit: f64,
        a_exit: f64,
        acc_bounds: (f64, f64),
    ) -> Option<Self> {
        let dv = v_exit - v_init;
        let (acc_peak, jerk) = if dv >= 0.0 {
            (acc_bounds.1, f64::INFINITY)
        } else {
            (acc_bounds.0, f64::NEG_INFINITY)
        };
        if !acc_peak.is_finite() {
            return None;
        }
        let t_hold = safe_t(dv / acc_peak);
        Some(Self::from_phases(
            v_init,
            a_init,
            acc_peak,
            a_exit,
            jerk,
            [0.0, t_hold, 0.0],
        ))
    }

    fn from_phases(
        vel_init: f64,
        acc_init: f64,
        acc_peak: f64,
        acc_exit: f64,
        jerk: f64,
        durations: [f64; 3],
    ) -> Self {
        let mut change = Self {
            jerk,
            durations,
            vel_init,
            acc_init,
            acc_peak,
            acc_exit,
            duration: durations.iter().sum(),
            distance: 0.0,
        };
        let origin = KinematicState::new(0.0, vel_init, acc_init);
        change.distance = change.end_state(origin).position;
        change
    }

    /// The three phases as segments starting at `start`.
    ///
    /// Accelerations at the phase junctions are set to their planned values
    /// so that acceleration steps (infinite jerk) are represented exactly.
    pub fn segments(&self, start: KinematicState) -> [Segment; 3] {
        let ramp = if self.jerk.is_finite() { self.jerk } else { 0.0 };

        let mut state = KinematicState {
            acceleration: self.acc_init,
            ..start
        };
        let up = Segment::new(ramp, self.durations[0], state);

        state = up.end();
        state.acceleration = self.acc_peak;
        let hold = Segment::new(0.0, self.durations[1], state);

        state = hold.end();
        let down = Segment::new(-ramp, self.durations[2], state);

        [up, hold, down]
    }

    /// State reached at the end of the change when starting at `start`.
    pub fn end_state(&self, start: KinematicState) -> KinematicState {
        let mut state = self.segments(start)[2].end();
        state.acceleration = self.acc_exit;
        state
    }

    /// Velocity at the end of the change.
    pub fn vel_exit(&self) -> f64 {
        self.end_state(KinematicState::new(0.0, self.vel_init, self.acc_init))
            .velocity
    }

    /// Number of phases that saturate a limit (non-zero ramps and holds).
    pub fn active_phases(&self) -> usize {
        self.durations.iter().filter(|t| **t > 0.0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const ACC: (f64, f64) = (-1.0, 1.0);

    #[test]
    fn test_rest_to_velocity_without_plateau() {
        // peak acceleration sqrt(j*dv) = 1 sits exactly on the limit
        let c = VelocityChange::time_optimal(0.0, 0.0, 1.0, 0.0, 1.0, ACC).unwrap();
        assert_abs_diff_eq!(c.durations[0], 1.0, epsilon = 1e-12);
        assert_eq!(c.durations[1], 0.0);
        assert_abs_diff_eq!(c.durations[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.distance, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.vel_exit(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_plateau_on_acceleration_limit() {
        let c = VelocityChange::time_optimal(0.0, 0.0, 3.0, 0.0, 1.0, ACC).unwrap();
        assert_abs_diff_eq!(c.acc_peak, 1.0);
        assert_abs_diff_eq!(c.durations[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.durations[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.durations[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.vel_exit(), 3.0, epsilon = 1e-12);
        // average velocity 1.5 over 4 s
        assert_abs_diff_eq!(c.distance, 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_negative_change_uses_negative_jerk() {
        let c = VelocityChange::time_optimal(2.0, 0.0, 1.0, 0.0, 2.0, ACC).unwrap();
        assert!(c.jerk < 0.0);
        assert!(c.acc_peak < 0.0);
        assert_abs_diff_eq!(c.vel_exit(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_nonzero_boundary_accelerations() {
        let c = VelocityChange::time_optimal(-0.5, 0.6, 0.4, -0.3, 2.0, ACC).unwrap();
        let end = c.end_state(KinematicState::new(0.0, -0.5, 0.6));
        assert_abs_diff_eq!(end.velocity, 0.4, epsilon = 1e-9);
        assert_abs_diff_eq!(end.acceleration, -0.3);
        for seg in c.segments(KinematicState::new(0.0, -0.5, 0.6)) {
            assert!(seg.start.acceleration.abs() <= 1.0 + 1e-9);
            assert!(seg.end().acceleration.abs() <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn test_acceleration_beyond_hold_limit_is_rejected() {
        // the only way up is to hold 1.5 > max acceleration
        assert!(VelocityChange::with_peak(0.0, 1.5, 0.0, 10.0, 1.0, 1.5, 1.0).is_none());
    }

    #[test]
    fn test_infinite_jerk_steps_acceleration() {
        let c = VelocityChange::time_optimal(0.0, 0.0, 2.0, 0.0, f64::INFINITY, ACC).unwrap();
        assert_eq!(c.durations[0], 0.0);
        assert_abs_diff_eq!(c.durations[1], 2.0, epsilon = 1e-12);
        assert_eq!(c.durations[2], 0.0);
        assert_abs_diff_eq!(c.distance, 2.0, epsilon = 1e-12);
        for seg in c.segments(KinematicState::at_rest(0.0)) {
            assert!(seg.jerk.is_finite());
        }
    }

    #[test]
    fn test_directed_keeps_the_requested_jerk_sign() {
        // from a = 1 the fastest way to v = 1 ramps up; going down first is slower
        let up = VelocityChange::directed(0.0, 1.0, 1.0, 1.0, 1.0, 1.0, (-2.0, 2.0)).unwrap();
        let down = VelocityChange::directed(0.0, 1.0, 1.0, 1.0, -1.0, -1.0, (-2.0, 2.0)).unwrap();
        assert!(up.jerk > 0.0 && down.jerk < 0.0);
        assert_abs_diff_eq!(up.acc_peak, 2.0f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(down.acc_peak, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(down.duration, 2.0, epsilon = 1e-9);
        assert!(up.duration < down.duration);
        assert_abs_diff_eq!(up.vel_exit(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(down.vel_exit(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_single_ramp() {
        let c = VelocityChange::ramp(0.5, -1.0, 1.0, 2.0);
        assert_eq!(c.durations, [1.0, 0.0, 0.0]);
        assert_eq!(c.active_phases(), 1);
        // symmetric ramp through zero: no net velocity change
        assert_abs_diff_eq!(c.vel_exit(), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(c.end_state(KinematicState::at_rest(0.0)).acceleration, 1.0);
    }

    #[test]
    fn test_equal_durations_prefer_fewer_phases() {
        let ramp = VelocityChange::ramp(0.0, 0.0, 1.0, 1.0);
        let mut split = ramp;
        split.durations = [0.5, 0.0, 0.5];
        assert!(ramp.is_preferred_to(&split));
        assert!(!split.is_preferred_to(&ramp));

        let mut longer = split;
        longer.duration += 1e-6;
        assert!(!longer.is_preferred_to(&ramp));
        assert!(ramp.is_preferred_to(&longer));
    }

    #[test]
    fn test_hold_is_empty() {
        let c = VelocityChange::hold(1.0, 0.0);
        assert_eq!(c.duration, 0.0);
        assert_eq!(c.distance, 0.0);
        assert_eq!(c.active_phases(), 0);
    }

    #[test]
    fn test_safe_t() {
        assert_eq!(safe_t(-1.0), 0.0);
        assert_eq!(safe_t(1e-15), 0.0);
        assert_eq!(safe_t(0.5), 0.5);
        assert_eq!(safe_t(1e12), T_MAX);
    }
}
