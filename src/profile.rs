//! Single-DOF profiles.
//!
//! A position profile is built from two velocity changes around a peak
//! velocity `vp` where the acceleration is zero:
//!
//!  (brake) -> accel: current -> (vp, 0) -> cruise at vp -> decel: (vp, 0) -> target
//!
//! When a boundary acceleration is non-zero the fastest motion may never
//! pass through zero acceleration. Those profiles join at a junction
//! acceleration `aj` instead, and the last stage is a single ramp:
//!
//!  (brake) -> accel: current -> (vj, aj) -> coast at aj -> ramp: aj -> target
//!
//! The time-optimal profile is the shortest member of both families which
//! covers the distance. The fixed-duration profile keeps the family and
//! trades the junction against cruise (or coast) time until it lasts exactly
//! as long as requested.

use serde::{Deserialize, Serialize};

use crate::brake::Brake;
use crate::constraints::Constraints;
use crate::input::ControlInterface;
use crate::segment::Segment;
use crate::state::KinematicState;
use crate::velocity_change::{safe_t, VelocityChange, T_MIN, T_TOL};

/// Which member of the profile family was chosen.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProfileShape {
    /// Already at the target, nothing to do.
    Hold,
    /// Single velocity change (velocity interface).
    VelocityChange,
    /// Ramp to a peak velocity and straight back down, no cruise.
    Peak { velocity: f64 },
    /// Ramp to `velocity`, cruise for `duration`, ramp to the target.
    Cruise { velocity: f64, duration: f64 },
    /// Ramp up and back down towards `acceleration` without it changing
    /// sign, coast from `velocity` at that acceleration, one last ramp to
    /// the target.
    Ramps { velocity: f64, acceleration: f64 },
}

/// One DOF worth of motion, relative to the state it was planned from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Profile {
    pub shape: ProfileShape,
    pub brake: Option<Brake>,
    pub accel: VelocityChange,
    /// Zero-jerk phase between `accel` and `decel`.
    pub cruise: f64,
    /// Second velocity change, a single ramp for `Ramps`.
    pub decel: VelocityChange,
    pub duration: f64,
}

impl Profile {
    fn new(
        shape: ProfileShape,
        brake: Option<Brake>,
        accel: VelocityChange,
        cruise: f64,
        decel: VelocityChange,
    ) -> Self {
        let brake_duration = brake.map_or(0.0, |b| b.duration);
        Self {
            shape,
            brake,
            accel,
            cruise,
            decel,
            duration: brake_duration + accel.duration + cruise + decel.duration,
        }
    }

    fn hold(state: &KinematicState) -> Self {
        let hold = VelocityChange::hold(state.velocity, state.acceleration);
        Self::new(ProfileShape::Hold, None, hold, 0.0, hold)
    }

    pub fn brake_duration(&self) -> f64 {
        self.brake.map_or(0.0, |b| b.duration)
    }

    /// Velocity at the junction of the two velocity changes, for the shapes
    /// that have one.
    pub fn peak_velocity(&self) -> Option<f64> {
        match self.shape {
            ProfileShape::Peak { velocity } | ProfileShape::Cruise { velocity, .. } => {
                Some(velocity)
            }
            ProfileShape::Hold | ProfileShape::VelocityChange | ProfileShape::Ramps { .. } => None,
        }
    }

    /// Phases with non-zero duration, brake excluded.
    pub fn active_phases(&self) -> usize {
        self.accel.active_phases() + usize::from(self.cruise > 0.0) + self.decel.active_phases()
    }

    /// Shorter than `other`, or as long within `T_MIN` but simpler.
    fn is_preferred_to(&self, other: &Self) -> bool {
        self.duration < other.duration - T_MIN
            || (self.duration <= other.duration + T_MIN
                && self.active_phases() < other.active_phases())
    }

    /// Constant-jerk segments of the profile starting at `current`.
    ///
    /// Always 7 segments (3 accel, 1 cruise, 3 decel), zero-length ones
    /// included, preceded by the brake segments if there is a brake.
    pub fn segments(&self, current: KinematicState) -> Vec<Segment> {
        let mut out = Vec::with_capacity(11);
        let start = match &self.brake {
            Some(brake) => brake.append_segments(current, &mut out),
            None => current,
        };

        out.extend(self.accel.segments(start));
        let cruise = Segment::new(0.0, self.cruise, self.accel.end_state(start));
        out.push(cruise);
        out.extend(self.decel.segments(cruise.end()));
        out
    }

    /// State at the end of the profile.
    pub fn end_state(&self, current: KinematicState) -> KinematicState {
        self.segments(current)
            .last()
            .map_or(current, |seg| seg.end())
    }
}

/// Grid resolution used to bracket roots before bisection.
const SCAN_INTERVALS: usize = 48;

/// Root candidates found by one scan, at most one per grid point.
#[derive(Clone, Copy, Debug)]
struct Roots {
    values: [f64; SCAN_INTERVALS + 1],
    len: usize,
}

impl Default for Roots {
    fn default() -> Self {
        Self {
            values: [0.0; SCAN_INTERVALS + 1],
            len: 0,
        }
    }
}

impl Roots {
    fn push(&mut self, value: f64) {
        if self.len < self.values.len() {
            self.values[self.len] = value;
            self.len += 1;
        }
    }

    fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values[..self.len].iter().copied()
    }
}

/// Solves profiles for one DOF under fixed limits.
#[derive(Clone, Copy, Debug)]
pub struct ProfileSolver<'a> {
    constraints: &'a Constraints,
    jerk: f64,
    /// (min, max) velocity
    vel: (f64, f64),
    /// (min, max) acceleration
    acc: (f64, f64),
    /// Relative position accuracy of the root searches.
    precision: f64,
}

impl<'a> ProfileSolver<'a> {
    // Depth of binary search used for numeric approximation
    const BINARY_SEARCH_DEPTH: usize = 100;

    /// States closer than this count as equal.
    const STATE_TOLERANCE: f64 = 1e-12;

    /// Slack on the velocity limits of a candidate.
    const VELOCITY_TOLERANCE: f64 = 1e-9;

    /// Accepted mismatch of a fixed-duration profile once the search ran out.
    const DURATION_TOLERANCE: f64 = 1e-9;

    pub fn new(constraints: &'a Constraints, precision: f64) -> Self {
        Self {
            constraints,
            jerk: constraints.max_jerk,
            vel: constraints.velocity_bounds(),
            acc: constraints.acceleration_bounds(),
            precision,
        }
    }

    /// Shortest profile from `current` to `target`.
    ///
    /// `None` when no member of the family reaches the target, which valid
    /// inputs only run into through numeric failure.
    pub fn time_optimal(
        &self,
        current: &KinematicState,
        target: &KinematicState,
        interface: ControlInterface,
    ) -> Option<Profile> {
        let brake = self.brake(current)?;
        let start = brake.map_or(*current, |b| b.end_state(current));

        match interface {
            ControlInterface::Position => {
                if brake.is_none() && current.approx_eq(target, Self::STATE_TOLERANCE) {
                    return Some(Profile::hold(current));
                }
                self.fastest_in_family(brake, &start, target)
            }
            ControlInterface::Velocity => {
                if brake.is_none() && self.velocity_reached(current, target) {
                    return Some(Profile::hold(current));
                }
                let change = VelocityChange::time_optimal(
                    start.velocity,
                    start.acceleration,
                    target.velocity,
                    target.acceleration,
                    self.jerk,
                    self.acc,
                )?;
                let hold = VelocityChange::hold(target.velocity, target.acceleration);
                Some(Profile::new(
                    ProfileShape::VelocityChange,
                    brake,
                    change,
                    0.0,
                    hold,
                ))
            }
        }
    }

    /// Profile from `current` to `target` lasting `duration`, derived from
    /// the time-optimal profile `optimal`.
    ///
    /// `None` when the DOF cannot be slowed down to `duration` within the
    /// profile family.
    pub fn with_duration(
        &self,
        current: &KinematicState,
        target: &KinematicState,
        interface: ControlInterface,
        optimal: &Profile,
        duration: f64,
    ) -> Option<Profile> {
        if duration - optimal.duration <= T_MIN {
            return Some(*optimal);
        }
        let start = optimal.brake.map_or(*current, |b| b.end_state(current));
        let remaining = duration - optimal.brake_duration();

        match (interface, optimal.shape) {
            (ControlInterface::Position, ProfileShape::Ramps { acceleration, .. }) => {
                let jerk_sign = optimal.decel.jerk.signum();
                self.stretched_ramps(
                    optimal.brake,
                    &start,
                    target,
                    remaining,
                    jerk_sign,
                    acceleration,
                )
                .or_else(|| self.stretched_position(optimal, &start, target, remaining))
            }
            (ControlInterface::Position, _) => self
                .stretched_position(optimal, &start, target, remaining)
                .or_else(|| {
                    self.stretched_ramps(
                        optimal.brake,
                        &start,
                        target,
                        remaining,
                        1.0,
                        target.acceleration,
                    )
                }),
            (ControlInterface::Velocity, _) => {
                self.stretched_velocity_change(optimal.brake, &start, target, remaining)
            }
        }
    }

    /// `Some(None)` when no brake is needed, `None` when one is needed but
    /// cannot be planned.
    fn brake(&self, current: &KinematicState) -> Option<Option<Brake>> {
        if Brake::is_required(current, self.constraints) {
            Brake::plan(current, self.constraints).map(Some)
        } else {
            Some(None)
        }
    }

    fn velocity_reached(&self, state: &KinematicState, target: &KinematicState) -> bool {
        (state.velocity - target.velocity).abs() <= Self::STATE_TOLERANCE
            && (state.acceleration - target.acceleration).abs() <= Self::STATE_TOLERANCE
    }

    /// Accel and decel stage around peak velocity `vp`.
    fn stages(
        &self,
        start: &KinematicState,
        target: &KinematicState,
        vp: f64,
    ) -> Option<(VelocityChange, VelocityChange)> {
        let accel = VelocityChange::time_optimal(
            start.velocity,
            start.acceleration,
            vp,
            0.0,
            self.jerk,
            self.acc,
        )?;
        let decel = VelocityChange::time_optimal(
            vp,
            0.0,
            target.velocity,
            target.acceleration,
            self.jerk,
            self.acc,
        )?;
        Some((accel, decel))
    }

    fn tolerance(&self, distance: f64) -> f64 {
        self.precision * distance.abs().max(1.0)
    }

    /// Shortest Peak, Cruise or Ramps profile, the Hold shortcut not
    /// considered.
    fn fastest_in_family(
        &self,
        brake: Option<Brake>,
        start: &KinematicState,
        target: &KinematicState,
    ) -> Option<Profile> {
        let mut best = self.fastest_through_zero(brake, start, target);
        if let Some(ramps) = self.fastest_ramps(brake, start, target) {
            keep_shorter(&mut best, ramps);
        }

        let distance = target.position - start.position;
        match &best {
            Some(profile) => log::trace!(
                "distance {distance:.6}: {:?} in {:.6} s",
                profile.shape,
                profile.duration
            ),
            None => log::trace!("distance {distance:.6}: no profile in family"),
        }
        best
    }

    /// Shortest Peak or Cruise profile.
    fn fastest_through_zero(
        &self,
        brake: Option<Brake>,
        start: &KinematicState,
        target: &KinematicState,
    ) -> Option<Profile> {
        let distance = target.position - start.position;
        let tol = self.tolerance(distance);
        let mut best: Option<Profile> = None;

        // 1) Peak: distance(vp) == distance, closed form between two states
        //    at rest, found numerically otherwise
        let residual = |vp: f64| {
            self.stages(start, target, vp)
                .map(|(a, c)| a.distance + c.distance - distance)
        };
        let peaks = match self.rest_to_rest_peak(start, target, tol, &residual) {
            Some(roots) => roots,
            None => self.find_roots(self.vel.0, self.vel.1, tol, &residual),
        };
        for vp in peaks.iter() {
            if let Some((accel, decel)) = self.stages(start, target, vp) {
                let shape = ProfileShape::Peak { velocity: vp };
                keep_shorter(&mut best, Profile::new(shape, brake, accel, 0.0, decel));
            }
        }

        // 2) Cruise on a velocity limit, closed form
        for vc in [self.vel.1, self.vel.0] {
            let Some((accel, decel)) = self.stages(start, target, vc) else {
                continue;
            };
            let cruise = (distance - accel.distance - decel.distance) / vc;
            if cruise < -T_TOL {
                continue;
            }
            let cruise = safe_t(cruise);
            let shape = ProfileShape::Cruise {
                velocity: vc,
                duration: cruise,
            };
            keep_shorter(&mut best, Profile::new(shape, brake, accel, cruise, decel));
        }
        best
    }

    /// Peak velocity between two states at rest.
    ///
    /// Both stages are symmetric and cover their mean velocity times their
    /// duration. With `A1` the acceleration limit towards the peak and `A2`
    /// the one back to rest:
    ///
    ///  jerk limited only:   |d| = 2 |vp|^1.5 / sqrt(J)
    ///  plateau in both:     |d| = vp^2 (1/A1 + 1/A2) / 2 + |vp| (A1 + A2) / (2 J)
    ///
    /// `None` when the states are not at rest or neither case checks out
    /// (a plateau in only one stage), which leaves it to the grid search.
    fn rest_to_rest_peak(
        &self,
        start: &KinematicState,
        target: &KinematicState,
        tol: f64,
        residual: &impl Fn(f64) -> Option<f64>,
    ) -> Option<Roots> {
        let at_rest = |s: &KinematicState| {
            s.velocity.abs() <= Self::STATE_TOLERANCE
                && s.acceleration.abs() <= Self::STATE_TOLERANCE
        };
        if !(at_rest(start) && at_rest(target)) {
            return None;
        }

        let distance = target.position - start.position;
        let (a_up, a_down, v_lim) = if distance > 0.0 {
            (self.acc.1, -self.acc.0, self.vel.1)
        } else {
            (-self.acc.0, self.acc.1, -self.vel.0)
        };
        let d = distance.abs();

        let without_plateau = self
            .jerk
            .is_finite()
            .then(|| (0.25 * d * d * self.jerk).cbrt());
        let with_plateaus = (a_up.is_finite() && a_down.is_finite()).then(|| {
            let a = 0.5 * (1.0 / a_up + 1.0 / a_down);
            let b = 0.5 * (a_up + a_down) / self.jerk;
            2.0 * d / (b + (b * b + 4.0 * a * d).sqrt())
        });

        for speed in [without_plateau, with_plateaus].into_iter().flatten() {
            let vp = speed.copysign(distance);
            if residual(vp).map_or(false, |r| r.abs() <= tol) {
                let mut roots = Roots::default();
                if speed <= v_lim {
                    roots.push(vp);
                }
                return Some(roots);
            }
        }
        None
    }

    /// Shortest Ramps profile.
    ///
    /// With both boundary accelerations at zero the acceleration has to
    /// change sign anyway, which Peak covers. Without a jerk limit the
    /// acceleration steps through zero at no cost.
    fn fastest_ramps(
        &self,
        brake: Option<Brake>,
        start: &KinematicState,
        target: &KinematicState,
    ) -> Option<Profile> {
        if !self.ramps_apply(start, target) {
            return None;
        }
        let distance = target.position - start.position;
        let tol = self.tolerance(distance);
        let mut best: Option<Profile> = None;

        for jerk in [self.jerk, -self.jerk] {
            let (lo, hi) = self.junction_range(jerk, start, target);
            for peak_sign in [1.0, -1.0] {
                let stages = |aj: f64| {
                    let (accel, decel) = self.ramps(start, target, jerk, peak_sign, aj, 0.0)?;
                    // a sign change between peak and junction is a Peak profile
                    (accel.acc_peak * aj >= 0.0).then_some((accel, decel))
                };
                let residual =
                    |aj: f64| stages(aj).map(|(a, c)| a.distance + c.distance - distance);

                for aj in self.find_roots(lo, hi, tol, &residual).iter() {
                    if let Some((accel, decel)) = stages(aj) {
                        let shape = ProfileShape::Ramps {
                            velocity: decel.vel_init,
                            acceleration: aj,
                        };
                        keep_shorter(&mut best, Profile::new(shape, brake, accel, 0.0, decel));
                    }
                }
            }
        }
        best
    }

    fn ramps_apply(&self, start: &KinematicState, target: &KinematicState) -> bool {
        self.jerk.is_finite()
            && (start.acceleration.abs() > Self::STATE_TOLERANCE
                || target.acceleration.abs() > Self::STATE_TOLERANCE)
    }

    /// Junction accelerations from which the final ramp with `jerk` reaches
    /// the target acceleration.
    fn junction_range(
        &self,
        jerk: f64,
        start: &KinematicState,
        target: &KinematicState,
    ) -> (f64, f64) {
        // without an acceleration limit the velocity range bounds it
        let reach = start.acceleration.abs().max(target.acceleration.abs())
            + (2.0 * self.jerk * (self.vel.1 - self.vel.0)).sqrt();
        let (a_min, a_max) = (self.acc.0.max(-reach), self.acc.1.min(reach));
        let a_exit = target.acceleration.max(a_min).min(a_max);
        if jerk > 0.0 {
            (a_min, a_exit)
        } else {
            (a_exit, a_max)
        }
    }

    /// Stages of a Ramps profile with junction acceleration `aj`: the change
    /// to the junction and the final ramp, `coast` seconds apart.
    ///
    /// `jerk` is the signed jerk of the first and of the final ramp.
    fn ramp_stages(
        &self,
        start: &KinematicState,
        target: &KinematicState,
        jerk: f64,
        peak_sign: f64,
        aj: f64,
        coast: f64,
    ) -> Option<(VelocityChange, VelocityChange)> {
        let a_exit = target.acceleration;
        let v_ramp = target.velocity - (a_exit * a_exit - aj * aj) / (2.0 * jerk);
        let accel = VelocityChange::directed(
            start.velocity,
            start.acceleration,
            v_ramp - aj * coast,
            aj,
            jerk,
            peak_sign,
            self.acc,
        )?;
        Some((accel, VelocityChange::ramp(v_ramp, aj, a_exit, jerk)))
    }

    /// `ramp_stages` restricted to the velocity limits.
    fn ramps(
        &self,
        start: &KinematicState,
        target: &KinematicState,
        jerk: f64,
        peak_sign: f64,
        aj: f64,
        coast: f64,
    ) -> Option<(VelocityChange, VelocityChange)> {
        let (accel, decel) = self.ramp_stages(start, target, jerk, peak_sign, aj, coast)?;
        let coasting = Segment::new(0.0, coast, accel.end_state(*start));
        let within = accel
            .segments(*start)
            .into_iter()
            .chain(std::iter::once(coasting))
            .chain(decel.segments(coasting.end()))
            .all(|seg| {
                let (lo, hi) = seg.velocity_range();
                lo >= self.vel.0 - Self::VELOCITY_TOLERANCE
                    && hi <= self.vel.1 + Self::VELOCITY_TOLERANCE
            });
        within.then_some((accel, decel))
    }

    /// Position profile lasting `remaining` (brake excluded).
    ///
    /// Residual over the peak velocity `v` with the cruise filling the rest
    /// of the time:
    ///
    ///  g(v) = d_accel(v) + d_decel(v) + v * (remaining - t_accel(v) - t_decel(v)) - distance
    ///
    /// defined where the cruise time is non-negative. The root nearest to
    /// the time-optimal peak velocity is used so the motion stays close to
    /// the optimal one.
    fn stretched_position(
        &self,
        optimal: &Profile,
        start: &KinematicState,
        target: &KinematicState,
        remaining: f64,
    ) -> Option<Profile> {
        let distance = target.position - start.position;
        let tol = self.tolerance(distance);
        let residual = |v: f64| {
            let (accel, decel) = self.stages(start, target, v)?;
            let cruise = remaining - accel.duration - decel.duration;
            (cruise >= -T_TOL)
                .then(|| accel.distance + decel.distance + v * cruise.max(0.0) - distance)
        };

        let seed = match optimal.peak_velocity() {
            Some(v) => v,
            None => self
                .fastest_through_zero(optimal.brake, start, target)
                .and_then(|p| p.peak_velocity())
                .unwrap_or(0.5 * (self.vel.0 + self.vel.1)),
        };

        let root = match residual(seed) {
            Some(r) if r.abs() <= tol => seed,
            r_seed => {
                // positive residual: the seed covers too much distance, slow down first
                let (near, far) = if r_seed.map_or(true, |r| r > 0.0) {
                    (self.vel.0, self.vel.1)
                } else {
                    (self.vel.1, self.vel.0)
                };
                self.nearest_root(seed, near, tol, &residual, grid_point)
                    .or_else(|| self.nearest_root(seed, far, tol, &residual, grid_point))?
            }
        };

        let (accel, decel) = self.stages(start, target, root)?;
        let cruise = safe_t(remaining - accel.duration - decel.duration);
        let shape = if cruise > 0.0 {
            ProfileShape::Cruise {
                velocity: root,
                duration: cruise,
            }
        } else {
            ProfileShape::Peak { velocity: root }
        };
        Some(Profile::new(shape, optimal.brake, accel, cruise, decel))
    }

    /// Ramps profile lasting `remaining` (brake excluded).
    ///
    /// The coast at the junction acceleration takes up the extra time. The
    /// junction acceleration is searched outwards from `seed`, first with
    /// the final ramp's jerk sign `jerk_sign`, then with the other one.
    fn stretched_ramps(
        &self,
        brake: Option<Brake>,
        start: &KinematicState,
        target: &KinematicState,
        remaining: f64,
        jerk_sign: f64,
        seed: f64,
    ) -> Option<Profile> {
        if !self.ramps_apply(start, target) {
            return None;
        }
        let distance = target.position - start.position;
        let tol = self.tolerance(distance);
        let origin = KinematicState::new(0.0, start.velocity, start.acceleration);

        for jerk in [jerk_sign * self.jerk, -jerk_sign * self.jerk] {
            let (lo, hi) = self.junction_range(jerk, start, target);
            let seed = seed.max(lo).min(hi);
            let mut best: Option<(f64, Profile)> = None;

            for peak_sign in [1.0, -1.0] {
                let stages = |aj: f64| {
                    let coast = self.ramps_coast(start, target, jerk, peak_sign, aj, remaining)?;
                    let (accel, decel) = self.ramps(start, target, jerk, peak_sign, aj, coast)?;
                    Some((accel, coast, decel))
                };
                let residual = |aj: f64| {
                    let (accel, coast, decel) = stages(aj)?;
                    let coasted = accel.end_state(origin).integrate(0.0, coast);
                    Some(coasted.position + decel.distance - distance)
                };

                for end in [lo, hi] {
                    let Some(aj) = self.nearest_root(seed, end, tol, &residual, dense_grid_point)
                    else {
                        continue;
                    };
                    let Some((accel, coast, decel)) = stages(aj) else {
                        continue;
                    };
                    if best.map_or(true, |(b, _)| (aj - seed).abs() < (b - seed).abs()) {
                        let shape = ProfileShape::Ramps {
                            velocity: decel.vel_init - aj * coast,
                            acceleration: aj,
                        };
                        best = Some((aj, Profile::new(shape, brake, accel, coast, decel)));
                    }
                }
            }
            if let Some((_, profile)) = best {
                return Some(profile);
            }
        }
        None
    }

    /// Coast time at `aj` after which the Ramps profile lasts `remaining`.
    fn ramps_coast(
        &self,
        start: &KinematicState,
        target: &KinematicState,
        jerk: f64,
        peak_sign: f64,
        aj: f64,
        remaining: f64,
    ) -> Option<f64> {
        let excess = |coast: f64| {
            let (accel, decel) = self.ramp_stages(start, target, jerk, peak_sign, aj, coast)?;
            Some(accel.duration + coast + decel.duration - remaining)
        };

        let mut lo = 0.0;
        match excess(lo) {
            Some(e) if e.abs() <= T_MIN => return Some(lo),
            Some(e) if e < 0.0 => {}
            _ => return None,
        }
        let ramp = safe_t((target.acceleration - aj) / jerk);
        let mut hi = safe_t(remaining - ramp);
        if excess(hi).map_or(false, |e| e < 0.0) {
            return None;
        }

        // Binary search, an undefined stage counts as too long
        for _ in 0..Self::BINARY_SEARCH_DEPTH {
            let mid = 0.5 * (lo + hi);
            match excess(mid) {
                Some(e) if e.abs() <= T_MIN => return Some(mid),
                Some(e) if e < 0.0 => lo = mid,
                _ => hi = mid,
            }
        }
        let coast = 0.5 * (lo + hi);
        excess(coast)
            .filter(|e| e.abs() <= Self::DURATION_TOLERANCE)
            .map(|_| coast)
    }

    /// Velocity change lasting `remaining`, found by scaling down the jerk
    /// (or the acceleration limits on a DOF without jerk limit).
    fn stretched_velocity_change(
        &self,
        brake: Option<Brake>,
        start: &KinematicState,
        target: &KinematicState,
        remaining: f64,
    ) -> Option<Profile> {
        let exit = VelocityChange::hold(target.velocity, target.acceleration);

        if self.velocity_reached(start, target) {
            // only a coast can fill the time, and it must not drift
            if target.acceleration.abs() > Self::STATE_TOLERANCE {
                return None;
            }
            let coast = VelocityChange::hold(target.velocity, 0.0);
            return Some(Profile::new(
                ProfileShape::VelocityChange,
                brake,
                coast,
                safe_t(remaining),
                exit,
            ));
        }

        let change_at = |scale: f64| {
            if self.jerk.is_finite() {
                VelocityChange::time_optimal(
                    start.velocity,
                    start.acceleration,
                    target.velocity,
                    target.acceleration,
                    self.jerk * scale,
                    self.acc,
                )
            } else {
                VelocityChange::time_optimal(
                    start.velocity,
                    start.acceleration,
                    target.velocity,
                    target.acceleration,
                    self.jerk,
                    (self.acc.0 * scale, self.acc.1 * scale),
                )
            }
        };

        // Exponential search for a scale slow enough
        let mut fast = 1.0;
        let mut slow = 0.5;
        let mut bracketed = false;
        for _ in 0..Self::BINARY_SEARCH_DEPTH {
            if change_at(slow)?.duration >= remaining {
                bracketed = true;
                break;
            }
            fast = slow;
            slow *= 0.5;
        }
        if !bracketed {
            return None;
        }

        // Binary search between them
        for _ in 0..Self::BINARY_SEARCH_DEPTH {
            let mid = 0.5 * (fast + slow);
            let duration = change_at(mid)?.duration;
            if (duration - remaining).abs() <= T_MIN {
                slow = mid;
                break;
            }
            if duration >= remaining {
                slow = mid;
            } else {
                fast = mid;
            }
        }

        let change = change_at(slow)?;
        Some(Profile::new(
            ProfileShape::VelocityChange,
            brake,
            change,
            0.0,
            exit,
        ))
    }

    /// All roots of `residual` on `[lo, hi]` that a grid scan can bracket.
    fn find_roots(
        &self,
        lo: f64,
        hi: f64,
        tol: f64,
        residual: &impl Fn(f64) -> Option<f64>,
    ) -> Roots {
        let mut roots = Roots::default();
        let mut prev: Option<(f64, f64)> = None;

        for i in 0..=SCAN_INTERVALS {
            let v = grid_point(lo, hi, i);
            let r = residual(v);
            match (prev, r) {
                (_, Some(r)) if r.abs() <= tol => roots.push(v),
                (Some((pv, pr)), Some(r)) if pr.abs() > tol && pr.signum() != r.signum() => {
                    if let Some(root) = self.bisect(pv, v, pr, tol, residual) {
                        roots.push(root);
                    }
                }
                _ => {}
            }
            prev = r.map(|r| (v, r));
        }
        roots
    }

    /// First root met when walking from `seed` towards `end` over the
    /// points of `grid`.
    fn nearest_root(
        &self,
        seed: f64,
        end: f64,
        tol: f64,
        residual: &impl Fn(f64) -> Option<f64>,
        grid: fn(f64, f64, usize) -> f64,
    ) -> Option<f64> {
        let mut prev_v = seed;
        let mut prev = residual(seed);

        for i in 1..=SCAN_INTERVALS {
            let v = grid(seed, end, i);
            let r = residual(v);
            match (prev, r) {
                (_, Some(r)) if r.abs() <= tol => return Some(v),
                (Some(pr), Some(r)) if pr.signum() != r.signum() => {
                    if let Some(root) = self.bisect(prev_v, v, pr, tol, residual) {
                        return Some(root);
                    }
                }
                // leaving the valid range: its edge has zero cruise time
                (Some(pr), None) => {
                    let edge = self.valid_bound(prev_v, v, residual);
                    if let Some(re) = residual(edge) {
                        if re.abs() <= tol {
                            return Some(edge);
                        }
                        if pr.signum() != re.signum() {
                            if let Some(root) = self.bisect(prev_v, edge, pr, tol, residual) {
                                return Some(root);
                            }
                        }
                    }
                }
                // entering it again
                (None, Some(r)) => {
                    let edge = self.valid_bound(v, prev_v, residual);
                    if let Some(re) = residual(edge) {
                        if re.abs() <= tol {
                            return Some(edge);
                        }
                        if re.signum() != r.signum() {
                            if let Some(root) = self.bisect(edge, v, re, tol, residual) {
                                return Some(root);
                            }
                        }
                    }
                }
                _ => {}
            }
            prev_v = v;
            prev = r;
        }
        None
    }

    /// Bisection on a sign change of `residual` between `a` and `b`,
    /// `r_a` being the residual at `a`.
    fn bisect(
        &self,
        a: f64,
        b: f64,
        r_a: f64,
        tol: f64,
        residual: &impl Fn(f64) -> Option<f64>,
    ) -> Option<f64> {
        let (mut a, mut b, mut r_a) = (a, b, r_a);
        for _ in 0..Self::BINARY_SEARCH_DEPTH {
            let mid = 0.5 * (a + b);
            let r_mid = residual(mid)?;
            if r_mid.abs() <= tol {
                return Some(mid);
            }
            if r_mid.signum() == r_a.signum() {
                a = mid;
                r_a = r_mid;
            } else {
                b = mid;
            }
        }
        // f64 resolution reached before the tolerance
        let mid = 0.5 * (a + b);
        let r_mid = residual(mid)?;
        (r_mid.abs() <= tol * 1e4).then_some(mid)
    }

    /// Last point where `residual` is defined, between a `valid` and an
    /// `invalid` point.
    fn valid_bound(
        &self,
        valid: f64,
        invalid: f64,
        residual: &impl Fn(f64) -> Option<f64>,
    ) -> f64 {
        let (mut valid, mut invalid) = (valid, invalid);
        for _ in 0..Self::BINARY_SEARCH_DEPTH {
            let mid = 0.5 * (valid + invalid);
            if residual(mid).is_some() {
                valid = mid;
            } else {
                invalid = mid;
            }
        }
        valid
    }
}

fn grid_point(from: f64, to: f64, i: usize) -> f64 {
    if i == SCAN_INTERVALS {
        to
    } else {
        from + (to - from) * i as f64 / SCAN_INTERVALS as f64
    }
}

/// Like `grid_point`, spaced quadratically so the points crowd around
/// `from`.
fn dense_grid_point(from: f64, to: f64, i: usize) -> f64 {
    if i == SCAN_INTERVALS {
        to
    } else {
        let f = i as f64 / SCAN_INTERVALS as f64;
        from + (to - from) * f * f
    }
}

fn keep_shorter(best: &mut Option<Profile>, candidate: Profile) {
    if best.map_or(true, |b| candidate.is_preferred_to(&b)) {
        *best = Some(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const PRECISION: f64 = 1e-12;

    fn solve(c: &Constraints, current: KinematicState, target: KinematicState) -> Profile {
        ProfileSolver::new(c, PRECISION)
            .time_optimal(&current, &target, ControlInterface::Position)
            .unwrap()
    }

    fn assert_continuous(segments: &[Segment]) {
        for pair in segments.windows(2) {
            assert!(
                pair[0].end().approx_eq(&pair[1].start, 1e-9),
                "{:?} -> {:?}",
                pair[0].end(),
                pair[1].start
            );
        }
    }

    #[test]
    fn test_short_move_peaks_below_velocity_limit() {
        let c = Constraints::new(1.0, 1.0, 1.0);
        let p = solve(&c, KinematicState::at_rest(0.0), KinematicState::at_rest(1.0));
        // jerk-only stages: distance 2 * vp^1.5, duration 4 * sqrt(vp)
        let vp = 0.5f64.powf(2.0 / 3.0);
        match p.shape {
            ProfileShape::Peak { velocity } => assert_abs_diff_eq!(velocity, vp, epsilon = 1e-9),
            shape => panic!("unexpected shape {shape:?}"),
        }
        assert_abs_diff_eq!(p.duration, 4.0 * vp.sqrt(), epsilon = 1e-9);
        let end = p.end_state(KinematicState::at_rest(0.0));
        assert_abs_diff_eq!(end.position, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_long_move_cruises_on_velocity_limit() {
        let c = Constraints::new(1.0, 1.0, 1.0);
        let p = solve(&c, KinematicState::at_rest(0.0), KinematicState::at_rest(3.0));
        assert_eq!(
            p.shape,
            ProfileShape::Cruise {
                velocity: 1.0,
                duration: p.cruise
            }
        );
        assert_abs_diff_eq!(p.cruise, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.duration, 5.0, epsilon = 1e-9);

        let p = solve(&c, KinematicState::at_rest(0.0), KinematicState::at_rest(-3.0));
        assert_eq!(p.peak_velocity(), Some(-1.0));
    }

    #[test]
    fn test_already_at_target_holds() {
        let c = Constraints::new(1.0, 1.0, 1.0);
        let s = KinematicState::new(2.0, 0.5, 0.0);
        let p = solve(&c, s, s);
        assert_eq!(p.shape, ProfileShape::Hold);
        assert_eq!(p.duration, 0.0);
        assert_eq!(p.segments(s).len(), 7);
    }

    #[test]
    fn test_segments_are_continuous() {
        let c = Constraints::new(2.0, 1.5, 3.0);
        let current = KinematicState::new(0.3, -0.4, 0.7);
        let target = KinematicState::new(4.0, 0.5, -0.2);
        let p = solve(&c, current, target);
        let segments = p.segments(current);
        assert_eq!(segments.len(), 7);
        assert_continuous(&segments);
        let total: f64 = segments.iter().map(|s| s.duration).sum();
        assert_abs_diff_eq!(total, p.duration, epsilon = 1e-9);
        assert!(p.end_state(current).approx_eq(&target, 1e-8));
    }

    #[test]
    fn test_brake_prefix_from_excess_velocity() {
        let c = Constraints::new(1.0, 1.0, 1.0);
        let current = KinematicState::new(0.0, -3.0, 0.0);
        let target = KinematicState::at_rest(1.0);
        let p = solve(&c, current, target);
        assert!(p.brake.is_some());
        let segments = p.segments(current);
        assert_eq!(segments.len(), 11);
        assert_continuous(&segments);
        assert!(p.end_state(current).approx_eq(&target, 1e-8));
    }

    #[test]
    fn test_stretched_position_profile() {
        let c = Constraints::new(1.0, 1.0, 1.0);
        let solver = ProfileSolver::new(&c, PRECISION);
        let (current, target) = (KinematicState::at_rest(0.0), KinematicState::at_rest(1.0));
        let optimal = solver
            .time_optimal(&current, &target, ControlInterface::Position)
            .unwrap();
        let p = solver
            .with_duration(&current, &target, ControlInterface::Position, &optimal, 5.0)
            .unwrap();
        // 5v - 2v^1.5 - 1 = 0 at v = 0.25, cruise 5 - 4 * sqrt(0.25)
        assert_abs_diff_eq!(p.peak_velocity().unwrap(), 0.25, epsilon = 1e-9);
        assert_abs_diff_eq!(p.cruise, 3.0, epsilon = 1e-8);
        assert_abs_diff_eq!(p.duration, 5.0, epsilon = 1e-9);
        assert!(p.end_state(current).approx_eq(&target, 1e-8));
    }

    #[test]
    fn test_stretched_hold_cruises_in_place() {
        let c = Constraints::new(1.0, 1.0, 1.0);
        let solver = ProfileSolver::new(&c, PRECISION);
        let s = KinematicState::at_rest(1.0);
        let optimal = solver.time_optimal(&s, &s, ControlInterface::Position).unwrap();
        let p = solver
            .with_duration(&s, &s, ControlInterface::Position, &optimal, 2.0)
            .unwrap();
        assert_abs_diff_eq!(p.duration, 2.0, epsilon = 1e-12);
        assert!(p.end_state(s).approx_eq(&s, 1e-12));
    }

    #[test]
    fn test_velocity_interface() {
        let c = Constraints::new(2.0, 1.0, 1.0);
        let solver = ProfileSolver::new(&c, PRECISION);
        let current = KinematicState::at_rest(0.0);
        let target = KinematicState::new(0.0, 1.0, 0.0);
        let optimal = solver
            .time_optimal(&current, &target, ControlInterface::Velocity)
            .unwrap();
        assert_eq!(optimal.shape, ProfileShape::VelocityChange);
        assert_abs_diff_eq!(optimal.duration, 2.0, epsilon = 1e-12);

        let p = solver
            .with_duration(&current, &target, ControlInterface::Velocity, &optimal, 4.0)
            .unwrap();
        assert_abs_diff_eq!(p.duration, 4.0, epsilon = 1e-9);
        let end = p.end_state(current);
        assert_abs_diff_eq!(end.velocity, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(end.acceleration, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_velocity_interface_cannot_stretch_drifting_hold() {
        let c = Constraints::new(2.0, 1.0, 1.0);
        let solver = ProfileSolver::new(&c, PRECISION);
        let s = KinematicState::new(0.0, 0.5, 0.5);
        let optimal = solver.time_optimal(&s, &s, ControlInterface::Velocity).unwrap();
        assert!(solver
            .with_duration(&s, &s, ControlInterface::Velocity, &optimal, 1.0)
            .is_none());
    }

    #[test]
    fn test_plateau_on_both_stages() {
        let c = Constraints::new(10.0, 1.0, 1.0);
        let p = solve(&c, KinematicState::at_rest(0.0), KinematicState::at_rest(10.0));
        // vp^2 + vp - 10 = 0
        let vp = 0.5 * (41f64.sqrt() - 1.0);
        match p.shape {
            ProfileShape::Peak { velocity } => assert_abs_diff_eq!(velocity, vp, epsilon = 1e-9),
            shape => panic!("unexpected shape {shape:?}"),
        }
        assert_abs_diff_eq!(p.duration, 2.0 * (vp + 1.0), epsilon = 1e-9);
        let end = p.end_state(KinematicState::at_rest(0.0));
        assert!(end.approx_eq(&KinematicState::at_rest(10.0), 1e-8));
    }

    #[test]
    fn test_ramps_without_acceleration_sign_change() {
        let c = Constraints::new(2.0, 2.0, 1.0);
        let current = KinematicState::new(0.0, 0.0, 1.0);
        let target = KinematicState::new(0.5, 1.0, 1.0);
        let p = solve(&c, current, target);
        // a zero-jerk arc alone takes 1 s
        assert!(matches!(p.shape, ProfileShape::Ramps { .. }), "{:?}", p.shape);
        assert!(p.duration < 1.0, "{}", p.duration);
        assert_abs_diff_eq!(p.duration, 0.949253, epsilon = 1e-4);

        let segments = p.segments(current);
        assert_continuous(&segments);
        for seg in &segments {
            let (lo, hi) = seg.velocity_range();
            assert!(lo >= -2.0 - 1e-9 && hi <= 2.0 + 1e-9);
            assert!(seg.start.acceleration.abs() <= 2.0 + 1e-9);
        }
        assert!(p.end_state(current).approx_eq(&target, 1e-8));
    }

    #[test]
    fn test_stretched_ramps_profile() {
        let c = Constraints::new(2.0, 2.0, 1.0);
        let solver = ProfileSolver::new(&c, PRECISION);
        let current = KinematicState::new(0.0, 0.0, 1.0);
        let target = KinematicState::new(0.5, 1.0, 1.0);
        let optimal = solver
            .time_optimal(&current, &target, ControlInterface::Position)
            .unwrap();

        let p = solver
            .with_duration(&current, &target, ControlInterface::Position, &optimal, 0.98)
            .unwrap();
        assert_abs_diff_eq!(p.duration, 0.98, epsilon = 1e-9);
        assert!(p.end_state(current).approx_eq(&target, 1e-8));

        // every motion longer than the zero-jerk arc overshoots the
        // position before it can get back with the target acceleration
        assert!(solver
            .with_duration(&current, &target, ControlInterface::Position, &optimal, 2.0)
            .is_none());
    }

    #[test]
    fn test_equal_durations_prefer_fewer_phases() {
        let hold = VelocityChange::hold(0.0, 0.0);
        let cruise = Profile::new(ProfileShape::VelocityChange, None, hold, 1.0, hold);
        let ramp = VelocityChange::ramp(0.0, 0.0, 0.5, 1.0);
        let split = Profile::new(ProfileShape::VelocityChange, None, ramp, 0.5, hold);
        assert_abs_diff_eq!(cruise.duration, split.duration, epsilon = 1e-15);
        assert_eq!(cruise.active_phases(), 1);
        assert_eq!(split.active_phases(), 2);

        let mut best = Some(split);
        keep_shorter(&mut best, cruise);
        assert_eq!(best, Some(cruise));
        keep_shorter(&mut best, split);
        assert_eq!(best, Some(cruise));
    }

    #[test]
    fn test_infinite_jerk_profile() {
        let c = Constraints::new(1.0, 1.0, f64::INFINITY);
        let p = solve(&c, KinematicState::at_rest(0.0), KinematicState::at_rest(3.0));
        // trapezoid: 1 s up, 2 s cruise, 1 s down
        assert_abs_diff_eq!(p.duration, 4.0, epsilon = 1e-9);
        for seg in p.segments(KinematicState::at_rest(0.0)) {
            assert!(seg.jerk.is_finite());
        }
    }
}
