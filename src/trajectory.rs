use serde::{Deserialize, Serialize};

use crate::profile::ProfileShape;
use crate::segment::Segment;
use crate::state::KinematicState;

/// Lowest and highest position a DOF passes through, with their times.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionExtrema {
    pub min: f64,
    pub max: f64,
    pub t_min: f64,
    pub t_max: f64,
}

impl PositionExtrema {
    fn at(state: &KinematicState, t: f64) -> Self {
        Self {
            min: state.position,
            max: state.position,
            t_min: t,
            t_max: t,
        }
    }

    fn include(&mut self, position: f64, t: f64) {
        if position < self.min {
            self.min = position;
            self.t_min = t;
        }
        if position > self.max {
            self.max = position;
            self.t_max = t;
        }
    }
}

/// Synchronized multi-DOF motion.
///
/// Built once per calculation and never modified afterwards; the engine and
/// every Output share it through an `Arc`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    segments: Vec<Vec<Segment>>,
    final_states: Vec<KinematicState>,
    shapes: Vec<ProfileShape>,
    independent_min_durations: Vec<f64>,
    duration: f64,
}

impl Trajectory {
    pub(crate) fn new(
        segments: Vec<Vec<Segment>>,
        final_states: Vec<KinematicState>,
        shapes: Vec<ProfileShape>,
        independent_min_durations: Vec<f64>,
        duration: f64,
    ) -> Self {
        Self {
            segments,
            final_states,
            shapes,
            independent_min_durations,
            duration,
        }
    }

    /// Common duration of all DOFs.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn dof(&self) -> usize {
        self.final_states.len()
    }

    /// State of every DOF at `t`.
    pub fn evaluate(&self, t: f64) -> Vec<KinematicState> {
        let mut out = vec![KinematicState::default(); self.dof()];
        self.evaluate_into(t, &mut out);
        out
    }

    /// Allocation-free [`evaluate`](Self::evaluate); `out` is filled up to
    /// the shorter of its length and the DOF count.
    pub fn evaluate_into(&self, t: f64, out: &mut [KinematicState]) {
        for (dof, state) in out.iter_mut().enumerate().take(self.dof()) {
            *state = self.state_at(dof, t);
        }
    }

    /// State of `dof` at `t`. From `duration` on this is the final state
    /// exactly.
    ///
    /// # Panics
    ///
    /// If `dof` is out of range.
    pub fn state_at(&self, dof: usize, t: f64) -> KinematicState {
        let final_state = self.final_states[dof];
        if t >= self.duration {
            return final_state;
        }
        let segments = &self.segments[dof];
        let Some(first) = segments.first() else {
            return final_state;
        };
        if t <= 0.0 {
            return first.start;
        }

        let mut local = t;
        for seg in segments {
            if local <= seg.duration {
                return seg.at(local);
            }
            local -= seg.duration;
        }
        // segment durations add up to the duration only within rounding
        segments.last().map_or(final_state, Segment::end)
    }

    pub fn segments(&self, dof: usize) -> &[Segment] {
        &self.segments[dof]
    }

    pub fn final_states(&self) -> &[KinematicState] {
        &self.final_states
    }

    pub fn shapes(&self) -> &[ProfileShape] {
        &self.shapes
    }

    /// Duration each DOF would need on its own.
    pub fn independent_min_durations(&self) -> &[f64] {
        &self.independent_min_durations
    }

    /// The DOF with the longest independent duration, which sets the pace.
    pub fn limiting_dof(&self) -> Option<usize> {
        self.independent_min_durations
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(dof, _)| dof)
    }

    /// Position range of every DOF over the whole trajectory.
    ///
    /// Positions only turn around where the velocity crosses zero, so the
    /// segment ends and those roots are all that need checking.
    pub fn position_extrema(&self) -> Vec<PositionExtrema> {
        self.segments
            .iter()
            .zip(&self.final_states)
            .map(|(segments, final_state)| {
                let start = segments.first().map_or(*final_state, |s| s.start);
                let mut extrema = PositionExtrema::at(&start, 0.0);
                let mut t0 = 0.0;
                for seg in segments {
                    for t in seg.velocity_roots().into_iter().flatten() {
                        extrema.include(seg.at(t).position, t0 + t);
                    }
                    t0 += seg.duration;
                    extrema.include(seg.end().position, t0);
                }
                extrema.include(final_state.position, self.duration);
                extrema
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// One DOF going 0 -> 1 and back over 2 s at constant jerk pieces.
    fn out_and_back() -> Trajectory {
        let start = KinematicState::new(0.0, 1.0, 0.0);
        let first = Segment::new(-1.0, 2.0, start);
        let second = Segment::new(0.0, 1.0, first.end());
        let final_state = second.end();
        Trajectory::new(
            vec![vec![first, second]],
            vec![final_state],
            vec![ProfileShape::Hold],
            vec![3.0],
            3.0,
        )
    }

    #[test]
    fn test_evaluate_boundaries() {
        let traj = out_and_back();
        assert_eq!(traj.evaluate(-1.0)[0], KinematicState::new(0.0, 1.0, 0.0));
        assert_eq!(traj.evaluate(3.0)[0], traj.final_states()[0]);
        assert_eq!(traj.evaluate(10.0)[0], traj.final_states()[0]);
        let mid = traj.state_at(0, 1.0);
        assert_abs_diff_eq!(mid.velocity, 0.5, epsilon = 1e-12);
        assert_eq!(traj.evaluate(1.5), traj.evaluate(1.5));
    }

    #[test]
    fn test_evaluate_into_short_buffer() {
        let traj = out_and_back();
        let mut out: [KinematicState; 0] = [];
        traj.evaluate_into(1.0, &mut out);
        let mut out = [KinematicState::default(); 2];
        traj.evaluate_into(1.0, &mut out);
        assert_eq!(out[0], traj.state_at(0, 1.0));
        assert_eq!(out[1], KinematicState::default());
    }

    #[test]
    fn test_position_extrema() {
        // v(t) = 1 - t^2/2 turns at t = sqrt(2)
        let traj = out_and_back();
        let ext = traj.position_extrema()[0];
        let t_turn = 2f64.sqrt();
        assert_abs_diff_eq!(ext.t_max, t_turn, epsilon = 1e-12);
        assert_abs_diff_eq!(ext.max, t_turn - t_turn.powi(3) / 6.0, epsilon = 1e-12);
        assert_eq!(ext.min, traj.final_states()[0].position);
        assert_eq!(ext.t_min, 3.0);
    }

    #[test]
    fn test_limiting_dof() {
        let traj = Trajectory::new(
            vec![vec![], vec![]],
            vec![KinematicState::default(); 2],
            vec![ProfileShape::Hold; 2],
            vec![1.0, 2.5],
            2.5,
        );
        assert_eq!(traj.limiting_dof(), Some(1));
        assert_eq!(Trajectory::default().limiting_dof(), None);
    }
}
