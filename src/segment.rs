use serde::{Deserialize, Serialize};

use crate::state::KinematicState;

/// One constant-jerk arc of a profile.
#[derive(Default, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub jerk: f64,
    pub duration: f64,
    pub start: KinematicState,
}

impl Segment {
    /// Creates a new Segment. Zero-length arcs store a jerk of zero so
    /// that acceleration steps never leak an infinite jerk into evaluation.
    pub fn new(jerk: f64, duration: f64, start: KinematicState) -> Self {
        let duration = duration.max(0.0);
        let jerk = if duration == 0.0 && !jerk.is_finite() {
            0.0
        } else {
            jerk
        };
        Self {
            jerk,
            duration,
            start,
        }
    }

    /// State at local time `t`, clamped to the segment.
    pub fn at(&self, t: f64) -> KinematicState {
        self.start.integrate(self.jerk, t.clamp(0.0, self.duration))
    }

    /// State at the end of the segment.
    pub fn end(&self) -> KinematicState {
        self.start.integrate(self.jerk, self.duration)
    }

    /// Lowest and highest velocity reached on the segment.
    pub(crate) fn velocity_range(&self) -> (f64, f64) {
        let end = self.end().velocity;
        let (mut lo, mut hi) = (self.start.velocity.min(end), self.start.velocity.max(end));
        // interior extremum where the acceleration crosses zero
        if self.jerk != 0.0 {
            let t = -self.start.acceleration / self.jerk;
            if t > 0.0 && t < self.duration {
                let v = self.at(t).velocity;
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
        (lo, hi)
    }

    /// Local times in `(0, duration)` where the velocity crosses zero.
    pub(crate) fn velocity_roots(&self) -> [Option<f64>; 2] {
        let (v, a, j) = (self.start.velocity, self.start.acceleration, self.jerk);
        let inside = |t: f64| (t > 0.0 && t < self.duration).then_some(t);

        // v + a*t + j*t^2/2 = 0
        if j.abs() < f64::EPSILON {
            if a.abs() < f64::EPSILON {
                return [None, None];
            }
            return [inside(-v / a), None];
        }
        let disc = a * a - 2.0 * j * v;
        if disc < 0.0 {
            return [None, None];
        }
        let sq = disc.sqrt();
        [inside((-a + sq) / j), inside((-a - sq) / j)]
    }
}
