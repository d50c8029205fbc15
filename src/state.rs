use serde::{Deserialize, Serialize};

/// Position, velocity and acceleration of one degree of freedom.
#[derive(Default, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KinematicState {
    pub position: f64,
    pub velocity: f64,
    pub acceleration: f64,
}

impl KinematicState {
    /// Creates a new KinematicState.
    pub const fn new(position: f64, velocity: f64, acceleration: f64) -> Self {
        Self {
            position,
            velocity,
            acceleration,
        }
    }

    /// Standing still at `position`.
    pub const fn at_rest(position: f64) -> Self {
        Self::new(position, 0.0, 0.0)
    }

    /// Evaluates the state `t` seconds later under constant `jerk`.
    ///
    /// Non-positive `t` returns the state unchanged, which also keeps
    /// zero-length steps with infinite jerk well defined.
    pub fn integrate(&self, jerk: f64, t: f64) -> Self {
        if t <= 0.0 {
            return *self;
        }
        let a0 = self.acceleration;
        let v0 = self.velocity;
        let s0 = self.position;

        // acc(t) = a0 + j*t
        let acc = a0 + jerk * t;

        // vel(t) = v0 + a0*t + j*t^2/2
        let vel = v0 + (a0 + acc) * t * 0.5;

        // pos(t) = s0 + v0*t + a0*t^2/2 + j*t^3/6, written with the average velocity
        let vel_avg = v0 + (2.0 * a0 + acc) * t / 6.0;
        let pos = s0 + vel_avg * t;

        Self::new(pos, vel, acc)
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.velocity.is_finite() && self.acceleration.is_finite()
    }

    /// Component-wise comparison within `tol`.
    pub fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        (self.position - other.position).abs() <= tol
            && (self.velocity - other.velocity).abs() <= tol
            && (self.acceleration - other.acceleration).abs() <= tol
    }
}
