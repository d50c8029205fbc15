use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::OtgError;
use crate::input::Input;
use crate::state::KinematicState;
use crate::trajectory::Trajectory;

/// Outcome of one engine call.
///
/// Integer codes are stable for callers that only see a number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleResult {
    /// The trajectory is being followed.
    #[default]
    Working,
    /// The target has been reached.
    Finished,
    /// Unclassified error, e.g. an unusable configuration.
    Error,
    ErrorInvalidInput,
    ErrorTrajectoryDuration,
    ErrorPositionalLimits,
    ErrorExecutionTimeCalculation,
    ErrorSynchronizationCalculation,
}

impl CycleResult {
    pub const fn code(self) -> i32 {
        match self {
            Self::Working => 0,
            Self::Finished => 1,
            Self::Error => -1,
            Self::ErrorInvalidInput => -100,
            Self::ErrorTrajectoryDuration => -101,
            Self::ErrorPositionalLimits => -102,
            Self::ErrorExecutionTimeCalculation => -110,
            Self::ErrorSynchronizationCalculation => -111,
        }
    }

    pub const fn is_error(self) -> bool {
        self.code() < 0
    }
}

impl From<&OtgError> for CycleResult {
    fn from(err: &OtgError) -> Self {
        match err {
            OtgError::InvalidConfig(_) => Self::Error,
            OtgError::InvalidInput(_) | OtgError::DofMismatch { .. } => Self::ErrorInvalidInput,
            OtgError::NoProfile { .. } => Self::ErrorExecutionTimeCalculation,
            OtgError::Synchronization { .. } => Self::ErrorSynchronizationCalculation,
            OtgError::TrajectoryDuration(_) => Self::ErrorTrajectoryDuration,
            OtgError::PositionalLimits { .. } => Self::ErrorPositionalLimits,
        }
    }
}

/// What one `calculate` / `update` call produced.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Time into the current trajectory the new state was sampled at.
    pub time: f64,
    /// Commanded state per DOF for this cycle.
    pub new_state: Vec<KinematicState>,
    /// The trajectory being followed, shared with the engine.
    pub trajectory: Option<Arc<Trajectory>>,
    pub result: CycleResult,
    /// True when this call planned a new trajectory.
    pub new_calculation: bool,
    /// Wall time spent in the call, in microseconds.
    pub calculation_duration: f64,
}

impl Output {
    /// Copies the new state into the current state of `input`, closing the
    /// control loop for the next cycle.
    pub fn pass_to_input(&self, input: &mut Input) {
        input.current.clone_from(&self.new_state);
    }

    pub fn trajectory_duration(&self) -> Option<f64> {
        self.trajectory.as_ref().map(|t| t.duration())
    }

    pub fn new_positions(&self) -> Vec<f64> {
        self.new_state.iter().map(|s| s.position).collect()
    }

    pub fn new_velocities(&self) -> Vec<f64> {
        self.new_state.iter().map(|s| s.velocity).collect()
    }
}
