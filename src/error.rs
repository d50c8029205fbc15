//! Error types for trajectory generation.

use thiserror::Error;

/// Everything that can stop a trajectory from being planned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OtgError {
    /// Engine configuration is unusable (period, DOF count, tolerances).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Per-DOF arrays do not agree on the number of degrees of freedom.
    #[error("DOF mismatch in {field}: expected {expected}, got {actual}")]
    DofMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// No profile of the family reaches the target of this DOF.
    #[error("No valid profile for DOF {dof}")]
    NoProfile { dof: usize },

    /// The DOF cannot be slowed down to the synchronized duration.
    #[error("DOF {dof} cannot be synchronized to a duration of {duration:.6} s")]
    Synchronization { dof: usize, duration: f64 },

    /// Trajectory would last longer than the supported maximum.
    #[error("Trajectory duration {0:.3} s exceeds the supported maximum")]
    TrajectoryDuration(f64),

    /// The trajectory leaves the positional limits of a DOF.
    #[error("DOF {dof} leaves its position limits ({min:.6} .. {max:.6})")]
    PositionalLimits { dof: usize, min: f64, max: f64 },
}

/// Result type alias for trajectory generation.
pub type Result<T> = std::result::Result<T, OtgError>;

impl OtgError {
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    #[must_use]
    pub const fn dof_mismatch(field: &'static str, expected: usize, actual: usize) -> Self {
        Self::DofMismatch {
            field,
            expected,
            actual,
        }
    }

    /// True for errors caused by the caller's input rather than by the
    /// kinematics of the requested motion.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::InvalidConfig(_) | Self::DofMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = OtgError::dof_mismatch("target", 3, 2);
        assert_eq!(
            err.to_string(),
            "DOF mismatch in target: expected 3, got 2"
        );
        assert!(err.is_input_error());

        let err = OtgError::Synchronization {
            dof: 1,
            duration: 2.5,
        };
        assert!(err.to_string().contains("DOF 1"));
        assert!(!err.is_input_error());
    }
}
