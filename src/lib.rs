//! # scurve_otg
//!
//! Online generation of jerk-limited, time-synchronized trajectories for
//! multi-axis motion.
//!
//! Per degree of freedom the caller provides the current kinematic state,
//! a target state and limits on velocity, acceleration and jerk. The engine
//! plans a trajectory that brings every axis to its target at the same
//! time and samples it once per control period. Changing the target between
//! two cycles replans from the state last commanded, so the motion stays
//! continuous.
//!
//! Modules:
//! - `state`, `constraints`, `segment` hold the kinematic data model.
//! - `velocity_change` and `brake` are the closed-form building blocks.
//! - `profile` solves a single DOF, `synchronizer` coordinates all of them.
//! - `trajectory` is the planned motion, `otg` the control-loop engine.
//!
//! ```
//! use scurve_otg::{CycleResult, Input, Otg};
//!
//! let mut otg = Otg::create(0.01, 2).unwrap();
//! let mut input = Input::new(2);
//! input.set_target_position(&[1.0, -0.5]);
//! input.set_max_velocity(&[1.0, 1.0]);
//! input.set_max_acceleration(&[2.0, 2.0]);
//! input.set_max_jerk(&[4.0, 4.0]);
//!
//! let mut output = otg.update(&input);
//! while output.result == CycleResult::Working {
//!     output.pass_to_input(&mut input);
//!     output = otg.update(&input);
//! }
//! assert_eq!(output.result, CycleResult::Finished);
//! assert_eq!(output.new_positions(), vec![1.0, -0.5]);
//! ```

pub mod brake;
pub mod config;
pub mod constraints;
pub mod error;
pub mod input;
pub mod otg;
pub mod output;
pub mod profile;
pub mod segment;
pub mod state;
pub mod synchronizer;
pub mod trajectory;
pub mod velocity_change;

// Re-export main structs for convenience:
pub use config::OtgConfig;
pub use constraints::Constraints;
pub use error::{OtgError, Result};
pub use input::{ControlInterface, DurationDiscretization, Input, Synchronization};
pub use otg::{EngineState, Otg};
pub use output::{CycleResult, Output};
pub use profile::{Profile, ProfileShape, ProfileSolver};
pub use segment::Segment;
pub use state::KinematicState;
pub use trajectory::{PositionExtrema, Trajectory};
