//! Control-loop engine.
//!
//! Call [`Otg::update`] once per control period with the current Input and
//! feed the Output back with [`Output::pass_to_input`]. A new trajectory is
//! only planned when the Input differs from the one the current trajectory
//! was planned for; the state the engine emitted itself does not count as a
//! difference.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::OtgConfig;
use crate::error::{OtgError, Result};
use crate::input::Input;
use crate::output::{CycleResult, Output};
use crate::synchronizer::Synchronizer;
use crate::trajectory::Trajectory;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// Nothing planned yet, or reset.
    #[default]
    Idle,
    Planning,
    /// Following a trajectory.
    Tracking,
    /// The trajectory has been run to its end.
    Finished,
    /// The last calculation failed; the next call plans again.
    Error,
}

/// Online trajectory generator for a fixed number of DOFs.
#[derive(Clone, Debug)]
pub struct Otg {
    config: OtgConfig,
    state: EngineState,
    /// Input the trajectory was planned for, its current state advanced to
    /// the last emitted state.
    last_input: Option<Input>,
    trajectory: Option<Arc<Trajectory>>,
    time: f64,
}

impl Otg {
    /// Slack on reaching the end of the trajectory, absorbs the rounding of
    /// summed control periods.
    const TIME_TOLERANCE: f64 = 1e-9;

    pub fn new(config: OtgConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: EngineState::Idle,
            last_input: None,
            trajectory: None,
            time: 0.0,
        })
    }

    /// Engine for `dof` axes updated every `delta_time` seconds.
    pub fn create(delta_time: f64, dof: usize) -> Result<Self> {
        Self::new(OtgConfig::new(delta_time, dof)?)
    }

    pub fn config(&self) -> &OtgConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn trajectory(&self) -> Option<&Arc<Trajectory>> {
        self.trajectory.as_ref()
    }

    /// Time into the current trajectory, held at its duration once finished.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// True if `input` fits this engine and passes validation.
    pub fn validate_input(&self, input: &Input, check_current: bool, check_target: bool) -> bool {
        self.check_dof(input).is_ok() && input.is_valid(check_current, check_target)
    }

    /// Forgets the trajectory; the next call plans from scratch.
    pub fn reset(&mut self) {
        log::debug!("reset");
        self.state = EngineState::Idle;
        self.last_input = None;
        self.trajectory = None;
        self.time = 0.0;
    }

    /// Plans a trajectory for `input` without advancing time.
    ///
    /// The Output holds the trajectory at t = 0, which is the current state.
    pub fn calculate(&mut self, input: &Input) -> Output {
        let started = Instant::now();
        match self.plan(input) {
            Ok(trajectory) => Output {
                time: 0.0,
                new_state: trajectory.evaluate(0.0),
                trajectory: Some(trajectory),
                result: CycleResult::Working,
                new_calculation: true,
                calculation_duration: micros_since(started),
            },
            Err(err) => self.fail(input, &err, started),
        }
    }

    /// Advances one control period and returns the state to command.
    pub fn update(&mut self, input: &Input) -> Output {
        let started = Instant::now();
        let mut new_calculation = false;

        let trajectory = match self.trajectory.clone() {
            Some(trajectory) if !self.needs_planning(input) => trajectory,
            _ => match self.plan(input) {
                Ok(trajectory) => {
                    new_calculation = true;
                    trajectory
                }
                Err(err) => return self.fail(input, &err, started),
            },
        };

        self.time += self.config.delta_time;
        let (new_state, result) = if self.time + Self::TIME_TOLERANCE >= trajectory.duration() {
            // time stops at the end of the trajectory
            self.time = trajectory.duration();
            if self.state != EngineState::Finished {
                log::debug!("target reached after {:.6} s", self.time);
            }
            self.state = EngineState::Finished;
            (trajectory.final_states().to_vec(), CycleResult::Finished)
        } else {
            self.state = EngineState::Tracking;
            (trajectory.evaluate(self.time), CycleResult::Working)
        };
        log::trace!("t={:.6} {:?}: {:?}", self.time, result, new_state);

        if let Some(last) = self.last_input.as_mut() {
            last.current.clone_from(&new_state);
        }

        Output {
            time: self.time,
            new_state,
            trajectory: Some(trajectory),
            result,
            new_calculation,
            calculation_duration: micros_since(started),
        }
    }

    fn needs_planning(&self, input: &Input) -> bool {
        matches!(
            self.state,
            EngineState::Idle | EngineState::Planning | EngineState::Error
        ) || self.last_input.as_ref() != Some(input)
    }

    fn check_dof(&self, input: &Input) -> Result<()> {
        if input.dof() != self.config.dof {
            return Err(OtgError::dof_mismatch(
                "current",
                self.config.dof,
                input.dof(),
            ));
        }
        Ok(())
    }

    fn plan(&mut self, input: &Input) -> Result<Arc<Trajectory>> {
        self.state = EngineState::Planning;
        self.check_dof(input)?;
        input.validate(self.config.check_current_state, true)?;

        let trajectory = Synchronizer::new(input, self.config.delta_time, self.config.precision)
            .synchronize()?;
        log::debug!(
            "planned {} DOF trajectory: {:.6} s, limiting DOF {:?}, shapes {:?}",
            trajectory.dof(),
            trajectory.duration(),
            trajectory.limiting_dof(),
            trajectory.shapes()
        );

        let trajectory = Arc::new(trajectory);
        self.last_input = Some(input.clone());
        self.trajectory = Some(Arc::clone(&trajectory));
        self.time = 0.0;
        self.state = EngineState::Tracking;
        Ok(trajectory)
    }

    fn fail(&mut self, input: &Input, err: &OtgError, started: Instant) -> Output {
        log::warn!("trajectory calculation failed: {err}");
        self.state = EngineState::Error;
        self.last_input = None;
        self.trajectory = None;
        self.time = 0.0;
        Output {
            time: 0.0,
            new_state: input.current.clone(),
            trajectory: None,
            result: CycleResult::from(err),
            new_calculation: true,
            calculation_duration: micros_since(started),
        }
    }
}

fn micros_since(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1e6
}
