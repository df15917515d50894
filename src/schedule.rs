//! Learning-rate schedules.
//!
//! The training loop asks for a rate before every mini-batch, passing a global sample counter
//! that grows by the batch size after each step (it is not an epoch index).

use crate::{Error, Result};

/// Maps a global step counter to a learning rate.
pub trait LrScheduler {
    /// Set the base rate the schedule decays from.
    fn set_eta(&mut self, eta: f32);

    /// Learning rate at `step`. Must be a pure function of `step` and the base rate.
    fn rate(&self, step: usize) -> f32;
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LrSchedule {
    #[default]
    Constant,
    /// `eta * decay_rate^(step / decay_steps)` with a real-valued exponent.
    Exponential { decay_rate: f32, decay_steps: usize },
    /// `eta * gamma^floor(step / step_size)`.
    Step { gamma: f32, step_size: usize },
}

impl LrSchedule {
    pub fn validate(self) -> Result<()> {
        match self {
            LrSchedule::Constant => Ok(()),
            LrSchedule::Exponential {
                decay_rate,
                decay_steps,
            } => {
                if !(decay_rate.is_finite() && decay_rate > 0.0 && decay_rate <= 1.0) {
                    return Err(Error::InvalidConfig(format!(
                        "exponential decay_rate must be in (0, 1], got {decay_rate}"
                    )));
                }
                if decay_steps == 0 {
                    return Err(Error::InvalidConfig(
                        "exponential decay_steps must be > 0".to_owned(),
                    ));
                }
                Ok(())
            }
            LrSchedule::Step { gamma, step_size } => {
                if !(gamma.is_finite() && gamma > 0.0 && gamma <= 1.0) {
                    return Err(Error::InvalidConfig(format!(
                        "step gamma must be in (0, 1], got {gamma}"
                    )));
                }
                if step_size == 0 {
                    return Err(Error::InvalidConfig("step_size must be > 0".to_owned()));
                }
                Ok(())
            }
        }
    }
}

/// [`LrSchedule`] bound to a base rate.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    schedule: LrSchedule,
    eta: f32,
}

impl Scheduler {
    pub fn new(schedule: LrSchedule) -> Result<Self> {
        schedule.validate()?;
        Ok(Self { schedule, eta: 0.0 })
    }

    #[inline]
    pub fn schedule(&self) -> LrSchedule {
        self.schedule
    }
}

impl LrScheduler for Scheduler {
    fn set_eta(&mut self, eta: f32) {
        self.eta = eta;
    }

    fn rate(&self, step: usize) -> f32 {
        match self.schedule {
            LrSchedule::Constant => self.eta,
            LrSchedule::Exponential {
                decay_rate,
                decay_steps,
            } => self.eta * decay_rate.powf(step as f32 / decay_steps as f32),
            LrSchedule::Step { gamma, step_size } => {
                self.eta * gamma.powi((step / step_size) as i32)
            }
        }
    }
}
