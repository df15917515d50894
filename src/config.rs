//! Training configuration.
//!
//! [`FitConfig`] gathers every knob of the training loop. With the `serde` feature it can be
//! loaded from JSON, e.g.:
//!
//! ```json
//! {
//!   "epochs": 20,
//!   "batch_size": 64,
//!   "lr": 0.05,
//!   "weight_decay": 0.0001,
//!   "lr_schedule": { "kind": "exponential", "decay_rate": 0.5, "decay_steps": 60000 },
//!   "optimizer": { "kind": "sgd" },
//!   "shuffle": { "Seeded": 7 },
//!   "early_stopping_patience": 3,
//!   "time_budget": { "secs": 600, "nanos": 0 },
//!   "verbosity": "Progress"
//! }
//! ```

use std::time::Duration;

use crate::{Error, LrSchedule, Optimizer, Result, Shuffle, Verbosity};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Base learning rate handed to the schedule. Must be finite and `>= 0`.
    pub lr: f32,
    /// Multiplicative weight decay `lambda` applied before every update; `0` disables it.
    pub weight_decay: f32,
    pub lr_schedule: LrSchedule,
    pub optimizer: Optimizer,
    pub shuffle: Shuffle,
    /// Stop after this many epochs without a new best validation cross-entropy; `0` disables.
    pub early_stopping_patience: usize,
    /// Wall-clock ceiling, checked after every epoch.
    pub time_budget: Option<Duration>,
    pub verbosity: Verbosity,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            lr: 1e-2,
            weight_decay: 0.0,
            lr_schedule: LrSchedule::Constant,
            optimizer: Optimizer::Sgd,
            shuffle: Shuffle::default(),
            early_stopping_patience: 0,
            time_budget: None,
            verbosity: Verbosity::Silent,
        }
    }
}

impl FitConfig {
    /// Check every field; the learning rate check comes first.
    pub fn validate(&self) -> Result<()> {
        if !(self.lr.is_finite() && self.lr >= 0.0) {
            return Err(Error::InvalidLearningRate(self.lr));
        }
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        if !(self.weight_decay.is_finite() && (0.0..1.0).contains(&self.weight_decay)) {
            return Err(Error::InvalidConfig(format!(
                "weight_decay must be in [0, 1), got {}",
                self.weight_decay
            )));
        }
        self.lr_schedule.validate()?;
        self.optimizer.validate()?;
        Ok(())
    }
}

#[cfg(feature = "serde")]
impl FitConfig {
    /// Parse and validate a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: FitConfig = serde_json::from_str(s)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse fit config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate a configuration from a JSON file.
    pub fn load_json<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::InvalidConfig(format!("failed to read {}: {e}", p.display())))?;
        Self::from_json_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(FitConfig::default().validate().is_ok());
    }

    #[test]
    fn negative_or_nan_lr_is_an_invalid_learning_rate() {
        let cfg = FitConfig {
            lr: -0.1,
            ..FitConfig::default()
        };
        assert_eq!(cfg.validate(), Err(Error::InvalidLearningRate(-0.1)));

        let cfg = FitConfig {
            lr: f32::NAN,
            ..FitConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidLearningRate(_))));

        let cfg = FitConfig {
            lr: 0.0,
            ..FitConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_loop_settings() {
        for cfg in [
            FitConfig {
                epochs: 0,
                ..FitConfig::default()
            },
            FitConfig {
                batch_size: 0,
                ..FitConfig::default()
            },
            FitConfig {
                weight_decay: 1.0,
                ..FitConfig::default()
            },
        ] {
            assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let cfg = FitConfig::from_json_str(
            r#"{"epochs": 3, "lr": 0.5, "optimizer": {"kind": "sgd_momentum", "momentum": 0.9}}"#,
        )
        .unwrap();
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.lr, 0.5);
        assert_eq!(cfg.optimizer, Optimizer::SgdMomentum { momentum: 0.9 });
        assert_eq!(cfg.batch_size, FitConfig::default().batch_size);

        assert!(matches!(
            FitConfig::from_json_str(r#"{"lr": -1.0}"#),
            Err(Error::InvalidLearningRate(_))
        ));
    }
}
