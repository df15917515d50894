use thiserror::Error;

use crate::Activation;

/// Errors returned by the shape-checked API.
///
/// Low-level matrix primitives panic on misuse instead; see the crate docs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Learning rate was negative or not finite.
    #[error("invalid learning rate {0}: must be finite and >= 0")]
    InvalidLearningRate(f32),

    /// Backprop only supports a softmax output layer paired with cross-entropy.
    #[error("backprop requires a softmax output layer, found {found:?}")]
    InvalidActivationForBackprop { found: Activation },

    #[error("shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
