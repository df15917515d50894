//! Network topology: one [`LayerSpec`] per layer, input layer included.

use crate::{Activation, Error, Result};

/// Width and activation of one layer.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerSpec {
    pub width: usize,
    pub activation: Activation,
}

impl LayerSpec {
    pub fn new(width: usize, activation: Activation) -> Self {
        Self { width, activation }
    }

    /// The input layer: identity activation, no parameters.
    pub fn input(width: usize) -> Self {
        Self::new(width, Activation::Identity)
    }
}

/// Ordered layer descriptors `L0..L(n-1)`; `L0` is the identity input layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    layers: Vec<LayerSpec>,
}

impl Topology {
    pub fn new(layers: Vec<LayerSpec>) -> Result<Self> {
        if layers.len() < 2 {
            return Err(Error::InvalidConfig(
                "topology needs an input layer and at least one more layer".to_owned(),
            ));
        }
        if layers[0].activation != Activation::Identity {
            return Err(Error::InvalidConfig(format!(
                "input layer must use the identity activation, got {:?}",
                layers[0].activation
            )));
        }
        for (i, spec) in layers.iter().enumerate() {
            if spec.width == 0 {
                return Err(Error::InvalidConfig(format!("layer {i} width must be > 0")));
            }
            spec.activation.validate()?;
        }
        Ok(Self { layers })
    }

    /// Number of layers, input included.
    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layer(&self, idx: usize) -> &LayerSpec {
        &self.layers[idx]
    }

    #[inline]
    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.layers[0].width
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].width
    }

    #[inline]
    pub fn output_activation(&self) -> Activation {
        self.layers[self.layers.len() - 1].activation
    }
}
