//! Network builder.
//!
//! `NetworkBuilder` is the recommended way to define a network. It records layer widths and
//! activations, prepends the identity input layer, and initializes weights with a scheme
//! suited to each layer's activation (see [`crate::params::Init`]).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Activation, Error, LayerSpec, Network, ParameterStore, Result, Topology};

#[derive(Debug, Clone)]
/// Builder for a [`Network`].
///
/// ```rust
/// use fjnet::{Activation, NetworkBuilder};
///
/// # fn main() -> fjnet::Result<()> {
/// let net = NetworkBuilder::new(2)?
///     .add_layer(8, Activation::ReLU)?
///     .add_layer(3, Activation::Softmax)?
///     .build_with_seed(0)?;
/// assert_eq!(net.topology().num_layers(), 3);
/// # Ok(())
/// # }
/// ```
pub struct NetworkBuilder {
    input_dim: usize,
    layers: Vec<LayerSpec>,
}

impl NetworkBuilder {
    /// Start building a network that accepts `input_dim` features per row.
    pub fn new(input_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidConfig("input_dim must be > 0".to_owned()));
        }
        Ok(Self {
            input_dim,
            layers: Vec::new(),
        })
    }

    /// Convenience constructor from a sizes list + activations.
    ///
    /// `sizes` includes the input width, so its length must be at least 2.
    /// `activations` must have length `sizes.len() - 1`.
    pub fn from_sizes(sizes: &[usize], activations: &[Activation]) -> Result<Self> {
        if sizes.len() < 2 {
            return Err(Error::InvalidConfig(
                "sizes must include input and output widths".to_owned(),
            ));
        }
        if activations.len() != sizes.len() - 1 {
            return Err(Error::InvalidConfig(format!(
                "activations length {} does not match sizes.len() - 1 ({})",
                activations.len(),
                sizes.len() - 1
            )));
        }

        let mut b = Self::new(sizes[0])?;
        for (&width, &act) in sizes[1..].iter().zip(activations) {
            b = b.add_layer(width, act)?;
        }
        Ok(b)
    }

    /// Append a layer with `width` units and `activation`.
    pub fn add_layer(mut self, width: usize, activation: Activation) -> Result<Self> {
        if width == 0 {
            return Err(Error::InvalidConfig("layer width must be > 0".to_owned()));
        }
        activation.validate()?;
        self.layers.push(LayerSpec::new(width, activation));
        Ok(self)
    }

    fn topology(self) -> Result<Topology> {
        if self.layers.is_empty() {
            return Err(Error::InvalidConfig(
                "network must have at least one layer after the input".to_owned(),
            ));
        }
        let mut specs = Vec::with_capacity(self.layers.len() + 1);
        specs.push(LayerSpec::input(self.input_dim));
        specs.extend(self.layers);
        Topology::new(specs)
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<Network> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Network> {
        let topology = self.topology()?;
        let params = ParameterStore::init_with_rng(&topology, rng);
        Network::from_parts(topology, params)
    }

    /// Build with every weight and bias set to zero.
    pub fn build_zeroed(self) -> Result<Network> {
        let topology = self.topology()?;
        let params = ParameterStore::zeros(&topology);
        Network::from_parts(topology, params)
    }
}
