//! Model serialization/deserialization (feature: `serde`).
//!
//! A versioned JSON format for [`Network`], decoupled from the in-memory types so the file
//! format can stay put if the internals move.
//!
//! Loading validates the version, every shape against the topology, and that all parameters
//! are finite.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, LayerSpec, Matrix, Network, ParameterStore, Result, Topology};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNetwork {
    pub format_version: u32,
    /// Every layer, input layer first.
    pub layers: Vec<LayerSpec>,
    pub params: Vec<SerializedParams>,
}

/// Parameters feeding layer `i + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedParams {
    /// Row-major `(width_i, width_{i+1})`.
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

impl From<&Network> for SerializedNetwork {
    fn from(net: &Network) -> Self {
        let p = net.params();
        let params = (0..p.num_layers())
            .map(|i| SerializedParams {
                weights: p.weights(i).as_slice().to_vec(),
                biases: p.biases(i).to_vec(),
            })
            .collect();
        Self {
            format_version: MODEL_FORMAT_VERSION,
            layers: net.topology().layers().to_vec(),
            params,
        }
    }
}

impl TryFrom<SerializedNetwork> for Network {
    type Error = Error;

    fn try_from(value: SerializedNetwork) -> std::result::Result<Self, Self::Error> {
        if value.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported model format_version {}; expected {}",
                value.format_version, MODEL_FORMAT_VERSION
            )));
        }
        let topology = Topology::new(value.layers)?;
        if value.params.len() != topology.num_layers() - 1 {
            return Err(Error::InvalidData(format!(
                "expected {} parameter blocks, found {}",
                topology.num_layers() - 1,
                value.params.len()
            )));
        }

        let mut weights = Vec::with_capacity(value.params.len());
        let mut biases = Vec::with_capacity(value.params.len());
        for (i, block) in value.params.into_iter().enumerate() {
            if block
                .weights
                .iter()
                .chain(&block.biases)
                .any(|v| !v.is_finite())
            {
                return Err(Error::InvalidData(format!(
                    "layer {i} parameters must be finite"
                )));
            }
            let (rows, cols) = (topology.layer(i).width, topology.layer(i + 1).width);
            weights.push(
                Matrix::from_vec(rows, cols, block.weights)
                    .map_err(|e| Error::InvalidData(format!("layer {i} weights invalid: {e}")))?,
            );
            biases.push(block.biases);
        }

        Network::from_parts(topology, ParameterStore::from_parts(weights, biases)?)
    }
}

impl Network {
    /// Serialize the network to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&SerializedNetwork::from(self))
            .map_err(|e| Error::InvalidData(format!("failed to serialize network: {e}")))
    }

    /// Serialize the network to a compact JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(&SerializedNetwork::from(self))
            .map_err(|e| Error::InvalidData(format!("failed to serialize network: {e}")))
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedNetwork = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse network json: {e}")))?;
        ser.try_into()
    }

    /// Save the network to a JSON file (pretty-printed).
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        std::fs::write(p, s)
            .map_err(|e| Error::InvalidData(format!("failed to write {}: {e}", p.display())))
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::InvalidData(format!("failed to read {}: {e}", p.display())))?;
        Self::from_json_str(&s)
    }
}
