//! Model files
//!
//! A model file is a JSON document holding a topology and its flat
//! parameter buffer, plus the buffer checksum for integrity checks.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::network::Network;
use crate::error::{GraftError, Result};
use crate::layers::Topology;
use crate::params::ParameterBuffer;

/// On-disk form of a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub topology: Topology,
    pub params: ParameterBuffer,
    /// SHA-256 of `params`; verified on load when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl ModelFile {
    /// Capture a network's topology and parameters
    pub fn from_network(network: &Network) -> Self {
        Self {
            topology: network.topology().clone(),
            params: network.params().clone(),
            checksum: Some(network.params().checksum()),
        }
    }

    /// Load a model file from disk
    ///
    /// # Errors
    /// - `FileNotFound` if the path does not exist
    /// - `InvalidTopology` if the stored topology breaks its invariants
    /// - `InvalidConfiguration` if the stored checksum no longer matches
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GraftError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let model: ModelFile = serde_json::from_reader(reader)?;
        model.topology.validate()?;

        if let Some(expected) = &model.checksum {
            let actual = model.params.checksum();
            if *expected != actual {
                return Err(GraftError::InvalidConfiguration {
                    key: "checksum".to_string(),
                    reason: format!(
                        "stored checksum {} does not match parameters ({})",
                        expected, actual
                    ),
                });
            }
        }

        Ok(model)
    }

    /// Write the model file as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Assemble the stored network
    pub fn into_network(self) -> Result<Network> {
        Network::new(self.topology, self.params)
    }
}
