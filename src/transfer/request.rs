//! Plan files
//!
//! A `TransferRequest` is the JSON form of a transfer plan. It is always
//! replayed through `TransferPlanBuilder`, so a plan file gets exactly the
//! validation a programmatic plan gets.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::plan::{FrozenPlan, TransferPlanBuilder};
use crate::error::{GraftError, Result};
use crate::layers::{LayerSpec, Topology, TrainingConfig};
use crate::params::WeightInit;

/// Which side of a layer a replacement changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementKind {
    Output,
    Input,
}

/// One entry of the `replacements` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementRequest {
    pub ordinal: usize,
    pub kind: ReplacementKind,
    /// New width; required for `output`, optional for `input`
    #[serde(default)]
    pub width: Option<usize>,
    /// Scheme name, parsed when the plan is built; defaults to `xavier`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_init: Option<String>,
}

impl ReplacementRequest {
    /// Resolve the scheme name
    ///
    /// # Errors
    /// `UnsupportedScheme` for an unknown name.
    pub fn scheme(&self) -> Result<WeightInit> {
        match &self.weight_init {
            Some(name) => name.parse(),
            None => Ok(WeightInit::default()),
        }
    }
}

/// Serialized transfer plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferRequest {
    /// Seed for fresh values; the CLI flag overrides it
    pub seed: Option<u64>,
    pub freeze_boundary: Option<usize>,
    pub finetune: Option<TrainingConfig>,
    pub replacements: Vec<ReplacementRequest>,
    pub pop_from: Option<usize>,
    pub append: Vec<LayerSpec>,
}

impl TransferRequest {
    /// Load a plan file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GraftError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Replay this request against `base` and finalize it
    ///
    /// Pop and freeze are recorded before replacements, and replacements
    /// in file order, so later entries for one ordinal win.
    pub fn to_plan(&self, base: &Topology) -> Result<FrozenPlan> {
        let mut builder = TransferPlanBuilder::new(base);

        if let Some(ordinal) = self.freeze_boundary {
            builder.set_freeze_boundary(ordinal)?;
        }
        if let Some(ordinal) = self.pop_from {
            builder.pop_from(ordinal)?;
        }
        if let Some(finetune) = &self.finetune {
            builder.set_finetune_config(finetune.clone());
        }

        for replacement in &self.replacements {
            let scheme = replacement.scheme()?;
            match replacement.kind {
                ReplacementKind::Output => {
                    let width = replacement.width.ok_or_else(|| {
                        GraftError::invalid_plan(replacement.ordinal, "output replacement needs a width")
                    })?;
                    builder.replace_width(replacement.ordinal, width, scheme)?;
                }
                ReplacementKind::Input => {
                    builder.replace_input(replacement.ordinal, replacement.width, scheme)?;
                }
            }
        }

        for layer in &self.append {
            builder.append(layer.clone());
        }

        builder.finalize()
    }
}
