//! Surgery engine
//!
//! Applies a `FrozenPlan` to a base topology and buffer, producing a new
//! assembled network. The base is only borrowed: every run allocates its
//! own output, so several runs may share one base model.
//!
//! Steps, in order: truncate, edit, freeze, append, re-layout, rebuild the
//! buffer from base views and fresh slices, assemble.

use std::borrow::Cow;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::plan::FrozenPlan;
use super::summary::TransferSummary;
use crate::error::{GraftError, Result};
use crate::layers::{LayerSpec, Topology};
use crate::model::Network;
use crate::params::{initialize_role, layout_for, Layout, ParameterBuffer};

/// Where a layer's values in the new buffer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ParamSource {
    /// Copied bit-for-bit from this base ordinal
    Kept { base_ordinal: usize },
    /// Existing layer resized or given a new scheme
    Reinitialized,
    /// New layer from the plan's append list
    Appended,
}

/// A new layer spec and the origin of its values
#[derive(Debug, Clone)]
struct Slot {
    spec: LayerSpec,
    source: ParamSource,
}

/// Result of one surgery run
#[derive(Debug)]
pub struct SurgeryOutput {
    pub network: Network,
    /// One entry per layer of `network`, in order
    pub provenance: Vec<ParamSource>,
    base_params: usize,
    base_checksum: String,
}

impl SurgeryOutput {
    /// Before/after report for this run
    pub fn summary(&self) -> TransferSummary {
        TransferSummary::new(
            self.base_params,
            self.base_checksum.clone(),
            &self.network,
            &self.provenance,
        )
    }

    pub fn into_network(self) -> Network {
        self.network
    }
}

/// Applies transfer plans
#[derive(Debug, Clone, Copy, Default)]
pub struct SurgeryEngine {
    seed: u64,
}

impl SurgeryEngine {
    /// Engine whose runs draw fresh values from `seed`
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Apply a plan with a generator seeded from this engine's seed
    pub fn apply(&self, base: &Topology, base_params: &ParameterBuffer, plan: &FrozenPlan) -> Result<SurgeryOutput> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        self.apply_with_rng(base, base_params, plan, &mut rng)
    }

    /// Apply a plan drawing fresh values from `rng`
    ///
    /// All-or-nothing: on error no output is produced.
    ///
    /// # Errors
    /// - `InvalidPlan` if the plan was built for a different layer count
    /// - `ShapeMismatch` if the base buffer does not match the base
    ///   topology, or a kept slice no longer matches its spec
    /// - `UnsupportedScheme` from the initializer
    pub fn apply_with_rng(
        &self,
        base: &Topology,
        base_params: &ParameterBuffer,
        plan: &FrozenPlan,
        rng: &mut StdRng,
    ) -> Result<SurgeryOutput> {
        if plan.base_len() != base.len() {
            return Err(GraftError::invalid_plan(
                plan.base_len(),
                format!(
                    "plan was built for {} layers but the base topology has {}",
                    plan.base_len(),
                    base.len()
                ),
            ));
        }
        let base_layout = layout_for(base);
        base_layout.check_buffer(base_params)?;

        let mut slots = truncate(base, plan);
        edit(&mut slots, plan);
        freeze(&mut slots, plan);
        append(&mut slots, plan);

        let specs: Vec<LayerSpec> = slots.iter().map(|s| s.spec.clone()).collect();
        let layout = Layout::for_layers(&specs);
        let params = rebuild(&slots, &layout, base_params, &base_layout, rng)?;
        layout.check_buffer(&params)?;
        layout.check_specs(&specs)?;

        let preprocessors = base
            .input_preprocessors()
            .iter()
            .filter(|(ordinal, _)| {
                let kept = **ordinal < plan.kept_len();
                if !kept {
                    warn!("[SURGERY] dropping input preprocessor of removed layer {}", ordinal);
                }
                kept
            })
            .map(|(&ordinal, pre)| (ordinal, pre.clone()))
            .collect();
        let topology = Topology::with_settings(specs, base.settings().clone(), preprocessors)?;

        let provenance: Vec<ParamSource> = slots.iter().map(|s| s.source).collect();
        let network = Network::new(topology, params)?;

        info!(
            "[SURGERY] {} -> {} layers, {} -> {} params ({} trainable)",
            base.len(),
            network.num_layers(),
            base_params.len(),
            network.num_params(),
            network.num_trainable_params()
        );

        Ok(SurgeryOutput {
            network,
            provenance,
            base_params: base_params.len(),
            base_checksum: base_params.checksum(),
        })
    }
}

fn truncate(base: &Topology, plan: &FrozenPlan) -> Vec<Slot> {
    base.layers()[..plan.kept_len()]
        .iter()
        .enumerate()
        .map(|(ordinal, spec)| Slot {
            spec: spec.clone(),
            source: ParamSource::Kept { base_ordinal: ordinal },
        })
        .collect()
}

fn edit(slots: &mut [Slot], plan: &FrozenPlan) {
    for (&ordinal, replacement) in plan.replacements() {
        let slot = &mut slots[ordinal];
        slot.spec = slot
            .spec
            .resized(replacement.width_in, replacement.width_out, replacement.weight_init);
        slot.source = ParamSource::Reinitialized;
        debug!(
            "[SURGERY] layer {} resized to {} -> {}",
            ordinal, slot.spec.width_in, slot.spec.width_out
        );
    }

    for (&ordinal, &width_in) in plan.cascades() {
        let slot = &mut slots[ordinal];
        slot.spec.width_in = width_in;
        slot.source = ParamSource::Reinitialized;
        debug!("[SURGERY] layer {} input width cascaded to {}", ordinal, width_in);
    }

    if let Some(finetune) = plan.finetune() {
        for slot in slots.iter_mut().filter(|s| s.source == ParamSource::Reinitialized) {
            slot.spec.training = slot.spec.training.overlay(finetune);
        }
    }
}

fn freeze(slots: &mut [Slot], plan: &FrozenPlan) {
    if let Some(boundary) = plan.freeze_boundary() {
        for slot in slots.iter_mut().take(boundary + 1) {
            slot.spec.frozen = true;
        }
        debug!("[SURGERY] froze layers 0..={}", boundary);
    }
}

fn append(slots: &mut Vec<Slot>, plan: &FrozenPlan) {
    for layer in plan.appended() {
        let mut spec = layer.clone();
        match (plan.finetune(), slots.last()) {
            (Some(finetune), _) => spec.training = spec.training.or_else(finetune),
            (None, Some(previous)) => spec.training = spec.training.or_else(&previous.spec.training),
            (None, None) => {}
        }
        spec.frozen = false;
        slots.push(Slot {
            spec,
            source: ParamSource::Appended,
        });
    }
}

fn rebuild(
    slots: &[Slot],
    layout: &Layout,
    base_params: &ParameterBuffer,
    base_layout: &Layout,
    rng: &mut StdRng,
) -> Result<ParameterBuffer> {
    let mut pieces: Vec<Cow<'_, [f32]>> = Vec::with_capacity(slots.len());

    for (ordinal, slot) in slots.iter().enumerate() {
        let expected = layout.range(ordinal)?.len;
        match slot.source {
            ParamSource::Kept { base_ordinal } => {
                let view = base_params.slice(base_layout, base_ordinal)?;
                if view.len() != expected {
                    return Err(GraftError::ShapeMismatch {
                        location: format!("parameter count of kept layer {} (base layer {})", ordinal, base_ordinal),
                        expected,
                        actual: view.len(),
                    });
                }
                pieces.push(Cow::Borrowed(view));
            }
            ParamSource::Reinitialized | ParamSource::Appended => {
                let mut fresh = Vec::with_capacity(expected);
                for param in slot.spec.param_layout() {
                    fresh.extend(initialize_role(param.role, slot.spec.weight_init, &param.shape, rng)?);
                }
                pieces.push(Cow::Owned(fresh));
            }
        }
    }

    Ok(ParameterBuffer::concat(pieces))
}
