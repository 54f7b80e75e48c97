//! Transfer plan builder
//!
//! Edits are recorded as data against a base topology, validated as a
//! whole by `finalize`, and handed to the surgery engine as an immutable
//! `FrozenPlan`. Each builder call checks only what it can check locally
//! and leaves the builder untouched when it fails.
//!
//! The freeze boundary is inclusive and counted from the input end: a
//! boundary of `2` freezes layers 0, 1 and 2.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{GraftError, Result};
use crate::layers::{LayerSpec, Topology, TrainingConfig};
use crate::params::WeightInit;

/// Requested change to one existing layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replacement {
    pub width_in: Option<usize>,
    pub width_out: Option<usize>,
    pub weight_init: WeightInit,
}

/// Accumulates structural edits against a base topology
#[derive(Debug, Clone)]
pub struct TransferPlanBuilder<'a> {
    base: &'a Topology,
    freeze_boundary: Option<usize>,
    finetune: Option<TrainingConfig>,
    replacements: BTreeMap<usize, Replacement>,
    pop_from: Option<usize>,
    appended: Vec<LayerSpec>,
}

impl<'a> TransferPlanBuilder<'a> {
    /// Start an empty plan against `base`
    pub fn new(base: &'a Topology) -> Self {
        Self {
            base,
            freeze_boundary: None,
            finetune: None,
            replacements: BTreeMap::new(),
            pop_from: None,
            appended: Vec::new(),
        }
    }

    /// Freeze layers `0..=ordinal`
    ///
    /// # Errors
    /// `InvalidPlan` if `ordinal` is not a base layer or is at or beyond
    /// the pop point.
    pub fn set_freeze_boundary(&mut self, ordinal: usize) -> Result<&mut Self> {
        self.check_base_ordinal(ordinal)?;
        if let Some(pop) = self.pop_from {
            if ordinal >= pop {
                return Err(GraftError::invalid_plan(
                    ordinal,
                    format!("freeze boundary must be below the pop point {}", pop),
                ));
            }
        }
        debug!("[PLAN] freeze boundary set to layer {}", ordinal);
        self.freeze_boundary = Some(ordinal);
        Ok(self)
    }

    /// Training settings applied to every edited or appended layer
    pub fn set_finetune_config(&mut self, config: TrainingConfig) -> &mut Self {
        self.finetune = Some(config);
        self
    }

    /// Change a layer's output width and reinitialize it
    ///
    /// The following layer's input width is adjusted to match when the plan
    /// is finalized.
    ///
    /// # Errors
    /// `InvalidPlan` if the layer is not in the base topology, is already
    /// being discarded, is width-preserving, or `width_out` is zero.
    pub fn replace_width(&mut self, ordinal: usize, width_out: usize, scheme: WeightInit) -> Result<&mut Self> {
        self.check_editable(ordinal)?;
        if width_out == 0 {
            return Err(GraftError::invalid_plan(ordinal, "output width must be positive"));
        }
        debug!("[PLAN] layer {} output width -> {} ({})", ordinal, width_out, scheme);
        let entry = self.replacement_entry(ordinal);
        entry.width_out = Some(width_out);
        entry.weight_init = scheme;
        Ok(self)
    }

    /// Change a layer's input width and/or scheme and reinitialize it
    ///
    /// With `width_in = None` only the scheme changes.
    ///
    /// # Errors
    /// Same as [`replace_width`](Self::replace_width).
    pub fn replace_input(&mut self, ordinal: usize, width_in: Option<usize>, scheme: WeightInit) -> Result<&mut Self> {
        self.check_editable(ordinal)?;
        if width_in == Some(0) {
            return Err(GraftError::invalid_plan(ordinal, "input width must be positive"));
        }
        debug!("[PLAN] layer {} input width -> {:?} ({})", ordinal, width_in, scheme);
        let entry = self.replacement_entry(ordinal);
        if width_in.is_some() {
            entry.width_in = width_in;
        }
        entry.weight_init = scheme;
        Ok(self)
    }

    /// Discard layer `ordinal` and every layer after it
    ///
    /// # Errors
    /// `InvalidPlan` if `ordinal` is not a base layer, is frozen, or an
    /// already-recorded replacement would be discarded.
    pub fn pop_from(&mut self, ordinal: usize) -> Result<&mut Self> {
        self.check_base_ordinal(ordinal)?;
        if let Some(boundary) = self.freeze_boundary {
            if ordinal <= boundary {
                return Err(GraftError::invalid_plan(
                    ordinal,
                    format!("cannot discard frozen layers (freeze boundary is {})", boundary),
                ));
            }
        }
        if let Some((&edited, _)) = self.replacements.range(ordinal..).next() {
            return Err(GraftError::invalid_plan(
                ordinal,
                format!("layer {} has a pending replacement and would be discarded", edited),
            ));
        }
        debug!("[PLAN] pop from layer {}", ordinal);
        self.pop_from = Some(ordinal);
        Ok(self)
    }

    /// Append a new, freshly initialized layer
    ///
    /// A `width_in` of 0 is inferred from the preceding layer.
    pub fn append(&mut self, layer: LayerSpec) -> &mut Self {
        debug!("[PLAN] append {} ({} -> {})", layer.label(), layer.width_in, layer.width_out);
        self.appended.push(layer);
        self
    }

    /// Validate the whole plan and issue an immutable snapshot
    ///
    /// # Errors
    /// - `InvalidPlan` for a structurally impossible plan
    /// - `ConflictingEdit` when a frozen layer is resized or an explicit
    ///   input width disagrees with the width feeding that layer
    pub fn finalize(&self) -> Result<FrozenPlan> {
        let kept_len = self.pop_from.unwrap_or(self.base.len());

        if let (Some(boundary), Some(pop)) = (self.freeze_boundary, self.pop_from) {
            if boundary >= pop {
                return Err(GraftError::invalid_plan(
                    pop,
                    format!("pop point must be above the freeze boundary {}", boundary),
                ));
            }
        }

        for &ordinal in self.replacements.keys() {
            if ordinal >= kept_len {
                return Err(GraftError::invalid_plan(
                    ordinal,
                    format!("replacement targets a layer discarded by pop from {}", kept_len),
                ));
            }
            if let Some(boundary) = self.freeze_boundary {
                if ordinal <= boundary {
                    return Err(GraftError::conflict(
                        vec![ordinal],
                        format!(
                            "tried to resize frozen layer {} (freeze boundary is {})",
                            ordinal, boundary
                        ),
                    ));
                }
            }
        }

        let cascades = self.derive_cascades(kept_len)?;
        self.check_explicit_inputs(&cascades)?;

        if kept_len == 0 && self.appended.is_empty() {
            return Err(GraftError::invalid_plan(0, "plan leaves no layers"));
        }

        let appended = self.resolve_appended(kept_len)?;

        debug!(
            "[PLAN] finalized: {} replacements, {} cascades, {} kept, {} appended",
            self.replacements.len(),
            cascades.len(),
            kept_len,
            appended.len()
        );

        Ok(FrozenPlan {
            base_len: self.base.len(),
            freeze_boundary: self.freeze_boundary,
            finetune: self.finetune.clone(),
            replacements: self.replacements.clone(),
            cascades,
            pop_from: self.pop_from,
            appended,
        })
    }

    fn check_base_ordinal(&self, ordinal: usize) -> Result<()> {
        if ordinal >= self.base.len() {
            return Err(GraftError::invalid_plan(
                ordinal,
                format!("base topology has only {} layers", self.base.len()),
            ));
        }
        Ok(())
    }

    fn check_editable(&self, ordinal: usize) -> Result<()> {
        if ordinal >= self.base.len() {
            return Err(GraftError::invalid_plan(
                ordinal,
                format!(
                    "base topology has only {} layers; appended layers cannot be resized",
                    self.base.len()
                ),
            ));
        }
        if let Some(pop) = self.pop_from {
            if ordinal >= pop {
                return Err(GraftError::invalid_plan(
                    ordinal,
                    format!("layer is discarded by pop from {}", pop),
                ));
            }
        }
        let spec = &self.base.layers()[ordinal];
        if spec.kind.is_width_preserving() {
            return Err(GraftError::invalid_plan(
                ordinal,
                format!("{} layers have no independent width", spec.kind.type_name()),
            ));
        }
        Ok(())
    }

    fn replacement_entry(&mut self, ordinal: usize) -> &mut Replacement {
        let current_init = self.base.layers()[ordinal].weight_init;
        self.replacements.entry(ordinal).or_insert_with(|| Replacement {
            width_in: None,
            width_out: None,
            weight_init: current_init,
        })
    }

    /// Input widths forced onto the layer after each resized layer
    fn derive_cascades(&self, kept_len: usize) -> Result<BTreeMap<usize, usize>> {
        let mut cascades = BTreeMap::new();
        for (&ordinal, replacement) in &self.replacements {
            let (Some(width), target) = (replacement.width_out, ordinal + 1) else {
                continue;
            };
            if target >= kept_len {
                continue;
            }
            let target_spec = &self.base.layers()[target];
            if target_spec.kind.is_width_preserving() {
                return Err(GraftError::invalid_plan(
                    target,
                    format!(
                        "{} layer cannot absorb the width change of layer {}",
                        target_spec.kind.type_name(),
                        ordinal
                    ),
                ));
            }
            if let Some(explicit) = self.replacements.get(&target).and_then(|r| r.width_in) {
                if explicit != width {
                    return Err(GraftError::conflict(
                        vec![ordinal, target],
                        format!(
                            "layer {} outputs {} but layer {} was given input width {}",
                            ordinal, width, target, explicit
                        ),
                    ));
                }
            }
            cascades.insert(target, width);
        }
        Ok(cascades)
    }

    /// Explicit input widths with no cascade must match what feeds the layer
    ///
    /// Layer 0 is checked against the declared input type, when there is one.
    fn check_explicit_inputs(&self, cascades: &BTreeMap<usize, usize>) -> Result<()> {
        for (&ordinal, replacement) in &self.replacements {
            let Some(width_in) = replacement.width_in else {
                continue;
            };
            if cascades.contains_key(&ordinal) {
                continue;
            }
            let (feeding, ordinals, source) = if ordinal == 0 {
                match self.base.settings().input_type {
                    Some(input) => (input.feature_width(), vec![0], "the network input".to_string()),
                    None => continue,
                }
            } else {
                let previous = ordinal - 1;
                (
                    self.base.layers()[previous].width_out,
                    vec![previous, ordinal],
                    format!("layer {}", previous),
                )
            };
            if width_in != feeding {
                return Err(GraftError::conflict(
                    ordinals,
                    format!(
                        "layer {} was given input width {} but {} provides {}",
                        ordinal, width_in, source, feeding
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Output width of the last kept layer after edits
    fn kept_width_out(&self, kept_len: usize) -> Option<usize> {
        if kept_len == 0 {
            return self
                .base
                .settings()
                .input_type
                .map(|input| input.feature_width());
        }
        let last = kept_len - 1;
        self.replacements
            .get(&last)
            .and_then(|r| r.width_out)
            .or_else(|| Some(self.base.layers()[last].width_out))
    }

    fn resolve_appended(&self, kept_len: usize) -> Result<Vec<LayerSpec>> {
        let mut previous = self.kept_width_out(kept_len);
        let mut resolved = Vec::with_capacity(self.appended.len());

        for (i, layer) in self.appended.iter().enumerate() {
            let ordinal = kept_len + i;
            let mut spec = layer.clone();
            spec.frozen = false;

            if spec.kind.is_width_preserving() {
                let width = match (previous, spec.width_out) {
                    (Some(p), 0) => p,
                    (Some(p), w) if w == p => p,
                    (None, w) if w > 0 => w,
                    (Some(p), w) => {
                        return Err(GraftError::invalid_plan(
                            ordinal,
                            format!("appended layer width {} does not match preceding width {}", w, p),
                        ))
                    }
                    (None, _) => {
                        return Err(GraftError::invalid_plan(ordinal, "cannot infer width of appended layer"))
                    }
                };
                spec.width_in = width;
                spec.width_out = width;
            } else {
                if spec.width_out == 0 {
                    return Err(GraftError::invalid_plan(ordinal, "appended layer needs a positive output width"));
                }
                match (previous, spec.width_in) {
                    (Some(p), 0) => spec.width_in = p,
                    (Some(p), w) if w != p => {
                        return Err(GraftError::invalid_plan(
                            ordinal,
                            format!("appended layer input width {} does not match preceding width {}", w, p),
                        ))
                    }
                    (None, 0) => {
                        return Err(GraftError::invalid_plan(ordinal, "cannot infer input width of appended layer"))
                    }
                    _ => {}
                }
            }

            previous = Some(spec.width_out);
            resolved.push(spec);
        }

        Ok(resolved)
    }
}

/// Validated, immutable transfer plan
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenPlan {
    base_len: usize,
    freeze_boundary: Option<usize>,
    finetune: Option<TrainingConfig>,
    replacements: BTreeMap<usize, Replacement>,
    cascades: BTreeMap<usize, usize>,
    pop_from: Option<usize>,
    appended: Vec<LayerSpec>,
}

impl FrozenPlan {
    /// Number of layers in the topology this plan was built for
    pub fn base_len(&self) -> usize {
        self.base_len
    }

    pub fn freeze_boundary(&self) -> Option<usize> {
        self.freeze_boundary
    }

    pub fn finetune(&self) -> Option<&TrainingConfig> {
        self.finetune.as_ref()
    }

    pub fn replacements(&self) -> &BTreeMap<usize, Replacement> {
        &self.replacements
    }

    /// Cascade target ordinal -> forced input width
    pub fn cascades(&self) -> &BTreeMap<usize, usize> {
        &self.cascades
    }

    pub fn pop_from(&self) -> Option<usize> {
        self.pop_from
    }

    /// Appended specs with inferred widths resolved
    pub fn appended(&self) -> &[LayerSpec] {
        &self.appended
    }

    /// Number of base layers that survive truncation
    pub fn kept_len(&self) -> usize {
        self.pop_from.unwrap_or(self.base_len)
    }

    /// Number of layers in the resulting topology
    pub fn result_len(&self) -> usize {
        self.kept_len() + self.appended.len()
    }

    /// Whether the kept layer at `ordinal` will be reinitialized
    pub fn is_reinitialized(&self, ordinal: usize) -> bool {
        self.replacements.contains_key(&ordinal) || self.cascades.contains_key(&ordinal)
    }

    /// Whether applying this plan changes nothing
    pub fn is_identity(&self) -> bool {
        self.freeze_boundary.is_none()
            && self.replacements.is_empty()
            && self.pop_from.is_none()
            && self.appended.is_empty()
    }
}
