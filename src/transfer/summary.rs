//! Before/after report of a surgery run
//!
//! Shows how many parameters were reused, reinitialized, appended and
//! removed, and how many are frozen versus trainable.

use std::fmt;

use serde::Serialize;

use super::engine::ParamSource;
use crate::model::Network;

/// One row of the per-layer table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerRow {
    pub ordinal: usize,
    pub label: String,
    pub width_in: usize,
    pub width_out: usize,
    pub params: usize,
    pub frozen: bool,
    pub source: ParamSource,
}

/// Parameter accounting for one surgery run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferSummary {
    pub base_params: usize,
    pub new_params: usize,
    pub reused_params: usize,
    pub reinitialized_params: usize,
    pub appended_params: usize,
    /// Base values not carried into the new buffer
    pub removed_params: usize,
    pub frozen_params: usize,
    pub trainable_params: usize,
    pub base_checksum: String,
    pub new_checksum: String,
    pub layers: Vec<LayerRow>,
}

impl TransferSummary {
    pub(crate) fn new(base_params: usize, base_checksum: String, network: &Network, provenance: &[ParamSource]) -> Self {
        let layers: Vec<LayerRow> = network
            .topology()
            .iter()
            .zip(network.layout().iter())
            .zip(provenance)
            .enumerate()
            .map(|(ordinal, ((spec, range), &source))| LayerRow {
                ordinal,
                label: spec.label().to_string(),
                width_in: spec.width_in,
                width_out: spec.width_out,
                params: range.len,
                frozen: spec.frozen,
                source,
            })
            .collect();

        let sum_where = |pred: &dyn Fn(&LayerRow) -> bool| -> usize {
            layers.iter().filter(|row| pred(row)).map(|row| row.params).sum()
        };
        let reused_params = sum_where(&|row| matches!(row.source, ParamSource::Kept { .. }));
        let reinitialized_params = sum_where(&|row| row.source == ParamSource::Reinitialized);
        let appended_params = sum_where(&|row| row.source == ParamSource::Appended);
        let frozen_params = sum_where(&|row| row.frozen);

        Self {
            base_params,
            new_params: network.num_params(),
            reused_params,
            reinitialized_params,
            appended_params,
            removed_params: base_params - reused_params,
            frozen_params,
            trainable_params: network.num_params() - frozen_params,
            base_checksum,
            new_checksum: network.params().checksum(),
            layers,
        }
    }
}

impl fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>3}  {:<28} {:>7} {:>7} {:>9}  {:<6}  source", "#", "layer", "in", "out", "params", "frozen")?;
        for row in &self.layers {
            let source = match row.source {
                ParamSource::Kept { base_ordinal } => format!("kept (base {})", base_ordinal),
                ParamSource::Reinitialized => "reinitialized".to_string(),
                ParamSource::Appended => "appended".to_string(),
            };
            writeln!(
                f,
                "{:>3}  {:<28} {:>7} {:>7} {:>9}  {:<6}  {}",
                row.ordinal,
                row.label,
                row.width_in,
                row.width_out,
                row.params,
                if row.frozen { "yes" } else { "no" },
                source
            )?;
        }
        writeln!(f)?;
        writeln!(f, "params: {} -> {}", self.base_params, self.new_params)?;
        writeln!(
            f,
            "reused: {}, reinitialized: {}, appended: {}, removed: {}",
            self.reused_params, self.reinitialized_params, self.appended_params, self.removed_params
        )?;
        writeln!(f, "frozen: {}, trainable: {}", self.frozen_params, self.trainable_params)?;
        writeln!(f, "base checksum: {}", self.base_checksum)?;
        write!(f, "new checksum:  {}", self.new_checksum)
    }
}
