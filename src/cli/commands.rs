//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fmt::Write as _;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::info;
use serde_json::Value;

use crate::error::{GraftError, Result};
use crate::import::KerasLrn;
use crate::layers::{InputType, LayerSpec};
use crate::model::ModelFile;
use crate::params::layout_for;
use crate::transfer::{SurgeryEngine, TransferRequest, TransferSummary};

/// Print a model's layer table, layout and checksum.
pub fn inspect(path: &Path) -> Result<()> {
    info!("Inspecting model: {}", path.display());

    let model = ModelFile::load(path)?;
    print!("{}", describe(&model));

    Ok(())
}

/// Render the `inspect` report for a loaded model.
pub fn describe(model: &ModelFile) -> String {
    let layout = layout_for(&model.topology);
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{:>3}  {:<28} {:>7} {:>7} {:>9}  {:<15}  frozen",
        "#", "layer", "in", "out", "params", "range"
    );
    for (ordinal, (spec, range)) in model.topology.iter().zip(layout.iter()).enumerate() {
        let _ = writeln!(
            out,
            "{:>3}  {:<28} {:>7} {:>7} {:>9}  {:<15}  {}",
            ordinal,
            spec.label(),
            spec.width_in,
            spec.width_out,
            range.len,
            format!("{}..{}", range.start, range.end()),
            if spec.frozen { "yes" } else { "no" }
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "layers: {}", model.topology.len());
    let _ = writeln!(out, "params: {}", model.params.len());
    let _ = writeln!(out, "checksum: {}", model.params.checksum());

    out
}

/// Apply a plan file to a model and write the result.
///
/// The seed comes from `seed` if given, else from the plan file, else 0.
pub fn apply(model_path: &Path, plan_path: &Path, output: &Path, seed: Option<u64>) -> Result<TransferSummary> {
    info!("Applying plan {} to {}", plan_path.display(), model_path.display());

    let base = ModelFile::load(model_path)?;
    let request = TransferRequest::load(plan_path)?;
    let plan = request.to_plan(&base.topology)?;

    let seed = seed.or(request.seed).unwrap_or_default();
    let result = SurgeryEngine::with_seed(seed).apply(&base.topology, &base.params, &plan)?;
    let summary = result.summary();

    ModelFile::from_network(&result.network).save(output)?;
    info!("Wrote {}", output.display());

    println!("{}", summary);
    Ok(summary)
}

/// Map a Keras LRN config file to a layer spec and print it as JSON.
pub fn import_lrn(config_path: &Path, input_width: usize) -> Result<LayerSpec> {
    info!("Importing LRN config: {}", config_path.display());

    if !config_path.exists() {
        return Err(GraftError::FileNotFound {
            path: config_path.display().to_string(),
        });
    }
    let reader = BufReader::new(File::open(config_path)?);
    let config = match serde_json::from_reader(reader)? {
        Value::Object(map) => map,
        _ => {
            return Err(GraftError::InvalidConfiguration {
                key: "config".to_string(),
                reason: "layer config must be a JSON object".to_string(),
            })
        }
    };

    let lrn = KerasLrn::from_config(&config)?;
    let input = lrn.output_type(&[InputType::FeedForward { size: input_width }])?;
    let spec = lrn.to_layer_spec(&input)?;

    println!("{}", serde_json::to_string_pretty(&spec)?);
    Ok(spec)
}
