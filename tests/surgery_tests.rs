//! Surgery Integration Tests
//!
//! End-to-end tests for planning and applying transfer surgery.

use std::borrow::Cow;

use approx::assert_abs_diff_eq;
use pretty_assertions::assert_eq;
use test_case::test_case;

use netgraft::layers::{InputPreprocessor, LayerSpec, LossFunction, Topology, TrainingConfig, Updater};
use netgraft::params::{layout_for, ParameterBuffer, WeightInit};
use netgraft::transfer::{ParamSource, SurgeryEngine, TransferPlanBuilder};
use netgraft::{GraftError, Network};

/// Five dense layers: 8 -> 6 -> 6 -> 5 -> 4 -> 2
fn five_layers() -> Topology {
    Topology::new(vec![
        LayerSpec::dense(8, 6).named("in"),
        LayerSpec::dense(6, 6),
        LayerSpec::dense(6, 5),
        LayerSpec::dense(5, 4),
        LayerSpec::output(4, 2, LossFunction::McXent).named("out"),
    ])
    .unwrap()
}

/// Deterministic, distinct base values
fn base_params(topology: &Topology) -> ParameterBuffer {
    let n = topology.param_count();
    ParameterBuffer::from_vec((0..n).map(|i| ((i as f32) * 0.37).sin()).collect())
}

fn base_slice<'a>(topology: &Topology, params: &'a ParameterBuffer, ordinal: usize) -> &'a [f32] {
    params.slice(&layout_for(topology), ordinal).unwrap()
}

// === Identity, freeze and truncation ===

#[test]
fn test_identity_surgery() {
    let topology = five_layers();
    let params = base_params(&topology);
    let plan = TransferPlanBuilder::new(&topology).finalize().unwrap();

    let output = SurgeryEngine::default().apply(&topology, &params, &plan).unwrap();

    assert_eq!(output.network.topology(), &topology);
    assert_eq!(output.network.params().as_slice(), params.as_slice());
    assert!(output
        .provenance
        .iter()
        .enumerate()
        .all(|(i, source)| *source == ParamSource::Kept { base_ordinal: i }));
}

#[test]
fn test_freeze_preserves_values() {
    let topology = five_layers();
    let params = base_params(&topology);
    let mut builder = TransferPlanBuilder::new(&topology);
    builder.set_freeze_boundary(2).unwrap();
    let plan = builder.finalize().unwrap();

    let network = SurgeryEngine::default().apply(&topology, &params, &plan).unwrap().into_network();

    assert_eq!(network.params().as_slice(), params.as_slice());
    assert_eq!(network.topology().frozen_ordinals(), vec![0, 1, 2]);
    assert_eq!(network.trainable_mask(), vec![false, false, false, true, true]);
    for ordinal in 0..3 {
        assert!(!network.layer(ordinal).unwrap().is_trainable());
    }
    assert_eq!(network.num_trainable_params(), 5 * 4 + 4 + 4 * 2 + 2);
}

#[test]
fn test_frozen_layers_forward_unchanged() {
    let topology = five_layers();
    let params = base_params(&topology);
    let base = Network::new(topology.clone(), params.clone()).unwrap();

    let mut builder = TransferPlanBuilder::new(&topology);
    builder.set_freeze_boundary(3).unwrap();
    let plan = builder.finalize().unwrap();
    let frozen = SurgeryEngine::default().apply(&topology, &params, &plan).unwrap().into_network();

    let input = [0.5, -0.25, 1.0, 0.0, 0.75, -1.0, 0.1, 0.2];
    let expected = base.output(&input).unwrap();
    let actual = frozen.output(&input).unwrap();

    assert_eq!(expected.len(), actual.len());
    for (e, a) in expected.iter().zip(&actual) {
        assert_abs_diff_eq!(*e, *a, epsilon = 1e-6);
    }
}

#[test]
fn test_pop_keeps_prefix() {
    let topology = five_layers();
    let params = base_params(&topology);
    let mut builder = TransferPlanBuilder::new(&topology);
    builder.pop_from(3).unwrap();
    let plan = builder.finalize().unwrap();

    let network = SurgeryEngine::default().apply(&topology, &params, &plan).unwrap().into_network();

    assert_eq!(network.num_layers(), 3);
    let expected = ParameterBuffer::concat((0..3).map(|i| Cow::Borrowed(base_slice(&topology, &params, i))));
    assert_eq!(network.params().as_slice(), expected.as_slice());
}

// === Resizing ===

#[test]
fn test_resize_cascades_to_next_layer() {
    let topology = five_layers();
    let params = base_params(&topology);
    let mut builder = TransferPlanBuilder::new(&topology);
    builder.replace_width(2, 16, WeightInit::Relu).unwrap();
    let plan = builder.finalize().unwrap();

    let output = SurgeryEngine::with_seed(11).apply(&topology, &params, &plan).unwrap();
    let network = &output.network;

    for ordinal in [0, 1, 4] {
        assert_eq!(
            network.layer_params(ordinal).unwrap(),
            base_slice(&topology, &params, ordinal),
            "layer {} should be bit-identical",
            ordinal
        );
    }

    let layers = network.topology().layers();
    assert_eq!((layers[2].width_in, layers[2].width_out), (6, 16));
    assert_eq!((layers[3].width_in, layers[3].width_out), (16, 4));
    assert_eq!(layers[2].weight_init, WeightInit::Relu);
    assert_eq!(network.layer_params(2).unwrap().len(), 6 * 16 + 16);
    assert_eq!(network.layer_params(3).unwrap().len(), 16 * 4 + 4);
    assert_eq!(output.provenance[2], ParamSource::Reinitialized);
    assert_eq!(output.provenance[3], ParamSource::Reinitialized);

    // Fresh biases start at zero
    assert!(network.layer_params(2).unwrap()[6 * 16..].iter().all(|&b| b == 0.0));
}

#[test]
fn test_resize_frozen_layer_conflicts() {
    let topology = five_layers();
    let mut builder = TransferPlanBuilder::new(&topology);
    builder
        .set_freeze_boundary(2)
        .unwrap()
        .replace_width(1, 10, WeightInit::Xavier)
        .unwrap();

    let err = builder.finalize().unwrap_err();
    assert!(matches!(err, GraftError::ConflictingEdit { .. }));
    assert_eq!(err.ordinals(), vec![1]);
    assert!(err.to_string().contains("frozen layer 1"));
}

#[test]
fn test_resize_just_above_boundary_allowed() {
    let topology = five_layers();
    let params = base_params(&topology);
    let mut builder = TransferPlanBuilder::new(&topology);
    builder
        .set_freeze_boundary(1)
        .unwrap()
        .replace_width(2, 9, WeightInit::Xavier)
        .unwrap();
    let plan = builder.finalize().unwrap();

    let network = SurgeryEngine::default().apply(&topology, &params, &plan).unwrap().into_network();
    assert_eq!(network.topology().layers()[2].width_in, 6);
    assert!(network.topology().layers()[1].frozen);
    assert!(!network.topology().layers()[2].frozen);
}

// === Appending ===

#[test]
fn test_pop_and_append() {
    let topology = five_layers();
    let params = base_params(&topology);
    let mut builder = TransferPlanBuilder::new(&topology);
    builder
        .pop_from(3)
        .unwrap()
        .append(LayerSpec::dense(0, 7))
        .append(LayerSpec::output(0, 3, LossFunction::McXent));
    let plan = builder.finalize().unwrap();

    let network = SurgeryEngine::with_seed(5).apply(&topology, &params, &plan).unwrap().into_network();
    assert_eq!(network.num_layers(), 5);

    let layers = network.topology().layers();
    assert_eq!((layers[3].width_in, layers[3].width_out), (5, 7));
    assert_eq!((layers[4].width_in, layers[4].width_out), (7, 3));

    let base_slices: Vec<&[f32]> = (0..5).map(|i| base_slice(&topology, &params, i)).collect();
    for ordinal in [3, 4] {
        let fresh = network.layer_params(ordinal).unwrap();
        assert!(base_slices.iter().all(|base| *base != fresh));
    }
}

#[test]
fn test_append_batch_norm_initialized_by_role() {
    let topology = five_layers();
    let params = base_params(&topology);
    let mut builder = TransferPlanBuilder::new(&topology);
    builder.append(LayerSpec::batch_norm(0));
    let plan = builder.finalize().unwrap();

    let network = SurgeryEngine::default().apply(&topology, &params, &plan).unwrap().into_network();
    // gamma, beta, mean, var
    assert_eq!(
        network.layer_params(5).unwrap(),
        &[1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0][..]
    );
}

// === Reproducibility and settings ===

#[test_case(0 ; "seed 0")]
#[test_case(42 ; "seed 42")]
#[test_case(u64::MAX ; "max seed")]
fn test_same_seed_same_buffer(seed: u64) {
    let topology = five_layers();
    let params = base_params(&topology);
    let mut builder = TransferPlanBuilder::new(&topology);
    builder
        .replace_width(1, 12, WeightInit::Normal)
        .unwrap()
        .append(LayerSpec::dense(0, 3).with_weight_init(WeightInit::Uniform));
    let plan = builder.finalize().unwrap();

    let first = SurgeryEngine::with_seed(seed).apply(&topology, &params, &plan).unwrap();
    let second = SurgeryEngine::with_seed(seed).apply(&topology, &params, &plan).unwrap();
    assert_eq!(first.network.params(), second.network.params());
    assert_eq!(first.summary().new_checksum, second.summary().new_checksum);
}

#[test]
fn test_different_seeds_differ() {
    let topology = five_layers();
    let params = base_params(&topology);
    let mut builder = TransferPlanBuilder::new(&topology);
    builder.replace_width(3, 8, WeightInit::Xavier).unwrap();
    let plan = builder.finalize().unwrap();

    let a = SurgeryEngine::with_seed(1).apply(&topology, &params, &plan).unwrap();
    let b = SurgeryEngine::with_seed(2).apply(&topology, &params, &plan).unwrap();
    assert_ne!(a.network.params(), b.network.params());
}

#[test]
fn test_finetune_overlay() {
    let topology = five_layers();
    let params = base_params(&topology);
    let finetune = TrainingConfig::new().with_updater(Updater::Adam).with_learning_rate(1e-4);
    let mut builder = TransferPlanBuilder::new(&topology);
    builder
        .set_finetune_config(finetune)
        .set_freeze_boundary(1)
        .unwrap()
        .replace_width(3, 8, WeightInit::Xavier)
        .unwrap();
    let plan = builder.finalize().unwrap();

    let network = SurgeryEngine::default().apply(&topology, &params, &plan).unwrap().into_network();
    let layers = network.topology().layers();
    assert_eq!(layers[0].training.updater, None);
    assert_eq!(layers[3].training.updater, Some(Updater::Adam));
    assert_eq!(layers[4].training.learning_rate, Some(1e-4));
}

#[test]
fn test_preprocessors_restricted_to_kept_layers() {
    let topology = Topology::with_settings(
        five_layers().layers().to_vec(),
        Default::default(),
        [(1, InputPreprocessor::FeedForwardToRnn), (4, InputPreprocessor::RnnToFeedForward)]
            .into_iter()
            .collect(),
    )
    .unwrap();
    let params = base_params(&topology);
    let mut builder = TransferPlanBuilder::new(&topology);
    builder.pop_from(4).unwrap().append(LayerSpec::output(0, 2, LossFunction::Mse));
    let plan = builder.finalize().unwrap();

    let network = SurgeryEngine::default().apply(&topology, &params, &plan).unwrap().into_network();
    let kept: Vec<usize> = network.topology().input_preprocessors().keys().copied().collect();
    assert_eq!(kept, vec![1]);
}

// === Concurrency ===

#[test]
fn test_concurrent_runs_share_base() {
    let topology = five_layers();
    let params = base_params(&topology);
    let mut builder = TransferPlanBuilder::new(&topology);
    builder
        .set_freeze_boundary(0)
        .unwrap()
        .replace_width(2, 10, WeightInit::XavierUniform)
        .unwrap();
    let plan = builder.finalize().unwrap();

    let expected = SurgeryEngine::with_seed(9).apply(&topology, &params, &plan).unwrap();

    let results: Vec<ParameterBuffer> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    SurgeryEngine::with_seed(9)
                        .apply(&topology, &params, &plan)
                        .unwrap()
                        .into_network()
                        .into_parts()
                        .1
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for buffer in &results {
        assert_eq!(buffer, expected.network.params());
    }
    // Base untouched
    assert_eq!(params, base_params(&topology));
}
