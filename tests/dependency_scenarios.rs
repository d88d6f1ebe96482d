//! End-to-end pruning through traced dependency chains.
//!
//! Each test builds a graph, propagates one pruning decision and checks
//! that the model still runs with the expected reduced shapes.

use aprender_depgraph::nn::{
    BatchNorm1d, BatchNorm2d, Conv2d, Flatten, Linear, Model, Module, ReLU, Sequential,
};
use aprender_depgraph::pruning::{
    propagate_channel_pruning, DepGraphError, DependencyGraph, NodeId, PruneOp,
};
use aprender_depgraph::trace::Tensor;

fn key(graph: &DependencyGraph, model: &Model, index: usize) -> NodeId {
    graph
        .node_for_layer(model.modules()[index].id())
        .expect("layer was traced")
}

#[test]
fn conv_bn_relu_conv_prunes_in_lock_step() {
    let mut model = Model::new(
        Sequential::new()
            .add(Conv2d::new(3, 16, 3))
            .add(BatchNorm2d::new(16))
            .add(ReLU::new())
            .add(Conv2d::new(16, 32, 3)),
    );
    let input = Tensor::ones(&[1, 3, 8, 8]);
    let graph = DependencyGraph::build(&model, &input).expect("build");
    let conv1 = key(&graph, &model, 1);

    let plan = propagate_channel_pruning(&mut model, &graph, conv1, &[0, 3, 3, 15])
        .expect("propagate");

    let ops: Vec<PruneOp> = plan.changes.iter().map(|c| c.op).collect();
    assert_eq!(
        ops,
        vec![
            PruneOp::PruneConvOut,
            PruneOp::PruneBatchNormIn,
            PruneOp::PruneConvIn
        ]
    );
    for change in &plan.changes {
        assert_eq!(change.removed, vec![0, 3, 15]);
        assert_eq!((change.before, change.after), (16, 13));
    }

    let modules = model.modules();
    let conv2 = modules[4]
        .as_any()
        .downcast_ref::<Conv2d>()
        .expect("conv2");
    assert_eq!(conv2.in_channels(), 13);
    assert_eq!(conv2.out_channels(), 32);

    let output = model.forward(&input).expect("pruned model runs").output;
    assert_eq!(output.shape(), &[1, 32, 4, 4]);
}

#[test]
fn conv_flatten_linear_expands_channel_blocks() {
    let mut model = Model::new(
        Sequential::new()
            .add(Conv2d::new(2, 4, 1))
            .add(Flatten::new())
            .add(Linear::new(4 * 3 * 3, 5)),
    );
    let input = Tensor::ones(&[2, 2, 3, 3]);
    let graph = DependencyGraph::build(&model, &input).expect("build");
    let conv = key(&graph, &model, 1);

    let plan = propagate_channel_pruning(&mut model, &graph, conv, &[1]).expect("propagate");

    let linear = plan
        .change(model.modules()[3].id(), PruneOp::PruneLinearIn)
        .expect("linear input pruned");
    assert_eq!(linear.removed, (9..18).collect::<Vec<_>>());
    assert_eq!((linear.before, linear.after), (36, 27));

    let output = model.forward(&input).expect("pruned model runs").output;
    assert_eq!(output.shape(), &[2, 5]);
}

#[test]
fn linear_bn_relu_linear() {
    let mut model = Model::new(
        Sequential::new()
            .add(Linear::new(6, 8))
            .add(BatchNorm1d::new(8))
            .add(ReLU::new())
            .add(Linear::new(8, 3)),
    );
    let input = Tensor::ones(&[4, 6]);
    let graph = DependencyGraph::build(&model, &input).expect("build");
    let first = key(&graph, &model, 1);

    let plan = propagate_channel_pruning(&mut model, &graph, first, &[7, 2]).expect("propagate");
    assert_eq!(plan.len(), 3);
    assert_eq!(model.forward(&input).expect("runs").output.shape(), &[4, 3]);
}

#[test]
fn last_layer_has_empty_chain() {
    let mut model = Model::new(
        Sequential::new()
            .add(Linear::new(4, 4))
            .add(ReLU::new())
            .add(Linear::new(4, 3)),
    );
    let input = Tensor::ones(&[1, 4]);
    let graph = DependencyGraph::build(&model, &input).expect("build");
    let last = key(&graph, &model, 3);

    let plan = propagate_channel_pruning(&mut model, &graph, last, &[0]).expect("propagate");
    assert_eq!(plan.len(), 1);
    assert_eq!(model.forward(&input).expect("runs").output.shape(), &[1, 2]);
}

#[test]
fn rejected_decision_leaves_model_untouched() {
    let mut model = Model::new(
        Sequential::new()
            .add(Conv2d::new(1, 2, 1))
            .add(ReLU::new())
            .add(Conv2d::new(2, 2, 1)),
    );
    let input = Tensor::ones(&[1, 1, 2, 2]);
    let graph = DependencyGraph::build(&model, &input).expect("build");
    let conv1 = key(&graph, &model, 1);

    let err = propagate_channel_pruning(&mut model, &graph, conv1, &[0, 1]).unwrap_err();
    assert!(matches!(err, DepGraphError::WouldRemoveAll { size: 2, .. }));

    let err = propagate_channel_pruning(&mut model, &graph, conv1, &[2]).unwrap_err();
    assert!(matches!(err, DepGraphError::IndexOutOfRange { index: 2, size: 2 }));

    let output = model.forward(&input).expect("still runs").output;
    assert_eq!(output.shape(), &[1, 2, 2, 2]);
}

#[test]
fn non_prunable_node_is_not_a_key() {
    let mut model = Model::new(
        Sequential::new()
            .add(Linear::new(2, 2))
            .add(ReLU::new())
            .add(Linear::new(2, 2)),
    );
    let graph = DependencyGraph::build(&model, &Tensor::ones(&[1, 2])).expect("build");
    let relu = key(&graph, &model, 2);

    let err = propagate_channel_pruning(&mut model, &graph, relu, &[0]).unwrap_err();
    assert!(matches!(err, DepGraphError::NotAKey(id) if id == relu));
}

#[test]
fn report_serializes_chains() {
    let model = Model::new(
        Sequential::new()
            .add(Conv2d::new(3, 4, 3))
            .add(Flatten::new())
            .add(Linear::new(4, 2)),
    );
    let graph = DependencyGraph::build(&model, &Tensor::ones(&[1, 3, 3, 3])).expect("build");
    let json = graph.report().to_json().expect("serialize");

    assert!(json.contains("\"prune_conv_out\""));
    assert!(json.contains("\"prune_linear_in\""));
    assert!(json.contains("\"flatten\""));
}
