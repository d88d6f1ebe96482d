//! Graph construction from one traced forward evaluation.
//!
//! The builder hooks every tracked layer so that it learns which layer
//! produced which trace record, runs the model once, then walks the tape
//! backwards from the final output. Each distinct record becomes one
//! [`Node`]; forward edges are the reversed predecessor relation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, info, warn};

use super::config::{GraphConfig, OwnerlessFallback};
use super::error::DepGraphError;
use super::node::{LayerRef, Node, NodeId, NodeKey, OpType};
use crate::nn::{LayerId, Model, Module};
use crate::trace::{Tape, Tensor, TraceHandle};

/// Name fragments of ownerless shape reinterpretations.
const RESHAPE_OPS: [&str; 3] = ["view", "reshape", "flatten"];

/// Kind of a traced operation, given its owning layer (if any) and name.
///
/// Owned operations are classified by the owner's role. Ownerless ones are
/// activations when their name mentions `relu`, reshapes when it mentions
/// `view`, `reshape` or `flatten`, otherwise `fallback`.
#[must_use]
pub fn classify(owner: Option<&LayerRef>, op_name: &str, fallback: OwnerlessFallback) -> OpType {
    if let Some(kind) = owner.and_then(|layer| OpType::from_role(layer.role)) {
        return kind;
    }
    let name = op_name.to_ascii_lowercase();
    if name.contains("relu") {
        OpType::Activation
    } else if RESHAPE_OPS.iter().any(|op| name.contains(op)) {
        OpType::Flatten
    } else {
        fallback.op_type()
    }
}

/// Raw graph produced by [`GraphBuilder::build`].
#[derive(Debug, Default)]
pub(crate) struct TracedGraph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) module_to_node: HashMap<NodeKey, NodeId>,
    pub(crate) reused_layers: Vec<LayerId>,
}

/// Builds the node graph of a model for one input.
#[derive(Debug)]
pub(crate) struct GraphBuilder<'c> {
    config: &'c GraphConfig,
}

impl<'c> GraphBuilder<'c> {
    /// Create a builder using `config`.
    #[must_use]
    pub(crate) fn new(config: &'c GraphConfig) -> Self {
        Self { config }
    }

    /// Trace `model` on `input` and materialize its node graph.
    ///
    /// All hooks attached here are detached before returning, on success
    /// and on failure alike.
    pub(crate) fn build(&self, model: &Model, input: &Tensor) -> Result<TracedGraph, DepGraphError> {
        let (output, tape, owners) = self.trace(model, input)?;

        let Some(root) = output.history() else {
            debug!("model output carries no history, graph is empty");
            return Ok(TracedGraph::default());
        };

        let graph = self.walk(&tape, &owners, root)?;
        info!(
            nodes = graph.nodes.len(),
            layers = graph.module_to_node.len(),
            recorded = tape.len(),
            "built dependency graph"
        );
        Ok(graph)
    }

    fn trace(
        &self,
        model: &Model,
        input: &Tensor,
    ) -> Result<(Tensor, Tape, HashMap<TraceHandle, LayerRef>), DepGraphError> {
        let owners: Rc<RefCell<HashMap<TraceHandle, LayerRef>>> = Rc::default();

        let mut guard = model.hook_guard();
        for module in model.modules() {
            if !self.config.tracks(module.role()) {
                continue;
            }
            let sink = Rc::clone(&owners);
            guard.attach(
                module.id(),
                Box::new(move |layer: &dyn Module, output: &Tensor| {
                    // Inner layers fire first; a layer passing its input
                    // through must not claim the producer's record.
                    if let Some(handle) = output.history() {
                        sink.borrow_mut()
                            .entry(handle)
                            .or_insert_with(|| LayerRef::of(layer));
                    }
                }),
            );
        }
        debug!(hooks = guard.len(), "attached tracing hooks");

        let trace = model.forward(input)?;
        drop(guard);

        let owners = owners.take();
        Ok((trace.output, trace.tape, owners))
    }

    fn walk(
        &self,
        tape: &Tape,
        owners: &HashMap<TraceHandle, LayerRef>,
        root: TraceHandle,
    ) -> Result<TracedGraph, DepGraphError> {
        let mut graph = TracedGraph::default();
        let mut visited: HashMap<TraceHandle, NodeId> = HashMap::new();
        let mut edges: Vec<(TraceHandle, NodeId)> = Vec::new();
        let mut stack = vec![root];

        while let Some(handle) = stack.pop() {
            if visited.contains_key(&handle) {
                continue;
            }
            let record = tape
                .get(handle)
                .ok_or(DepGraphError::UnknownTraceHandle(handle))?;

            let owner = owners.get(&handle).copied();
            let op_type = classify(owner.as_ref(), record.name(), self.config.ownerless_fallback);
            let id = NodeId::new(graph.nodes.len());
            graph.nodes.push(Node::new(owner, op_type, handle));
            visited.insert(handle, id);
            debug!(node = %id, %op_type, op = record.name(), "traced node");

            match owner {
                Some(layer) => register_layer(&mut graph, tape, layer, id),
                None => {
                    graph.module_to_node.insert(NodeKey::Functional(handle), id);
                }
            }

            for predecessor in record.predecessors() {
                if let Some(from) = predecessor.operation() {
                    edges.push((from, id));
                    stack.push(from);
                }
            }
        }

        for (from, to) in edges {
            if let Some(&from) = visited.get(&from) {
                graph.nodes[from.index()].push_output(to);
            }
        }
        // Designated successor is the earliest executed consumer.
        let positions: Vec<Option<usize>> = graph
            .nodes
            .iter()
            .map(|node| tape.position(node.trace_handle()))
            .collect();
        for node in &mut graph.nodes {
            node.sort_outputs_by_key(|to| positions[to.index()]);
        }
        Ok(graph)
    }
}

/// Point `module_to_node` at the earliest invocation of `layer`.
fn register_layer(graph: &mut TracedGraph, tape: &Tape, layer: LayerRef, id: NodeId) {
    let key = NodeKey::Layer(layer.id);
    let Some(&current) = graph.module_to_node.get(&key) else {
        graph.module_to_node.insert(key, id);
        return;
    };

    let position = |node: NodeId| tape.position(graph.nodes[node.index()].trace_handle());
    if position(id) < position(current) {
        graph.module_to_node.insert(key, id);
    }
    if !graph.reused_layers.contains(&layer.id) {
        warn!(
            layer = %layer.id,
            kind = layer.type_name,
            "layer is invoked more than once; chains are resolved per invocation"
        );
        graph.reused_layers.push(layer.id);
    }
}
