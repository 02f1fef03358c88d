// src/dag/graph.rs

use std::sync::Arc;

use anyhow::{anyhow, Result};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use rustc_hash::FxHashMap;

use crate::dag::thunk::{Executable, Input, TaskId, Thunk, Value};
use crate::store::pool::Chunk;

/// Dense index of a node within a [`RunGraph`].
pub type NodeIdx = usize;

/// One resolved input position of an indexed node.
#[derive(Clone)]
pub enum InputSlot {
    /// Another node of the run; resolved through the metadata store.
    Node(NodeIdx),
    /// A driver-supplied chunk handle.
    Chunk(Chunk),
    /// A literal value.
    Literal(Value),
}

/// The indexed DAG for one run.
///
/// Thunks are assigned dense indices in a contiguous arena; `inputs` and
/// `dependents` are index lists, so neither direction of the graph owns
/// the other. The whole structure is computed once at `init` and is
/// immutable for the run.
pub struct RunGraph {
    nodes: Vec<Arc<Thunk>>,
    inputs: Vec<Vec<InputSlot>>,
    dependents: Vec<Vec<NodeIdx>>,
    by_id: FxHashMap<TaskId, NodeIdx>,
    root: NodeIdx,
}

impl RunGraph {
    /// Index the DAG rooted at `root`.
    ///
    /// Structurally equal subgraphs (equal task ids) collapse into a
    /// single node, so a task is computed once per run no matter how many
    /// consumers reference it.
    pub fn build(root: &Arc<Thunk>) -> Result<Self> {
        let mut nodes: Vec<Arc<Thunk>> = Vec::new();
        let mut by_id: FxHashMap<TaskId, NodeIdx> = FxHashMap::default();

        // First pass: discover every distinct node.
        let mut stack: Vec<Arc<Thunk>> = vec![root.clone()];
        while let Some(thunk) = stack.pop() {
            if by_id.contains_key(&thunk.id()) {
                continue;
            }
            by_id.insert(thunk.id(), nodes.len());
            if let Executable::Func { inputs, .. } = thunk.exec() {
                for input in inputs.iter() {
                    if let Input::Thunk(child) = input {
                        stack.push(child.clone());
                    }
                }
            }
            nodes.push(thunk);
        }

        // Second pass: resolve input slots and populate dependents.
        let mut inputs: Vec<Vec<InputSlot>> = vec![Vec::new(); nodes.len()];
        let mut dependents: Vec<Vec<NodeIdx>> = vec![Vec::new(); nodes.len()];

        for (idx, thunk) in nodes.iter().enumerate() {
            if let Executable::Func { inputs: raw, .. } = thunk.exec() {
                let mut slots = Vec::with_capacity(raw.len());
                for input in raw.iter() {
                    match input {
                        Input::Thunk(child) => {
                            let child_idx = by_id[&child.id()];
                            // `dependents` is a set: a parent consuming the
                            // same child twice still counts once.
                            if !dependents[child_idx].contains(&idx) {
                                dependents[child_idx].push(idx);
                            }
                            slots.push(InputSlot::Node(child_idx));
                        }
                        Input::Chunk(c) => slots.push(InputSlot::Chunk(c.clone())),
                        Input::Literal(v) => slots.push(InputSlot::Literal(v.clone())),
                    }
                }
                inputs[idx] = slots;
            }
        }

        let graph = Self {
            root: by_id[&root.id()],
            nodes,
            inputs,
            dependents,
            by_id,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Structural sharing can only ever merge equal subgraphs, so a cycle
    /// here means id aliasing went wrong; fail the run up front rather
    /// than hang the schedulers.
    fn check_acyclic(&self) -> Result<()> {
        let mut g: DiGraphMap<NodeIdx, ()> = DiGraphMap::new();
        for idx in 0..self.nodes.len() {
            g.add_node(idx);
        }
        for (idx, slots) in self.inputs.iter().enumerate() {
            for slot in slots.iter() {
                if let InputSlot::Node(child) = slot {
                    g.add_edge(*child, idx, ());
                }
            }
        }
        match toposort(&g, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(anyhow!(
                "cycle detected in run graph involving task {}",
                self.nodes[cycle.node_id()].id().short()
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> NodeIdx {
        self.root
    }

    pub fn root_id(&self) -> TaskId {
        self.nodes[self.root].id()
    }

    pub fn node(&self, idx: NodeIdx) -> &Arc<Thunk> {
        &self.nodes[idx]
    }

    pub fn id_of(&self, idx: NodeIdx) -> TaskId {
        self.nodes[idx].id()
    }

    pub fn index_of(&self, id: TaskId) -> Option<NodeIdx> {
        self.by_id.get(&id).copied()
    }

    pub fn inputs(&self, idx: NodeIdx) -> &[InputSlot] {
        &self.inputs[idx]
    }

    pub fn dependents(&self, idx: NodeIdx) -> &[NodeIdx] {
        &self.dependents[idx]
    }
}
