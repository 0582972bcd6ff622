// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! The typed control-flow graph: sole owner of the node and edge sets.
//!
//! Nodes never hold adjacency; every query and every mutation goes through
//! [`FlowGraph`]. All mutating operations report contract violations instead
//! of panicking so one malformed function can be abandoned without taking
//! down the whole run.

use crate::graph::node::{Node, NodeId, NodeKind};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// A broken structural invariant. Fatal for the current function's analysis;
/// recoverable for the caller (fall back to an unstructured graph).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ContractViolation(String);

impl ContractViolation {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Edge typing. `Always` is an unconditional transfer, `True`/`False` the two
/// arms of a condition, `Case` one arm of an indexed dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum EdgeKind {
    Always,
    True,
    False,
    Case(u32),
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Always => f.write_str("always"),
            EdgeKind::True => f.write_str("true"),
            EdgeKind::False => f.write_str("false"),
            EdgeKind::Case(index) => write!(f, "case:{index}"),
        }
    }
}

/// A directed typed edge, value-equal on `(from, to, kind)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId, kind: EdgeKind) -> Self {
        Self { from, to, kind }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.from, self.kind, self.to)
    }
}

/// The control-flow graph for one function.
#[derive(Clone, Debug)]
pub struct FlowGraph {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeSet<Edge>,
    entry: NodeId,
    exit: NodeId,
    /// Ids that have been removed. A retired id is never re-added; a fresh
    /// construct always mints a new id.
    retired: BTreeSet<NodeId>,
    minted: u64,
}

impl FlowGraph {
    /// An empty graph holding only the entry and exit markers.
    pub fn new() -> Self {
        let entry = Node::entry();
        let exit = Node::exit();
        let entry_id = entry.id().clone();
        let exit_id = exit.id().clone();
        let mut nodes = BTreeMap::new();
        nodes.insert(entry_id.clone(), entry);
        nodes.insert(exit_id.clone(), exit);
        Self {
            nodes,
            edges: BTreeSet::new(),
            entry: entry_id,
            exit: exit_id,
            retired: BTreeSet::new(),
            minted: 0,
        }
    }

    pub fn entry_id(&self) -> &NodeId {
        &self.entry
    }

    pub fn exit_id(&self) -> &NodeId {
        &self.exit
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Payload mutation is reserved for the builder's block-splitting step.
    pub(crate) fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Mints an id that collides with no live or retired node.
    pub fn mint_id(&mut self, prefix: &str) -> NodeId {
        loop {
            self.minted += 1;
            let candidate = NodeId::new(format!("{prefix}_{}", self.minted));
            if !self.nodes.contains_key(&candidate) && !self.retired.contains(&candidate) {
                return candidate;
            }
        }
    }

    pub fn add_node(&mut self, node: Node) -> Result<(), ContractViolation> {
        let id = node.id().clone();
        if self.nodes.contains_key(&id) {
            return Err(ContractViolation::new(format!(
                "add_node: node {id} already present"
            )));
        }
        if self.retired.contains(&id) {
            return Err(ContractViolation::new(format!(
                "add_node: node id {id} was retired and must not be reused"
            )));
        }
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Removes a node and retires its id. The node must be edge-free; rewrite
    /// operations strip edges first, which keeps every intermediate graph
    /// state inspectable.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<Node, ContractViolation> {
        if id == &self.entry || id == &self.exit {
            return Err(ContractViolation::new(format!(
                "remove_node: {id} is the entry/exit marker"
            )));
        }
        if self
            .edges
            .iter()
            .any(|edge| &edge.from == id || &edge.to == id)
        {
            return Err(ContractViolation::new(format!(
                "remove_node: node {id} still has edges"
            )));
        }
        match self.nodes.remove(id) {
            Some(node) => {
                self.retired.insert(id.clone());
                Ok(node)
            }
            None => Err(ContractViolation::new(format!(
                "remove_node: node {id} is absent"
            ))),
        }
    }

    pub fn add_edge(
        &mut self,
        from: &NodeId,
        to: &NodeId,
        kind: EdgeKind,
    ) -> Result<(), ContractViolation> {
        if !self.nodes.contains_key(from) {
            return Err(ContractViolation::new(format!(
                "add_edge: source {from} is absent"
            )));
        }
        if !self.nodes.contains_key(to) {
            return Err(ContractViolation::new(format!(
                "add_edge: target {to} is absent"
            )));
        }
        let edge = Edge::new(from.clone(), to.clone(), kind);
        if !self.edges.insert(edge) {
            return Err(ContractViolation::new(format!(
                "add_edge: duplicate edge {from} -[{kind}]-> {to}"
            )));
        }
        Ok(())
    }

    pub fn remove_edge(
        &mut self,
        from: &NodeId,
        to: &NodeId,
        kind: EdgeKind,
    ) -> Result<(), ContractViolation> {
        let edge = Edge::new(from.clone(), to.clone(), kind);
        if !self.edges.remove(&edge) {
            return Err(ContractViolation::new(format!(
                "remove_edge: edge {from} -[{kind}]-> {to} is absent"
            )));
        }
        Ok(())
    }

    /// The one primitive that preserves edge topology across a rewrite: every
    /// edge touching `old` is cloned with the endpoint swapped to `new`, then
    /// `old` is dropped and its id retired. Returns the displaced node.
    pub fn replace_node(&mut self, old: &NodeId, new: Node) -> Result<Node, ContractViolation> {
        if old == &self.entry || old == &self.exit {
            return Err(ContractViolation::new(format!(
                "replace_node: {old} is the entry/exit marker"
            )));
        }
        if !self.nodes.contains_key(old) {
            return Err(ContractViolation::new(format!(
                "replace_node: node {old} is absent"
            )));
        }
        let new_id = new.id().clone();
        self.add_node(new)?;
        debug!("[flow_graph] replace {} -> {}", old, new_id);

        let touching: Vec<Edge> = self
            .edges
            .iter()
            .filter(|edge| &edge.from == old || &edge.to == old)
            .cloned()
            .collect();
        for edge in touching {
            self.edges.remove(&edge);
            let from = if edge.from == *old {
                new_id.clone()
            } else {
                edge.from
            };
            let to = if edge.to == *old {
                new_id.clone()
            } else {
                edge.to
            };
            // Set semantics deduplicate rewired parallels.
            self.edges.insert(Edge::new(from, to, edge.kind));
        }

        let displaced = self
            .nodes
            .remove(old)
            .ok_or_else(|| ContractViolation::new(format!("replace_node: node {old} vanished")))?;
        self.retired.insert(old.clone());
        Ok(displaced)
    }

    pub fn has_edge(&self, from: &NodeId, to: &NodeId, kind: EdgeKind) -> bool {
        self.edges
            .contains(&Edge::new(from.clone(), to.clone(), kind))
    }

    /// All edges ending at `id`, in deterministic order.
    pub fn ins(&self, id: &NodeId) -> Vec<&Edge> {
        self.edges.iter().filter(|edge| &edge.to == id).collect()
    }

    /// All edges leaving `id`, in deterministic order.
    pub fn outs(&self, id: &NodeId) -> Vec<&Edge> {
        self.edges.iter().filter(|edge| &edge.from == id).collect()
    }

    /// The target of this node's single `Always` out-edge, if that is its
    /// entire out-edge set.
    pub fn single_always_successor(&self, id: &NodeId) -> Option<NodeId> {
        match self.outs(id).as_slice() {
            [edge] if edge.kind == EdgeKind::Always => Some(edge.to.clone()),
            _ => None,
        }
    }

    /// The `(true_target, false_target)` pair if this node has exactly one
    /// `True` and one `False` out-edge.
    pub fn boolean_successors(&self, id: &NodeId) -> Option<(NodeId, NodeId)> {
        let outs = self.outs(id);
        if outs.len() != 2 {
            return None;
        }
        let true_to = outs.iter().find(|e| e.kind == EdgeKind::True)?.to.clone();
        let false_to = outs.iter().find(|e| e.kind == EdgeKind::False)?.to.clone();
        Some((true_to, false_to))
    }

    /// The single predecessor edge `(from, kind)` if this node has exactly
    /// one in-edge.
    pub fn single_predecessor(&self, id: &NodeId) -> Option<(NodeId, EdgeKind)> {
        match self.ins(id).as_slice() {
            [edge] => Some((edge.from.clone(), edge.kind)),
            _ => None,
        }
    }

    /// Structural sanity check: edge endpoints present, entry/exit degree
    /// rules, uniform out-edge typing. Cheap; run before and after every
    /// reduction cycle when enabled.
    pub fn validate(&self) -> Result<(), ContractViolation> {
        let entries = self.nodes.values().filter(|n| n.is_entry()).count();
        let exits = self.nodes.values().filter(|n| n.is_exit()).count();
        if entries != 1 || exits != 1 {
            return Err(ContractViolation::new(format!(
                "validate: expected exactly one entry and one exit, found {entries}/{exits}"
            )));
        }
        if !self.ins(&self.entry).is_empty() {
            return Err(ContractViolation::new(
                "validate: entry node has incoming edges",
            ));
        }
        if !self.outs(&self.exit).is_empty() {
            return Err(ContractViolation::new(
                "validate: exit node has outgoing edges",
            ));
        }
        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.from) || !self.nodes.contains_key(&edge.to) {
                return Err(ContractViolation::new(format!(
                    "validate: edge {edge} references an absent node"
                )));
            }
        }
        for (id, node) in &self.nodes {
            self.validate_out_kinds(id, node)?;
        }
        Ok(())
    }

    fn validate_out_kinds(&self, id: &NodeId, node: &Node) -> Result<(), ContractViolation> {
        let outs = self.outs(id);
        if outs.is_empty() {
            if node.is_terminal() {
                return Ok(());
            }
            return Err(ContractViolation::new(format!(
                "validate: non-terminal node {id} has no out-edges"
            )));
        }
        let kinds: Vec<EdgeKind> = outs.iter().map(|e| e.kind).collect();
        let uniform = match kinds.as_slice() {
            [EdgeKind::Always] => true,
            [EdgeKind::True, EdgeKind::False] | [EdgeKind::False, EdgeKind::True] => true,
            _ => {
                let mut indices = BTreeSet::new();
                kinds
                    .iter()
                    .all(|k| matches!(k, EdgeKind::Case(i) if indices.insert(*i)))
            }
        };
        if !uniform {
            return Err(ContractViolation::new(format!(
                "validate: node {id} has non-uniform out-edges {kinds:?}"
            )));
        }
        Ok(())
    }

    /// Normalizes boolean out-edges so every node satisfies the uniformity
    /// invariant: a `True`/`False` pair to the same target collapses to one
    /// `Always`, and a lone `True` or `False` is retyped to `Always`.
    pub fn make_uniform_boolean_edges(&mut self) -> Result<(), ContractViolation> {
        let ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
        for id in ids {
            let outs: Vec<Edge> = self.outs(&id).into_iter().cloned().collect();
            let true_edge = outs.iter().find(|e| e.kind == EdgeKind::True).cloned();
            let false_edge = outs.iter().find(|e| e.kind == EdgeKind::False).cloned();
            match (true_edge, false_edge) {
                (Some(t), Some(f)) if t.to == f.to => {
                    debug!(
                        "[flow_graph] collapsing degenerate branch at {} (both arms -> {})",
                        id, t.to
                    );
                    self.remove_edge(&t.from, &t.to, EdgeKind::True)?;
                    self.remove_edge(&f.from, &f.to, EdgeKind::False)?;
                    if self.outs(&id).is_empty() {
                        self.add_edge(&id, &t.to, EdgeKind::Always)?;
                    }
                }
                (Some(t), None) => {
                    self.remove_edge(&t.from, &t.to, EdgeKind::True)?;
                    self.add_edge(&id, &t.to, EdgeKind::Always)?;
                }
                (None, Some(f)) => {
                    self.remove_edge(&f.from, &f.to, EdgeKind::False)?;
                    self.add_edge(&id, &f.to, EdgeKind::Always)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl Default for FlowGraph {
    fn default() -> Self {
        Self::new()
    }
}
