// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Graph model: typed edges, the node-variant set, and dominance analysis.

pub mod dominance;
pub mod flow_graph;
pub mod node;

pub use dominance::DominatorMap;
pub use flow_graph::{ContractViolation, Edge, EdgeKind, FlowGraph};
pub use node::{Node, NodeId, NodeKind};
