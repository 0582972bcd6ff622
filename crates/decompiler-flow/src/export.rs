// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Renderer-facing export schema.
//!
//! The structuring core hands a renderer the final graph as flat id/label
//! nodes and typed edges; everything else (disassembly listings, address
//! lookups) goes through [`Node`] accessors on the graph itself.
//!
//! [`Node`]: crate::graph::Node

use crate::graph::flow_graph::FlowGraph;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportNode {
    pub id: String,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEdge {
    pub from: String,
    pub to: String,
    /// `"always"`, `"true"`, `"false"`, or `"case:<n>"`.
    pub kind: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<ExportEdge>,
}

impl GraphExport {
    pub fn from_graph(graph: &FlowGraph) -> Self {
        let nodes = graph
            .nodes()
            .map(|node| ExportNode {
                id: node.id().to_string(),
                label: node.label(),
            })
            .collect();
        let edges = graph
            .edges()
            .map(|edge| ExportEdge {
                from: edge.from.to_string(),
                to: edge.to.to_string(),
                kind: edge.kind.to_string(),
            })
            .collect();
        Self { nodes, edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::flow_graph::EdgeKind;
    use crate::graph::node::{Node, NodeId};
    use crate::instruction::Instruction;

    #[test]
    fn edge_kinds_render_to_schema_strings() {
        let mut graph = FlowGraph::new();
        let a = NodeId::new("a");
        graph
            .add_node(Node::block(a.clone(), vec![Instruction::plain(0, "op")]))
            .unwrap();
        let entry = graph.entry_id().clone();
        let exit = graph.exit_id().clone();
        graph.add_edge(&entry, &a, EdgeKind::Always).unwrap();
        graph.add_edge(&a, &exit, EdgeKind::Case(3)).unwrap();

        let export = GraphExport::from_graph(&graph);
        assert_eq!(export.nodes.len(), 3);
        let kinds: Vec<&str> = export.edges.iter().map(|e| e.kind.as_str()).collect();
        assert!(kinds.contains(&"always"));
        assert!(kinds.contains(&"case:3"));
    }
}
