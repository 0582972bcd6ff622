// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Immediate-dominator computation over the flow graph.
//!
//! Implements the Lengauer-Tarjan algorithm: a DFS numbering pass, a
//! reverse-DFS semidominator pass using path-compressed `eval`/`link`
//! queries, and a forward pass resolving the remaining implicit immediate
//! dominators. Near-linear in the number of edges; recomputed from scratch
//! once per reduction cycle, which is cheap at single-function scale.
//!
//! The `eval` path compression runs on an explicit stack so deep dominator
//! chains in large functions cannot overflow the call stack.

use crate::graph::flow_graph::FlowGraph;
use crate::graph::node::NodeId;
use std::collections::{BTreeMap, BTreeSet};

/// Map from every reachable node except the entry to its immediate dominator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DominatorMap {
    idom: BTreeMap<NodeId, NodeId>,
}

impl DominatorMap {
    /// Computes immediate dominators for everything reachable from the entry
    /// node.
    pub fn compute(graph: &FlowGraph) -> Self {
        let mut state = LengauerTarjan::number(graph);
        state.solve();

        let mut idom = BTreeMap::new();
        for index in 1..state.order.len() {
            idom.insert(
                state.order[index].clone(),
                state.order[state.idom[index]].clone(),
            );
        }
        Self { idom }
    }

    /// The immediate dominator of `id`, or `None` for the entry node and for
    /// unreachable nodes.
    pub fn immediate_dominator(&self, id: &NodeId) -> Option<&NodeId> {
        self.idom.get(id)
    }

    /// Whether `a` dominates `b` (reflexively).
    pub fn dominates(&self, a: &NodeId, b: &NodeId) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom.get(current) {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    /// The distinct dominator values: every node that immediately dominates
    /// at least one other node. This is the reducer's candidate pool.
    pub fn dominator_heads(&self) -> BTreeSet<NodeId> {
        self.idom.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.idom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idom.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NodeId)> {
        self.idom.iter()
    }
}

/// Working state, indexed by DFS number (index 0 is the entry).
struct LengauerTarjan {
    /// Nodes in DFS preorder; the position doubles as the DFS number.
    order: Vec<NodeId>,
    /// Predecessor lists among reachable nodes, by DFS number.
    preds: Vec<Vec<usize>>,
    /// DFS tree parent.
    parent: Vec<usize>,
    /// Semidominator candidate, as a DFS number.
    semi: Vec<usize>,
    /// Immediate dominator, as a DFS number (resolved by `solve`).
    idom: Vec<usize>,
    /// Forest ancestor for `eval`/`link`; `None` for roots.
    ancestor: Vec<Option<usize>>,
    /// Node with the least semidominator on the path to the forest root.
    best: Vec<usize>,
    /// Nodes whose semidominator is this node.
    bucket: Vec<Vec<usize>>,
}

impl LengauerTarjan {
    /// DFS numbering pass over everything reachable from the entry.
    fn number(graph: &FlowGraph) -> Self {
        let mut order: Vec<NodeId> = Vec::with_capacity(graph.node_count());
        let mut index_of: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut parent_of: BTreeMap<NodeId, usize> = BTreeMap::new();

        let mut stack: Vec<(NodeId, Option<usize>)> = vec![(graph.entry_id().clone(), None)];
        while let Some((id, pushed_by)) = stack.pop() {
            if index_of.contains_key(&id) {
                continue;
            }
            let index = order.len();
            index_of.insert(id.clone(), index);
            if let Some(parent) = pushed_by {
                parent_of.insert(id.clone(), parent);
            }
            // Reversed so the first successor is visited first.
            for edge in graph.outs(&id).into_iter().rev() {
                if !index_of.contains_key(&edge.to) {
                    stack.push((edge.to.clone(), Some(index)));
                }
            }
            order.push(id);
        }

        let n = order.len();
        let mut preds = vec![Vec::new(); n];
        for edge in graph.edges() {
            if let (Some(&from), Some(&to)) = (index_of.get(&edge.from), index_of.get(&edge.to)) {
                preds[to].push(from);
            }
        }

        let mut parent = vec![0usize; n];
        for (id, &p) in &parent_of {
            parent[index_of[id]] = p;
        }

        Self {
            order,
            preds,
            parent,
            semi: (0..n).collect(),
            idom: (0..n).collect(),
            ancestor: vec![None; n],
            best: (0..n).collect(),
            bucket: vec![Vec::new(); n],
        }
    }

    /// Semidominator pass in decreasing DFS order, then the forward pass that
    /// turns implicit immediate dominators into explicit ones.
    fn solve(&mut self) {
        let n = self.order.len();
        for w in (1..n).rev() {
            let parent_w = self.parent[w];

            for i in 0..self.preds[w].len() {
                let v = self.preds[w][i];
                let u = self.eval(v);
                if self.semi[u] < self.semi[w] {
                    self.semi[w] = self.semi[u];
                }
            }

            let semi_w = self.semi[w];
            self.bucket[semi_w].push(w);
            self.ancestor[w] = Some(parent_w);

            let pending = std::mem::take(&mut self.bucket[parent_w]);
            for v in pending {
                let u = self.eval(v);
                self.idom[v] = if self.semi[u] < self.semi[v] {
                    u
                } else {
                    parent_w
                };
            }
        }

        for w in 1..n {
            if self.idom[w] != self.semi[w] {
                self.idom[w] = self.idom[self.idom[w]];
            }
        }
        if n > 0 {
            self.idom[0] = 0;
        }
    }

    /// The node with the least semidominator on the path from `v` to its
    /// forest root, compressing the path as a side effect.
    fn eval(&mut self, v: usize) -> usize {
        if self.ancestor[v].is_none() {
            return v;
        }
        self.compress(v);
        self.best[v]
    }

    /// Iterative path compression: gather the ancestor chain that still has a
    /// grandparent, then fold it root-first.
    fn compress(&mut self, v: usize) {
        let mut chain = Vec::new();
        let mut x = v;
        while let Some(a) = self.ancestor[x] {
            if self.ancestor[a].is_some() {
                chain.push(x);
                x = a;
            } else {
                break;
            }
        }
        for &x in chain.iter().rev() {
            let a = match self.ancestor[x] {
                Some(a) => a,
                None => continue,
            };
            if self.semi[self.best[a]] < self.semi[self.best[x]] {
                self.best[x] = self.best[a];
            }
            self.ancestor[x] = self.ancestor[a];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::flow_graph::EdgeKind;
    use crate::graph::node::Node;
    use crate::instruction::Instruction;

    fn leaf(graph: &mut FlowGraph, id: &str, address: u32) -> NodeId {
        let node_id = NodeId::new(id);
        graph
            .add_node(Node::block(
                node_id.clone(),
                vec![Instruction::plain(address, "op")],
            ))
            .unwrap();
        node_id
    }

    /// entry -> cond -> {t, f} -> common -> exit
    fn diamond() -> (FlowGraph, NodeId, NodeId) {
        let mut graph = FlowGraph::new();
        let cond = leaf(&mut graph, "cond", 0);
        let t = leaf(&mut graph, "t", 4);
        let f = leaf(&mut graph, "f", 8);
        let common = leaf(&mut graph, "common", 12);
        let entry = graph.entry_id().clone();
        let exit = graph.exit_id().clone();
        graph.add_edge(&entry, &cond, EdgeKind::Always).unwrap();
        graph.add_edge(&cond, &t, EdgeKind::True).unwrap();
        graph.add_edge(&cond, &f, EdgeKind::False).unwrap();
        graph.add_edge(&t, &common, EdgeKind::Always).unwrap();
        graph.add_edge(&f, &common, EdgeKind::Always).unwrap();
        graph.add_edge(&common, &exit, EdgeKind::Always).unwrap();
        (graph, cond, common)
    }

    #[test]
    fn diamond_join_is_dominated_by_condition() {
        let (graph, cond, common) = diamond();
        let doms = DominatorMap::compute(&graph);
        assert_eq!(doms.immediate_dominator(&common), Some(&cond));
        assert_eq!(doms.immediate_dominator(graph.entry_id()), None);
    }

    #[test]
    fn no_node_dominates_itself_immediately() {
        let (graph, _, _) = diamond();
        let doms = DominatorMap::compute(&graph);
        for (node, idom) in doms.iter() {
            assert_ne!(node, idom);
        }
    }

    #[test]
    fn recompute_is_idempotent() {
        let (graph, _, _) = diamond();
        let first = DominatorMap::compute(&graph);
        let second = DominatorMap::compute(&graph);
        assert_eq!(first, second);
    }

    #[test]
    fn loop_back_edge_keeps_header_as_dominator() {
        let mut graph = FlowGraph::new();
        let cond = leaf(&mut graph, "cond", 0);
        let body = leaf(&mut graph, "body", 4);
        let after = leaf(&mut graph, "after", 8);
        let entry = graph.entry_id().clone();
        let exit = graph.exit_id().clone();
        graph.add_edge(&entry, &cond, EdgeKind::Always).unwrap();
        graph.add_edge(&cond, &body, EdgeKind::True).unwrap();
        graph.add_edge(&cond, &after, EdgeKind::False).unwrap();
        graph.add_edge(&body, &cond, EdgeKind::Always).unwrap();
        graph.add_edge(&after, &exit, EdgeKind::Always).unwrap();

        let doms = DominatorMap::compute(&graph);
        assert_eq!(doms.immediate_dominator(&body), Some(&cond));
        assert_eq!(doms.immediate_dominator(&after), Some(&cond));
        assert!(doms.dominates(&cond, &body));
        assert!(!doms.dominates(&body, &after));
    }

    #[test]
    fn dominator_heads_collect_distinct_values() {
        let (graph, cond, _) = diamond();
        let doms = DominatorMap::compute(&graph);
        let heads = doms.dominator_heads();
        assert!(heads.contains(graph.entry_id()));
        assert!(heads.contains(&cond));
        // Leaf arms dominate nothing.
        assert!(!heads.contains(&NodeId::new("t")));
    }

    #[test]
    fn unreachable_nodes_are_absent_from_the_map() {
        let (mut graph, _, _) = diamond();
        let orphan = leaf(&mut graph, "orphan", 100);
        let exit = graph.exit_id().clone();
        graph.add_edge(&orphan, &exit, EdgeKind::Always).unwrap();
        let doms = DominatorMap::compute(&graph);
        assert_eq!(doms.immediate_dominator(&orphan), None);
    }
}
