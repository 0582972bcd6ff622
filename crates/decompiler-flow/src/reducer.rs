// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! The fixpoint structuring loop.
//!
//! Each cycle recomputes dominators from scratch and restricts the candidate
//! pool to the distinct dominator values: a node that becomes the head of a
//! structured region must dominate every node absorbed into it, so nothing
//! else can ever match. Rules run in tiered priority order; any success
//! restarts the whole cycle with fresh dominators so higher-priority shapes
//! get first refusal. Sequence joining runs only when no higher tier fired
//! anywhere, because joining eagerly would hide loop and conditional shapes
//! spanning multiple linear blocks.
//!
//! The loop terminates on any finite graph: every rewrite strictly shrinks
//! `(node count, edge count)` lexicographically. Irreducible residue is
//! reported as a diagnostic, never an error.

use crate::diagnostics::DiagnosticSink;
use crate::graph::dominance::DominatorMap;
use crate::graph::flow_graph::{ContractViolation, EdgeKind, FlowGraph};
use crate::graph::node::{Node, NodeId, NodeKind};
use crate::patterns::{
    apply_do_while, apply_if, apply_if_else, apply_sequence, apply_short_circuit, apply_while,
    apply_while_true,
};
use crate::StructuringOptions;
use itertools::Itertools;
use log::debug;
use std::collections::BTreeSet;

type ApplyFn = fn(&mut FlowGraph, &NodeId) -> Result<Option<NodeId>, ContractViolation>;

/// Short-circuit composition first.
const TIER_ONE: &[ApplyFn] = &[apply_short_circuit];
/// Loops before conditionals: a loop header must not be misread as an `if`.
const TIER_TWO: &[ApplyFn] = &[
    apply_while,
    apply_do_while,
    apply_while_true,
    apply_if,
    apply_if_else,
];
const TIER_THREE: &[ApplyFn] = &[apply_sequence];

/// What one reduction run did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReduceOutcome {
    pub cycles: usize,
    pub rewrites: usize,
    /// Non-entry dominator heads left when no rule fires any more. More than
    /// one means an irreducible region survived.
    pub residual_heads: Vec<NodeId>,
    /// The caller-imposed cycle budget ran out before the fixpoint.
    pub budget_exhausted: bool,
}

/// Reduces the graph in place until no rule applies (or the optional cycle
/// budget runs out). Returns what happened; irreducible leftovers are a
/// diagnostic, not an error.
pub fn reduce(
    graph: &mut FlowGraph,
    options: &StructuringOptions,
    sink: &mut DiagnosticSink,
) -> Result<ReduceOutcome, ContractViolation> {
    if options.suppress_nop_blocks {
        let pruned = prune_nop_blocks(graph)?;
        if pruned > 0 {
            debug!("[reducer] pruned {} nop-only blocks", pruned);
        }
    }

    let mut cycles = 0;
    let mut rewrites = 0;
    let mut budget_exhausted = false;

    loop {
        if let Some(max_cycles) = options.max_cycles {
            if cycles >= max_cycles {
                sink.warning(format!(
                    "reduction stopped after {cycles} cycles; budget exhausted"
                ));
                budget_exhausted = true;
                break;
            }
        }
        cycles += 1;
        if options.validate_each_cycle {
            graph.validate()?;
        }

        let dominators = DominatorMap::compute(graph);
        let mut pool = dominators.dominator_heads();
        // A self-looping node dominates nothing else, yet it is the head of
        // the region it absorbs (itself), so it joins the pool.
        for edge in graph.edges() {
            if edge.from == edge.to {
                pool.insert(edge.from.clone());
            }
        }
        let shape_before = (graph.node_count(), graph.edge_count());

        let mut fired = apply_tier(graph, &pool, TIER_ONE)?;
        if fired == 0 {
            fired = apply_tier(graph, &pool, TIER_TWO)?;
        }
        if fired == 0 {
            fired = apply_tier(graph, &pool, TIER_THREE)?;
        }

        if options.validate_each_cycle {
            graph.validate()?;
        }
        if fired == 0 {
            break;
        }
        rewrites += fired;
        let shape_after = (graph.node_count(), graph.edge_count());
        debug_assert!(shape_after < shape_before, "rewrites must shrink the graph");
        debug!(
            "[reducer] cycle {}: {} rewrites, {} nodes remain",
            cycles,
            fired,
            graph.node_count()
        );
    }

    let residual_heads = residual_heads(graph);
    if residual_heads.len() > 1 {
        sink.info(format!(
            "irreducible region: residual dominator heads [{}]",
            residual_heads.iter().join(", ")
        ));
    }

    Ok(ReduceOutcome {
        cycles,
        rewrites,
        residual_heads,
        budget_exhausted,
    })
}

/// Runs each rule over the whole pool. Candidates are re-validated inside
/// each `apply_*` immediately before rewriting, because earlier rewrites in
/// the same tier can invalidate later entries of this pre-computed list.
fn apply_tier(
    graph: &mut FlowGraph,
    pool: &BTreeSet<NodeId>,
    rules: &[ApplyFn],
) -> Result<usize, ContractViolation> {
    let mut fired = 0;
    for rule in rules {
        for head in pool {
            if !graph.contains(head) {
                continue;
            }
            if rule(graph, head)?.is_some() {
                fired += 1;
            }
        }
    }
    Ok(fired)
}

/// Re-points predecessors of degenerate `nop`-only single-`Always` blocks
/// directly at their successor and drops the block.
fn prune_nop_blocks(graph: &mut FlowGraph) -> Result<usize, ContractViolation> {
    let mut removed = 0;
    loop {
        let candidate = graph
            .nodes()
            .find(|node| is_nop_only(graph, node))
            .map(|node| node.id().clone());
        let Some(id) = candidate else {
            break;
        };
        let Some(successor) = graph.single_always_successor(&id) else {
            break;
        };
        let ins: Vec<(NodeId, EdgeKind)> = graph
            .ins(&id)
            .into_iter()
            .map(|edge| (edge.from.clone(), edge.kind))
            .collect();
        graph.remove_edge(&id, &successor, EdgeKind::Always)?;
        for (from, kind) in ins {
            graph.remove_edge(&from, &id, kind)?;
            if !graph.has_edge(&from, &successor, kind) {
                graph.add_edge(&from, &successor, kind)?;
            }
        }
        graph.remove_node(&id)?;
        debug!("[reducer] dropped nop block {} -> {}", id, successor);
        removed += 1;
    }
    Ok(removed)
}

fn is_nop_only(graph: &FlowGraph, node: &Node) -> bool {
    if !matches!(
        node.kind(),
        NodeKind::Block { .. } | NodeKind::Duplicated { .. }
    ) {
        return false;
    }
    let instructions = node.instructions();
    if instructions.is_empty() || !instructions.iter().all(|instr| instr.is_nop()) {
        return false;
    }
    matches!(graph.single_always_successor(node.id()), Some(succ) if &succ != node.id())
}

/// The non-entry dominator heads of the final graph. A fully structured
/// function leaves at most one.
fn residual_heads(graph: &FlowGraph) -> Vec<NodeId> {
    let dominators = DominatorMap::compute(graph);
    dominators
        .dominator_heads()
        .into_iter()
        .filter(|head| head != graph.entry_id())
        .collect()
}
