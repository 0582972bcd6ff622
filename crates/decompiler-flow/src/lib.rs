// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Control-flow recovery for the MIPS decompiler.
//!
//! Builds a typed control-flow graph from a decoded instruction stream and
//! reduces it to structured regions (sequences, conditionals, loops,
//! short-circuit booleans) by repeatedly collapsing canonical patterns,
//! ordered by dominance.
//!
//! The entry point for one function is [`structure_function`]; the pieces
//! (builder, dominators, reducer) are public for callers that want to drive
//! them separately. Instruction decoding and expression synthesis live in
//! sibling crates; this one starts from decoded instructions and stops at a
//! structured [`graph::FlowGraph`].

pub mod builder;
pub mod diagnostics;
pub mod export;
pub mod graph;
pub mod instruction;
pub mod patterns;
pub mod reducer;

use crate::diagnostics::DiagnosticSink;
use crate::graph::flow_graph::ContractViolation;
use crate::graph::node::{Node, NodeId};
use crate::graph::FlowGraph;
use crate::instruction::{Address, Instruction};
use crate::reducer::ReduceOutcome;
use log::warn;
use std::collections::BTreeSet;
use thiserror::Error;

/// Structuring failed for one function. The graph for that function is
/// abandoned; other functions are unaffected.
#[derive(Debug, Error)]
pub enum StructuringError {
    #[error("structuring aborted for function at {function:#010x}: {violation}")]
    Contract {
        function: Address,
        violation: ContractViolation,
    },
}

impl StructuringError {
    pub fn function(&self) -> Address {
        match self {
            StructuringError::Contract { function, .. } => *function,
        }
    }
}

/// Knobs for one structuring run.
#[derive(Clone, Debug)]
pub struct StructuringOptions {
    /// Run `validate` before and after every reduction cycle.
    pub validate_each_cycle: bool,
    /// Hard cutoff on reduction cycles; `None` relies on the monotone
    /// node-count decrease alone.
    pub max_cycles: Option<usize>,
    /// Strip `nop`-only blocks before reducing.
    pub suppress_nop_blocks: bool,
}

impl Default for StructuringOptions {
    fn default() -> Self {
        Self {
            validate_each_cycle: cfg!(debug_assertions),
            max_cycles: None,
            suppress_nop_blocks: true,
        }
    }
}

/// A structured function: the reduced graph plus what reduction did.
#[derive(Debug)]
pub struct StructuredFunction {
    pub graph: FlowGraph,
    pub outcome: ReduceOutcome,
}

/// Builds and structures the control-flow graph for one function.
///
/// `instructions` is the address-ordered decoded stream, `entry_address` the
/// function entry, `callees` the known function-entry addresses. Diagnostics
/// for the run accumulate in `sink`. On a contract violation the function's
/// analysis is aborted; callers can fall back to [`fallback_graph`] so a
/// renderer still gets something walkable.
pub fn structure_function(
    instructions: &[Instruction],
    entry_address: Address,
    callees: &BTreeSet<Address>,
    options: &StructuringOptions,
    sink: &mut DiagnosticSink,
) -> Result<StructuredFunction, StructuringError> {
    let abort = |violation: ContractViolation| {
        warn!(
            "structuring aborted for function at {:#010x}: {}",
            entry_address, violation
        );
        StructuringError::Contract {
            function: entry_address,
            violation,
        }
    };

    let mut graph =
        builder::build_cfg(instructions, entry_address, callees, sink).map_err(abort)?;
    let outcome = reducer::reduce(&mut graph, options, sink).map_err(abort)?;
    Ok(StructuredFunction { graph, outcome })
}

/// A minimal unstructured graph (`entry -> block -> exit`) for functions
/// whose analysis was aborted. Never fails: renderers always receive a
/// walkable graph, not a silent truncation.
pub fn fallback_graph(instructions: &[Instruction], entry_address: Address) -> FlowGraph {
    let mut graph = FlowGraph::new();
    let entry = graph.entry_id().clone();
    let exit = graph.exit_id().clone();
    if instructions.is_empty() {
        graph
            .add_edge(&entry, &exit, graph::EdgeKind::Always)
            .expect("fresh graph accepts the entry edge");
        return graph;
    }
    let id = NodeId::for_block(entry_address);
    graph
        .add_node(Node::block(id.clone(), instructions.to_vec()))
        .expect("fresh graph accepts the fallback block");
    graph
        .add_edge(&entry, &id, graph::EdgeKind::Always)
        .expect("fresh graph accepts the entry edge");
    graph
        .add_edge(&id, &exit, graph::EdgeKind::Always)
        .expect("fresh graph accepts the exit edge");
    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_graph_is_always_valid() {
        let instructions = vec![
            Instruction::plain(0x00, "addiu sp, sp, -8"),
            Instruction::ret(0x04),
        ];
        let graph = fallback_graph(&instructions, 0x00);
        assert!(graph.validate().is_ok());
        assert_eq!(graph.node_count(), 3);

        let empty = fallback_graph(&[], 0x00);
        assert!(empty.validate().is_ok());
        assert_eq!(empty.node_count(), 2);
    }
}
