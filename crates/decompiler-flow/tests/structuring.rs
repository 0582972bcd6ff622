// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! End-to-end structuring over decoded MIPS-style instruction streams.

use anyhow::Result;
use decompiler_flow::builder::build_cfg;
use decompiler_flow::diagnostics::DiagnosticSink;
use decompiler_flow::export::GraphExport;
use decompiler_flow::graph::{FlowGraph, Node, NodeKind};
use decompiler_flow::instruction::{Address, Instruction};
use decompiler_flow::{fallback_graph, structure_function, StructuringOptions};
use std::collections::BTreeSet;

fn options() -> StructuringOptions {
    StructuringOptions {
        validate_each_cycle: true,
        ..StructuringOptions::default()
    }
}

fn structure(
    instructions: Vec<Instruction>,
    entry: Address,
    callees: &[Address],
) -> Result<(decompiler_flow::StructuredFunction, DiagnosticSink)> {
    let callees: BTreeSet<Address> = callees.iter().copied().collect();
    let mut sink = DiagnosticSink::new();
    let function = structure_function(&instructions, entry, &callees, &options(), &mut sink)?;
    Ok((function, sink))
}

/// Recursively checks the node or any owned child against the predicate.
fn any_node(node: &Node, predicate: &dyn Fn(&Node) -> bool) -> bool {
    if predicate(node) {
        return true;
    }
    match node.kind() {
        NodeKind::Sequence { nodes } => nodes.iter().any(|n| any_node(n, predicate)),
        NodeKind::If {
            condition, body, ..
        }
        | NodeKind::While {
            condition, body, ..
        }
        | NodeKind::DoWhile {
            condition, body, ..
        } => any_node(condition, predicate) || any_node(body, predicate),
        NodeKind::IfElse {
            condition,
            then_body,
            else_body,
        } => {
            any_node(condition, predicate)
                || any_node(then_body, predicate)
                || any_node(else_body, predicate)
        }
        NodeKind::WhileTrue { body } => any_node(body, predicate),
        NodeKind::And { operands } | NodeKind::Or { operands } => {
            operands.iter().any(|n| any_node(n, predicate))
        }
        NodeKind::Not { operand } => any_node(operand, predicate),
        NodeKind::Duplicated { original } => any_node(original, predicate),
        NodeKind::Entry | NodeKind::Exit | NodeKind::Block { .. } => false,
    }
}

fn graph_has(graph: &FlowGraph, predicate: &dyn Fn(&Node) -> bool) -> bool {
    graph.nodes().any(|node| any_node(node, predicate))
}

/// Occurrences of an instruction address across the whole graph, including
/// composite children.
fn address_occurrences(graph: &FlowGraph, address: Address) -> usize {
    graph
        .nodes()
        .flat_map(|node| node.instructions())
        .filter(|instr| instr.address() == address)
        .count()
}

/// A branch over a diamond: both arms rejoin and the whole function folds
/// into entry -> structured region -> exit.
#[test]
fn diamond_structures_into_if_else() -> Result<()> {
    let instructions = vec![
        Instruction::conditional_branch(0x00, 0x14, "beq v0, zero, 0x14"),
        Instruction::nop(0x04).in_delay_slot(),
        Instruction::plain(0x08, "addiu v1, zero, 1"),
        Instruction::jump(0x0c, 0x18, "j 0x18"),
        Instruction::plain(0x14, "addiu v1, zero, 2"),
        Instruction::plain(0x18, "move v0, v1"),
        Instruction::ret(0x1c),
    ];
    let (function, _) = structure(instructions, 0x00, &[])?;

    assert_eq!(function.graph.node_count(), 3);
    assert!(graph_has(&function.graph, &|n| matches!(
        n.kind(),
        NodeKind::IfElse { .. }
    )));
    assert!(function.outcome.residual_heads.len() <= 1);
    assert!(function.graph.validate().is_ok());

    // Both arm bodies survive inside the structure.
    assert_eq!(address_occurrences(&function.graph, 0x08), 1);
    assert_eq!(address_occurrences(&function.graph, 0x14), 1);
    Ok(())
}

/// Condition at the top, body branching back: a pre-tested loop whose
/// polarity follows which edge loops.
#[test]
fn top_tested_loop_becomes_while_not() -> Result<()> {
    let instructions = vec![
        Instruction::plain(0x00, "addiu v0, zero, 10"),
        // Loop exits (True) when v0 == 0; the body hangs off the False arm.
        Instruction::conditional_branch(0x04, 0x18, "beq v0, zero, 0x18"),
        Instruction::nop(0x08).in_delay_slot(),
        Instruction::plain(0x0c, "addiu v0, v0, -1"),
        Instruction::jump(0x10, 0x04, "j 0x04"),
        Instruction::plain(0x18, "move v1, v0"),
        Instruction::ret(0x1c),
    ];
    let (function, _) = structure(instructions, 0x00, &[])?;

    assert!(graph_has(&function.graph, &|n| matches!(
        n.kind(),
        NodeKind::While {
            inverted_condition: true,
            ..
        }
    )));
    assert_eq!(function.graph.node_count(), 3);
    assert!(function.graph.validate().is_ok());
    Ok(())
}

/// Body first, conditional branch back to the body start: do-while.
#[test]
fn bottom_tested_loop_becomes_do_while() -> Result<()> {
    let instructions = vec![
        Instruction::plain(0x00, "addiu v0, zero, 10"),
        Instruction::plain(0x04, "addiu v0, v0, -1"),
        Instruction::plain(0x08, "sltu v1, zero, v0"),
        Instruction::conditional_branch(0x0c, 0x04, "bne v1, zero, 0x04"),
        Instruction::plain(0x10, "addiu a0, a0, 4").in_delay_slot(),
        Instruction::ret(0x14),
    ];
    let (function, _) = structure(instructions, 0x00, &[])?;

    // The loop shape survives as a do-while (or while over the split body);
    // nothing may be left unreduced.
    assert!(function.outcome.residual_heads.len() <= 1);
    assert!(function.graph.validate().is_ok());
    assert!(graph_has(&function.graph, &|n| matches!(
        n.kind(),
        NodeKind::DoWhile { .. } | NodeKind::While { .. }
    )));
    // The duplicated delay instruction executes on both paths.
    assert_eq!(address_occurrences(&function.graph, 0x10), 2);
    Ok(())
}

/// Chained branches sharing a target: short-circuit `||` feeding an if/else.
#[test]
fn chained_conditions_become_or() -> Result<()> {
    let instructions = vec![
        Instruction::conditional_branch(0x00, 0x18, "beq a0, zero, 0x18"),
        Instruction::nop(0x04).in_delay_slot(),
        Instruction::conditional_branch(0x08, 0x18, "beq a1, zero, 0x18"),
        Instruction::nop(0x0c).in_delay_slot(),
        Instruction::plain(0x10, "addiu v0, zero, 0"),
        Instruction::jump(0x14, 0x1c, "j 0x1c"),
        Instruction::plain(0x18, "addiu v0, zero, 1"),
        Instruction::plain(0x1c, "move v1, v0"),
        Instruction::ret(0x20),
    ];
    let (function, _) = structure(instructions, 0x00, &[])?;

    assert!(graph_has(&function.graph, &|n| matches!(
        n.kind(),
        NodeKind::Or { operands } if operands.len() == 2
    )));
    assert!(graph_has(&function.graph, &|n| matches!(
        n.kind(),
        NodeKind::IfElse { .. }
    )));
    assert_eq!(function.graph.node_count(), 3);
    assert!(function.graph.validate().is_ok());
    Ok(())
}

/// After CFG construction the delay instruction exists as two distinct
/// `dup_` nodes, one per branch path; reduction keeps both evaluations.
#[test]
fn delay_slot_is_duplicated_once_per_path() -> Result<()> {
    let instructions = vec![
        Instruction::conditional_branch(0x00, 0x10, "beq v0, zero, 0x10"),
        Instruction::plain(0x04, "addiu a0, a0, 1").in_delay_slot(),
        Instruction::plain(0x08, "move v1, a0"),
        Instruction::ret(0x0c),
        Instruction::plain(0x10, "move v1, zero"),
        Instruction::ret(0x14),
    ];

    let mut sink = DiagnosticSink::new();
    let graph = build_cfg(&instructions, 0x00, &BTreeSet::new(), &mut sink)?;
    let dup_ids: Vec<String> = graph
        .nodes()
        .filter(|n| matches!(n.kind(), NodeKind::Duplicated { .. }))
        .map(|n| n.id().to_string())
        .collect();
    assert_eq!(dup_ids.len(), 2);
    assert!(dup_ids.iter().all(|id| id.starts_with("dup_")));
    assert_eq!(address_occurrences(&graph, 0x04), 2);

    // Through full structuring, both evaluations survive.
    let (function, _) = structure(instructions, 0x00, &[])?;
    assert_eq!(address_occurrences(&function.graph, 0x04), 2);
    assert!(function.graph.validate().is_ok());
    Ok(())
}

/// Straight-line code split by an interior jump target concatenates back to
/// one block in address order.
#[test]
fn adjacent_blocks_concatenate_in_address_order() -> Result<()> {
    let instructions = vec![
        Instruction::plain(0x00, "addiu sp, sp, -16"),
        Instruction::jump(0x04, 0x08, "j 0x08"),
        Instruction::plain(0x08, "sw ra, 12(sp)"),
        Instruction::ret(0x0c),
    ];
    let (function, _) = structure(instructions, 0x00, &[])?;

    assert_eq!(function.graph.node_count(), 3);
    let structured: Vec<&Node> = function
        .graph
        .nodes()
        .filter(|n| !n.is_entry() && !n.is_exit())
        .collect();
    assert_eq!(structured.len(), 1);
    let addrs: Vec<Address> = structured[0]
        .instructions()
        .iter()
        .map(|i| i.address())
        .collect();
    assert_eq!(addrs, vec![0x00, 0x04, 0x08, 0x0c]);
    assert!(structured[0].contains_address(0x08));
    Ok(())
}

/// An irreducible two-entry loop terminates with a diagnostic and a
/// partially structured graph; the fallback graph stays walkable.
#[test]
fn irreducible_flow_degrades_with_diagnostic() -> Result<()> {
    // A loop between 0x08 and 0x18 that can be entered at either block: the
    // entry branch picks a side, and 0x18 branches back into 0x08.
    let instructions = vec![
        Instruction::conditional_branch(0x00, 0x18, "beq a0, zero, 0x18"),
        Instruction::nop(0x04).in_delay_slot(),
        Instruction::plain(0x08, "addiu v0, v0, 1"),
        Instruction::jump(0x0c, 0x18, "j 0x18"),
        Instruction::plain(0x18, "addiu v0, v0, 2"),
        Instruction::conditional_branch(0x1c, 0x08, "bne v0, a1, 0x08"),
        Instruction::nop(0x20).in_delay_slot(),
        Instruction::ret(0x24),
    ];
    let (function, sink) = structure(instructions.clone(), 0x00, &[])?;

    assert!(function.graph.validate().is_ok());
    if function.outcome.residual_heads.len() > 1 {
        assert!(sink
            .entries()
            .iter()
            .any(|d| d.message.contains("irreducible")));
    }

    let fallback = fallback_graph(&instructions, 0x00);
    assert!(fallback.validate().is_ok());
    Ok(())
}

/// The export schema covers every node and edge with valid kind strings.
#[test]
fn export_schema_round_trips_through_json() -> Result<()> {
    let instructions = vec![
        Instruction::conditional_branch(0x00, 0x10, "beq v0, zero, 0x10"),
        Instruction::plain(0x04, "addiu a0, a0, 1").in_delay_slot(),
        Instruction::plain(0x08, "move v1, a0"),
        Instruction::ret(0x0c),
        Instruction::plain(0x10, "move v1, zero"),
        Instruction::ret(0x14),
    ];
    let mut sink = DiagnosticSink::new();
    let graph = build_cfg(&instructions, 0x00, &BTreeSet::new(), &mut sink)?;
    let export = GraphExport::from_graph(&graph);

    assert_eq!(export.nodes.len(), graph.node_count());
    let ids: BTreeSet<&str> = export.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids.len(), export.nodes.len(), "ids are unique");
    for edge in &export.edges {
        assert!(ids.contains(edge.from.as_str()));
        assert!(ids.contains(edge.to.as_str()));
        assert!(
            edge.kind == "always"
                || edge.kind == "true"
                || edge.kind == "false"
                || edge.kind.starts_with("case:")
        );
    }

    let json = serde_json::to_string(&export)?;
    let back: GraphExport = serde_json::from_str(&json)?;
    assert_eq!(back, export);
    Ok(())
}

/// Calls to known callees stay leaf calls; a jump to a callee is a tail
/// call straight to exit.
#[test]
fn calls_and_tail_calls_keep_the_function_shape() -> Result<()> {
    let instructions = vec![
        Instruction::plain(0x00, "addiu sp, sp, -24"),
        Instruction::call(0x04, 0x4000, "jal 0x4000"),
        Instruction::plain(0x08, "move a0, v0"),
        Instruction::jump(0x0c, 0x5000, "j 0x5000"),
    ];
    let (function, _) = structure(instructions, 0x00, &[0x4000, 0x5000])?;

    // One structured block straight to exit; no edges into the callees.
    assert_eq!(function.graph.node_count(), 3);
    assert!(function.graph.validate().is_ok());
    assert_eq!(address_occurrences(&function.graph, 0x04), 1);
    Ok(())
}
