// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Structuring rules: one pure candidate predicate plus one applying rewrite
//! per composite node variant.
//!
//! Predicates never touch the graph; rewrites re-run their predicate first
//! because the reducer's candidate pool can be stale by the time a rule is
//! applied. An `apply_*` returning `Ok(None)` means the candidate no longer
//! matches, which is a normal outcome, not an error.
//!
//! Every rewrite follows the same shape: strip the edges internal to the
//! pattern, lift the absorbed nodes out of the graph, build the composite,
//! swap it in with `replace_node` (which rewires the surviving boundary
//! edges), then re-attach the successor edges of the collapsed region.

use crate::graph::flow_graph::{ContractViolation, EdgeKind, FlowGraph};
use crate::graph::node::{Node, NodeId, NodeKind};
use log::debug;

/// Two adjacent regions with no other traffic between them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceCandidate {
    pub head: NodeId,
    pub tail: NodeId,
}

/// A condition with a one-armed body rejoining the other arm's target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IfCandidate {
    pub condition: NodeId,
    pub body: NodeId,
    pub continuation: NodeId,
    pub inverted_condition: bool,
}

/// A condition with two disjoint bodies rejoining at a common node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IfElseCandidate {
    pub condition: NodeId,
    pub then_body: NodeId,
    pub else_body: NodeId,
    pub continuation: NodeId,
}

/// A condition targeted by a back-edge from its own loop body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WhileCandidate {
    pub condition: NodeId,
    pub body: NodeId,
    pub exit_target: NodeId,
    pub inverted_condition: bool,
}

/// A body falling into a condition that loops back to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DoWhileCandidate {
    pub body: NodeId,
    pub condition: NodeId,
    pub exit_target: NodeId,
    pub inverted_condition: bool,
}

/// A node whose only out-edge is a self-loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WhileTrueCandidate {
    pub node: NodeId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShortCircuitKind {
    And,
    Or,
}

/// Two chained two-way conditions forming a short-circuit `&&`/`||`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortCircuitCandidate {
    pub first: NodeId,
    pub second: NodeId,
    pub kind: ShortCircuitKind,
    /// The second condition's polarity is swapped (wrapped in `Not`) to line
    /// its arms up with the first's.
    pub negate_second: bool,
    pub true_target: NodeId,
    pub false_target: NodeId,
}

fn is_plain_region(graph: &FlowGraph, id: &NodeId) -> bool {
    graph
        .node(id)
        .map(|node| !node.is_entry() && !node.is_exit())
        .unwrap_or(false)
}

pub fn sequence_candidate(graph: &FlowGraph, head: &NodeId) -> Option<SequenceCandidate> {
    if !is_plain_region(graph, head) {
        return None;
    }
    let tail = graph.single_always_successor(head)?;
    if &tail == head || !is_plain_region(graph, &tail) {
        return None;
    }
    let (pred, _) = graph.single_predecessor(&tail)?;
    if &pred != head {
        return None;
    }
    Some(SequenceCandidate {
        head: head.clone(),
        tail,
    })
}

/// Merges the two regions. Adjacent leaf blocks concatenate physically;
/// anything structured joins (or extends) a `Sequence` list.
pub fn apply_sequence(
    graph: &mut FlowGraph,
    head: &NodeId,
) -> Result<Option<NodeId>, ContractViolation> {
    let Some(candidate) = sequence_candidate(graph, head) else {
        return Ok(None);
    };
    let tail_outs: Vec<(NodeId, EdgeKind)> = graph
        .outs(&candidate.tail)
        .into_iter()
        .map(|edge| (edge.to.clone(), edge.kind))
        .collect();

    graph.remove_edge(&candidate.head, &candidate.tail, EdgeKind::Always)?;
    for (to, kind) in &tail_outs {
        graph.remove_edge(&candidate.tail, to, *kind)?;
    }
    let tail_node = graph.remove_node(&candidate.tail)?;
    let head_node = graph.node(&candidate.head).cloned().ok_or_else(|| {
        ContractViolation::new(format!("sequence: head {} vanished", candidate.head))
    })?;

    let merged = join_regions(graph, head_node, tail_node);
    let merged_id = merged.id().clone();
    graph.replace_node(&candidate.head, merged)?;
    for (to, kind) in tail_outs {
        // A back-edge into the collapsed region becomes a self-loop.
        let target = if to == candidate.head || to == candidate.tail {
            merged_id.clone()
        } else {
            to
        };
        graph.add_edge(&merged_id, &target, kind)?;
    }
    debug!(
        "[patterns] sequence {} + {} -> {}",
        candidate.head, candidate.tail, merged_id
    );
    Ok(Some(merged_id))
}

fn join_regions(graph: &mut FlowGraph, head: Node, tail: Node) -> Node {
    if head.is_leaf_block() && tail.is_leaf_block() {
        let NodeKind::Block {
            instructions: mut merged,
        } = head.into_kind()
        else {
            unreachable!()
        };
        let NodeKind::Block { instructions } = tail.into_kind() else {
            unreachable!()
        };
        merged.extend(instructions);
        return Node::block(graph.mint_id("block"), merged);
    }
    let mut nodes = sequence_elements(head);
    for element in sequence_elements(tail) {
        push_element(&mut nodes, element);
    }
    Node::sequence(graph.mint_id("seq"), nodes)
}

/// An existing `Sequence` head or tail contributes its list elements rather
/// than nesting.
fn sequence_elements(node: Node) -> Vec<Node> {
    if matches!(node.kind(), NodeKind::Sequence { .. }) {
        let NodeKind::Sequence { nodes } = node.into_kind() else {
            unreachable!()
        };
        nodes
    } else {
        vec![node]
    }
}

/// Appends a list element, concatenating where a leaf block meets a leaf
/// block so long straight runs stay one physical node.
fn push_element(nodes: &mut Vec<Node>, node: Node) {
    let fuse = matches!(
        (nodes.last().map(|last| last.kind()), node.kind()),
        (Some(NodeKind::Block { .. }), NodeKind::Block { .. })
    );
    if !fuse {
        nodes.push(node);
        return;
    }
    let Some(previous) = nodes.pop() else {
        return;
    };
    let previous_id = previous.id().clone();
    let NodeKind::Block {
        instructions: mut merged,
    } = previous.into_kind()
    else {
        unreachable!()
    };
    let NodeKind::Block { instructions } = node.into_kind() else {
        unreachable!()
    };
    merged.extend(instructions);
    nodes.push(Node::block(previous_id, merged));
}

pub fn if_candidate(graph: &FlowGraph, condition: &NodeId) -> Option<IfCandidate> {
    if !is_plain_region(graph, condition) {
        return None;
    }
    let (true_to, false_to) = graph.boolean_successors(condition)?;
    if true_to == false_to {
        return None;
    }
    for (body, continuation, inverted) in [
        (true_to.clone(), false_to.clone(), false),
        (false_to, true_to, true),
    ] {
        if body == *condition || continuation == *condition {
            continue;
        }
        if !is_plain_region(graph, &body) {
            continue;
        }
        let Some((pred, _)) = graph.single_predecessor(&body) else {
            continue;
        };
        if &pred != condition {
            continue;
        }
        if graph.single_always_successor(&body) != Some(continuation.clone()) {
            continue;
        }
        return Some(IfCandidate {
            condition: condition.clone(),
            body,
            continuation,
            inverted_condition: inverted,
        });
    }
    None
}

pub fn apply_if(
    graph: &mut FlowGraph,
    condition: &NodeId,
) -> Result<Option<NodeId>, ContractViolation> {
    let Some(candidate) = if_candidate(graph, condition) else {
        return Ok(None);
    };
    strip_boolean_outs(graph, &candidate.condition)?;
    graph.remove_edge(&candidate.body, &candidate.continuation, EdgeKind::Always)?;
    let body = graph.remove_node(&candidate.body)?;
    let cond_node = clone_node(graph, &candidate.condition)?;
    let id = graph.mint_id("if");
    let node = Node::if_node(id.clone(), cond_node, body, candidate.inverted_condition);
    graph.replace_node(&candidate.condition, node)?;
    graph.add_edge(&id, &candidate.continuation, EdgeKind::Always)?;
    debug!(
        "[patterns] if {} body {} -> {}",
        candidate.condition, candidate.body, id
    );
    Ok(Some(id))
}

pub fn if_else_candidate(graph: &FlowGraph, condition: &NodeId) -> Option<IfElseCandidate> {
    if !is_plain_region(graph, condition) {
        return None;
    }
    let (then_body, else_body) = graph.boolean_successors(condition)?;
    if then_body == else_body
        || then_body == *condition
        || else_body == *condition
        || !is_plain_region(graph, &then_body)
        || !is_plain_region(graph, &else_body)
    {
        return None;
    }
    for body in [&then_body, &else_body] {
        let (pred, _) = graph.single_predecessor(body)?;
        if &pred != condition {
            return None;
        }
    }
    let then_next = graph.single_always_successor(&then_body)?;
    let else_next = graph.single_always_successor(&else_body)?;
    if then_next != else_next {
        return None;
    }
    let continuation = then_next;
    if continuation == *condition || continuation == then_body || continuation == else_body {
        return None;
    }
    Some(IfElseCandidate {
        condition: condition.clone(),
        then_body,
        else_body,
        continuation,
    })
}

pub fn apply_if_else(
    graph: &mut FlowGraph,
    condition: &NodeId,
) -> Result<Option<NodeId>, ContractViolation> {
    let Some(candidate) = if_else_candidate(graph, condition) else {
        return Ok(None);
    };
    strip_boolean_outs(graph, &candidate.condition)?;
    graph.remove_edge(
        &candidate.then_body,
        &candidate.continuation,
        EdgeKind::Always,
    )?;
    graph.remove_edge(
        &candidate.else_body,
        &candidate.continuation,
        EdgeKind::Always,
    )?;
    let then_body = graph.remove_node(&candidate.then_body)?;
    let else_body = graph.remove_node(&candidate.else_body)?;
    let cond_node = clone_node(graph, &candidate.condition)?;
    let id = graph.mint_id("if_else");
    let node = Node::if_else(id.clone(), cond_node, then_body, else_body);
    graph.replace_node(&candidate.condition, node)?;
    graph.add_edge(&id, &candidate.continuation, EdgeKind::Always)?;
    debug!(
        "[patterns] if_else {} -> {} (join {})",
        candidate.condition, id, candidate.continuation
    );
    Ok(Some(id))
}

pub fn while_candidate(graph: &FlowGraph, condition: &NodeId) -> Option<WhileCandidate> {
    if !is_plain_region(graph, condition) {
        return None;
    }
    let (true_to, false_to) = graph.boolean_successors(condition)?;
    if true_to == false_to {
        return None;
    }
    for (body, exit_target, inverted) in [
        (true_to.clone(), false_to.clone(), false),
        (false_to, true_to, true),
    ] {
        if body == *condition || exit_target == *condition {
            continue;
        }
        if !is_plain_region(graph, &body) || exit_target == body {
            continue;
        }
        let Some((pred, _)) = graph.single_predecessor(&body) else {
            continue;
        };
        if &pred != condition {
            continue;
        }
        // The body's sole exit is the back-edge to the condition.
        if graph.single_always_successor(&body) != Some(condition.clone()) {
            continue;
        }
        return Some(WhileCandidate {
            condition: condition.clone(),
            body,
            exit_target,
            inverted_condition: inverted,
        });
    }
    None
}

pub fn apply_while(
    graph: &mut FlowGraph,
    condition: &NodeId,
) -> Result<Option<NodeId>, ContractViolation> {
    let Some(candidate) = while_candidate(graph, condition) else {
        return Ok(None);
    };
    strip_boolean_outs(graph, &candidate.condition)?;
    graph.remove_edge(&candidate.body, &candidate.condition, EdgeKind::Always)?;
    let body = graph.remove_node(&candidate.body)?;
    let cond_node = clone_node(graph, &candidate.condition)?;
    let id = graph.mint_id("while");
    let node = Node::while_node(id.clone(), cond_node, body, candidate.inverted_condition);
    graph.replace_node(&candidate.condition, node)?;
    graph.add_edge(&id, &candidate.exit_target, EdgeKind::Always)?;
    debug!(
        "[patterns] while {} body {} -> {} (inverted: {})",
        candidate.condition, candidate.body, id, candidate.inverted_condition
    );
    Ok(Some(id))
}

pub fn do_while_candidate(graph: &FlowGraph, body: &NodeId) -> Option<DoWhileCandidate> {
    if !is_plain_region(graph, body) {
        return None;
    }
    let condition = graph.single_always_successor(body)?;
    if &condition == body || !is_plain_region(graph, &condition) {
        return None;
    }
    let (pred, _) = graph.single_predecessor(&condition)?;
    if &pred != body {
        return None;
    }
    let (true_to, false_to) = graph.boolean_successors(&condition)?;
    let (exit_target, inverted) = if &true_to == body {
        (false_to, false)
    } else if &false_to == body {
        (true_to, true)
    } else {
        return None;
    };
    if exit_target == *body || exit_target == condition {
        return None;
    }
    Some(DoWhileCandidate {
        body: body.clone(),
        condition,
        exit_target,
        inverted_condition: inverted,
    })
}

pub fn apply_do_while(
    graph: &mut FlowGraph,
    body: &NodeId,
) -> Result<Option<NodeId>, ContractViolation> {
    let Some(candidate) = do_while_candidate(graph, body) else {
        return Ok(None);
    };
    graph.remove_edge(&candidate.body, &candidate.condition, EdgeKind::Always)?;
    strip_boolean_outs(graph, &candidate.condition)?;
    let cond_node = graph.remove_node(&candidate.condition)?;
    let body_node = clone_node(graph, &candidate.body)?;
    let id = graph.mint_id("do_while");
    let node = Node::do_while(id.clone(), cond_node, body_node, candidate.inverted_condition);
    graph.replace_node(&candidate.body, node)?;
    graph.add_edge(&id, &candidate.exit_target, EdgeKind::Always)?;
    debug!(
        "[patterns] do_while {} cond {} -> {} (inverted: {})",
        candidate.body, candidate.condition, id, candidate.inverted_condition
    );
    Ok(Some(id))
}

pub fn while_true_candidate(graph: &FlowGraph, id: &NodeId) -> Option<WhileTrueCandidate> {
    if !is_plain_region(graph, id) {
        return None;
    }
    if graph.single_always_successor(id)? != *id {
        return None;
    }
    Some(WhileTrueCandidate { node: id.clone() })
}

pub fn apply_while_true(
    graph: &mut FlowGraph,
    id: &NodeId,
) -> Result<Option<NodeId>, ContractViolation> {
    let Some(candidate) = while_true_candidate(graph, id) else {
        return Ok(None);
    };
    graph.remove_edge(&candidate.node, &candidate.node, EdgeKind::Always)?;
    let body = clone_node(graph, &candidate.node)?;
    let new_id = graph.mint_id("while_true");
    // Terminal: the self-loop is gone and no normal exit remains.
    let node = Node::while_true(new_id.clone(), body);
    graph.replace_node(&candidate.node, node)?;
    debug!("[patterns] while_true {} -> {}", candidate.node, new_id);
    Ok(Some(new_id))
}

pub fn short_circuit_candidate(
    graph: &FlowGraph,
    first: &NodeId,
) -> Option<ShortCircuitCandidate> {
    if !is_plain_region(graph, first) {
        return None;
    }
    let (true_to, false_to) = graph.boolean_successors(first)?;
    if true_to == false_to {
        return None;
    }

    // `||`: the second condition is evaluated when the first is false.
    if let Some(candidate) = chained_condition(graph, first, &false_to, EdgeKind::False) {
        let (second, t1, f1) = candidate;
        if t1 == true_to && f1 != true_to && !involved(&f1, first, &second) && !involved(&true_to, first, &second) {
            return Some(ShortCircuitCandidate {
                first: first.clone(),
                second,
                kind: ShortCircuitKind::Or,
                negate_second: false,
                true_target: true_to,
                false_target: f1,
            });
        }
        if f1 == true_to && !involved(&t1, first, &second) && !involved(&true_to, first, &second) {
            return Some(ShortCircuitCandidate {
                first: first.clone(),
                second,
                kind: ShortCircuitKind::Or,
                negate_second: true,
                true_target: true_to,
                false_target: t1,
            });
        }
    }

    // `&&`: the second condition is evaluated when the first is true.
    if let Some(candidate) = chained_condition(graph, first, &true_to, EdgeKind::True) {
        let (second, t1, f1) = candidate;
        if f1 == false_to && t1 != false_to && !involved(&t1, first, &second) && !involved(&false_to, first, &second) {
            return Some(ShortCircuitCandidate {
                first: first.clone(),
                second,
                kind: ShortCircuitKind::And,
                negate_second: false,
                true_target: t1,
                false_target: false_to,
            });
        }
        if t1 == false_to && !involved(&f1, first, &second) && !involved(&false_to, first, &second) {
            return Some(ShortCircuitCandidate {
                first: first.clone(),
                second,
                kind: ShortCircuitKind::And,
                negate_second: true,
                true_target: f1,
                false_target: false_to,
            });
        }
    }
    None
}

/// The chained second condition, if `target` is a two-way condition reached
/// only through `first`'s `kind` arm.
fn chained_condition(
    graph: &FlowGraph,
    first: &NodeId,
    target: &NodeId,
    kind: EdgeKind,
) -> Option<(NodeId, NodeId, NodeId)> {
    if target == first || !is_plain_region(graph, target) {
        return None;
    }
    let (pred, pred_kind) = graph.single_predecessor(target)?;
    if &pred != first || pred_kind != kind {
        return None;
    }
    let (t1, f1) = graph.boolean_successors(target)?;
    Some((target.clone(), t1, f1))
}

fn involved(id: &NodeId, first: &NodeId, second: &NodeId) -> bool {
    id == first || id == second
}

pub fn apply_short_circuit(
    graph: &mut FlowGraph,
    first: &NodeId,
) -> Result<Option<NodeId>, ContractViolation> {
    let Some(candidate) = short_circuit_candidate(graph, first) else {
        return Ok(None);
    };
    strip_boolean_outs(graph, &candidate.first)?;
    strip_boolean_outs(graph, &candidate.second)?;
    let second_node = graph.remove_node(&candidate.second)?;
    let second_operand = if candidate.negate_second {
        let not_id = graph.mint_id("not");
        Node::not(not_id, second_node)
    } else {
        second_node
    };
    let first_node = clone_node(graph, &candidate.first)?;

    // A chained head extends its operand list instead of nesting.
    let (prefix, operands) = match candidate.kind {
        ShortCircuitKind::Or => {
            if matches!(first_node.kind(), NodeKind::Or { .. }) {
                let NodeKind::Or { mut operands } = first_node.into_kind() else {
                    unreachable!()
                };
                operands.push(second_operand);
                ("or", operands)
            } else {
                ("or", vec![first_node, second_operand])
            }
        }
        ShortCircuitKind::And => {
            if matches!(first_node.kind(), NodeKind::And { .. }) {
                let NodeKind::And { mut operands } = first_node.into_kind() else {
                    unreachable!()
                };
                operands.push(second_operand);
                ("and", operands)
            } else {
                ("and", vec![first_node, second_operand])
            }
        }
    };
    let id = graph.mint_id(prefix);
    let node = match candidate.kind {
        ShortCircuitKind::Or => Node::or(id.clone(), operands),
        ShortCircuitKind::And => Node::and(id.clone(), operands),
    };
    graph.replace_node(&candidate.first, node)?;
    graph.add_edge(&id, &candidate.true_target, EdgeKind::True)?;
    graph.add_edge(&id, &candidate.false_target, EdgeKind::False)?;
    debug!(
        "[patterns] {:?} chain {} + {} -> {}",
        candidate.kind, candidate.first, candidate.second, id
    );
    Ok(Some(id))
}

/// Removes a condition node's `True`/`False` pair.
fn strip_boolean_outs(graph: &mut FlowGraph, id: &NodeId) -> Result<(), ContractViolation> {
    let outs: Vec<(NodeId, EdgeKind)> = graph
        .outs(id)
        .into_iter()
        .map(|edge| (edge.to.clone(), edge.kind))
        .collect();
    for (to, kind) in outs {
        if matches!(kind, EdgeKind::True | EdgeKind::False) {
            graph.remove_edge(id, &to, kind)?;
        } else {
            return Err(ContractViolation::new(format!(
                "condition {id} has a stray {kind} out-edge"
            )));
        }
    }
    Ok(())
}

fn clone_node(graph: &FlowGraph, id: &NodeId) -> Result<Node, ContractViolation> {
    graph
        .node(id)
        .cloned()
        .ok_or_else(|| ContractViolation::new(format!("node {id} vanished mid-rewrite")))
}
