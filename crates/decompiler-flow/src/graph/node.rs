// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! The node-variant set: leaf instruction regions and every structured
//! compound region the reducer can build.
//!
//! Node identity is a stable string key, not an object reference. Composite
//! variants own their absorbed children by value; once a child is folded into
//! a composite it no longer exists in the graph, and its id is retired for
//! good. Graph-level adjacency lives only in the [`FlowGraph`], never inside
//! a node.
//!
//! [`FlowGraph`]: crate::graph::FlowGraph

use crate::instruction::{Address, Instruction, Register};
use std::collections::BTreeSet;
use std::fmt;

/// Stable string identity of a node.
///
/// Two nodes with the same id are the same logical construct; duplication
/// always mints a fresh `dup_`-prefixed id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Conventional id for the leaf block starting at `address`.
    pub fn for_block(address: Address) -> Self {
        Self(format!("block_{address:08x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A region of control flow, leaf or structured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
}

/// The closed set of node variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Unique function entry marker; never carries instructions.
    Entry,
    /// Unique function exit marker; never carries instructions.
    Exit,
    /// A leaf sequence of instructions in address order.
    Block { instructions: Vec<Instruction> },
    /// An ordered list of regions executed back to back. Leaf neighbours are
    /// concatenated physically before ever reaching this variant; list
    /// elements here are structured regions.
    Sequence { nodes: Vec<Node> },
    /// `if (cond) { body }` with no else branch. `inverted_condition` means
    /// the body hangs off the `False` edge (`if_not`).
    If {
        condition: Box<Node>,
        body: Box<Node>,
        inverted_condition: bool,
    },
    /// `if (cond) { then } else { else }`.
    IfElse {
        condition: Box<Node>,
        then_body: Box<Node>,
        else_body: Box<Node>,
    },
    /// Pre-tested loop. `inverted_condition` means the `False` edge continued
    /// the loop (`while_not`).
    While {
        condition: Box<Node>,
        body: Box<Node>,
        inverted_condition: bool,
    },
    /// Post-tested loop. `inverted_condition` means the `False` edge pointed
    /// back at the body.
    DoWhile {
        condition: Box<Node>,
        body: Box<Node>,
        inverted_condition: bool,
    },
    /// Infinite loop; terminal in the graph. Any embedded return was wired to
    /// the exit node by the builder before this collapsed.
    WhileTrue { body: Box<Node> },
    /// Short-circuit conjunction of two or more condition regions.
    And { operands: Vec<Node> },
    /// Short-circuit disjunction of two or more condition regions.
    Or { operands: Vec<Node> },
    /// Polarity wrapper: the wrapped condition's `True`/`False` meaning is
    /// swapped without touching its instructions.
    Not { operand: Box<Node> },
    /// A genuinely distinct copy of an existing region under a fresh id, so
    /// one physical instruction (the branch-delay slot) can live on two
    /// control paths with independent rewrite histories.
    Duplicated { original: Box<Node> },
}

impl Node {
    pub fn entry() -> Self {
        Self {
            id: NodeId::new("entry"),
            kind: NodeKind::Entry,
        }
    }

    pub fn exit() -> Self {
        Self {
            id: NodeId::new("exit"),
            kind: NodeKind::Exit,
        }
    }

    pub fn block(id: NodeId, instructions: Vec<Instruction>) -> Self {
        Self {
            id,
            kind: NodeKind::Block { instructions },
        }
    }

    pub fn sequence(id: NodeId, nodes: Vec<Node>) -> Self {
        Self {
            id,
            kind: NodeKind::Sequence { nodes },
        }
    }

    pub fn if_node(id: NodeId, condition: Node, body: Node, inverted_condition: bool) -> Self {
        Self {
            id,
            kind: NodeKind::If {
                condition: Box::new(condition),
                body: Box::new(body),
                inverted_condition,
            },
        }
    }

    pub fn if_else(id: NodeId, condition: Node, then_body: Node, else_body: Node) -> Self {
        Self {
            id,
            kind: NodeKind::IfElse {
                condition: Box::new(condition),
                then_body: Box::new(then_body),
                else_body: Box::new(else_body),
            },
        }
    }

    pub fn while_node(id: NodeId, condition: Node, body: Node, inverted_condition: bool) -> Self {
        Self {
            id,
            kind: NodeKind::While {
                condition: Box::new(condition),
                body: Box::new(body),
                inverted_condition,
            },
        }
    }

    pub fn do_while(id: NodeId, condition: Node, body: Node, inverted_condition: bool) -> Self {
        Self {
            id,
            kind: NodeKind::DoWhile {
                condition: Box::new(condition),
                body: Box::new(body),
                inverted_condition,
            },
        }
    }

    pub fn while_true(id: NodeId, body: Node) -> Self {
        Self {
            id,
            kind: NodeKind::WhileTrue {
                body: Box::new(body),
            },
        }
    }

    pub fn and(id: NodeId, operands: Vec<Node>) -> Self {
        Self {
            id,
            kind: NodeKind::And { operands },
        }
    }

    pub fn or(id: NodeId, operands: Vec<Node>) -> Self {
        Self {
            id,
            kind: NodeKind::Or { operands },
        }
    }

    pub fn not(id: NodeId, operand: Node) -> Self {
        Self {
            id,
            kind: NodeKind::Not {
                operand: Box::new(operand),
            },
        }
    }

    pub fn duplicated(id: NodeId, original: Node) -> Self {
        Self {
            id,
            kind: NodeKind::Duplicated {
                original: Box::new(original),
            },
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Payload mutation is reserved for the builder's block-splitting step.
    pub(crate) fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    /// Consumes the node, discarding its id. Used when a rewrite absorbs an
    /// existing node's payload into a fresh construct.
    pub(crate) fn into_kind(self) -> NodeKind {
        self.kind
    }

    pub fn is_entry(&self) -> bool {
        matches!(self.kind, NodeKind::Entry)
    }

    pub fn is_exit(&self) -> bool {
        matches!(self.kind, NodeKind::Exit)
    }

    pub fn is_leaf_block(&self) -> bool {
        matches!(self.kind, NodeKind::Block { .. })
    }

    /// Terminal regions are the only ones allowed zero out-edges besides the
    /// exit node itself. A sequence ending in a terminal region is itself
    /// terminal.
    pub fn is_terminal(&self) -> bool {
        match &self.kind {
            NodeKind::Exit | NodeKind::WhileTrue { .. } => true,
            NodeKind::Sequence { nodes } => nodes.last().is_some_and(Node::is_terminal),
            _ => false,
        }
    }

    /// Every owned instruction in execution/address order, recursing through
    /// composite children. Used by renderers for disassembly listings.
    pub fn instructions(&self) -> Vec<&Instruction> {
        let mut out = Vec::new();
        self.collect_instructions(&mut out);
        out
    }

    fn collect_instructions<'a>(&'a self, out: &mut Vec<&'a Instruction>) {
        match &self.kind {
            NodeKind::Entry | NodeKind::Exit => {}
            NodeKind::Block { instructions } => out.extend(instructions.iter()),
            NodeKind::Sequence { nodes } => {
                for node in nodes {
                    node.collect_instructions(out);
                }
            }
            NodeKind::If {
                condition, body, ..
            } => {
                condition.collect_instructions(out);
                body.collect_instructions(out);
            }
            NodeKind::IfElse {
                condition,
                then_body,
                else_body,
            } => {
                condition.collect_instructions(out);
                then_body.collect_instructions(out);
                else_body.collect_instructions(out);
            }
            NodeKind::While {
                condition, body, ..
            } => {
                condition.collect_instructions(out);
                body.collect_instructions(out);
            }
            // Post-tested: the body executes before the condition.
            NodeKind::DoWhile {
                condition, body, ..
            } => {
                body.collect_instructions(out);
                condition.collect_instructions(out);
            }
            NodeKind::WhileTrue { body } => body.collect_instructions(out),
            NodeKind::And { operands } | NodeKind::Or { operands } => {
                for op in operands {
                    op.collect_instructions(out);
                }
            }
            NodeKind::Not { operand } => operand.collect_instructions(out),
            NodeKind::Duplicated { original } => original.collect_instructions(out),
        }
    }

    /// Whether any owned instruction lives at `address`.
    pub fn contains_address(&self, address: Address) -> bool {
        self.instructions()
            .iter()
            .any(|instr| instr.address() == address)
    }

    pub fn registers_read(&self) -> BTreeSet<Register> {
        self.instructions()
            .iter()
            .flat_map(|instr| instr.inputs().iter().copied())
            .collect()
    }

    pub fn registers_written(&self) -> BTreeSet<Register> {
        self.instructions()
            .iter()
            .flat_map(|instr| instr.outputs().iter().copied())
            .collect()
    }

    /// Short human-readable label for renderers.
    pub fn label(&self) -> String {
        match &self.kind {
            NodeKind::Entry => "entry".to_string(),
            NodeKind::Exit => "exit".to_string(),
            NodeKind::Block { instructions } => match (instructions.first(), instructions.last()) {
                (Some(first), Some(last)) => {
                    format!("{:#010x}..{:#010x}", first.address(), last.address())
                }
                _ => "empty".to_string(),
            },
            NodeKind::Sequence { nodes } => format!("seq[{}]", nodes.len()),
            NodeKind::If {
                inverted_condition: false,
                ..
            } => "if".to_string(),
            NodeKind::If {
                inverted_condition: true,
                ..
            } => "if_not".to_string(),
            NodeKind::IfElse { .. } => "if_else".to_string(),
            NodeKind::While {
                inverted_condition: false,
                ..
            } => "while".to_string(),
            NodeKind::While {
                inverted_condition: true,
                ..
            } => "while_not".to_string(),
            NodeKind::DoWhile {
                inverted_condition: false,
                ..
            } => "do_while".to_string(),
            NodeKind::DoWhile {
                inverted_condition: true,
                ..
            } => "do_while_not".to_string(),
            NodeKind::WhileTrue { .. } => "while_true".to_string(),
            NodeKind::And { operands } => format!("and[{}]", operands.len()),
            NodeKind::Or { operands } => format!("or[{}]", operands.len()),
            NodeKind::Not { .. } => "not".to_string(),
            NodeKind::Duplicated { original } => format!("dup({})", original.label()),
        }
    }
}
