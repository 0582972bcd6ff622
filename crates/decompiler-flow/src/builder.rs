// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Linear-sweep CFG construction from a decoded instruction stream.
//!
//! A work queue of addresses drives the sweep: instructions are consumed into
//! the current leaf block until a control transfer (or a `nop` sequence
//! point) is met, and branch/fall-through targets are enqueued. Blocks are
//! split lazily when a later edge needs to enter the middle of an
//! already-built block.
//!
//! MIPS branch-delay slots get dedicated handling: the delay instruction ends
//! up isolated in its own single-instruction block carrying the branch's
//! `True`/`False` edges, and a post-sweep pass replaces each such block with
//! two independent `Duplicated` copies, one per outgoing path. That keeps
//! exactly one evaluation of the delay instruction's side effects per path
//! taken.

use crate::diagnostics::DiagnosticSink;
use crate::graph::flow_graph::{ContractViolation, EdgeKind, FlowGraph};
use crate::graph::node::{Node, NodeId, NodeKind};
use crate::instruction::{Address, Instruction, InstructionKind, INSTRUCTION_SIZE};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Source side of an edge recorded before its target block exists.
#[derive(Clone, Copy, Debug)]
enum PendingFrom {
    /// The function entry marker.
    Entry,
    /// The block containing the instruction at this address. Lookup happens
    /// at resolution time so block splits cannot orphan the edge.
    At(Address),
}

/// An edge recorded during the sweep, resolved once all blocks exist.
#[derive(Clone, Copy, Debug)]
struct PendingEdge {
    from: PendingFrom,
    target: Address,
    kind: EdgeKind,
}

/// A conditional branch whose delay block needs its `True`/`False` edges
/// attached after the sweep.
#[derive(Clone, Copy, Debug)]
struct DelayFixup {
    branch_addr: Address,
    delay_addr: Address,
    true_target: Address,
    false_target: Address,
}

/// Builds the initial leaf-node graph for one function.
///
/// `callees` is the set of known function-entry addresses; a jump into one is
/// treated as a tail call (edge to exit), and a call to one is a leaf call
/// with no edge into the callee.
pub fn build_cfg(
    instructions: &[Instruction],
    entry_address: Address,
    callees: &BTreeSet<Address>,
    sink: &mut DiagnosticSink,
) -> Result<FlowGraph, ContractViolation> {
    let mut builder = CfgBuilder::new(instructions, callees);
    builder.sweep(entry_address, sink)?;
    builder.resolve_pending_edges(sink)?;
    builder.attach_delay_edges(sink)?;
    builder.duplicate_delay_blocks(sink)?;
    builder.graph.make_uniform_boolean_edges()?;
    builder.graph.validate()?;
    Ok(builder.graph)
}

struct CfgBuilder<'a> {
    instructions: &'a [Instruction],
    callees: &'a BTreeSet<Address>,
    /// Address to stream position, for O(log n) decode lookups.
    index: BTreeMap<Address, usize>,
    graph: FlowGraph,
    /// Block start address to `(node id, last instruction address)`.
    blocks: BTreeMap<Address, (NodeId, Address)>,
    pending: Vec<PendingEdge>,
    fixups: Vec<DelayFixup>,
}

/// How a block's instruction consumption ended.
enum BlockEnd {
    /// Fell into the next address or an existing block start.
    FallThrough { next: Address },
    /// Function return; edge to exit.
    Return,
    /// Unconditional jump to a known callee entry; edge to exit.
    TailCall,
    /// Unconditional jump inside the function.
    Goto { target: Address },
    /// Conditional branch; delay handling recorded as a fixup.
    Branch {
        branch_addr: Address,
        target: Address,
    },
    /// Ran past the end of the decoded stream.
    OffEnd,
}

impl<'a> CfgBuilder<'a> {
    fn new(instructions: &'a [Instruction], callees: &'a BTreeSet<Address>) -> Self {
        let index = instructions
            .iter()
            .enumerate()
            .map(|(position, instr)| (instr.address(), position))
            .collect();
        Self {
            instructions,
            callees,
            index,
            graph: FlowGraph::new(),
            blocks: BTreeMap::new(),
            pending: Vec::new(),
            fixups: Vec::new(),
        }
    }

    fn instruction_at(&self, address: Address) -> Option<&'a Instruction> {
        self.index
            .get(&address)
            .map(|&position| &self.instructions[position])
    }

    /// The block whose span contains `address`, as `(start, id, last)`.
    fn block_containing(&self, address: Address) -> Option<(Address, NodeId, Address)> {
        let (&start, (id, last)) = self.blocks.range(..=address).next_back()?;
        if address <= *last {
            Some((start, id.clone(), *last))
        } else {
            None
        }
    }

    fn sweep(&mut self, entry_address: Address, sink: &mut DiagnosticSink) -> Result<(), ContractViolation> {
        self.pending.push(PendingEdge {
            from: PendingFrom::Entry,
            target: entry_address,
            kind: EdgeKind::Always,
        });

        let mut queue: VecDeque<Address> = VecDeque::new();
        queue.push_back(entry_address);

        while let Some(address) = queue.pop_front() {
            match self.block_containing(address) {
                Some((start, _, _)) if start == address => continue,
                Some(_) => {
                    // A later edge enters the middle of a built block.
                    self.split_block(address)?;
                    continue;
                }
                None => {}
            }
            if self.instruction_at(address).is_none() {
                sink.warning_at(address, format!("no instruction at {address:#010x}; target dropped"));
                continue;
            }
            self.build_block(address, &mut queue, sink)?;
        }
        Ok(())
    }

    /// Consumes instructions from `start` into one new leaf block and records
    /// its outgoing control flow.
    fn build_block(
        &mut self,
        start: Address,
        queue: &mut VecDeque<Address>,
        sink: &mut DiagnosticSink,
    ) -> Result<(), ContractViolation> {
        let mut instrs: Vec<Instruction> = Vec::new();
        let mut pc = start;
        let end;

        loop {
            if pc != start && self.blocks.contains_key(&pc) {
                end = BlockEnd::FallThrough { next: pc };
                break;
            }
            let Some(instr) = self.instruction_at(pc) else {
                end = BlockEnd::OffEnd;
                break;
            };
            match instr.kind() {
                InstructionKind::Plain => {
                    instrs.push(instr.clone());
                    pc += INSTRUCTION_SIZE;
                }
                InstructionKind::Call { target } => {
                    // A resolved callee is a leaf from this function's point
                    // of view; control flow continues past the call site.
                    if !self.callees.contains(&target) {
                        debug!(
                            "[builder] call at {:#010x} to unresolved target {:#010x}",
                            pc, target
                        );
                    }
                    instrs.push(instr.clone());
                    pc += INSTRUCTION_SIZE;
                }
                InstructionKind::Nop => {
                    if instrs.is_empty() {
                        // A lone nop becomes its own block; the reducer's
                        // pre-pass strips these.
                        instrs.push(instr.clone());
                        end = BlockEnd::FallThrough {
                            next: pc + INSTRUCTION_SIZE,
                        };
                    } else {
                        end = BlockEnd::FallThrough { next: pc };
                    }
                    break;
                }
                InstructionKind::Return => {
                    instrs.push(instr.clone());
                    end = BlockEnd::Return;
                    break;
                }
                InstructionKind::Jump { target } => {
                    instrs.push(instr.clone());
                    end = if self.callees.contains(&target) {
                        debug!(
                            "[builder] jump at {:#010x} targets callee {:#010x}: tail call",
                            pc, target
                        );
                        BlockEnd::TailCall
                    } else {
                        BlockEnd::Goto { target }
                    };
                    break;
                }
                InstructionKind::ConditionalBranch { target } => {
                    instrs.push(instr.clone());
                    end = BlockEnd::Branch {
                        branch_addr: pc,
                        target,
                    };
                    break;
                }
            }
        }

        if instrs.is_empty() {
            sink.warning_at(start, format!("empty block at {start:#010x}; dropped"));
            return Ok(());
        }

        let last_addr = instrs
            .last()
            .map(Instruction::address)
            .unwrap_or(start);
        let id = NodeId::for_block(start);
        self.graph.add_node(Node::block(id.clone(), instrs))?;
        self.blocks.insert(start, (id.clone(), last_addr));
        debug!("[builder] block {} spans {:#010x}..{:#010x}", id, start, last_addr);

        match end {
            BlockEnd::FallThrough { next } => {
                self.pending.push(PendingEdge {
                    from: PendingFrom::At(last_addr),
                    target: next,
                    kind: EdgeKind::Always,
                });
                queue.push_back(next);
            }
            BlockEnd::Return | BlockEnd::TailCall => {
                let exit = self.graph.exit_id().clone();
                self.graph.add_edge(&id, &exit, EdgeKind::Always)?;
            }
            BlockEnd::Goto { target } => {
                self.pending.push(PendingEdge {
                    from: PendingFrom::At(last_addr),
                    target,
                    kind: EdgeKind::Always,
                });
                queue.push_back(target);
            }
            BlockEnd::Branch {
                branch_addr,
                target,
            } => {
                let delay_addr = branch_addr + INSTRUCTION_SIZE;
                let fall_through = branch_addr + 2 * INSTRUCTION_SIZE;
                self.pending.push(PendingEdge {
                    from: PendingFrom::At(branch_addr),
                    target: delay_addr,
                    kind: EdgeKind::Always,
                });
                self.fixups.push(DelayFixup {
                    branch_addr,
                    delay_addr,
                    true_target: target,
                    false_target: fall_through,
                });
                // Fall-through first so the delay block stops at its start
                // instead of needing a split.
                queue.push_back(fall_through);
                queue.push_back(target);
                queue.push_back(delay_addr);
            }
            BlockEnd::OffEnd => {
                sink.warning_at(
                    last_addr,
                    format!("block at {start:#010x} runs off the instruction stream"),
                );
                let exit = self.graph.exit_id().clone();
                self.graph.add_edge(&id, &exit, EdgeKind::Always)?;
            }
        }
        Ok(())
    }

    /// Chops the block containing `address` into two blocks joined by an
    /// `Always` edge; out-edges move to the second half. Returns the id of
    /// the block now starting at `address`.
    fn split_block(&mut self, address: Address) -> Result<NodeId, ContractViolation> {
        let (start, id, last) = self.block_containing(address).ok_or_else(|| {
            ContractViolation::new(format!("split_block: no block contains {address:#010x}"))
        })?;
        if start == address {
            return Ok(id);
        }

        let node = self
            .graph
            .node(&id)
            .ok_or_else(|| ContractViolation::new(format!("split_block: node {id} is absent")))?;
        let NodeKind::Block { instructions } = node.kind() else {
            return Err(ContractViolation::new(format!(
                "split_block: node {id} is not a leaf block"
            )));
        };
        let position = instructions
            .iter()
            .position(|instr| instr.address() == address)
            .ok_or_else(|| {
                ContractViolation::new(format!(
                    "split_block: {address:#010x} is not an instruction boundary in {id}"
                ))
            })?;

        let second_instrs: Vec<Instruction> = instructions[position..].to_vec();
        let first_last = instructions[position - 1].address();
        let second_id = NodeId::for_block(address);
        self.graph
            .add_node(Node::block(second_id.clone(), second_instrs))?;

        // The terminator lives in the second half; its edges follow it.
        let outs: Vec<(NodeId, EdgeKind)> = self
            .graph
            .outs(&id)
            .into_iter()
            .map(|edge| (edge.to.clone(), edge.kind))
            .collect();
        for (to, kind) in outs {
            self.graph.remove_edge(&id, &to, kind)?;
            self.graph.add_edge(&second_id, &to, kind)?;
        }
        self.graph.add_edge(&id, &second_id, EdgeKind::Always)?;

        let Some(node) = self.graph.node_mut(&id) else {
            return Err(ContractViolation::new(format!("split_block: node {id} vanished")));
        };
        let NodeKind::Block { instructions } = node.kind_mut() else {
            return Err(ContractViolation::new(format!(
                "split_block: node {id} changed kind mid-split"
            )));
        };
        instructions.truncate(position);

        self.blocks.insert(start, (id.clone(), first_last));
        self.blocks.insert(address, (second_id.clone(), last));
        debug!(
            "[builder] split {} at {:#010x} into {} + {}",
            id, address, id, second_id
        );
        Ok(second_id)
    }

    /// The block starting at `address`, splitting if the address sits
    /// mid-block.
    fn resolve_block_at(&mut self, address: Address) -> Result<Option<NodeId>, ContractViolation> {
        match self.block_containing(address) {
            Some((start, id, _)) if start == address => Ok(Some(id)),
            Some(_) => self.split_block(address).map(Some),
            None => Ok(None),
        }
    }

    fn resolve_pending_edges(&mut self, sink: &mut DiagnosticSink) -> Result<(), ContractViolation> {
        let pending = std::mem::take(&mut self.pending);
        for edge in pending {
            let from = match edge.from {
                PendingFrom::Entry => self.graph.entry_id().clone(),
                PendingFrom::At(address) => match self.block_containing(address) {
                    Some((_, id, _)) => id,
                    None => {
                        return Err(ContractViolation::new(format!(
                            "pending edge source at {:#010x} has no block",
                            address
                        )))
                    }
                },
            };
            let to = match self.resolve_block_at(edge.target)? {
                Some(id) => id,
                None => {
                    sink.warning_at(
                        edge.target,
                        format!(
                            "edge target {:#010x} is outside the function; wiring to exit",
                            edge.target
                        ),
                    );
                    self.graph.exit_id().clone()
                }
            };
            if !self.has_edge(&from, &to, edge.kind) {
                self.graph.add_edge(&from, &to, edge.kind)?;
            }
        }
        Ok(())
    }

    fn has_edge(&self, from: &NodeId, to: &NodeId, kind: EdgeKind) -> bool {
        self.graph.has_edge(from, to, kind)
    }

    /// Moves each conditional branch's `True`/`False` edges onto its isolated
    /// delay block, replacing the delay block's fall-through edge.
    fn attach_delay_edges(&mut self, sink: &mut DiagnosticSink) -> Result<(), ContractViolation> {
        let fixups = std::mem::take(&mut self.fixups);
        for fixup in fixups {
            let Some(delay_id) = self.resolve_block_at(fixup.delay_addr)? else {
                sink.warning_at(
                    fixup.branch_addr,
                    format!(
                        "branch at {:#010x} has no delay instruction at {:#010x}",
                        fixup.branch_addr, fixup.delay_addr
                    ),
                );
                continue;
            };
            // Isolate the delay instruction if consumption ran past it.
            let delay_end = fixup.delay_addr + INSTRUCTION_SIZE;
            if let Some((start, _, last)) = self.block_containing(fixup.delay_addr) {
                if start == fixup.delay_addr && last >= delay_end {
                    self.split_block(delay_end)?;
                }
            }

            let transfers = self
                .graph
                .node(&delay_id)
                .map(|node| {
                    node.instructions()
                        .iter()
                        .any(|instr| !matches!(instr.kind(), InstructionKind::Plain | InstructionKind::Nop))
                })
                .unwrap_or(true);
            if transfers {
                sink.warning_at(
                    fixup.delay_addr,
                    format!(
                        "delay slot at {:#010x} is itself a control transfer; branch left unstructured",
                        fixup.delay_addr
                    ),
                );
                continue;
            }
            if let Some(instr) = self.instruction_at(fixup.delay_addr) {
                if !instr.occupies_delay_slot() {
                    debug!(
                        "[builder] decoder did not flag {:#010x} as a delay slot",
                        fixup.delay_addr
                    );
                }
            }

            let outs: Vec<(NodeId, EdgeKind)> = self
                .graph
                .outs(&delay_id)
                .into_iter()
                .map(|edge| (edge.to.clone(), edge.kind))
                .collect();
            for (to, kind) in outs {
                self.graph.remove_edge(&delay_id, &to, kind)?;
            }

            let true_to = self.edge_target_or_exit(fixup.true_target, sink)?;
            let false_to = self.edge_target_or_exit(fixup.false_target, sink)?;
            if !self.has_edge(&delay_id, &true_to, EdgeKind::True) {
                self.graph.add_edge(&delay_id, &true_to, EdgeKind::True)?;
            }
            if !self.has_edge(&delay_id, &false_to, EdgeKind::False) {
                self.graph.add_edge(&delay_id, &false_to, EdgeKind::False)?;
            }
            debug!(
                "[builder] branch at {:#010x}: delay block {} -> true {}, false {}",
                fixup.branch_addr, delay_id, true_to, false_to
            );
        }
        Ok(())
    }

    fn edge_target_or_exit(
        &mut self,
        address: Address,
        sink: &mut DiagnosticSink,
    ) -> Result<NodeId, ContractViolation> {
        match self.resolve_block_at(address)? {
            Some(id) => Ok(id),
            None => {
                sink.warning_at(
                    address,
                    format!("branch target {address:#010x} is outside the function; wiring to exit"),
                );
                Ok(self.graph.exit_id().clone())
            }
        }
    }

    /// Replaces every two-out-edge block holding only a shared delay-slot
    /// instruction with two independent `Duplicated` copies, one per path.
    /// This is the only place instruction content is physically duplicated.
    fn duplicate_delay_blocks(&mut self, sink: &mut DiagnosticSink) -> Result<(), ContractViolation> {
        let candidates: Vec<NodeId> = self
            .graph
            .nodes()
            .filter(|node| {
                matches!(node.kind(), NodeKind::Block { instructions } if instructions.len() == 1)
                    && self.graph.outs(node.id()).len() == 2
            })
            .map(|node| node.id().clone())
            .collect();

        for id in candidates {
            let Some((true_to, false_to)) = self.graph.boolean_successors(&id) else {
                sink.warning(format!(
                    "delay block {id} lacks a true/false edge pair; left unduplicated"
                ));
                continue;
            };
            if true_to == id || false_to == id {
                sink.warning(format!(
                    "delay block {id} branches to itself; left unduplicated"
                ));
                continue;
            }
            let preds: Vec<(NodeId, EdgeKind)> = self
                .graph
                .ins(&id)
                .into_iter()
                .map(|edge| (edge.from.clone(), edge.kind))
                .collect();
            if preds.len() != 1 || preds[0].1 != EdgeKind::Always {
                warn!(
                    "[builder] delay block {} has unexpected predecessors; left unduplicated",
                    id
                );
                continue;
            }
            let (pred, _) = preds.into_iter().next().ok_or_else(|| {
                ContractViolation::new(format!("delay block {id} lost its predecessor"))
            })?;

            self.graph.remove_edge(&pred, &id, EdgeKind::Always)?;
            self.graph.remove_edge(&id, &true_to, EdgeKind::True)?;
            self.graph.remove_edge(&id, &false_to, EdgeKind::False)?;
            let original = self.graph.remove_node(&id)?;

            let true_id = self.graph.mint_id(&format!("dup_{id}"));
            let false_id = self.graph.mint_id(&format!("dup_{id}"));
            self.graph
                .add_node(Node::duplicated(true_id.clone(), original.clone()))?;
            self.graph
                .add_node(Node::duplicated(false_id.clone(), original))?;

            self.graph.add_edge(&pred, &true_id, EdgeKind::True)?;
            self.graph.add_edge(&pred, &false_id, EdgeKind::False)?;
            self.graph.add_edge(&true_id, &true_to, EdgeKind::Always)?;
            self.graph.add_edge(&false_id, &false_to, EdgeKind::Always)?;
            debug!(
                "[builder] duplicated delay block {} into {} (true) and {} (false)",
                id, true_id, false_id
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(
        instructions: Vec<Instruction>,
        entry: Address,
        callees: &[Address],
    ) -> (FlowGraph, DiagnosticSink) {
        let mut sink = DiagnosticSink::new();
        let callees: BTreeSet<Address> = callees.iter().copied().collect();
        let graph = build_cfg(&instructions, entry, &callees, &mut sink).expect("build_cfg");
        (graph, sink)
    }

    #[test]
    fn straight_line_function_is_one_block() {
        let (graph, _) = build(
            vec![
                Instruction::plain(0x00, "addiu sp, sp, -24"),
                Instruction::plain(0x04, "sw ra, 20(sp)"),
                Instruction::ret(0x08),
            ],
            0x00,
            &[],
        );
        // entry + block + exit
        assert_eq!(graph.node_count(), 3);
        let block = NodeId::for_block(0x00);
        assert_eq!(
            graph.single_always_successor(graph.entry_id()),
            Some(block.clone())
        );
        assert_eq!(
            graph.single_always_successor(&block),
            Some(graph.exit_id().clone())
        );
    }

    #[test]
    fn conditional_branch_duplicates_its_delay_slot() {
        // 0x00 beq -> 0x10 with delay at 0x04, fall-through at 0x08.
        let (graph, _) = build(
            vec![
                Instruction::conditional_branch(0x00, 0x10, "beq v0, zero, 0x10"),
                Instruction::plain(0x04, "addiu a0, a0, 1").in_delay_slot(),
                Instruction::plain(0x08, "move v1, a0"),
                Instruction::ret(0x0c),
                Instruction::plain(0x10, "move v1, zero"),
                Instruction::ret(0x14),
            ],
            0x00,
            &[],
        );

        let dups: Vec<&Node> = graph
            .nodes()
            .filter(|n| matches!(n.kind(), NodeKind::Duplicated { .. }))
            .collect();
        assert_eq!(dups.len(), 2, "delay slot must exist as two distinct nodes");
        assert!(dups.iter().all(|n| n.contains_address(0x04)));
        assert_ne!(dups[0].id(), dups[1].id());
        assert!(dups.iter().all(|n| n.id().as_str().starts_with("dup_")));

        // One copy reachable only via the True edge, one only via False.
        let branch = NodeId::for_block(0x00);
        let (true_to, false_to) = graph.boolean_successors(&branch).expect("branch edges");
        assert_ne!(true_to, false_to);
        assert_eq!(
            graph.single_always_successor(&true_to),
            Some(NodeId::for_block(0x10))
        );
        assert_eq!(
            graph.single_always_successor(&false_to),
            Some(NodeId::for_block(0x08))
        );
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn backward_branch_splits_the_loop_header() {
        // 0x00..0x08 straight line, branch at 0x0c back to 0x04.
        let (graph, _) = build(
            vec![
                Instruction::plain(0x00, "move v0, zero"),
                Instruction::plain(0x04, "addiu v0, v0, 1"),
                Instruction::plain(0x08, "sltiu v1, v0, 10"),
                Instruction::conditional_branch(0x0c, 0x04, "bne v1, zero, 0x04"),
                Instruction::nop(0x10).in_delay_slot(),
                Instruction::ret(0x14),
            ],
            0x00,
            &[],
        );

        // The jump target 0x04 must start its own block after splitting.
        let header = NodeId::for_block(0x04);
        assert!(graph.contains(&header));
        let prefix = NodeId::for_block(0x00);
        assert_eq!(graph.single_always_successor(&prefix), Some(header.clone()));
        assert!(graph.validate().is_ok());

        // The back edge goes through the duplicated delay nop on the True path.
        let dup_true = graph
            .nodes()
            .find(|n| {
                matches!(n.kind(), NodeKind::Duplicated { .. })
                    && graph.single_always_successor(n.id()) == Some(header.clone())
            })
            .map(|n| n.id().clone());
        assert!(dup_true.is_some(), "true-path duplicate loops to header");
    }

    #[test]
    fn returns_connect_to_exit_and_calls_stay_leaf() {
        let (graph, _) = build(
            vec![
                Instruction::call(0x00, 0x1000, "jal 0x1000"),
                Instruction::plain(0x04, "move a0, v0"),
                Instruction::ret(0x08),
            ],
            0x00,
            &[0x1000],
        );
        // Call does not end the block; no edge into the callee exists.
        assert_eq!(graph.node_count(), 3);
        let block = NodeId::for_block(0x00);
        assert!(graph.node(&block).unwrap().contains_address(0x00));
        assert!(graph.node(&block).unwrap().contains_address(0x08));
        assert_eq!(
            graph.single_always_successor(&block),
            Some(graph.exit_id().clone())
        );
    }

    #[test]
    fn tail_call_jump_goes_to_exit() {
        let (graph, _) = build(
            vec![
                Instruction::plain(0x00, "move a0, v0"),
                Instruction::jump(0x04, 0x2000, "j 0x2000"),
            ],
            0x00,
            &[0x2000],
        );
        let block = NodeId::for_block(0x00);
        assert_eq!(
            graph.single_always_successor(&block),
            Some(graph.exit_id().clone())
        );
    }

    #[test]
    fn missing_delay_pair_degrades_with_warning() {
        // Branch at the very end of the stream: no delay instruction.
        let (graph, sink) = build(
            vec![
                Instruction::plain(0x00, "sltu v0, a0, a1"),
                Instruction::conditional_branch(0x04, 0x00, "bne v0, zero, 0x00"),
            ],
            0x00,
            &[],
        );
        assert!(sink.warnings().count() >= 1);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn empty_stream_yields_entry_to_exit() {
        let (graph, sink) = build(vec![], 0x00, &[]);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(
            graph.single_always_successor(graph.entry_id()),
            Some(graph.exit_id().clone())
        );
        assert!(sink.warnings().count() >= 1);
    }
}
