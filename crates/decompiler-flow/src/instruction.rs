// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Decoded-instruction surface consumed from the disassembler.
//!
//! The structuring core never decodes machine words itself; it receives an
//! address-ordered stream of `Instruction` values with branch-target and
//! register-usage metadata already attached.

use std::collections::BTreeSet;
use std::fmt;

/// Absolute address of an instruction in the analyzed binary.
pub type Address = u32;

/// Opaque register identifier as reported by the decoder.
pub type Register = u8;

/// Byte size of one MIPS instruction word.
pub const INSTRUCTION_SIZE: Address = 4;

/// Control-transfer classification of a decoded instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionKind {
    /// No control-transfer effect.
    Plain,
    /// `nop`; acts as a sequence point during the linear sweep.
    Nop,
    /// Two-way branch with an architectural delay slot. Fall-through resumes
    /// after the delay instruction.
    ConditionalBranch { target: Address },
    /// Unconditional jump. A jump whose target is a known callee entry is a
    /// tail call and leaves the function.
    Jump { target: Address },
    /// Direct call (`jal`). The callee is a leaf from this function's point
    /// of view; no edge enters it.
    Call { target: Address },
    /// Return through `ra` (`jr ra`); connects to the exit node.
    Return,
}

/// One decoded instruction with the metadata the structuring core consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    address: Address,
    kind: InstructionKind,
    text: String,
    inputs: BTreeSet<Register>,
    outputs: BTreeSet<Register>,
    delay_slot: bool,
}

impl Instruction {
    pub fn new(address: Address, kind: InstructionKind, text: impl Into<String>) -> Self {
        Self {
            address,
            kind,
            text: text.into(),
            inputs: BTreeSet::new(),
            outputs: BTreeSet::new(),
            delay_slot: false,
        }
    }

    pub fn plain(address: Address, text: impl Into<String>) -> Self {
        Self::new(address, InstructionKind::Plain, text)
    }

    pub fn nop(address: Address) -> Self {
        Self::new(address, InstructionKind::Nop, "nop")
    }

    pub fn conditional_branch(address: Address, target: Address, text: impl Into<String>) -> Self {
        Self::new(address, InstructionKind::ConditionalBranch { target }, text)
    }

    pub fn jump(address: Address, target: Address, text: impl Into<String>) -> Self {
        Self::new(address, InstructionKind::Jump { target }, text)
    }

    pub fn call(address: Address, target: Address, text: impl Into<String>) -> Self {
        Self::new(address, InstructionKind::Call { target }, text)
    }

    pub fn ret(address: Address) -> Self {
        Self::new(address, InstructionKind::Return, "jr ra")
    }

    /// Marks this instruction as occupying a branch-delay slot.
    pub fn in_delay_slot(mut self) -> Self {
        self.delay_slot = true;
        self
    }

    pub fn with_inputs(mut self, regs: impl IntoIterator<Item = Register>) -> Self {
        self.inputs.extend(regs);
        self
    }

    pub fn with_outputs(mut self, regs: impl IntoIterator<Item = Register>) -> Self {
        self.outputs.extend(regs);
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn kind(&self) -> InstructionKind {
        self.kind
    }

    /// Renderable textual form, e.g. `addiu sp, sp, -24`.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The absolute branch/jump/call target, if this instruction has one.
    pub fn branch_target(&self) -> Option<Address> {
        match self.kind {
            InstructionKind::ConditionalBranch { target }
            | InstructionKind::Jump { target }
            | InstructionKind::Call { target } => Some(target),
            InstructionKind::Plain | InstructionKind::Nop | InstructionKind::Return => None,
        }
    }

    pub fn is_nop(&self) -> bool {
        matches!(self.kind, InstructionKind::Nop)
    }

    /// Whether the decoder placed this instruction in a branch-delay slot.
    pub fn occupies_delay_slot(&self) -> bool {
        self.delay_slot
    }

    pub fn inputs(&self) -> &BTreeSet<Register> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeSet<Register> {
        &self.outputs
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}: {}", self.address, self.text)
    }
}
