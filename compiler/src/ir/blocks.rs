//! IR Basic Blocks
//!
//! A block is a run of phi nodes, straight-line instructions and one
//! terminator. Blocks belong to a function but are only part of its layout
//! once attached; see [`IrFunction::append_block`](super::IrFunction::append_block).

use super::{IrId, IrInstruction, IrType, IrValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a block within its function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrBlockId(pub u32);

impl IrBlockId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn entry() -> Self {
        Self(0)
    }

    pub fn is_entry(&self) -> bool {
        self.0 == 0
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for IrBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Merge of values flowing in from predecessor blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrPhiNode {
    pub dest: IrId,
    pub ty: IrType,
    pub incoming: Vec<(IrBlockId, IrValue)>,
}

/// Terminator instructions that end a basic block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrTerminator {
    /// Unconditional branch
    Branch { target: IrBlockId },

    /// Branch on an `i1`
    CondBranch {
        condition: IrValue,
        true_target: IrBlockId,
        false_target: IrBlockId,
    },

    /// Return from function
    Return { value: Option<IrValue> },

    Unreachable,
}

impl IrTerminator {
    pub fn successors(&self) -> Vec<IrBlockId> {
        match self {
            IrTerminator::Branch { target } => vec![*target],
            IrTerminator::CondBranch {
                true_target,
                false_target,
                ..
            } => vec![*true_target, *false_target],
            IrTerminator::Return { .. } | IrTerminator::Unreachable => Vec::new(),
        }
    }

    pub fn operands(&self) -> Vec<&IrValue> {
        match self {
            IrTerminator::CondBranch { condition, .. } => vec![condition],
            IrTerminator::Return { value: Some(value) } => vec![value],
            _ => Vec::new(),
        }
    }
}

/// A basic block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrBasicBlock {
    pub id: IrBlockId,

    /// Name hint used when printing, e.g. `then`, `loopend`
    pub label: String,

    pub phi_nodes: Vec<IrPhiNode>,

    pub instructions: Vec<IrInstruction>,

    /// `None` until the block is closed
    pub terminator: Option<IrTerminator>,
}

impl IrBasicBlock {
    pub fn new(id: IrBlockId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            phi_nodes: Vec::new(),
            instructions: Vec::new(),
            terminator: None,
        }
    }

    pub fn add_instruction(&mut self, inst: IrInstruction) {
        self.instructions.push(inst);
    }

    /// Insert after the allocas already at the head of the block
    pub fn add_alloca(&mut self, inst: IrInstruction) {
        let position = self
            .instructions
            .iter()
            .position(|existing| !existing.is_alloca())
            .unwrap_or(self.instructions.len());
        self.instructions.insert(position, inst);
    }

    pub fn add_phi(&mut self, phi: IrPhiNode) {
        self.phi_nodes.push(phi);
    }

    pub fn set_terminator(&mut self, term: IrTerminator) {
        self.terminator = Some(term);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }

    pub fn successors(&self) -> Vec<IrBlockId> {
        self.terminator
            .as_ref()
            .map(IrTerminator::successors)
            .unwrap_or_default()
    }

    /// Name used in textual IR
    pub fn display_name(&self) -> String {
        if self.id.is_entry() {
            "entry".to_string()
        } else {
            format!("{}.{}", self.label, self.id.as_u32())
        }
    }
}
