//! IR Instructions
//!
//! Non-terminating instructions. Block terminators and phi nodes live in
//! [`blocks`](super::blocks).

use super::{IrId, IrType, IrValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// IR instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrInstruction {
    // === Memory ===
    /// Reserve a stack slot; `dest` has type `ty*`
    Alloca { dest: IrId, ty: IrType },

    /// Load a `ty` from `ptr`
    Load { dest: IrId, ty: IrType, ptr: IrValue },

    /// Store a `ty` through `ptr`
    Store {
        ty: IrType,
        value: IrValue,
        ptr: IrValue,
    },

    /// Address of field `index` of the struct `ptr` points to
    StructGep {
        dest: IrId,
        struct_name: String,
        ptr: IrValue,
        index: u32,
    },

    // === Arithmetic ===
    BinOp {
        dest: IrId,
        op: BinaryOp,
        ty: IrType,
        left: IrValue,
        right: IrValue,
    },

    /// Integer comparison producing an `i1`; `ty` is the operand type
    Cmp {
        dest: IrId,
        op: CompareOp,
        ty: IrType,
        left: IrValue,
        right: IrValue,
    },

    Cast {
        dest: IrId,
        op: CastOp,
        value: IrValue,
        from: IrType,
        to: IrType,
    },

    // === Calls ===
    /// Call a function by name
    CallDirect {
        dest: Option<IrId>,
        func: String,
        signature: IrType,
        args: Vec<IrValue>,
    },

    /// Call through a function pointer
    CallIndirect {
        dest: Option<IrId>,
        func_ptr: IrValue,
        signature: IrType,
        args: Vec<IrValue>,
    },
}

/// Binary arithmetic operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Signed division
    Div,
}

impl BinaryOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "sdiv",
        }
    }
}

/// Signed integer comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Predicate keyword for `icmp`
    pub fn predicate(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Lt => "slt",
            CompareOp::Le => "sle",
            CompareOp::Gt => "sgt",
            CompareOp::Ge => "sge",
        }
    }

    pub fn evaluate(&self, left: i64, right: i64) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastOp {
    /// Pointer to pointer, same bits
    Bitcast,
    /// Zero-extend a narrower integer
    ZExt,
    /// Truncate a wider integer
    Trunc,
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastOp::Bitcast => write!(f, "bitcast"),
            CastOp::ZExt => write!(f, "zext"),
            CastOp::Trunc => write!(f, "trunc"),
        }
    }
}

impl IrInstruction {
    /// Register defined by this instruction, if any
    pub fn dest(&self) -> Option<IrId> {
        match self {
            IrInstruction::Alloca { dest, .. }
            | IrInstruction::Load { dest, .. }
            | IrInstruction::StructGep { dest, .. }
            | IrInstruction::BinOp { dest, .. }
            | IrInstruction::Cmp { dest, .. }
            | IrInstruction::Cast { dest, .. } => Some(*dest),
            IrInstruction::CallDirect { dest, .. } | IrInstruction::CallIndirect { dest, .. } => {
                *dest
            }
            IrInstruction::Store { .. } => None,
        }
    }

    /// Operands read by this instruction
    pub fn operands(&self) -> Vec<&IrValue> {
        match self {
            IrInstruction::Alloca { .. } => Vec::new(),
            IrInstruction::Load { ptr, .. } => vec![ptr],
            IrInstruction::Store { value, ptr, .. } => vec![value, ptr],
            IrInstruction::StructGep { ptr, .. } => vec![ptr],
            IrInstruction::BinOp { left, right, .. } | IrInstruction::Cmp { left, right, .. } => {
                vec![left, right]
            }
            IrInstruction::Cast { value, .. } => vec![value],
            IrInstruction::CallDirect { args, .. } => args.iter().collect(),
            IrInstruction::CallIndirect { func_ptr, args, .. } => {
                let mut operands = vec![func_ptr];
                operands.extend(args.iter());
                operands
            }
        }
    }

    /// Registers read by this instruction
    pub fn uses(&self) -> Vec<IrId> {
        self.operands()
            .into_iter()
            .filter_map(IrValue::as_reg)
            .collect()
    }

    pub fn is_alloca(&self) -> bool {
        matches!(self, IrInstruction::Alloca { .. })
    }
}
