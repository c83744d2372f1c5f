//! Intermediate Representation (IR) for the Eva compiler
//!
//! An SSA representation modelled on LLVM's textual IR: typed pointers,
//! named struct types, explicit basic blocks with phi nodes, and module-level
//! globals. The code generator writes into it through [`IrBuilder`]; the
//! [`printer`] serializes it as `.ll` text and [`validation`] checks the
//! structural rules a backend relies on.

pub mod blocks;
pub mod builder;
pub mod functions;
pub mod instructions;
pub mod modules;
pub mod printer;
pub mod types;
pub mod validation;

pub use blocks::*;
pub use builder::*;
pub use functions::*;
pub use instructions::*;
pub use modules::*;
pub use types::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Virtual register, unique within one function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrId(u32);

impl IrId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for IrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Linkage of functions and globals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linkage {
    /// Visible to other modules
    External,
    /// Module-local, not in the symbol table
    Private,
}

impl Linkage {
    /// Keyword used in textual IR; external linkage is implicit
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Linkage::External => None,
            Linkage::Private => Some("private"),
        }
    }
}
