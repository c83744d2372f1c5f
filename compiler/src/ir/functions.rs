//! IR Functions
//!
//! A function owns its blocks and its register table. Parameters occupy the
//! first registers. A function without blocks is a declaration: either an
//! external symbol such as `printf` or a prototype whose body has not been
//! lowered yet.

use super::{IrBasicBlock, IrBlockId, IrId, IrType, Linkage};
use fxhash::FxHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrParameter {
    pub name: String,
    pub ty: IrType,
    pub reg: IrId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFunctionSignature {
    pub params: Vec<IrParameter>,
    pub return_type: IrType,
    pub varargs: bool,
}

impl IrFunctionSignature {
    /// The signature as an `IrType::Function`
    pub fn function_type(&self) -> IrType {
        IrType::function(
            self.params.iter().map(|param| param.ty.clone()).collect(),
            self.return_type.clone(),
            self.varargs,
        )
    }
}

/// Type and name hint of a virtual register
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrRegister {
    pub ty: IrType,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFunction {
    pub name: String,
    pub signature: IrFunctionSignature,
    pub linkage: Linkage,

    /// Every block ever created, attached or not
    pub blocks: IndexMap<IrBlockId, IrBasicBlock>,

    /// Attached blocks in emission order
    pub layout: Vec<IrBlockId>,

    pub registers: Vec<IrRegister>,

    next_block_id: u32,
}

impl IrFunction {
    /// Create a declaration; parameters get registers `0..n`
    pub fn new(name: impl Into<String>, params: Vec<(String, IrType)>, return_type: IrType, varargs: bool) -> Self {
        let mut registers = Vec::with_capacity(params.len());
        let params = params
            .into_iter()
            .enumerate()
            .map(|(i, (name, ty))| {
                registers.push(IrRegister {
                    ty: ty.clone(),
                    name: name.clone(),
                });
                IrParameter {
                    name,
                    ty,
                    reg: IrId::new(i as u32),
                }
            })
            .collect();

        Self {
            name: name.into(),
            signature: IrFunctionSignature {
                params,
                return_type,
                varargs,
            },
            linkage: Linkage::External,
            blocks: IndexMap::new(),
            layout: Vec::new(),
            registers,
            next_block_id: 0,
        }
    }

    pub fn function_type(&self) -> IrType {
        self.signature.function_type()
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Create and attach the entry block; returns the existing one if present
    pub fn begin_body(&mut self) -> IrBlockId {
        if self.blocks.is_empty() {
            let entry = self.create_block("entry");
            self.append_block(entry);
        }
        IrBlockId::entry()
    }

    pub fn entry_block(&self) -> IrBlockId {
        IrBlockId::entry()
    }

    pub fn alloc_reg(&mut self, ty: IrType, name: impl Into<String>) -> IrId {
        let id = IrId::new(self.registers.len() as u32);
        self.registers.push(IrRegister {
            ty,
            name: name.into(),
        });
        id
    }

    pub fn register_type(&self, reg: IrId) -> Option<&IrType> {
        self.registers.get(reg.index()).map(|info| &info.ty)
    }

    /// Printed name of a register, e.g. `%x.3`
    pub fn register_name(&self, reg: IrId) -> String {
        match self.registers.get(reg.index()) {
            Some(info) if !info.name.is_empty() => format!("%{}.{}", info.name, reg.as_u32()),
            _ => format!("%tmp.{}", reg.as_u32()),
        }
    }

    /// Create a block that is not yet part of the layout
    pub fn create_block(&mut self, label: impl Into<String>) -> IrBlockId {
        let id = IrBlockId::new(self.next_block_id);
        self.next_block_id += 1;
        self.blocks.insert(id, IrBasicBlock::new(id, label));
        id
    }

    /// Attach a block at the end of the layout. Returns false for unknown or
    /// already attached blocks.
    pub fn append_block(&mut self, id: IrBlockId) -> bool {
        if !self.blocks.contains_key(&id) || self.is_attached(id) {
            return false;
        }
        self.layout.push(id);
        true
    }

    pub fn is_attached(&self, id: IrBlockId) -> bool {
        self.layout.contains(&id)
    }

    pub fn block(&self, id: IrBlockId) -> Option<&IrBasicBlock> {
        self.blocks.get(&id)
    }

    pub fn block_mut(&mut self, id: IrBlockId) -> Option<&mut IrBasicBlock> {
        self.blocks.get_mut(&id)
    }

    /// Attached blocks in layout order
    pub fn attached_blocks(&self) -> impl Iterator<Item = &IrBasicBlock> {
        self.layout.iter().filter_map(|id| self.blocks.get(id))
    }

    /// Predecessors of every attached block, computed from terminators
    pub fn predecessors(&self) -> FxHashMap<IrBlockId, Vec<IrBlockId>> {
        let mut preds: FxHashMap<IrBlockId, Vec<IrBlockId>> = FxHashMap::default();
        for block in self.attached_blocks() {
            for succ in block.successors() {
                let entry = preds.entry(succ).or_default();
                if !entry.contains(&block.id) {
                    entry.push(block.id);
                }
            }
        }
        preds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrTerminator;

    fn sample() -> IrFunction {
        IrFunction::new(
            "square",
            vec![("x".to_string(), IrType::I32)],
            IrType::I32,
            false,
        )
    }

    #[test]
    fn test_parameters_take_first_registers() {
        let mut func = sample();
        assert!(func.is_declaration());
        assert_eq!(func.signature.params[0].reg, IrId::new(0));
        let tmp = func.alloc_reg(IrType::I32, "");
        assert_eq!(tmp, IrId::new(1));
        assert_eq!(func.register_name(IrId::new(0)), "%x.0");
        assert_eq!(func.register_name(tmp), "%tmp.1");
        assert_eq!(func.function_type().to_string(), "i32 (i32)");
    }

    #[test]
    fn test_detached_blocks_join_layout_on_append() {
        let mut func = sample();
        let entry = func.begin_body();
        assert_eq!(func.begin_body(), entry);
        let other = func.create_block("ifend");
        assert!(!func.is_attached(other));
        assert!(func.append_block(other));
        assert!(!func.append_block(other));
        assert_eq!(func.layout, vec![entry, other]);
    }

    #[test]
    fn test_predecessors() {
        let mut func = sample();
        let entry = func.begin_body();
        let target = func.create_block("next");
        func.append_block(target);
        if let Some(block) = func.block_mut(entry) {
            block.set_terminator(IrTerminator::CondBranch {
                condition: crate::ir::IrValue::bool(true),
                true_target: target,
                false_target: target,
            });
        }
        let preds = func.predecessors();
        assert_eq!(preds.get(&target), Some(&vec![entry]));
        assert!(preds.get(&entry).is_none());
    }
}
