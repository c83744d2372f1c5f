//! IR Builder
//!
//! Owns the module under construction and an insertion cursor
//! (function, block). `build_*` methods append at the cursor and return
//! `None` when there is no cursor, the referenced entity does not exist, or
//! the current block is already terminated.

use super::{
    BinaryOp, CastOp, CompareOp, IrBlockId, IrFunction, IrId, IrInstruction, IrModule,
    IrPhiNode, IrTerminator, IrType, IrValue,
};

/// Saved insertion cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertPoint {
    pub function: String,
    pub block: IrBlockId,
}

/// IR builder for constructing modules
pub struct IrBuilder {
    /// The module being built
    pub module: IrModule,

    cursor: Option<InsertPoint>,
}

impl IrBuilder {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module: IrModule::new(module_name),
            cursor: None,
        }
    }

    /// Hand the finished module over
    pub fn finish(self) -> IrModule {
        self.module
    }

    // === Cursor ===

    pub fn insert_point(&self) -> Option<InsertPoint> {
        self.cursor.clone()
    }

    pub fn restore_insert_point(&mut self, point: Option<InsertPoint>) {
        self.cursor = point;
    }

    pub fn position_at_end(&mut self, function: impl Into<String>, block: IrBlockId) {
        self.cursor = Some(InsertPoint {
            function: function.into(),
            block,
        });
    }

    /// Move the cursor to another block of the current function
    pub fn switch_to_block(&mut self, block: IrBlockId) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.block = block;
        }
    }

    pub fn current_block(&self) -> Option<IrBlockId> {
        self.cursor.as_ref().map(|cursor| cursor.block)
    }

    pub fn current_function_name(&self) -> Option<&str> {
        self.cursor.as_ref().map(|cursor| cursor.function.as_str())
    }

    pub fn current_function(&self) -> Option<&IrFunction> {
        let cursor = self.cursor.as_ref()?;
        self.module.get_function(&cursor.function)
    }

    pub fn current_function_mut(&mut self) -> Option<&mut IrFunction> {
        let cursor = self.cursor.as_ref()?;
        self.module.functions.get_mut(&cursor.function)
    }

    // === Functions and blocks ===

    /// Add a declaration unless a function with this name exists already
    pub fn declare_function(
        &mut self,
        name: &str,
        params: Vec<(String, IrType)>,
        return_type: IrType,
        varargs: bool,
    ) -> &IrFunction {
        self.module
            .functions
            .entry(name.to_string())
            .or_insert_with(|| IrFunction::new(name, params, return_type, varargs))
    }

    /// Create the entry block of a declared function and move the cursor there
    pub fn begin_function(&mut self, name: &str) -> Option<IrBlockId> {
        let entry = self.module.get_function_mut(name)?.begin_body();
        self.position_at_end(name, entry);
        Some(entry)
    }

    /// Create a block in the current function, detached from the layout
    pub fn create_block(&mut self, label: &str) -> Option<IrBlockId> {
        self.current_function_mut().map(|f| f.create_block(label))
    }

    /// Create a block in the current function and attach it immediately
    pub fn create_attached_block(&mut self, label: &str) -> Option<IrBlockId> {
        let function = self.current_function_mut()?;
        let block = function.create_block(label);
        function.append_block(block);
        Some(block)
    }

    /// Attach a detached block at the end of the current function
    pub fn append_block(&mut self, block: IrBlockId) -> Option<()> {
        self.current_function_mut()?
            .append_block(block)
            .then_some(())
    }

    // === Types ===

    pub fn type_of(&self, value: &IrValue) -> Option<IrType> {
        self.module.type_of_value(self.current_function(), value)
    }

    // === Instructions ===

    fn alloc_reg(&mut self, ty: IrType, name: &str) -> Option<IrId> {
        self.current_function_mut().map(|f| f.alloc_reg(ty, name))
    }

    fn add_instruction(&mut self, inst: IrInstruction) -> Option<()> {
        let block = self.current_block()?;
        let block = self.current_function_mut()?.block_mut(block)?;
        if block.is_terminated() {
            return None;
        }
        block.add_instruction(inst);
        Some(())
    }

    /// Stack slot in the entry block of the current function, placed after
    /// the allocas already there
    pub fn build_entry_alloca(&mut self, ty: IrType, name: &str) -> Option<IrId> {
        let dest = self.alloc_reg(ty.pointer_to(), name)?;
        let function = self.current_function_mut()?;
        let entry = function.entry_block();
        function
            .block_mut(entry)?
            .add_alloca(IrInstruction::Alloca { dest, ty });
        Some(dest)
    }

    pub fn build_load(&mut self, ty: IrType, ptr: IrValue, name: &str) -> Option<IrId> {
        let dest = self.alloc_reg(ty.clone(), name)?;
        self.add_instruction(IrInstruction::Load { dest, ty, ptr })?;
        Some(dest)
    }

    pub fn build_store(&mut self, value: IrValue, ptr: IrValue) -> Option<()> {
        let ty = self.type_of(&value)?;
        self.add_instruction(IrInstruction::Store { ty, value, ptr })
    }

    /// Address of field `index` in the struct behind `ptr`
    pub fn build_struct_gep(
        &mut self,
        struct_name: &str,
        ptr: IrValue,
        index: u32,
        name: &str,
    ) -> Option<IrId> {
        let field_ty = self
            .module
            .struct_fields(struct_name)?
            .get(index as usize)?
            .clone();
        let dest = self.alloc_reg(field_ty.pointer_to(), name)?;
        self.add_instruction(IrInstruction::StructGep {
            dest,
            struct_name: struct_name.to_string(),
            ptr,
            index,
        })?;
        Some(dest)
    }

    pub fn build_binop(&mut self, op: BinaryOp, left: IrValue, right: IrValue) -> Option<IrId> {
        let ty = self.type_of(&left)?;
        let dest = self.alloc_reg(ty.clone(), "tmp")?;
        self.add_instruction(IrInstruction::BinOp {
            dest,
            op,
            ty,
            left,
            right,
        })?;
        Some(dest)
    }

    pub fn build_cmp(&mut self, op: CompareOp, left: IrValue, right: IrValue) -> Option<IrId> {
        let ty = self.type_of(&left)?;
        let dest = self.alloc_reg(IrType::I1, "tmp")?;
        self.add_instruction(IrInstruction::Cmp {
            dest,
            op,
            ty,
            left,
            right,
        })?;
        Some(dest)
    }

    pub fn build_cast(&mut self, op: CastOp, value: IrValue, to: IrType) -> Option<IrId> {
        let from = self.type_of(&value)?;
        let dest = self.alloc_reg(to.clone(), "cast")?;
        self.add_instruction(IrInstruction::Cast {
            dest,
            op,
            value,
            from,
            to,
        })?;
        Some(dest)
    }

    /// Call a function by name. `None` for void callees as well, since
    /// they produce no value.
    pub fn build_call_direct(&mut self, func: &str, args: Vec<IrValue>, name: &str) -> Option<IrId> {
        let signature = self.module.get_function(func)?.function_type();
        let (_, return_type, _) = signature.function_parts()?;
        if return_type.is_void() {
            return None;
        }
        let dest = self.alloc_reg(return_type.clone(), name)?;
        self.add_instruction(IrInstruction::CallDirect {
            dest: Some(dest),
            func: func.to_string(),
            signature,
            args,
        })?;
        Some(dest)
    }

    /// Call through a function pointer of type `signature*`
    pub fn build_call_indirect(
        &mut self,
        func_ptr: IrValue,
        signature: IrType,
        args: Vec<IrValue>,
        name: &str,
    ) -> Option<IrId> {
        let (_, return_type, _) = signature.function_parts()?;
        if return_type.is_void() {
            return None;
        }
        let dest = self.alloc_reg(return_type.clone(), name)?;
        self.add_instruction(IrInstruction::CallIndirect {
            dest: Some(dest),
            func_ptr,
            signature,
            args,
        })?;
        Some(dest)
    }

    // === Terminators ===

    fn set_terminator(&mut self, term: IrTerminator) -> Option<()> {
        let block = self.current_block()?;
        let block = self.current_function_mut()?.block_mut(block)?;
        if block.is_terminated() {
            return None;
        }
        block.set_terminator(term);
        Some(())
    }

    pub fn build_branch(&mut self, target: IrBlockId) -> Option<()> {
        self.set_terminator(IrTerminator::Branch { target })
    }

    pub fn build_cond_branch(
        &mut self,
        condition: IrValue,
        true_target: IrBlockId,
        false_target: IrBlockId,
    ) -> Option<()> {
        self.set_terminator(IrTerminator::CondBranch {
            condition,
            true_target,
            false_target,
        })
    }

    pub fn build_return(&mut self, value: Option<IrValue>) -> Option<()> {
        self.set_terminator(IrTerminator::Return { value })
    }

    // === Phi nodes ===

    /// Empty phi at the head of the current block
    pub fn build_phi(&mut self, ty: IrType, name: &str) -> Option<IrId> {
        let block = self.current_block()?;
        let dest = self.alloc_reg(ty.clone(), name)?;
        self.current_function_mut()?
            .block_mut(block)?
            .add_phi(IrPhiNode {
                dest,
                ty,
                incoming: Vec::new(),
            });
        Some(dest)
    }

    pub fn add_phi_incoming(
        &mut self,
        block: IrBlockId,
        phi_dest: IrId,
        value: IrValue,
        from_block: IrBlockId,
    ) -> Option<()> {
        self.current_function_mut()?
            .block_mut(block)?
            .phi_nodes
            .iter_mut()
            .find(|phi| phi.dest == phi_dest)
            .map(|phi| phi.incoming.push((from_block, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder_in_main() -> IrBuilder {
        let mut builder = IrBuilder::new("test");
        builder.declare_function("main", vec![], IrType::I32, false);
        builder.begin_function("main").unwrap();
        builder
    }

    #[test]
    fn test_entry_allocas_survive_terminated_entry() {
        let mut builder = builder_in_main();
        let next = builder.create_attached_block("next").unwrap();
        builder.build_branch(next).unwrap();
        builder.switch_to_block(next);

        // The entry block is closed but the alloca still lands there
        let slot = builder.build_entry_alloca(IrType::I32, "x").unwrap();
        builder.build_store(IrValue::i32(1), slot.into()).unwrap();

        let main = builder.module.get_function("main").unwrap();
        let entry = main.block(IrBlockId::entry()).unwrap();
        assert!(entry.instructions[0].is_alloca());
        assert_eq!(main.block(next).unwrap().instructions.len(), 1);
        assert_eq!(main.register_type(slot), Some(&IrType::ptr(IrType::I32)));
    }

    #[test]
    fn test_no_instructions_after_terminator() {
        let mut builder = builder_in_main();
        builder.build_return(Some(IrValue::i32(0))).unwrap();
        assert!(builder.build_binop(BinaryOp::Add, IrValue::i32(1), IrValue::i32(2)).is_none());
        assert!(builder.build_return(None).is_none());
    }

    #[test]
    fn test_cursor_save_restore() {
        let mut builder = builder_in_main();
        let saved = builder.insert_point();
        builder.declare_function("helper", vec![], IrType::I32, false);
        builder.begin_function("helper").unwrap();
        assert_eq!(builder.current_function_name(), Some("helper"));
        builder.restore_insert_point(saved);
        assert_eq!(builder.current_function_name(), Some("main"));
        assert_eq!(builder.current_block(), Some(IrBlockId::entry()));
    }

    #[test]
    fn test_phi_and_struct_gep() {
        let mut builder = builder_in_main();
        builder.module.set_struct_body("Pair", vec![IrType::I32, IrType::I64]);
        let null = IrValue::Null(IrType::struct_ptr("Pair"));
        let field = builder.build_struct_gep("Pair", null, 1, "second").unwrap();
        assert_eq!(builder.type_of(&field.into()), Some(IrType::ptr(IrType::I64)));
        assert!(builder
            .build_struct_gep("Pair", IrValue::Null(IrType::struct_ptr("Pair")), 2, "oob")
            .is_none());

        let phi = builder.build_phi(IrType::I32, "merge").unwrap();
        builder
            .add_phi_incoming(IrBlockId::entry(), phi, IrValue::i32(1), IrBlockId::new(3))
            .unwrap();
        let main = builder.module.get_function("main").unwrap();
        let phis = &main.block(IrBlockId::entry()).unwrap().phi_nodes;
        assert_eq!(phis[0].incoming, vec![(IrBlockId::new(3), IrValue::i32(1))]);
    }

    #[test]
    fn test_direct_call_types() {
        let mut builder = builder_in_main();
        builder.declare_function("GC_malloc", vec![("size".into(), IrType::I64)], IrType::byte_ptr(), false);
        let raw = builder
            .build_call_direct("GC_malloc", vec![IrValue::i64(16)], "raw")
            .unwrap();
        assert_eq!(builder.type_of(&raw.into()), Some(IrType::byte_ptr()));
        assert!(builder.build_call_direct("missing", vec![], "x").is_none());
    }
}
