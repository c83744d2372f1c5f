//! IR Validation
//!
//! Structural checks run after code generation and before a module is
//! emitted: block termination, branch targets, block attachment, phi/predecessor
//! agreement, call arity, register definitions and the single symbol
//! namespace shared by functions and globals.

use super::{IrBlockId, IrFunction, IrId, IrInstruction, IrModule, IrValue};
use fxhash::FxHashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub function: String,
    pub block: Option<IrBlockId>,
    pub kind: ValidationErrorKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationErrorKind {
    /// Attached block without a terminator
    MissingTerminator,

    /// Branch to a block that does not exist or is not attached
    InvalidBranchTarget { target: IrBlockId },

    /// Block created but never attached
    DetachedBlock,

    /// Something branches back into the entry block
    EntryHasPredecessors,

    /// Phi incoming edges disagree with the block's predecessors
    InvalidPhiNode { phi: IrId, reason: String },

    /// Direct call to a function the module does not contain
    UnknownFunction { name: String },

    /// Argument count differs from a non-variadic signature
    ArityMismatch { expected: usize, found: usize },

    /// Register read but never defined in this function
    UndefinedRegister { register: IrId },

    /// Global referenced but never defined
    UnknownGlobal { name: String },

    /// A function and a global share one symbol name
    SymbolClash { name: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in @{}", self.function)?;
        if let Some(block) = self.block {
            write!(f, " ({})", block)?;
        }
        write!(f, ": ")?;
        match &self.kind {
            ValidationErrorKind::MissingTerminator => write!(f, "block has no terminator"),
            ValidationErrorKind::InvalidBranchTarget { target } => {
                write!(f, "branch to missing or detached block {}", target)
            }
            ValidationErrorKind::DetachedBlock => write!(f, "block was never attached"),
            ValidationErrorKind::EntryHasPredecessors => {
                write!(f, "entry block must not have predecessors")
            }
            ValidationErrorKind::InvalidPhiNode { phi, reason } => {
                write!(f, "phi {}: {}", phi, reason)
            }
            ValidationErrorKind::UnknownFunction { name } => {
                write!(f, "call to unknown function @{}", name)
            }
            ValidationErrorKind::ArityMismatch { expected, found } => {
                write!(f, "call expects {} arguments, got {}", expected, found)
            }
            ValidationErrorKind::UndefinedRegister { register } => {
                write!(f, "register {} is used but never defined", register)
            }
            ValidationErrorKind::UnknownGlobal { name } => {
                write!(f, "reference to unknown global @{}", name)
            }
            ValidationErrorKind::SymbolClash { name } => {
                write!(f, "@{} names both a function and a global", name)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate every function body in the module
pub fn validate_module(module: &IrModule) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    for function in module.functions.values() {
        if module.get_global(&function.name).is_some() {
            errors.push(ValidationError {
                function: function.name.clone(),
                block: None,
                kind: ValidationErrorKind::SymbolClash {
                    name: function.name.clone(),
                },
            });
        }
        if !function.is_declaration() {
            FunctionValidator::new(module, function, &mut errors).run();
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

struct FunctionValidator<'a> {
    module: &'a IrModule,
    function: &'a IrFunction,
    errors: &'a mut Vec<ValidationError>,
    defined: FxHashSet<IrId>,
}

impl<'a> FunctionValidator<'a> {
    fn new(
        module: &'a IrModule,
        function: &'a IrFunction,
        errors: &'a mut Vec<ValidationError>,
    ) -> Self {
        Self {
            module,
            function,
            errors,
            defined: FxHashSet::default(),
        }
    }

    fn error(&mut self, block: Option<IrBlockId>, kind: ValidationErrorKind) {
        self.errors.push(ValidationError {
            function: self.function.name.clone(),
            block,
            kind,
        });
    }

    fn run(mut self) {
        self.collect_definitions();
        self.check_layout();
        self.check_blocks();
        self.check_phis();
    }

    fn collect_definitions(&mut self) {
        let function = self.function;
        self.defined
            .extend(function.signature.params.iter().map(|param| param.reg));
        for block in function.attached_blocks() {
            self.defined.extend(block.phi_nodes.iter().map(|phi| phi.dest));
            self.defined
                .extend(block.instructions.iter().filter_map(IrInstruction::dest));
        }
    }

    fn check_layout(&mut self) {
        let function = self.function;
        if function.layout.first() != Some(&IrBlockId::entry()) {
            self.error(None, ValidationErrorKind::DetachedBlock);
        }
        for id in function.blocks.keys() {
            if !function.is_attached(*id) {
                self.error(Some(*id), ValidationErrorKind::DetachedBlock);
            }
        }
        if function.predecessors().contains_key(&IrBlockId::entry()) {
            self.error(
                Some(IrBlockId::entry()),
                ValidationErrorKind::EntryHasPredecessors,
            );
        }
    }

    fn check_blocks(&mut self) {
        let function = self.function;
        for block in function.attached_blocks() {
            for inst in &block.instructions {
                self.check_operands(block.id, inst.operands());
                self.check_call(block.id, inst);
            }

            match &block.terminator {
                None => self.error(Some(block.id), ValidationErrorKind::MissingTerminator),
                Some(term) => {
                    self.check_operands(block.id, term.operands());
                    for target in term.successors() {
                        if !function.is_attached(target) {
                            self.error(
                                Some(block.id),
                                ValidationErrorKind::InvalidBranchTarget { target },
                            );
                        }
                    }
                }
            }
        }
    }

    fn check_operands(&mut self, block: IrBlockId, operands: Vec<&IrValue>) {
        for operand in operands {
            match operand {
                IrValue::Reg(register) if !self.defined.contains(register) => {
                    self.error(
                        Some(block),
                        ValidationErrorKind::UndefinedRegister {
                            register: *register,
                        },
                    );
                }
                IrValue::Global(name) | IrValue::Str(name)
                    if self.module.get_global(name).is_none() =>
                {
                    self.error(
                        Some(block),
                        ValidationErrorKind::UnknownGlobal { name: name.clone() },
                    );
                }
                IrValue::Function(name) if self.module.get_function(name).is_none() => {
                    self.error(
                        Some(block),
                        ValidationErrorKind::UnknownFunction { name: name.clone() },
                    );
                }
                _ => {}
            }
        }
    }

    fn check_call(&mut self, block: IrBlockId, inst: &IrInstruction) {
        let (signature, args) = match inst {
            IrInstruction::CallDirect {
                func,
                signature,
                args,
                ..
            } => {
                if self.module.get_function(func).is_none() {
                    self.error(
                        Some(block),
                        ValidationErrorKind::UnknownFunction { name: func.clone() },
                    );
                    return;
                }
                (signature, args)
            }
            IrInstruction::CallIndirect {
                signature, args, ..
            } => (signature, args),
            _ => return,
        };

        if let Some((params, _, varargs)) = signature.function_parts() {
            let arity_ok = if varargs {
                args.len() >= params.len()
            } else {
                args.len() == params.len()
            };
            if !arity_ok {
                self.error(
                    Some(block),
                    ValidationErrorKind::ArityMismatch {
                        expected: params.len(),
                        found: args.len(),
                    },
                );
            }
        }
    }

    fn check_phis(&mut self) {
        let function = self.function;
        let preds = function.predecessors();
        for block in function.attached_blocks() {
            let block_preds = preds.get(&block.id).cloned().unwrap_or_default();
            for phi in &block.phi_nodes {
                for (from, value) in &phi.incoming {
                    if !block_preds.contains(from) {
                        self.error(
                            Some(block.id),
                            ValidationErrorKind::InvalidPhiNode {
                                phi: phi.dest,
                                reason: format!("{} is not a predecessor", from),
                            },
                        );
                    }
                    self.check_operands(block.id, vec![value]);
                }
                for pred in &block_preds {
                    if !phi.incoming.iter().any(|(from, _)| from == pred) {
                        self.error(
                            Some(block.id),
                            ValidationErrorKind::InvalidPhiNode {
                                phi: phi.dest,
                                reason: format!("no incoming value for predecessor {}", pred),
                            },
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrBuilder, IrConstant, IrGlobal, IrTerminator, IrType};

    fn main_builder() -> IrBuilder {
        let mut builder = IrBuilder::new("test");
        builder.declare_function("main", vec![], IrType::I32, false);
        builder.begin_function("main").unwrap();
        builder
    }

    fn kinds(module: &IrModule) -> Vec<ValidationErrorKind> {
        match validate_module(module) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.into_iter().map(|e| e.kind).collect(),
        }
    }

    #[test]
    fn test_valid_diamond() {
        let mut builder = main_builder();
        let then_block = builder.create_attached_block("then").unwrap();
        let else_block = builder.create_block("else").unwrap();
        let end = builder.create_block("ifend").unwrap();
        builder
            .build_cond_branch(IrValue::bool(true), then_block, else_block)
            .unwrap();
        builder.switch_to_block(then_block);
        builder.build_branch(end).unwrap();
        builder.append_block(else_block).unwrap();
        builder.switch_to_block(else_block);
        builder.build_branch(end).unwrap();
        builder.append_block(end).unwrap();
        builder.switch_to_block(end);
        let phi = builder.build_phi(IrType::I32, "tmp").unwrap();
        builder.add_phi_incoming(end, phi, IrValue::i32(1), then_block);
        builder.add_phi_incoming(end, phi, IrValue::i32(2), else_block);
        builder.build_return(Some(phi.into())).unwrap();

        assert_eq!(kinds(&builder.module), Vec::new());
    }

    #[test]
    fn test_branch_to_detached_block() {
        let mut builder = main_builder();
        let orphan = builder.create_block("orphan").unwrap();
        builder.build_branch(orphan).unwrap();

        let kinds = kinds(&builder.module);
        assert!(kinds.contains(&ValidationErrorKind::DetachedBlock));
        assert!(kinds.contains(&ValidationErrorKind::InvalidBranchTarget { target: orphan }));
    }

    #[test]
    fn test_phi_must_cover_predecessors() {
        let mut builder = main_builder();
        let end = builder.create_attached_block("end").unwrap();
        builder.build_branch(end).unwrap();
        builder.switch_to_block(end);
        let phi = builder.build_phi(IrType::I32, "tmp").unwrap();
        builder.build_return(Some(phi.into())).unwrap();

        let kinds = kinds(&builder.module);
        assert!(matches!(kinds.as_slice(), [ValidationErrorKind::InvalidPhiNode { .. }]));
    }

    #[test]
    fn test_undefined_register_and_entry_loop() {
        let mut builder = main_builder();
        let main = builder.current_function_mut().unwrap();
        let ghost = main.alloc_reg(IrType::I1, "ghost");
        if let Some(entry) = main.block_mut(IrBlockId::entry()) {
            entry.set_terminator(IrTerminator::CondBranch {
                condition: ghost.into(),
                true_target: IrBlockId::entry(),
                false_target: IrBlockId::entry(),
            });
        }

        let kinds = kinds(&builder.module);
        assert!(kinds.contains(&ValidationErrorKind::UndefinedRegister { register: ghost }));
        assert!(kinds.contains(&ValidationErrorKind::EntryHasPredecessors));
    }

    #[test]
    fn test_call_arity() {
        let mut builder = main_builder();
        builder.declare_function("two", vec![("a".into(), IrType::I32), ("b".into(), IrType::I32)], IrType::I32, false);
        builder.build_call_direct("two", vec![IrValue::i32(1)], "r").unwrap();
        builder.build_return(Some(IrValue::i32(0))).unwrap();

        assert_eq!(
            kinds(&builder.module),
            vec![ValidationErrorKind::ArityMismatch { expected: 2, found: 1 }]
        );
    }

    #[test]
    fn test_function_and_global_share_namespace() {
        let mut builder = main_builder();
        builder.build_return(Some(IrValue::i32(0))).unwrap();
        builder.module.add_global(IrGlobal::variable(
            "main",
            IrType::I32,
            IrConstant::Int { ty: IrType::I32, value: 1 },
        ));

        assert_eq!(
            kinds(&builder.module),
            vec![ValidationErrorKind::SymbolClash { name: "main".into() }]
        );
    }
}
