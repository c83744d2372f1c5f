//! `if` and `while`
//!
//! Blocks that follow a nested body (else, merge, loop exit) are created
//! detached and only attached once the body has been lowered, so blocks
//! appended by nested forms come first in the layout.

use super::{builder_error, Codegen, LowerCx, ScopeId};
use crate::error::{CompileError, Result};
use crate::ir::{IrBlockId, IrValue};
use parser::Exp;

impl Codegen<'_> {
    fn current_block(&self) -> Result<IrBlockId> {
        self.builder
            .current_block()
            .ok_or_else(|| builder_error("block query without insertion point"))
    }

    fn attach_and_enter(&mut self, block: IrBlockId) -> Result<()> {
        self.builder
            .append_block(block)
            .ok_or_else(|| builder_error("block attachment"))?;
        self.builder.switch_to_block(block);
        Ok(())
    }

    /// `(if cond then else)`, merged with a phi of the then-branch's type
    pub(crate) fn lower_if(&mut self, items: &[Exp], scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        let [_, cond, then_exp, else_exp] = items else {
            return Err(CompileError::malformed("if", "expected (if condition then else)"));
        };

        let cond = self.lower(cond, scope, cx)?;
        let cond = self.to_condition(cond, "if condition")?;

        let then_block = self
            .builder
            .create_attached_block("then")
            .ok_or_else(|| builder_error("then block"))?;
        let else_block = self
            .builder
            .create_block("else")
            .ok_or_else(|| builder_error("else block"))?;
        let end_block = self
            .builder
            .create_block("ifend")
            .ok_or_else(|| builder_error("ifend block"))?;
        self.builder
            .build_cond_branch(cond, then_block, else_block)
            .ok_or_else(|| builder_error("br"))?;

        self.builder.switch_to_block(then_block);
        let then_value = self.lower(then_exp, scope, cx)?;
        let then_ty = self.type_of(&then_value)?;
        self.builder
            .build_branch(end_block)
            .ok_or_else(|| builder_error("br"))?;
        // Nested control flow may have moved us
        let then_exit = self.current_block()?;

        self.attach_and_enter(else_block)?;
        let else_value = self.lower(else_exp, scope, cx)?;
        let else_value = self.coerce(else_value, &then_ty, "if else-branch")?;
        self.builder
            .build_branch(end_block)
            .ok_or_else(|| builder_error("br"))?;
        let else_exit = self.current_block()?;

        self.attach_and_enter(end_block)?;
        let phi = self
            .builder
            .build_phi(then_ty, "tmp")
            .ok_or_else(|| builder_error("phi"))?;
        self.builder
            .add_phi_incoming(end_block, phi, then_value, then_exit)
            .ok_or_else(|| builder_error("phi incoming"))?;
        self.builder
            .add_phi_incoming(end_block, phi, else_value, else_exit)
            .ok_or_else(|| builder_error("phi incoming"))?;
        Ok(phi.into())
    }

    /// `(while cond body)`; evaluates to `0`
    pub(crate) fn lower_while(&mut self, items: &[Exp], scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        let [_, cond, body] = items else {
            return Err(CompileError::malformed("while", "expected (while condition body)"));
        };

        let cond_block = self
            .builder
            .create_attached_block("cond")
            .ok_or_else(|| builder_error("cond block"))?;
        self.builder
            .build_branch(cond_block)
            .ok_or_else(|| builder_error("br"))?;

        self.builder.switch_to_block(cond_block);
        let test = self.lower(cond, scope, cx)?;
        let test = self.to_condition(test, "while condition")?;

        let body_block = self
            .builder
            .create_block("body")
            .ok_or_else(|| builder_error("body block"))?;
        let end_block = self
            .builder
            .create_block("loopend")
            .ok_or_else(|| builder_error("loopend block"))?;
        self.builder
            .build_cond_branch(test, body_block, end_block)
            .ok_or_else(|| builder_error("br"))?;

        self.attach_and_enter(body_block)?;
        self.lower(body, scope, cx)?;
        self.builder
            .build_branch(cond_block)
            .ok_or_else(|| builder_error("br"))?;

        self.attach_and_enter(end_block)?;
        Ok(IrValue::i32(0))
    }
}

#[cfg(test)]
mod tests {
    use crate::codegen::tests::{compile, run};
    use crate::error::CompileError;
    use crate::ir::printer::print_module;
    use crate::ir::validation::validate_module;

    #[test]
    fn test_if_selects_branch() {
        assert_eq!(run(r#"(printf "%d" (if (> 5 10) 1 2))"#), "2");
        assert_eq!(run(r#"(printf "%d" (if (< 5 10) 1 2))"#), "1");
    }

    #[test]
    fn test_nested_if_phi_edges() {
        let src = r#"
            (var x 7)
            (printf "%d\n" (if (> x 5) (if (> x 10) 3 2) 1))
        "#;
        assert_eq!(run(src), "2\n");

        let module = compile(src).unwrap();
        validate_module(&module).unwrap();
        let main = module.get_function("main").unwrap();
        let labels: Vec<_> = main
            .attached_blocks()
            .map(|block| block.label.as_str())
            .collect();
        assert_eq!(labels, ["entry", "then", "then", "else", "ifend", "else", "ifend"]);
    }

    #[test]
    fn test_if_prints_llvm_phi() {
        let module = compile(r#"(printf "%d" (if (> 5 10) 1 2))"#).unwrap();
        let ll = print_module(&module);
        assert!(ll.contains("  br i1 %tmp.0, label %then.1, label %else.2\n"));
        assert!(ll.contains("  %tmp.1 = phi i32 [ 1, %then.1 ], [ 2, %else.2 ]\n"));
        assert!(ll.lines().filter(|l| l.contains(" phi ")).all(|l| !l.contains("label")));
    }

    #[test]
    fn test_numeric_condition_and_else_coercion() {
        assert_eq!(run(r#"(printf "%d" (if 3 10 false))"#), "10");
        assert_eq!(run(r#"(printf "%d" (if 0 10 true))"#), "1");
    }

    #[test]
    fn test_while_loop() {
        let out = run(r#"
            (var i 5)
            (var runs 0)
            (while (> i 0)
                (begin
                    (set i (- i 1))
                    (set runs (+ runs 1))))
            (printf "%d %d" runs i)
        "#);
        assert_eq!(out, "5 0");
    }

    #[test]
    fn test_while_value_and_shape() {
        assert_eq!(run(r#"(printf "%d" (while false 1))"#), "0");
        assert!(matches!(
            compile("(while true)"),
            Err(CompileError::MalformedForm { .. })
        ));
        assert!(matches!(
            compile("(if true 1)"),
            Err(CompileError::MalformedForm { .. })
        ));
    }
}
