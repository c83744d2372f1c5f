//! Code generation: Eva AST to IR
//!
//! [`compile_program`] lowers a whole program into an [`IrModule`]. The
//! top-level expressions become the body of `main`; `def` and `class` forms
//! add functions, struct types and vtables beside it.
//!
//! Lowering is a recursive descent over [`Exp`]. Mutable state is split the
//! way it is used:
//! - [`Codegen`] owns the builder, the scope arena and the class registry
//! - [`LowerCx`] names the function and class being compiled and is passed
//!   down explicitly, so nested `def`s build a fresh one and the caller's
//!   context is untouched when they return

pub mod classes;
pub mod control_flow;
pub mod environment;
pub mod functions;
pub mod objects;
pub mod types;

pub use classes::{ClassInfo, ClassRegistry};
pub use environment::{Binding, Environment, ScopeId};

use crate::config::CompilerConfig;
use crate::error::{CompileError, Result};
use crate::ir::{BinaryOp, CompareOp, IrBuilder, IrConstant, IrGlobal, IrModule, IrType, IrValue};
use log::{debug, trace};
use parser::Exp;

/// Name of the function holding the top-level program
pub const ENTRY_FUNCTION: &str = "main";

/// Function and class the lowering cursor is in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowerCx {
    pub function: String,

    /// Set while compiling a class body and its methods
    pub class: Option<String>,
}

impl LowerCx {
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            function: name.into(),
            class: None,
        }
    }

    pub fn method(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            function: name.into(),
            class: Some(class.into()),
        }
    }
}

pub struct Codegen<'c> {
    pub(crate) builder: IrBuilder,
    pub(crate) env: Environment,
    pub(crate) classes: ClassRegistry,
    pub(crate) config: &'c CompilerConfig,
}

/// Compile a parsed program, normally the `(begin ...)` returned by
/// [`parser::parse_program`]
pub fn compile_program(program: &Exp, config: &CompilerConfig) -> Result<IrModule> {
    let mut codegen = Codegen::new(config);
    codegen.compile(program)?;
    Ok(codegen.finish())
}

/// Error for a builder call that returned `None`
pub(crate) fn builder_error(what: &str) -> CompileError {
    CompileError::internal(format!("IR builder rejected {}", what))
}

impl<'c> Codegen<'c> {
    pub fn new(config: &'c CompilerConfig) -> Self {
        let mut builder = IrBuilder::new(config.build.module_name.as_str());
        builder.module.target_triple = config.build.target_triple.clone();
        Self {
            builder,
            env: Environment::new(),
            classes: ClassRegistry::new(),
            config,
        }
    }

    pub fn finish(self) -> IrModule {
        self.builder.finish()
    }

    /// Declare the runtime, create the configured globals and lower
    /// `program` as the body of `main`
    pub fn compile(&mut self, program: &Exp) -> Result<()> {
        self.declare_runtime();
        self.setup_globals();

        self.builder
            .declare_function(ENTRY_FUNCTION, Vec::new(), IrType::I32, false);
        self.builder
            .begin_function(ENTRY_FUNCTION)
            .ok_or_else(|| builder_error("main"))?;

        let cx = LowerCx::function(ENTRY_FUNCTION);
        let global = self.env.global();
        self.lower(program, global, &cx)?;

        self.builder
            .build_return(Some(IrValue::i32(0)))
            .ok_or_else(|| builder_error("ret in main"))?;
        debug!(
            "compiled module '{}': {} functions, {} classes",
            self.builder.module.name,
            self.builder.module.functions.len(),
            self.classes.len()
        );
        Ok(())
    }

    /// External formatter `i32 (i8*, ...)` and allocator `i8* (i64)`
    fn declare_runtime(&mut self) {
        let formatter = self.config.runtime.formatter.as_str();
        let allocator = self.config.runtime.allocator.as_str();
        self.builder.declare_function(
            formatter,
            vec![("format".to_string(), IrType::byte_ptr())],
            IrType::I32,
            true,
        );
        self.builder.declare_function(
            allocator,
            vec![("size".to_string(), IrType::I64)],
            IrType::byte_ptr(),
            false,
        );
    }

    fn setup_globals(&mut self) {
        let global = self.env.global();
        for (name, value) in &self.config.globals {
            let mut variable = IrGlobal::variable(
                name.as_str(),
                IrType::I32,
                IrConstant::Int {
                    ty: IrType::I32,
                    value: *value,
                },
            );
            variable.align = Some(4);
            self.builder.module.add_global(variable);
            self.env.define(
                global,
                name.as_str(),
                Binding::Global {
                    name: name.clone(),
                    ty: IrType::I32,
                },
            );
        }
    }

    /// Lower one expression and return the value it evaluates to
    pub(crate) fn lower(&mut self, exp: &Exp, scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        trace!("lower {} in @{}", exp, cx.function);
        match exp {
            Exp::Number(value) => Ok(IrValue::i32(*value)),
            Exp::Str(raw) => {
                let text = unescape(raw);
                let name = self.builder.module.add_string_constant(&text);
                Ok(IrValue::Str(name))
            }
            Exp::Symbol(name) => self.lower_symbol(name, scope, cx),
            Exp::List(items) => self.lower_list(items, scope, cx),
        }
    }

    fn lower_symbol(&mut self, name: &str, scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        match name {
            "true" => return Ok(IrValue::bool(true)),
            "false" => return Ok(IrValue::bool(false)),
            _ => {}
        }

        let binding = self.lookup_in(name, scope, cx)?;
        match binding {
            Binding::Slot { ptr, ty, .. } => {
                let value = self
                    .builder
                    .build_load(ty, ptr, name)
                    .ok_or_else(|| builder_error("load"))?;
                Ok(value.into())
            }
            Binding::Global { name: global, ty } => {
                let value = self
                    .builder
                    .build_load(ty, IrValue::Global(global), name)
                    .ok_or_else(|| builder_error("load"))?;
                Ok(value.into())
            }
            Binding::Function { name } => Ok(IrValue::Function(name)),
            Binding::Value { value, .. } => Ok(value),
        }
    }

    /// Look `name` up and reject bindings that live in another function's
    /// frame, since Eva functions do not capture
    pub(crate) fn lookup_in(&self, name: &str, scope: ScopeId, cx: &LowerCx) -> Result<Binding> {
        let binding = self.env.lookup(scope, name)?;
        match binding.owner() {
            Some(owner) if owner != cx.function => Err(CompileError::malformed(
                name,
                format!(
                    "'{}' belongs to @{} and cannot be used from @{}",
                    name, owner, cx.function
                ),
            )),
            _ => Ok(binding.clone()),
        }
    }

    fn lower_list(&mut self, items: &[Exp], scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        let tag = match items.first() {
            Some(Exp::Symbol(tag)) => tag.as_str(),
            Some(_) => return self.lower_call(items, scope, cx),
            None => return Err(CompileError::malformed("()", "empty list is not an expression")),
        };

        match tag {
            "var" => self.lower_var(items, scope, cx),
            "set" => self.lower_set(items, scope, cx),
            "begin" => self.lower_begin(items, scope, cx),
            "printf" => self.lower_printf(items, scope, cx),
            "+" | "-" | "*" | "/" => self.lower_arithmetic(tag, items, scope, cx),
            ">" | "<" | "==" | "!=" | ">=" | "<=" => self.lower_comparison(tag, items, scope, cx),
            "if" => self.lower_if(items, scope, cx),
            "while" => self.lower_while(items, scope, cx),
            "def" => self.lower_def(items, scope, cx),
            "class" => self.lower_class(items, scope, cx),
            "new" => self.lower_new(items, scope, cx),
            "prop" => self.lower_prop(items, scope, cx),
            "method" => self.lower_method(items, scope, cx),
            "super" => Err(CompileError::malformed(
                "super",
                "only valid as the receiver of (method (super Class) name)",
            )),
            _ => self.lower_call(items, scope, cx),
        }
    }

    /// `(var name value)` or `(var (name type) value)`
    fn lower_var(&mut self, items: &[Exp], scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        let [_, binder, init] = items else {
            return Err(CompileError::malformed("var", "expected (var name value)"));
        };

        // Instances are bound directly; there is nothing to store
        if init.is_form("new") {
            let name = match binder {
                Exp::Symbol(name) => name.clone(),
                other => self.resolve_binder(other, "var", cx)?.0,
            };
            let instance = self.lower(init, scope, cx)?;
            let ty = self.type_of(&instance)?;
            self.env.define(
                scope,
                name,
                Binding::Value {
                    value: instance.clone(),
                    ty,
                    function: cx.function.clone(),
                },
            );
            return Ok(instance);
        }

        let (name, ty) = self.resolve_binder(binder, "var", cx)?;
        let value = self.lower(init, scope, cx)?;
        let value = self.coerce(value, &ty, &format!("var {}", name))?;

        let slot = self
            .builder
            .build_entry_alloca(ty.clone(), &name)
            .ok_or_else(|| builder_error("alloca"))?;
        self.builder
            .build_store(value.clone(), slot.into())
            .ok_or_else(|| builder_error("store"))?;
        self.env.define(
            scope,
            name,
            Binding::Slot {
                ptr: slot.into(),
                ty,
                function: cx.function.clone(),
            },
        );
        Ok(value)
    }

    /// `(set name value)` or `(set (prop object field) value)`
    fn lower_set(&mut self, items: &[Exp], scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        let [_, target, value] = items else {
            return Err(CompileError::malformed("set", "expected (set target value)"));
        };

        if target.is_form("prop") {
            return self.store_prop(target, value, scope, cx);
        }

        let name = target.as_symbol().ok_or_else(|| {
            CompileError::malformed("set", format!("cannot assign to {}", target))
        })?;
        let (ptr, ty) = match self.lookup_in(name, scope, cx)? {
            Binding::Slot { ptr, ty, .. } => (ptr, ty),
            Binding::Global { name, ty } => (IrValue::Global(name), ty),
            Binding::Function { .. } | Binding::Value { .. } => {
                return Err(CompileError::malformed(
                    "set",
                    format!("'{}' is not an assignable variable", name),
                ))
            }
        };

        let value = self.lower(value, scope, cx)?;
        let value = self.coerce(value, &ty, &format!("set {}", name))?;
        self.builder
            .build_store(value.clone(), ptr)
            .ok_or_else(|| builder_error("store"))?;
        Ok(value)
    }

    /// `(begin exp...)` in a fresh child scope
    fn lower_begin(&mut self, items: &[Exp], scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        let body = &items[1..];
        if body.is_empty() {
            return Err(CompileError::malformed("begin", "block has no expressions"));
        }

        let block_scope = self.env.child(scope);
        let mut last = None;
        for exp in body {
            last = Some(self.lower(exp, block_scope, cx)?);
        }
        last.ok_or_else(|| CompileError::malformed("begin", "block has no expressions"))
    }

    /// `(printf format args...)` through the configured formatter
    fn lower_printf(&mut self, items: &[Exp], scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        if items.len() < 2 {
            return Err(CompileError::malformed("printf", "missing format string"));
        }

        let mut args = Vec::with_capacity(items.len() - 1);
        let format = self.lower(&items[1], scope, cx)?;
        args.push(self.coerce(format, &IrType::byte_ptr(), "printf format")?);
        for exp in &items[2..] {
            let value = self.lower(exp, scope, cx)?;
            args.push(self.promote_vararg(value)?);
        }

        let formatter = self.config.runtime.formatter.clone();
        let result = self
            .builder
            .build_call_direct(&formatter, args, "tmp")
            .ok_or_else(|| builder_error("formatter call"))?;
        Ok(result.into())
    }

    fn binary_operands(
        &mut self,
        tag: &str,
        items: &[Exp],
        scope: ScopeId,
        cx: &LowerCx,
    ) -> Result<(IrValue, IrValue)> {
        let [_, left, right] = items else {
            return Err(CompileError::malformed(tag, "expected exactly two operands"));
        };
        let left = self.lower(left, scope, cx)?;
        let right = self.lower(right, scope, cx)?;

        let left_ty = self.type_of(&left)?;
        let right_ty = self.type_of(&right)?;
        let (left_bits, right_bits) = match (left_ty.int_bits(), right_ty.int_bits()) {
            (Some(l), Some(r)) => (l, r),
            (None, _) => return Err(CompileError::mismatch(&IrType::I32, &left_ty, tag)),
            (_, None) => return Err(CompileError::mismatch(&IrType::I32, &right_ty, tag)),
        };

        // Mixed widths meet at the wider operand
        if left_bits < right_bits {
            Ok((self.coerce(left, &right_ty, tag)?, right))
        } else {
            let right = self.coerce(right, &left_ty, tag)?;
            Ok((left, right))
        }
    }

    fn lower_arithmetic(&mut self, tag: &str, items: &[Exp], scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        let op = match tag {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            _ => BinaryOp::Div,
        };
        let (left, right) = self.binary_operands(tag, items, scope, cx)?;
        let result = self
            .builder
            .build_binop(op, left, right)
            .ok_or_else(|| builder_error(op.mnemonic()))?;
        Ok(result.into())
    }

    fn lower_comparison(&mut self, tag: &str, items: &[Exp], scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        let op = match tag {
            ">" => CompareOp::Gt,
            "<" => CompareOp::Lt,
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            ">=" => CompareOp::Ge,
            _ => CompareOp::Le,
        };
        let (left, right) = self.binary_operands(tag, items, scope, cx)?;
        let result = self
            .builder
            .build_cmp(op, left, right)
            .ok_or_else(|| builder_error("icmp"))?;
        Ok(result.into())
    }
}

/// Expand `\n`, `\t` and `\\` in a raw string literal
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
