//! Function definitions and calls

use super::{builder_error, Binding, Codegen, LowerCx, ScopeId};
use crate::error::{CompileError, Result};
use crate::ir::{IrType, IrValue};
use log::debug;
use parser::Exp;
use smallvec::SmallVec;

/// Most calls pass a handful of arguments
type ArgList = SmallVec<[IrValue; 4]>;

/// Pieces of a `(def name (params...) [-> type] body)` form
#[derive(Debug, Clone, Copy)]
pub(crate) struct DefForm<'a> {
    pub name: &'a str,
    pub params: &'a [Exp],
    pub return_type: Option<&'a str>,
    pub body: &'a Exp,
}

impl<'a> DefForm<'a> {
    pub(crate) fn parse(items: &'a [Exp]) -> Result<Self> {
        let (name, params, return_type, body) = match items {
            [_, name, params, body] => (name, params, None, body),
            [_, name, params, arrow, ty, body] if arrow.as_symbol() == Some("->") => {
                let ty = ty.as_symbol().ok_or_else(|| {
                    CompileError::malformed("def", format!("return type must be a name, found {}", ty))
                })?;
                (name, params, Some(ty), body)
            }
            _ => {
                return Err(CompileError::malformed(
                    "def",
                    "expected (def name (params...) [-> type] body)",
                ))
            }
        };

        let name = name
            .as_symbol()
            .ok_or_else(|| CompileError::malformed("def", format!("function name must be a symbol, found {}", name)))?;
        let params = params.as_list().ok_or_else(|| {
            CompileError::malformed("def", format!("parameters of '{}' must be a list", name))
        })?;

        Ok(Self {
            name,
            params,
            return_type,
            body,
        })
    }
}

/// How a call reaches its target
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Callee {
    /// Function known by name
    Direct { name: String, signature: IrType },

    /// Function pointer computed at run time, e.g. a vtable entry
    Indirect { ptr: IrValue, signature: IrType },
}

impl Callee {
    fn signature(&self) -> &IrType {
        match self {
            Callee::Direct { signature, .. } | Callee::Indirect { signature, .. } => signature,
        }
    }

    fn describe(&self) -> String {
        match self {
            Callee::Direct { name, .. } => name.clone(),
            Callee::Indirect { signature, .. } => format!("({})*", signature),
        }
    }
}

impl Codegen<'_> {
    /// Declare `ir_name` with the parameter and return types of `def`
    pub(crate) fn declare_prototype(&mut self, ir_name: &str, def: &DefForm<'_>, cx: &LowerCx) -> Result<()> {
        if let Some(existing) = self.builder.module.get_function(ir_name) {
            let reason = if existing.is_declaration() {
                format!("'{}' clashes with an external declaration", def.name)
            } else {
                format!("function '{}' is already defined", def.name)
            };
            return Err(CompileError::malformed("def", reason));
        }
        if self.builder.module.get_global(ir_name).is_some() {
            return Err(CompileError::malformed(
                "def",
                format!("'{}' clashes with a global of the same name", def.name),
            ));
        }

        let mut params = Vec::with_capacity(def.params.len());
        for param in def.params {
            params.push(self.resolve_binder(param, "def", cx)?);
        }
        let return_type = match def.return_type {
            Some(ty) => self.resolve_type_name(ty, cx)?,
            None => super::types::DEFAULT_TYPE,
        };

        debug!("declare @{} ({} params) -> {}", ir_name, params.len(), return_type);
        self.builder.declare_function(ir_name, params, return_type, false);
        Ok(())
    }

    /// Lower the body of an already declared function.
    ///
    /// The caller's insertion point is saved and restored; parameters are
    /// spilled to entry-block slots so `set` works on them.
    pub(crate) fn define_body(&mut self, ir_name: &str, def: &DefForm<'_>, scope: ScopeId, cx: &LowerCx) -> Result<()> {
        let saved = self.builder.insert_point();
        self.builder
            .begin_function(ir_name)
            .ok_or_else(|| builder_error("function body"))?;

        let signature = self
            .builder
            .current_function()
            .map(|f| f.signature.clone())
            .ok_or_else(|| builder_error("function lookup"))?;

        let fn_scope = self.env.child(scope);
        for param in &signature.params {
            let slot = self
                .builder
                .build_entry_alloca(param.ty.clone(), &param.name)
                .ok_or_else(|| builder_error("parameter slot"))?;
            self.builder
                .build_store(param.reg.into(), slot.into())
                .ok_or_else(|| builder_error("parameter store"))?;
            self.env.define(
                fn_scope,
                param.name.as_str(),
                Binding::Slot {
                    ptr: slot.into(),
                    ty: param.ty.clone(),
                    function: ir_name.to_string(),
                },
            );
        }

        let value = self.lower(def.body, fn_scope, cx)?;
        let value = self.coerce(value, &signature.return_type, &format!("return of {}", def.name))?;
        self.builder
            .build_return(Some(value))
            .ok_or_else(|| builder_error("ret"))?;

        self.builder.restore_insert_point(saved);
        Ok(())
    }

    /// `(def name (params...) [-> type] body)` outside a class
    pub(crate) fn lower_def(&mut self, items: &[Exp], scope: ScopeId, _cx: &LowerCx) -> Result<IrValue> {
        let def = DefForm::parse(items)?;
        let fn_cx = LowerCx::function(def.name);
        self.declare_prototype(def.name, &def, &fn_cx)?;

        // Bound before the body so it can recurse
        self.env.define(
            scope,
            def.name,
            Binding::Function {
                name: def.name.to_string(),
            },
        );
        self.define_body(def.name, &def, scope, &fn_cx)?;
        Ok(IrValue::Function(def.name.to_string()))
    }

    /// Work out what `callee` calls, plus the receiver when it is a
    /// callable object
    fn resolve_callee(&mut self, callee: &Exp, scope: ScopeId, cx: &LowerCx) -> Result<(Callee, Option<IrValue>)> {
        if let Exp::Symbol(name) = callee {
            if let Binding::Function { name } = self.lookup_in(name, scope, cx)? {
                let signature = self
                    .builder
                    .module
                    .get_function(&name)
                    .map(|f| f.function_type())
                    .ok_or_else(|| CompileError::undefined(name.as_str()))?;
                return Ok((Callee::Direct { name, signature }, None));
            }
        }

        let value = self.lower(callee, scope, cx)?;
        let ty = self.type_of(&value)?;

        if let Some(class) = ty.pointee_struct() {
            if self.classes.contains(class) {
                let name = self.classes.method_function(class, "__call__")?.to_string();
                let signature = self
                    .builder
                    .module
                    .get_function(&name)
                    .map(|f| f.function_type())
                    .ok_or_else(|| builder_error("__call__ lookup"))?;
                return Ok((Callee::Direct { name, signature }, Some(value)));
            }
        }

        if let Some(signature) = ty.pointee().filter(|inner| inner.function_parts().is_some()) {
            let signature = signature.clone();
            return Ok((Callee::Indirect { ptr: value, signature }, None));
        }

        Err(CompileError::TypeMismatch {
            expected: "function".to_string(),
            found: ty.to_string(),
            context: format!("call of {}", callee),
        })
    }

    /// `(callee args...)`
    pub(crate) fn lower_call(&mut self, items: &[Exp], scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        let (callee_exp, arg_exps) = items
            .split_first()
            .ok_or_else(|| CompileError::malformed("()", "empty call"))?;
        let (callee, receiver) = self.resolve_callee(callee_exp, scope, cx)?;

        let (params, _, varargs) = callee
            .signature()
            .function_parts()
            .map(|(params, ret, varargs)| (params.to_vec(), ret.clone(), varargs))
            .ok_or_else(|| builder_error("callee signature"))?;

        let mut args: ArgList = SmallVec::new();
        args.extend(receiver);
        for exp in arg_exps {
            args.push(self.lower(exp, scope, cx)?);
        }

        let arity_ok = if varargs {
            args.len() >= params.len()
        } else {
            args.len() == params.len()
        };
        if !arity_ok {
            return Err(CompileError::malformed(
                callee.describe(),
                format!("expects {} arguments, got {}", params.len(), args.len()),
            ));
        }

        let context = format!("argument of {}", callee.describe());
        let mut coerced = Vec::with_capacity(args.len());
        for (i, arg) in args.into_iter().enumerate() {
            let arg = match params.get(i) {
                Some(param) => self.coerce(arg, param, &context)?,
                None => self.promote_vararg(arg)?,
            };
            coerced.push(arg);
        }

        let result = match callee {
            Callee::Direct { name, .. } => self.builder.build_call_direct(&name, coerced, "tmp"),
            Callee::Indirect { ptr, signature } => {
                self.builder.build_call_indirect(ptr, signature, coerced, "tmp")
            }
        };
        result
            .map(IrValue::from)
            .ok_or_else(|| builder_error("call"))
    }
}
