//! Lexical environment
//!
//! Scopes live in an arena and point at their parent by index. A scope is
//! never removed, so a [`ScopeId`] stays valid for the whole compilation.

use crate::error::{CompileError, Result};
use crate::ir::{IrType, IrValue};
use fxhash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// What a name compiles to
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Stack slot owned by `function`; reads load through `ptr`
    Slot {
        ptr: IrValue,
        ty: IrType,
        function: String,
    },

    /// Module-level variable
    Global { name: String, ty: IrType },

    /// Function, referenced by address
    Function { name: String },

    /// SSA value bound directly, e.g. an instance returned by `new`
    Value {
        value: IrValue,
        ty: IrType,
        function: String,
    },
}

impl Binding {
    /// Function whose frame the binding lives in, if any
    pub fn owner(&self) -> Option<&str> {
        match self {
            Binding::Slot { function, .. } | Binding::Value { function, .. } => Some(function),
            Binding::Global { .. } | Binding::Function { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
struct Scope {
    record: FxHashMap<String, Binding>,
    parent: Option<ScopeId>,
}

#[derive(Debug)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// An environment holding only the global scope
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    pub fn global(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Open an empty child scope
    pub fn child(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.push(Scope {
            record: FxHashMap::default(),
            parent: Some(parent),
        });
        ScopeId(self.scopes.len() - 1)
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(scope.0).and_then(|s| s.parent)
    }

    /// Bind `name` in `scope`, replacing a binding of the same scope
    pub fn define(&mut self, scope: ScopeId, name: impl Into<String>, binding: Binding) {
        if let Some(s) = self.scopes.get_mut(scope.0) {
            s.record.insert(name.into(), binding);
        }
    }

    /// Nearest definition of `name` walking towards the global scope
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Result<&Binding> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = match self.scopes.get(id.0) {
                Some(s) => s,
                None => break,
            };
            if let Some(binding) = s.record.get(name) {
                return Ok(binding);
            }
            current = s.parent;
        }
        Err(CompileError::undefined(name))
    }

    /// Definition in `scope` itself, ignoring parents
    #[cfg(test)]
    fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<&Binding> {
        self.scopes.get(scope.0).and_then(|s| s.record.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrId;

    fn slot(reg: u32) -> Binding {
        Binding::Slot {
            ptr: IrValue::Reg(IrId::new(reg)),
            ty: IrType::I32,
            function: "main".into(),
        }
    }

    #[test]
    fn test_lookup_walks_parents() {
        let mut env = Environment::new();
        let global = env.global();
        env.define(global, "VERSION", Binding::Global { name: "VERSION".into(), ty: IrType::I32 });
        let block = env.child(global);
        let inner = env.child(block);

        assert!(matches!(env.lookup(inner, "VERSION"), Ok(Binding::Global { .. })));
        assert_eq!(env.parent(inner), Some(block));
        assert_eq!(env.parent(global), None);
        assert!(env.lookup_local(inner, "VERSION").is_none());
    }

    #[test]
    fn test_shadowing_is_confined_to_scope() {
        let mut env = Environment::new();
        let outer = env.child(env.global());
        env.define(outer, "x", slot(0));
        let inner = env.child(outer);
        env.define(inner, "x", slot(1));

        assert_eq!(env.lookup(inner, "x").unwrap(), &slot(1));
        assert_eq!(env.lookup(outer, "x").unwrap(), &slot(0));
    }

    #[test]
    fn test_redefinition_overwrites_same_scope() {
        let mut env = Environment::new();
        let scope = env.child(env.global());
        env.define(scope, "x", slot(0));
        env.define(scope, "x", slot(2));
        assert_eq!(env.lookup(scope, "x").unwrap(), &slot(2));
    }

    #[test]
    fn test_undefined_symbol() {
        let env = Environment::new();
        assert_eq!(
            env.lookup(env.global(), "nope").unwrap_err(),
            CompileError::undefined("nope")
        );
        assert_eq!(slot(0).owner(), Some("main"));
        assert_eq!(Binding::Function { name: "f".into() }.owner(), None);
    }
}
