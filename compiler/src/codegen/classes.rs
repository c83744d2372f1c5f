//! Classes, struct layouts and vtables
//!
//! A class `Point` becomes:
//! - `%Point = type { %Point_vTable*, fields... }`
//! - `%Point_vTable = type { method pointers... }`
//! - a constant `@Point_vTable` holding the method addresses
//! - one function `Point_<method>` per method, `self` first
//!
//! A subclass starts from copies of its parent's field and method tables.
//! Overrides keep the slot of the entry they replace and new entries are
//! appended, so a parent-typed pointer finds every field and method at the
//! same index in any subclass.

use super::functions::DefForm;
use super::{Codegen, LowerCx, ScopeId};
use crate::error::{CompileError, Result};
use crate::ir::{IrConstant, IrGlobal, IrType, IrValue};
use indexmap::IndexMap;
use log::debug;
use parser::Exp;

/// Field 0 of every instance
pub const VTABLE_INDEX: u32 = 0;

/// Per-class metadata, fixed once the class form has been compiled
#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub name: String,
    pub parent: Option<String>,

    /// Field name to type, in slot order starting at slot 1
    pub fields: IndexMap<String, IrType>,

    /// Method name to implementing function, in vtable order
    pub methods: IndexMap<String, String>,
}

impl ClassInfo {
    pub fn vtable_name(&self) -> String {
        vtable_name(&self.name)
    }

    /// Struct element index of `field`
    pub fn field_index(&self, field: &str) -> Result<(u32, &IrType)> {
        self.fields
            .get_full(field)
            .map(|(index, _, ty)| (index as u32 + 1, ty))
            .ok_or_else(|| CompileError::UnknownField {
                class: self.name.clone(),
                field: field.to_string(),
            })
    }

    /// Vtable slot of `method`
    pub fn method_index(&self, method: &str) -> Result<u32> {
        self.methods
            .get_index_of(method)
            .map(|index| index as u32)
            .ok_or_else(|| self.unknown_method(method))
    }

    fn unknown_method(&self, method: &str) -> CompileError {
        CompileError::UnknownMethod {
            class: self.name.clone(),
            method: method.to_string(),
        }
    }
}

pub fn vtable_name(class: &str) -> String {
    format!("{}_vTable", class)
}

/// Mangled function name of a method
pub fn method_name(class: &str, method: &str) -> String {
    format!("{}_{}", class, method)
}

/// Every class compiled so far, by name
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: IndexMap<String, ClassInfo>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&ClassInfo> {
        self.classes
            .get(name)
            .ok_or_else(|| CompileError::unknown_class(name))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.values()
    }

    /// Function implementing `method` for instances of `class`
    pub fn method_function(&self, class: &str, method: &str) -> Result<&str> {
        let info = self.get(class)?;
        info.methods
            .get(method)
            .map(String::as_str)
            .ok_or_else(|| info.unknown_method(method))
    }

    fn register(&mut self, info: ClassInfo) -> Result<()> {
        if self.classes.contains_key(&info.name) {
            return Err(CompileError::DuplicateClass { name: info.name });
        }
        self.classes.insert(info.name.clone(), info);
        Ok(())
    }
}

impl Codegen<'_> {
    /// `(class Name Parent (begin members...))`, `Parent` may be `null`
    pub(crate) fn lower_class(&mut self, items: &[Exp], scope: ScopeId, _cx: &LowerCx) -> Result<IrValue> {
        let [_, name, parent, body] = items else {
            return Err(CompileError::malformed(
                "class",
                "expected (class Name Parent (begin ...))",
            ));
        };
        let name = name.as_symbol().ok_or_else(|| {
            CompileError::malformed("class", format!("class name must be a symbol, found {}", name))
        })?;
        let parent = match parent.as_symbol() {
            Some("null") => None,
            Some(parent) => Some(self.classes.get(parent)?.clone()),
            None => {
                return Err(CompileError::malformed(
                    "class",
                    format!("parent must be a class name or null, found {}", parent),
                ))
            }
        };
        if self.classes.contains(name) {
            return Err(CompileError::DuplicateClass {
                name: name.to_string(),
            });
        }
        let members = match body.as_list() {
            Some([head, members @ ..]) if head.as_symbol() == Some("begin") => members,
            _ => {
                return Err(CompileError::malformed(
                    "class",
                    format!("body of '{}' must be a (begin ...) block", name),
                ))
            }
        };

        debug!(
            "compiling class {} (parent: {})",
            name,
            parent.as_ref().map(|p| p.name.as_str()).unwrap_or("none")
        );
        let class_cx = LowerCx::method(name, name);
        let module = &mut self.builder.module;
        module.declare_struct(name);
        module.declare_struct(vtable_name(name));

        let mut info = match parent {
            Some(parent) => ClassInfo {
                name: name.to_string(),
                parent: Some(parent.name),
                fields: parent.fields,
                methods: parent.methods,
            },
            None => ClassInfo {
                name: name.to_string(),
                parent: None,
                fields: IndexMap::new(),
                methods: IndexMap::new(),
            },
        };

        // Members first, so the layout and vtable exist before any body
        let mut own_methods = Vec::new();
        for member in members {
            match member.form_tag() {
                Some("var") => {
                    let binder = match member.as_list() {
                        Some([_, binder, _]) => binder,
                        _ => {
                            return Err(CompileError::malformed(
                                "var",
                                format!("expected (var field value) in class '{}'", name),
                            ))
                        }
                    };
                    let (field, ty) = self.resolve_binder(binder, "var", &class_cx)?;
                    info.fields.insert(field, ty);
                }
                Some("def") => {
                    let def = DefForm::parse(member.as_list().unwrap_or_default())?;
                    let ir_name = method_name(name, def.name);
                    let method_cx = LowerCx::method(ir_name.as_str(), name);
                    self.declare_prototype(&ir_name, &def, &method_cx)?;
                    info.methods.insert(def.name.to_string(), ir_name.clone());
                    own_methods.push((ir_name, def, method_cx));
                }
                _ => {
                    return Err(CompileError::malformed(
                        "class",
                        format!("'{}' may only contain var and def, found {}", name, member),
                    ))
                }
            }
        }

        self.build_layout(&info)?;
        self.classes.register(info)?;

        for (ir_name, def, method_cx) in &own_methods {
            debug!("compiling method {}", ir_name);
            self.define_body(ir_name, def, scope, method_cx)?;
        }
        Ok(IrValue::i32(0))
    }

    /// Struct body, vtable type and vtable constant of `info`
    fn build_layout(&mut self, info: &ClassInfo) -> Result<()> {
        let vtable = info.vtable_name();
        let module = &self.builder.module;
        if module.get_function(&vtable).is_some() || module.get_global(&vtable).is_some() {
            return Err(CompileError::malformed(
                "class",
                format!("@{} clashes with the vtable of '{}'", vtable, info.name),
            ));
        }

        let mut entries = Vec::with_capacity(info.methods.len());
        let mut slot_types = Vec::with_capacity(info.methods.len());
        for function in info.methods.values() {
            let ty = self
                .builder
                .module
                .get_function(function)
                .map(|f| f.function_type().pointer_to())
                .ok_or_else(|| CompileError::internal(format!("method {} was never declared", function)))?;
            slot_types.push(ty);
            entries.push(IrConstant::Function(function.clone()));
        }

        let mut fields = Vec::with_capacity(info.fields.len() + 1);
        fields.push(IrType::struct_ptr(vtable.as_str()));
        fields.extend(info.fields.values().cloned());

        let module = &mut self.builder.module;
        module.set_struct_body(info.name.as_str(), fields);
        module.set_struct_body(vtable.as_str(), slot_types);
        module.add_global(IrGlobal::constant(
            vtable.as_str(),
            IrType::Struct(vtable.clone()),
            IrConstant::Struct {
                name: vtable.clone(),
                fields: entries,
            },
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::tests::{compile, run};

    const POINT: &str = r#"
        (class Point null
            (begin
                (var x 0)
                (var y 0)
                (def constructor (self x y)
                    (begin
                        (set (prop self x) x)
                        (set (prop self y) y)))
                (def calc (self) (+ (prop self x) (prop self y)))))
    "#;

    const POINT3D: &str = r#"
        (class Point3D Point
            (begin
                (var z 0)
                (def constructor (self x y z)
                    (begin
                        ((method (super Point3D) constructor) self x y)
                        (set (prop self z) z)))
                (def calc (self)
                    (+ ((method (super Point3D) calc) self) (prop self z)))))
    "#;

    #[test]
    fn test_point_layout() {
        let module = compile(POINT).unwrap();
        assert_eq!(
            module.struct_fields("Point").unwrap(),
            &[IrType::struct_ptr("Point_vTable"), IrType::I32, IrType::I32]
        );
        assert_eq!(
            module.struct_fields("Point_vTable").unwrap(),
            &[
                IrType::function(
                    vec![IrType::struct_ptr("Point"), IrType::I32, IrType::I32],
                    IrType::I32,
                    false
                )
                .pointer_to(),
                IrType::function(vec![IrType::struct_ptr("Point")], IrType::I32, false).pointer_to(),
            ]
        );
        let vtable = module.get_global("Point_vTable").unwrap();
        assert!(vtable.is_constant);
        assert_eq!(
            vtable.initializer,
            IrConstant::Struct {
                name: "Point_vTable".into(),
                fields: vec![
                    IrConstant::Function("Point_constructor".into()),
                    IrConstant::Function("Point_calc".into()),
                ],
            }
        );
    }

    #[test]
    fn test_inherited_tables_keep_slots() {
        let module = compile(&format!("{}{}", POINT, POINT3D)).unwrap();
        let fields = module.struct_fields("Point3D").unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0], IrType::struct_ptr("Point3D_vTable"));

        let vtable = module.get_global("Point3D_vTable").unwrap();
        assert_eq!(
            vtable.initializer,
            IrConstant::Struct {
                name: "Point3D_vTable".into(),
                fields: vec![
                    IrConstant::Function("Point3D_constructor".into()),
                    IrConstant::Function("Point3D_calc".into()),
                ],
            }
        );
    }

    #[test]
    fn test_registry_indices() {
        let mut registry = ClassRegistry::new();
        let mut info = ClassInfo {
            name: "Point".into(),
            parent: None,
            fields: IndexMap::new(),
            methods: IndexMap::new(),
        };
        info.fields.insert("x".into(), IrType::I32);
        info.fields.insert("y".into(), IrType::I32);
        info.methods.insert("constructor".into(), "Point_constructor".into());
        info.methods.insert("calc".into(), "Point_calc".into());

        assert_eq!(info.field_index("y").unwrap(), (2, &IrType::I32));
        assert_eq!(info.method_index("calc").unwrap(), 1);
        assert!(matches!(info.field_index("z"), Err(CompileError::UnknownField { .. })));
        assert!(matches!(info.method_index("area"), Err(CompileError::UnknownMethod { .. })));

        registry.register(info.clone()).unwrap();
        assert_eq!(registry.method_function("Point", "calc").unwrap(), "Point_calc");
        assert_eq!(
            registry.register(info).unwrap_err(),
            CompileError::DuplicateClass { name: "Point".into() }
        );
        assert!(registry.get("Line").is_err());
    }

    #[test]
    fn test_inherited_method_without_override() {
        let out = run(&format!(
            r#"{}
            (class Named Point
                (begin
                    (var (label string) "")
                    (def constructor (self (label string))
                        (begin
                            (set (prop self label) label)
                            ((method (super Named) constructor) self 1 2)))))
            (var n (new Named "n"))
            (printf "%s %d\n" (prop n label) ((method n calc) n))"#,
            POINT
        ));
        assert_eq!(out, "n 3\n");
    }

    #[test]
    fn test_class_errors() {
        assert_eq!(
            compile("(class A Missing (begin (var x 0)))").unwrap_err(),
            CompileError::unknown_class("Missing")
        );
        assert_eq!(
            compile("(class A null (begin (var x 0))) (class A null (begin (var y 0)))").unwrap_err(),
            CompileError::DuplicateClass { name: "A".into() }
        );
        // Functions and globals share one symbol namespace
        for src in [
            "(class A null (begin (def vTable (self) 1)))",
            "(def A_vTable () 1) (class A null (begin (var x 0)))",
        ] {
            let err = compile(src).unwrap_err();
            assert!(
                matches!(err, CompileError::MalformedForm { ref form, .. } if form == "class"),
                "{}",
                src
            );
        }
        for src in [
            "(class A null (var x 0))",
            "(class A null (begin (printf \"x\")))",
            "(class A null)",
        ] {
            assert!(
                matches!(compile(src), Err(CompileError::MalformedForm { .. })),
                "{}",
                src
            );
        }
    }
}
