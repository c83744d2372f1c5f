//! Declared types and value coercion
//!
//! Eva has no inference: a name's type comes from its `(name type)`
//! annotation, and anything unannotated is a 32-bit number.

use super::{builder_error, Codegen, LowerCx};
use crate::error::{CompileError, Result};
use crate::ir::{CastOp, CompareOp, IrType, IrValue};
use parser::Exp;

/// Type of unannotated variables, parameters and return values
pub const DEFAULT_TYPE: IrType = IrType::I32;

impl Codegen<'_> {
    /// `number`, `string` or a class name
    pub(crate) fn resolve_type_name(&self, name: &str, cx: &LowerCx) -> Result<IrType> {
        match name {
            "number" => Ok(IrType::I32),
            "string" => Ok(IrType::byte_ptr()),
            class if self.classes.contains(class) || cx.class.as_deref() == Some(class) => {
                Ok(IrType::struct_ptr(class))
            }
            other => Err(CompileError::unknown_class(other)),
        }
    }

    /// Split a binder, `x` or `(x type)`, into its name and type.
    ///
    /// `self` inside a class always has the class pointer type, whatever
    /// its annotation says.
    pub(crate) fn resolve_binder(&self, binder: &Exp, form: &str, cx: &LowerCx) -> Result<(String, IrType)> {
        let (name, ty) = match binder {
            Exp::Symbol(name) => (name.clone(), None),
            Exp::List(items) => match items.as_slice() {
                [Exp::Symbol(name), Exp::Symbol(ty)] => (name.clone(), Some(ty.as_str())),
                _ => {
                    return Err(CompileError::malformed(
                        form,
                        format!("expected a name or (name type), found {}", binder),
                    ))
                }
            },
            other => {
                return Err(CompileError::malformed(
                    form,
                    format!("expected a name, found {} {}", other.kind_name(), other),
                ))
            }
        };

        if name == "self" {
            if let Some(class) = &cx.class {
                return Ok((name, IrType::struct_ptr(class.as_str())));
            }
        }

        let ty = match ty {
            Some(ty) => self.resolve_type_name(ty, cx)?,
            None => DEFAULT_TYPE,
        };
        Ok((name, ty))
    }

    /// Convert `value` so it can be stored into or passed as `to`.
    ///
    /// Pointers are bitcast to other pointers, integers are zero-extended or
    /// truncated; anything else is a [`CompileError::TypeMismatch`].
    pub(crate) fn coerce(&mut self, value: IrValue, to: &IrType, context: &str) -> Result<IrValue> {
        let from = self.type_of(&value)?;
        if &from == to {
            return Ok(value);
        }

        if from.is_pointer() && to.is_pointer() {
            let cast = self
                .builder
                .build_cast(CastOp::Bitcast, value, to.clone())
                .ok_or_else(|| builder_error("bitcast"))?;
            return Ok(cast.into());
        }

        match (from.int_bits(), to.int_bits()) {
            (Some(from_bits), Some(to_bits)) => {
                if let Some(constant) = value.as_int() {
                    let unsigned = if from_bits < 64 {
                        constant & ((1i64 << from_bits) - 1)
                    } else {
                        constant
                    };
                    return Ok(IrValue::int(to.clone(), unsigned));
                }
                let op = if from_bits < to_bits {
                    CastOp::ZExt
                } else {
                    CastOp::Trunc
                };
                let cast = self
                    .builder
                    .build_cast(op, value, to.clone())
                    .ok_or_else(|| builder_error("integer cast"))?;
                Ok(cast.into())
            }
            _ => Err(CompileError::mismatch(to, &from, context)),
        }
    }

    /// Turn a branch condition into an `i1`, comparing integers against zero
    pub(crate) fn to_condition(&mut self, value: IrValue, context: &str) -> Result<IrValue> {
        let ty = self.type_of(&value)?;
        match ty {
            IrType::I1 => Ok(value),
            ty if ty.is_integer() => {
                let zero = IrValue::int(ty, 0);
                let test = self
                    .builder
                    .build_cmp(CompareOp::Ne, value, zero)
                    .ok_or_else(|| builder_error("icmp"))?;
                Ok(test.into())
            }
            other => Err(CompileError::mismatch(&IrType::I1, &other, context)),
        }
    }

    /// Promote `i1`/`i8` arguments of a variadic call to `i32`
    pub(crate) fn promote_vararg(&mut self, value: IrValue) -> Result<IrValue> {
        match self.type_of(&value)? {
            IrType::I1 | IrType::I8 => self.coerce(value, &IrType::I32, "variadic argument"),
            _ => Ok(value),
        }
    }

    pub(crate) fn type_of(&self, value: &IrValue) -> Result<IrType> {
        self.builder
            .type_of(value)
            .ok_or_else(|| CompileError::internal(format!("no type for operand {:?}", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::tests::codegen_in_main;
    use crate::ir::IrInstruction;

    fn cx() -> LowerCx {
        LowerCx::function("main")
    }

    #[test]
    fn test_type_names() {
        let config = Default::default();
        let codegen = codegen_in_main(&config);
        assert_eq!(codegen.resolve_type_name("number", &cx()).unwrap(), IrType::I32);
        assert_eq!(codegen.resolve_type_name("string", &cx()).unwrap(), IrType::byte_ptr());
        assert_eq!(
            codegen.resolve_type_name("Point", &cx()).unwrap_err(),
            CompileError::unknown_class("Point")
        );

        let in_class = LowerCx::method("Point_calc", "Point");
        assert_eq!(
            codegen.resolve_type_name("Point", &in_class).unwrap(),
            IrType::struct_ptr("Point")
        );
    }

    #[test]
    fn test_binders() {
        let config = Default::default();
        let codegen = codegen_in_main(&config);
        let binder = parser::parse_expression("(s string)").unwrap();
        assert_eq!(
            codegen.resolve_binder(&binder, "var", &cx()).unwrap(),
            ("s".to_string(), IrType::byte_ptr())
        );
        assert_eq!(
            codegen.resolve_binder(&Exp::symbol("x"), "var", &cx()).unwrap(),
            ("x".to_string(), IrType::I32)
        );

        let method = LowerCx::method("Point_calc", "Point");
        assert_eq!(
            codegen.resolve_binder(&Exp::symbol("self"), "def", &method).unwrap().1,
            IrType::struct_ptr("Point")
        );

        let bad = parser::parse_expression("(x number extra)").unwrap();
        assert!(matches!(
            codegen.resolve_binder(&bad, "var", &cx()),
            Err(CompileError::MalformedForm { .. })
        ));
    }

    #[test]
    fn test_coercions() {
        let config = Default::default();
        let mut codegen = codegen_in_main(&config);

        // Constants convert without emitting instructions
        let widened = codegen.coerce(IrValue::bool(true), &IrType::I32, "test").unwrap();
        assert_eq!(widened, IrValue::i32(1));

        let err = codegen
            .coerce(IrValue::Str(".str.0".into()), &IrType::I32, "var x")
            .unwrap_err();
        assert_eq!(err, CompileError::mismatch(&IrType::I32, &IrType::byte_ptr(), "var x"));

        let null = IrValue::Null(IrType::struct_ptr("Point3D"));
        let cast = codegen.coerce(null, &IrType::struct_ptr("Point"), "arg").unwrap();
        assert_eq!(codegen.type_of(&cast).unwrap(), IrType::struct_ptr("Point"));

        let main = codegen.builder.current_function().unwrap();
        let entry = main.block(main.entry_block()).unwrap();
        assert!(matches!(
            entry.instructions.as_slice(),
            [IrInstruction::Cast { op: CastOp::Bitcast, .. }]
        ));
    }

    #[test]
    fn test_conditions() {
        let config = Default::default();
        let mut codegen = codegen_in_main(&config);
        assert_eq!(
            codegen.to_condition(IrValue::bool(false), "if").unwrap(),
            IrValue::bool(false)
        );
        let test = codegen.to_condition(IrValue::i32(3), "if").unwrap();
        assert_eq!(codegen.type_of(&test).unwrap(), IrType::I1);
        assert!(codegen
            .to_condition(IrValue::Null(IrType::byte_ptr()), "while")
            .is_err());
    }
}
