//! Instances: `new`, `prop` and `method`

use super::classes::VTABLE_INDEX;
use super::{builder_error, Codegen, LowerCx, ScopeId};
use crate::error::{CompileError, Result};
use crate::ir::{CastOp, IrType, IrValue};
use log::trace;
use parser::Exp;

impl Codegen<'_> {
    /// Class name behind an instance pointer
    fn instance_class(&self, value: &IrValue, context: &str) -> Result<String> {
        let ty = self.type_of(value)?;
        match ty.pointee_struct() {
            Some(class) if self.classes.contains(class) => Ok(class.to_string()),
            _ => Err(CompileError::TypeMismatch {
                expected: "class instance".to_string(),
                found: ty.to_string(),
                context: context.to_string(),
            }),
        }
    }

    /// `(new Class args...)`: heap-allocate, install the vtable, run the
    /// constructor
    pub(crate) fn lower_new(&mut self, items: &[Exp], scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        let class = match items.get(1).and_then(Exp::as_symbol) {
            Some(class) => class,
            None => return Err(CompileError::malformed("new", "expected (new Class args...)")),
        };
        let info = self.classes.get(class)?;
        let vtable = info.vtable_name();
        let constructor = info.methods.get("constructor").cloned();
        let args = &items[2..];

        let instance_ty = IrType::struct_ptr(class);
        let size = self.builder.module.size_of(&IrType::Struct(class.to_string()));
        let allocator = self.config.runtime.allocator.clone();
        let raw = self
            .builder
            .build_call_direct(&allocator, vec![IrValue::i64(size as i64)], "raw")
            .ok_or_else(|| builder_error("allocator call"))?;
        let instance: IrValue = self
            .builder
            .build_cast(CastOp::Bitcast, raw.into(), instance_ty)
            .ok_or_else(|| builder_error("bitcast"))?
            .into();

        let vtable_slot = self
            .builder
            .build_struct_gep(class, instance.clone(), VTABLE_INDEX, "vtable")
            .ok_or_else(|| builder_error("vtable gep"))?;
        self.builder
            .build_store(IrValue::Global(vtable), vtable_slot.into())
            .ok_or_else(|| builder_error("vtable store"))?;

        match constructor {
            Some(constructor) => {
                self.call_method_function(&constructor, instance.clone(), args, scope, cx)?;
            }
            None if !args.is_empty() => {
                return Err(CompileError::UnknownMethod {
                    class: class.to_string(),
                    method: "constructor".to_string(),
                })
            }
            None => {}
        }
        Ok(instance)
    }

    /// Direct call of a method function with an explicit receiver
    fn call_method_function(
        &mut self,
        function: &str,
        receiver: IrValue,
        args: &[Exp],
        scope: ScopeId,
        cx: &LowerCx,
    ) -> Result<IrValue> {
        let params = self
            .builder
            .module
            .get_function(function)
            .map(|f| f.signature.params.iter().map(|p| p.ty.clone()).collect::<Vec<_>>())
            .ok_or_else(|| builder_error("method lookup"))?;
        if params.len() != args.len() + 1 {
            return Err(CompileError::malformed(
                function,
                format!("expects {} arguments, got {}", params.len().saturating_sub(1), args.len()),
            ));
        }

        let mut values = Vec::with_capacity(params.len());
        values.push(self.coerce(receiver, &params[0], function)?);
        for (exp, ty) in args.iter().zip(&params[1..]) {
            let value = self.lower(exp, scope, cx)?;
            values.push(self.coerce(value, ty, function)?);
        }
        let result = self
            .builder
            .build_call_direct(function, values, "tmp")
            .ok_or_else(|| builder_error("method call"))?;
        Ok(result.into())
    }

    /// Address and type of `(prop object field)`
    fn prop_address(&mut self, items: &[Exp], scope: ScopeId, cx: &LowerCx) -> Result<(IrValue, IrType)> {
        let (object, field) = match items {
            [_, object, Exp::Symbol(field)] => (object, field),
            _ => return Err(CompileError::malformed("prop", "expected (prop object field)")),
        };

        let instance = self.lower(object, scope, cx)?;
        let class = self.instance_class(&instance, "prop")?;
        let (index, ty) = {
            let (index, ty) = self.classes.get(&class)?.field_index(field)?;
            (index, ty.clone())
        };
        trace!("prop {}.{} at slot {}", class, field, index);

        let address = self
            .builder
            .build_struct_gep(&class, instance, index, field)
            .ok_or_else(|| builder_error("field gep"))?;
        Ok((address.into(), ty))
    }

    /// `(prop object field)`
    pub(crate) fn lower_prop(&mut self, items: &[Exp], scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        let (address, ty) = self.prop_address(items, scope, cx)?;
        let name = items.get(2).and_then(Exp::as_symbol).unwrap_or("field");
        let value = self
            .builder
            .build_load(ty, address, name)
            .ok_or_else(|| builder_error("field load"))?;
        Ok(value.into())
    }

    /// `(set (prop object field) value)`
    pub(crate) fn store_prop(&mut self, target: &Exp, value: &Exp, scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        let items = target.as_list().unwrap_or_default();
        let (address, ty) = self.prop_address(items, scope, cx)?;
        let value = self.lower(value, scope, cx)?;
        let value = self.coerce(value, &ty, "set prop")?;
        self.builder
            .build_store(value.clone(), address)
            .ok_or_else(|| builder_error("field store"))?;
        Ok(value)
    }

    /// `(method object name)` or `(method (super Class) name)`: the function
    /// pointer in the receiver's vtable slot for `name`
    pub(crate) fn lower_method(&mut self, items: &[Exp], scope: ScopeId, cx: &LowerCx) -> Result<IrValue> {
        let (receiver, method) = match items {
            [_, receiver, Exp::Symbol(method)] => (receiver, method.as_str()),
            _ => return Err(CompileError::malformed("method", "expected (method object name)")),
        };

        let (class, vtable) = if receiver.is_form("super") {
            // Statically the parent's vtable
            let class = match receiver.as_list() {
                Some([_, Exp::Symbol(class)]) => class,
                _ => return Err(CompileError::malformed("super", "expected (super Class)")),
            };
            let parent = self.classes.get(class)?.parent.clone().ok_or_else(|| {
                CompileError::malformed("super", format!("class '{}' has no parent", class))
            })?;
            let vtable = IrValue::Global(self.classes.get(&parent)?.vtable_name());
            (parent, vtable)
        } else {
            let instance = self.lower(receiver, scope, cx)?;
            let class = self.instance_class(&instance, "method")?;
            let vtable_ty = IrType::struct_ptr(self.classes.get(&class)?.vtable_name());
            let slot = self
                .builder
                .build_struct_gep(&class, instance, VTABLE_INDEX, "vtable")
                .ok_or_else(|| builder_error("vtable gep"))?;
            let vtable = self
                .builder
                .build_load(vtable_ty, slot.into(), "vt")
                .ok_or_else(|| builder_error("vtable load"))?;
            (class, vtable.into())
        };

        let info = self.classes.get(&class)?;
        let index = info.method_index(method)?;
        let vtable_name = info.vtable_name();
        let method_ty = self
            .builder
            .module
            .struct_fields(&vtable_name)
            .and_then(|slots| slots.get(index as usize))
            .cloned()
            .ok_or_else(|| builder_error("vtable slot type"))?;

        let entry = self
            .builder
            .build_struct_gep(&vtable_name, vtable, index, method)
            .ok_or_else(|| builder_error("vtable entry gep"))?;
        let function = self
            .builder
            .build_load(method_ty, entry.into(), method)
            .ok_or_else(|| builder_error("vtable entry load"))?;
        Ok(function.into())
    }
}
