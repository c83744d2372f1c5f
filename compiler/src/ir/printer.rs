//! LLVM textual IR printer
//!
//! Renders an [`IrModule`] as `.ll` text with typed pointers. Output depends
//! only on insertion order, so compiling the same source twice prints the
//! same bytes.

use super::{
    IrBasicBlock, IrBlockId, IrConstant, IrFunction, IrGlobal, IrId, IrInstruction, IrModule,
    IrTerminator, IrType, IrValue,
};
use std::fmt::{self, Write};

/// Render a whole module
pub fn print_module(module: &IrModule) -> String {
    ModulePrinter { module }.to_string()
}

/// Render one function, e.g. for `--print-ir` style debugging of a single body
pub fn print_function(module: &IrModule, function: &IrFunction) -> String {
    let mut out = String::new();
    let _ = ModulePrinter { module }.write_function(&mut out, function);
    out
}

struct ModulePrinter<'a> {
    module: &'a IrModule,
}

impl fmt::Display for ModulePrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let module = self.module;
        writeln!(f, "; ModuleID = '{}'", module.name)?;
        writeln!(f, "source_filename = \"{}\"", module.name)?;
        if let Some(triple) = &module.target_triple {
            writeln!(f, "target triple = \"{}\"", triple)?;
        }

        if !module.struct_types.is_empty() {
            writeln!(f)?;
            for (name, body) in &module.struct_types {
                match body {
                    Some(fields) if fields.is_empty() => writeln!(f, "%{} = type {{}}", name)?,
                    Some(fields) => writeln!(f, "%{} = type {{ {} }}", name, join_types(fields))?,
                    None => writeln!(f, "%{} = type opaque", name)?,
                }
            }
        }

        if !module.globals.is_empty() {
            writeln!(f)?;
            for global in module.globals.values() {
                self.write_global(f, global)?;
            }
        }

        for function in module.functions.values() {
            writeln!(f)?;
            self.write_function(f, function)?;
        }
        Ok(())
    }
}

impl ModulePrinter<'_> {
    fn write_global(&self, out: &mut impl Write, global: &IrGlobal) -> fmt::Result {
        write!(out, "@{} = ", global.name)?;
        if let Some(keyword) = global.linkage.keyword() {
            write!(out, "{} ", keyword)?;
        }
        if global.unnamed_addr {
            write!(out, "unnamed_addr ")?;
        }
        let kind = if global.is_constant { "constant" } else { "global" };
        write!(
            out,
            "{} {} {}",
            kind,
            global.ty,
            self.constant(&global.ty, &global.initializer)
        )?;
        if let Some(align) = global.align {
            write!(out, ", align {}", align)?;
        }
        writeln!(out)
    }

    fn constant(&self, ty: &IrType, constant: &IrConstant) -> String {
        match constant {
            IrConstant::Int { ty, value } => int_literal(ty, *value),
            IrConstant::Null(_) => "null".to_string(),
            IrConstant::Bytes(bytes) => format!("c\"{}\"", escape_bytes(bytes)),
            IrConstant::Function(name) => format!("@{}", name),
            IrConstant::Struct { name, fields } => {
                let field_types = self.module.struct_fields(name).unwrap_or(&[]);
                let rendered: Vec<String> = fields
                    .iter()
                    .enumerate()
                    .map(|(i, field)| {
                        let field_ty = field_types.get(i).cloned().unwrap_or_else(|| ty.clone());
                        format!("{} {}", field_ty, self.constant(&field_ty, field))
                    })
                    .collect();
                if rendered.is_empty() {
                    return "{}".to_string();
                }
                format!("{{ {} }}", rendered.join(", "))
            }
        }
    }

    fn write_function(&self, out: &mut impl Write, function: &IrFunction) -> fmt::Result {
        let signature = &function.signature;
        let mut params: Vec<String> = if function.is_declaration() {
            signature.params.iter().map(|p| p.ty.to_string()).collect()
        } else {
            signature
                .params
                .iter()
                .map(|p| format!("{} {}", p.ty, function.register_name(p.reg)))
                .collect()
        };
        if signature.varargs {
            params.push("...".to_string());
        }

        if function.is_declaration() {
            return writeln!(
                out,
                "declare {} @{}({})",
                signature.return_type,
                function.name,
                params.join(", ")
            );
        }

        writeln!(
            out,
            "define {} @{}({}) {{",
            signature.return_type,
            function.name,
            params.join(", ")
        )?;
        for (i, block) in function.attached_blocks().enumerate() {
            if i > 0 {
                writeln!(out)?;
            }
            self.write_block(out, function, block)?;
        }
        writeln!(out, "}}")
    }

    fn write_block(
        &self,
        out: &mut impl Write,
        function: &IrFunction,
        block: &IrBasicBlock,
    ) -> fmt::Result {
        writeln!(out, "{}:", block.display_name())?;

        for phi in &block.phi_nodes {
            let incoming: Vec<String> = phi
                .incoming
                .iter()
                .map(|(pred, value)| {
                    format!(
                        "[ {}, {} ]",
                        self.value(function, value),
                        block_name(function, *pred)
                    )
                })
                .collect();
            writeln!(
                out,
                "  {} = phi {} {}",
                function.register_name(phi.dest),
                phi.ty,
                incoming.join(", ")
            )?;
        }

        for inst in &block.instructions {
            writeln!(out, "  {}", self.instruction(function, inst))?;
        }

        match &block.terminator {
            Some(term) => writeln!(out, "  {}", self.terminator(function, term)),
            None => writeln!(out, "  ; missing terminator"),
        }
    }

    fn instruction(&self, function: &IrFunction, inst: &IrInstruction) -> String {
        let reg = |id| function.register_name(id);
        match inst {
            IrInstruction::Alloca { dest, ty } => format!("{} = alloca {}", reg(*dest), ty),
            IrInstruction::Load { dest, ty, ptr } => format!(
                "{} = load {}, {}* {}",
                reg(*dest),
                ty,
                ty,
                self.value(function, ptr)
            ),
            IrInstruction::Store { ty, value, ptr } => format!(
                "store {} {}, {}* {}",
                ty,
                self.value(function, value),
                ty,
                self.value(function, ptr)
            ),
            IrInstruction::StructGep {
                dest,
                struct_name,
                ptr,
                index,
            } => format!(
                "{} = getelementptr inbounds %{}, %{}* {}, i32 0, i32 {}",
                reg(*dest),
                struct_name,
                struct_name,
                self.value(function, ptr),
                index
            ),
            IrInstruction::BinOp {
                dest,
                op,
                ty,
                left,
                right,
            } => format!(
                "{} = {} {} {}, {}",
                reg(*dest),
                op.mnemonic(),
                ty,
                self.value(function, left),
                self.value(function, right)
            ),
            IrInstruction::Cmp {
                dest,
                op,
                ty,
                left,
                right,
            } => format!(
                "{} = icmp {} {} {}, {}",
                reg(*dest),
                op.predicate(),
                ty,
                self.value(function, left),
                self.value(function, right)
            ),
            IrInstruction::Cast {
                dest,
                op,
                value,
                from,
                to,
            } => format!(
                "{} = {} {} {} to {}",
                reg(*dest),
                op,
                from,
                self.value(function, value),
                to
            ),
            IrInstruction::CallDirect {
                dest,
                func,
                signature,
                args,
            } => self.call(function, *dest, &format!("@{}", func), signature, args),
            IrInstruction::CallIndirect {
                dest,
                func_ptr,
                signature,
                args,
            } => self.call(
                function,
                *dest,
                &self.value(function, func_ptr),
                signature,
                args,
            ),
        }
    }

    fn call(
        &self,
        function: &IrFunction,
        dest: Option<IrId>,
        callee: &str,
        signature: &IrType,
        args: &[IrValue],
    ) -> String {
        let (callee_ty, return_type) = match signature.function_parts() {
            // Variadic callees need the full function type at the call site
            Some((_, ret, true)) => (signature.to_string(), ret.clone()),
            Some((_, ret, false)) => (ret.to_string(), ret.clone()),
            None => (signature.to_string(), IrType::Void),
        };
        let args: Vec<String> = args
            .iter()
            .map(|arg| self.typed_value(function, arg))
            .collect();
        let call = format!("call {} {}({})", callee_ty, callee, args.join(", "));
        match dest {
            Some(dest) if !return_type.is_void() => {
                format!("{} = {}", function.register_name(dest), call)
            }
            _ => call,
        }
    }

    fn terminator(&self, function: &IrFunction, term: &IrTerminator) -> String {
        match term {
            IrTerminator::Branch { target } => format!("br {}", block_ref(function, *target)),
            IrTerminator::CondBranch {
                condition,
                true_target,
                false_target,
            } => format!(
                "br i1 {}, {}, {}",
                self.value(function, condition),
                block_ref(function, *true_target),
                block_ref(function, *false_target)
            ),
            IrTerminator::Return { value: Some(value) } => {
                format!("ret {}", self.typed_value(function, value))
            }
            IrTerminator::Return { value: None } => "ret void".to_string(),
            IrTerminator::Unreachable => "unreachable".to_string(),
        }
    }

    fn typed_value(&self, function: &IrFunction, value: &IrValue) -> String {
        let ty = self
            .module
            .type_of_value(Some(function), value)
            .unwrap_or(IrType::Void);
        format!("{} {}", ty, self.value(function, value))
    }

    fn value(&self, function: &IrFunction, value: &IrValue) -> String {
        match value {
            IrValue::Reg(id) => function.register_name(*id),
            IrValue::Int { ty, value } => int_literal(ty, *value),
            IrValue::Null(_) => "null".to_string(),
            IrValue::Undef(_) => "undef".to_string(),
            IrValue::Global(name) | IrValue::Function(name) => format!("@{}", name),
            IrValue::Str(name) => {
                let array_ty = self
                    .module
                    .get_global(name)
                    .map(|global| global.ty.clone())
                    .unwrap_or(IrType::Array(Box::new(IrType::I8), 0));
                format!(
                    "getelementptr inbounds ({}, {}* @{}, i64 0, i64 0)",
                    array_ty, array_ty, name
                )
            }
        }
    }
}

/// `%name`, as phi operands spell a predecessor
fn block_name(function: &IrFunction, id: IrBlockId) -> String {
    match function.block(id) {
        Some(block) => format!("%{}", block.display_name()),
        None => format!("%{}", id),
    }
}

/// `label %name`, the branch operand form
fn block_ref(function: &IrFunction, id: IrBlockId) -> String {
    format!("label {}", block_name(function, id))
}

fn int_literal(ty: &IrType, value: i64) -> String {
    match ty {
        IrType::I1 if value != 0 => "true".to_string(),
        IrType::I1 => "false".to_string(),
        _ => value.to_string(),
    }
}

fn join_types(types: &[IrType]) -> String {
    types
        .iter()
        .map(IrType::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Printable ASCII stays as-is; everything else, `"` and `\` become `\XX`
fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        if (0x20..0x7f).contains(&byte) && byte != b'"' && byte != b'\\' {
            out.push(byte as char);
        } else {
            let _ = write!(out, "\\{:02X}", byte);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, CompareOp, IrBuilder, IrGlobal};

    #[test]
    fn test_escape_bytes() {
        assert_eq!(escape_bytes(b"x = %d\n\0"), "x = %d\\0A\\00");
        assert_eq!(escape_bytes(b"say \"hi\""), "say \\22hi\\22");
    }

    #[test]
    fn test_print_small_module() {
        let mut builder = IrBuilder::new("EvaLLVM");
        builder.module.add_global(IrGlobal {
            align: Some(4),
            ..IrGlobal::variable(
                "VERSION",
                IrType::I32,
                IrConstant::Int { ty: IrType::I32, value: 42 },
            )
        });
        builder.declare_function("printf", vec![("fmt".into(), IrType::byte_ptr())], IrType::I32, true);
        builder.declare_function("main", vec![], IrType::I32, false);
        builder.begin_function("main").unwrap();

        let text = builder.module.add_string_constant("%d\n");
        let slot = builder.build_entry_alloca(IrType::I32, "x").unwrap();
        builder.build_store(IrValue::i32(40), slot.into()).unwrap();
        let x = builder.build_load(IrType::I32, slot.into(), "x").unwrap();
        let sum = builder.build_binop(BinaryOp::Add, x.into(), IrValue::i32(2)).unwrap();
        builder
            .build_call_direct("printf", vec![IrValue::Str(text), sum.into()], "tmp")
            .unwrap();
        builder.build_return(Some(IrValue::i32(0))).unwrap();

        let ll = print_module(&builder.finish());
        let expected = "\
; ModuleID = 'EvaLLVM'
source_filename = \"EvaLLVM\"

@VERSION = global i32 42, align 4
@.str.0 = private unnamed_addr constant [4 x i8] c\"%d\\0A\\00\"

declare i32 @printf(i8*, ...)

define i32 @main() {
entry:
  %x.0 = alloca i32
  store i32 40, i32* %x.0
  %x.1 = load i32, i32* %x.0
  %tmp.2 = add i32 %x.1, 2
  %tmp.3 = call i32 (i8*, ...) @printf(i8* getelementptr inbounds ([4 x i8], [4 x i8]* @.str.0, i64 0, i64 0), i32 %tmp.2)
  ret i32 0
}
";
        assert_eq!(ll, expected);
    }

    #[test]
    fn test_print_branches_and_phi() {
        // while (i < 3) { i = if (i > 1) i + 2 else i + 1 }
        let mut builder = IrBuilder::new("m");
        builder.declare_function("main", vec![], IrType::I32, false);
        builder.begin_function("main").unwrap();
        let slot = builder.build_entry_alloca(IrType::I32, "i").unwrap();
        builder.build_store(IrValue::i32(0), slot.into()).unwrap();

        let cond = builder.create_attached_block("cond").unwrap();
        let body = builder.create_block("body").unwrap();
        let loop_end = builder.create_block("loopend").unwrap();
        builder.build_branch(cond).unwrap();

        builder.switch_to_block(cond);
        let i = builder.build_load(IrType::I32, slot.into(), "i").unwrap();
        let test = builder.build_cmp(CompareOp::Lt, i.into(), IrValue::i32(3)).unwrap();
        builder.build_cond_branch(test.into(), body, loop_end).unwrap();

        builder.append_block(body).unwrap();
        builder.switch_to_block(body);
        let i = builder.build_load(IrType::I32, slot.into(), "i").unwrap();
        let test = builder.build_cmp(CompareOp::Gt, i.into(), IrValue::i32(1)).unwrap();
        let then_block = builder.create_attached_block("then").unwrap();
        let else_block = builder.create_block("else").unwrap();
        let if_end = builder.create_block("ifend").unwrap();
        builder.build_cond_branch(test.into(), then_block, else_block).unwrap();

        builder.switch_to_block(then_block);
        let big = builder.build_binop(BinaryOp::Add, i.into(), IrValue::i32(2)).unwrap();
        builder.build_branch(if_end).unwrap();
        builder.append_block(else_block).unwrap();
        builder.switch_to_block(else_block);
        let small = builder.build_binop(BinaryOp::Add, i.into(), IrValue::i32(1)).unwrap();
        builder.build_branch(if_end).unwrap();

        builder.append_block(if_end).unwrap();
        builder.switch_to_block(if_end);
        let merged = builder.build_phi(IrType::I32, "tmp").unwrap();
        builder.add_phi_incoming(if_end, merged, big.into(), then_block).unwrap();
        builder.add_phi_incoming(if_end, merged, small.into(), else_block).unwrap();
        builder.build_store(merged.into(), slot.into()).unwrap();
        builder.build_branch(cond).unwrap();

        builder.append_block(loop_end).unwrap();
        builder.switch_to_block(loop_end);
        builder.build_return(Some(IrValue::i32(0))).unwrap();

        let ll = print_module(&builder.finish());
        let expected = "\
; ModuleID = 'm'
source_filename = \"m\"

define i32 @main() {
entry:
  %i.0 = alloca i32
  store i32 0, i32* %i.0
  br label %cond.1

cond.1:
  %i.1 = load i32, i32* %i.0
  %tmp.2 = icmp slt i32 %i.1, 3
  br i1 %tmp.2, label %body.2, label %loopend.3

body.2:
  %i.3 = load i32, i32* %i.0
  %tmp.4 = icmp sgt i32 %i.3, 1
  br i1 %tmp.4, label %then.4, label %else.5

then.4:
  %tmp.5 = add i32 %i.3, 2
  br label %ifend.6

else.5:
  %tmp.6 = add i32 %i.3, 1
  br label %ifend.6

ifend.6:
  %tmp.7 = phi i32 [ %tmp.5, %then.4 ], [ %tmp.6, %else.5 ]
  store i32 %tmp.7, i32* %i.0
  br label %cond.1

loopend.3:
  ret i32 0
}
";
        assert_eq!(ll, expected);
    }

    #[test]
    fn test_struct_types_and_vtable_constant() {
        let mut module = IrModule::new("m");
        module.declare_struct("A_vTable");
        module.declare_struct("A");
        let method = IrType::function(vec![IrType::struct_ptr("A")], IrType::I32, false);
        module.set_struct_body("A_vTable", vec![method.pointer_to()]);
        module.set_struct_body("A", vec![IrType::struct_ptr("A_vTable"), IrType::I32]);
        module.add_global(IrGlobal::constant(
            "A_vTable",
            IrType::Struct("A_vTable".into()),
            IrConstant::Struct {
                name: "A_vTable".into(),
                fields: vec![IrConstant::Function("A_get".into())],
            },
        ));

        let ll = print_module(&module);
        assert!(ll.contains("%A_vTable = type { i32 (%A*)* }\n"));
        assert!(ll.contains("%A = type { %A_vTable*, i32 }\n"));
        assert!(ll.contains("@A_vTable = constant %A_vTable { i32 (%A*)* @A_get }\n"));
    }
}
