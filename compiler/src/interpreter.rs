//! IR interpreter
//!
//! Executes a generated [`IrModule`] directly, starting from `main`, so
//! compiled programs can be run and checked without a native toolchain.
//!
//! ## Memory model
//! Every alloca, heap allocation and global is an *allocation*: a vector of
//! typed cells. Aggregates are flattened, one cell per scalar field, and a
//! pointer is an `(allocation, cell offset)` pair. Struct GEP advances the
//! offset by the flattened size of the preceding fields; casts keep the
//! pointer as is.
//!
//! The configured allocator symbol returns a fresh allocation and the
//! configured formatter implements a printf subset writing into
//! [`RunOutput::stdout`].

use crate::ir::{
    BinaryOp, CastOp, CompareOp, IrBasicBlock, IrBlockId, IrConstant, IrFunction, IrInstruction,
    IrModule, IrTerminator, IrType, IrValue,
};
use fxhash::FxHashMap;
use log::{debug, trace};
use std::fmt;

/// Maximum call depth before reporting a stack overflow
pub const MAX_CALL_DEPTH: usize = 256;

/// Default budget of executed instructions
pub const DEFAULT_STEP_LIMIT: u64 = 50_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub alloc: usize,
    pub offset: usize,
}

/// Runtime value held in a register or memory cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Ptr(Pointer),
    Null,
    Function(String),
    Undef,
}

impl Value {
    fn as_int(&self, context: &str) -> Result<i64, InterpError> {
        match self {
            Value::Int(value) => Ok(*value),
            Value::Undef => Err(InterpError::UndefinedValue(context.to_string())),
            other => Err(InterpError::TypeError(format!(
                "{}: expected an integer, found {:?}",
                context, other
            ))),
        }
    }

    fn as_pointer(&self, context: &str) -> Result<Pointer, InterpError> {
        match self {
            Value::Ptr(pointer) => Ok(*pointer),
            Value::Null => Err(InterpError::NullPointer(context.to_string())),
            Value::Undef => Err(InterpError::UndefinedValue(context.to_string())),
            other => Err(InterpError::TypeError(format!(
                "{}: expected a pointer, found {:?}",
                context, other
            ))),
        }
    }
}

/// Result of running `main`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub exit_code: i64,
    pub stdout: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterpError {
    FunctionNotFound(String),
    BlockNotFound { function: String, block: IrBlockId },
    StackOverflow,
    StepLimitExceeded(u64),
    DivisionByZero,
    NullPointer(String),
    UndefinedValue(String),
    OutOfBounds(String),
    TypeError(String),
    Format(String),
}

impl fmt::Display for InterpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpError::FunctionNotFound(name) => write!(f, "function not found: @{}", name),
            InterpError::BlockNotFound { function, block } => {
                write!(f, "block {} not found in @{}", block, function)
            }
            InterpError::StackOverflow => write!(f, "stack overflow"),
            InterpError::StepLimitExceeded(limit) => {
                write!(f, "step limit of {} instructions exceeded", limit)
            }
            InterpError::DivisionByZero => write!(f, "division by zero"),
            InterpError::NullPointer(context) => write!(f, "null pointer access in {}", context),
            InterpError::UndefinedValue(context) => write!(f, "undefined value used in {}", context),
            InterpError::OutOfBounds(context) => write!(f, "out of bounds access in {}", context),
            InterpError::TypeError(msg) => write!(f, "type error: {}", msg),
            InterpError::Format(msg) => write!(f, "format error: {}", msg),
        }
    }
}

impl std::error::Error for InterpError {}

struct Frame {
    registers: Vec<Value>,
    prev_block: Option<IrBlockId>,
}

pub struct Interpreter<'m> {
    module: &'m IrModule,
    allocator: String,
    formatter: String,
    heap: Vec<Vec<Value>>,
    globals: FxHashMap<String, usize>,
    stdout: String,
    depth: usize,
    steps: u64,
    step_limit: u64,
}

impl<'m> Interpreter<'m> {
    /// Prepare an interpreter; globals are materialized immediately
    pub fn new(module: &'m IrModule, allocator: &str, formatter: &str) -> Self {
        let mut interp = Self {
            module,
            allocator: allocator.to_string(),
            formatter: formatter.to_string(),
            heap: Vec::new(),
            globals: FxHashMap::default(),
            stdout: String::new(),
            depth: 0,
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
        };
        for global in module.globals.values() {
            let mut cells = Vec::new();
            flatten_constant(&global.initializer, &mut cells);
            let alloc = interp.allocate(cells);
            interp.globals.insert(global.name.clone(), alloc);
        }
        interp
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Run `main` and collect its exit code and formatted output
    pub fn run_main(mut self) -> Result<RunOutput, InterpError> {
        let result = self.call_function("main", Vec::new())?;
        let exit_code = match result {
            Value::Int(code) => code,
            _ => 0,
        };
        debug!("main returned {} after {} steps", exit_code, self.steps);
        Ok(RunOutput {
            exit_code,
            stdout: self.stdout,
        })
    }

    /// Call any function in the module by name
    pub fn call_function(&mut self, name: &str, args: Vec<Value>) -> Result<Value, InterpError> {
        if name == self.allocator {
            return self.builtin_alloc(&args);
        }
        if name == self.formatter {
            return self.builtin_format(&args);
        }

        let module = self.module;
        let function = module
            .get_function(name)
            .filter(|f| !f.is_declaration())
            .ok_or_else(|| InterpError::FunctionNotFound(name.to_string()))?;

        if self.depth >= MAX_CALL_DEPTH {
            return Err(InterpError::StackOverflow);
        }
        self.depth += 1;
        let result = self.execute(function, args);
        self.depth -= 1;
        result
    }

    fn allocate(&mut self, cells: Vec<Value>) -> usize {
        self.heap.push(cells);
        self.heap.len() - 1
    }

    fn execute(&mut self, function: &'m IrFunction, args: Vec<Value>) -> Result<Value, InterpError> {
        trace!("enter @{}", function.name);
        let mut frame = Frame {
            registers: vec![Value::Undef; function.registers.len()],
            prev_block: None,
        };
        for (param, arg) in function.signature.params.iter().zip(args) {
            frame.registers[param.reg.index()] = arg;
        }

        let mut current = function.entry_block();
        loop {
            let block = function
                .block(current)
                .ok_or_else(|| InterpError::BlockNotFound {
                    function: function.name.clone(),
                    block: current,
                })?;

            self.execute_phi_nodes(&mut frame, block)?;
            for inst in &block.instructions {
                self.steps += 1;
                if self.steps > self.step_limit {
                    return Err(InterpError::StepLimitExceeded(self.step_limit));
                }
                self.execute_instruction(&mut frame, inst)?;
            }

            let next = match &block.terminator {
                Some(IrTerminator::Branch { target }) => *target,
                Some(IrTerminator::CondBranch {
                    condition,
                    true_target,
                    false_target,
                }) => {
                    let condition = self.eval(&frame, condition)?.as_int("br")?;
                    if condition != 0 {
                        *true_target
                    } else {
                        *false_target
                    }
                }
                Some(IrTerminator::Return { value }) => {
                    trace!("leave @{}", function.name);
                    return match value {
                        Some(value) => self.eval(&frame, value),
                        None => Ok(Value::Undef),
                    };
                }
                Some(IrTerminator::Unreachable) | None => {
                    return Err(InterpError::TypeError(format!(
                        "fell off block {} in @{}",
                        current, function.name
                    )))
                }
            };
            frame.prev_block = Some(current);
            current = next;
        }
    }

    fn execute_phi_nodes(&mut self, frame: &mut Frame, block: &IrBasicBlock) -> Result<(), InterpError> {
        let prev = match frame.prev_block {
            Some(prev) => prev,
            None => return Ok(()),
        };

        // All phis read the incoming state before any of them is written
        let mut values = Vec::with_capacity(block.phi_nodes.len());
        for phi in &block.phi_nodes {
            let (_, incoming) = phi
                .incoming
                .iter()
                .find(|(from, _)| *from == prev)
                .ok_or_else(|| InterpError::UndefinedValue(format!("phi without edge from {}", prev)))?;
            values.push((phi.dest, self.eval(frame, incoming)?));
        }
        for (dest, value) in values {
            frame.registers[dest.index()] = value;
        }
        Ok(())
    }

    fn execute_instruction(&mut self, frame: &mut Frame, inst: &IrInstruction) -> Result<(), InterpError> {
        let (dest, value) = match inst {
            IrInstruction::Alloca { dest, ty } => {
                let cells = vec![Value::Undef; self.cell_count(ty)];
                let alloc = self.allocate(cells);
                (Some(*dest), Value::Ptr(Pointer { alloc, offset: 0 }))
            }
            IrInstruction::Load { dest, ptr, .. } => {
                let pointer = self.eval(frame, ptr)?.as_pointer("load")?;
                let value = self.read(pointer)?;
                if value == Value::Undef {
                    return Err(InterpError::UndefinedValue("load".to_string()));
                }
                (Some(*dest), value)
            }
            IrInstruction::Store { value, ptr, .. } => {
                let value = self.eval(frame, value)?;
                let pointer = self.eval(frame, ptr)?.as_pointer("store")?;
                self.write(pointer, value)?;
                (None, Value::Undef)
            }
            IrInstruction::StructGep {
                dest,
                struct_name,
                ptr,
                index,
            } => {
                let pointer = self.eval(frame, ptr)?.as_pointer("getelementptr")?;
                let offset = self.field_offset(struct_name, *index as usize);
                (
                    Some(*dest),
                    Value::Ptr(Pointer {
                        alloc: pointer.alloc,
                        offset: pointer.offset + offset,
                    }),
                )
            }
            IrInstruction::BinOp {
                dest,
                op,
                ty,
                left,
                right,
            } => {
                let l = self.eval(frame, left)?.as_int(op.mnemonic())?;
                let r = self.eval(frame, right)?.as_int(op.mnemonic())?;
                let raw = match op {
                    BinaryOp::Add => l.wrapping_add(r),
                    BinaryOp::Sub => l.wrapping_sub(r),
                    BinaryOp::Mul => l.wrapping_mul(r),
                    BinaryOp::Div => {
                        if r == 0 {
                            return Err(InterpError::DivisionByZero);
                        }
                        l.wrapping_div(r)
                    }
                };
                (Some(*dest), Value::Int(ty.wrap(raw)))
            }
            IrInstruction::Cmp {
                dest,
                op,
                left,
                right,
                ..
            } => {
                let l = self.eval(frame, left)?;
                let r = self.eval(frame, right)?;
                let result = match (&l, &r) {
                    (Value::Int(a), Value::Int(b)) => op.evaluate(*a, *b),
                    _ => match op {
                        CompareOp::Eq => l == r,
                        CompareOp::Ne => l != r,
                        _ => {
                            return Err(InterpError::TypeError(format!(
                                "icmp {} on non-integers",
                                op.predicate()
                            )))
                        }
                    },
                };
                (Some(*dest), Value::Int(result as i64))
            }
            IrInstruction::Cast {
                dest,
                op,
                value,
                from,
                to,
            } => {
                let value = self.eval(frame, value)?;
                let value = match op {
                    CastOp::Bitcast => value,
                    CastOp::ZExt => {
                        let bits = from.int_bits().unwrap_or(64);
                        let raw = value.as_int("zext")?;
                        let masked = if bits >= 64 {
                            raw
                        } else {
                            raw & ((1i64 << bits) - 1)
                        };
                        Value::Int(to.wrap(masked))
                    }
                    CastOp::Trunc => Value::Int(to.wrap(value.as_int("trunc")?)),
                };
                (Some(*dest), value)
            }
            IrInstruction::CallDirect { dest, func, args, .. } => {
                let args = self.eval_args(frame, args)?;
                (*dest, self.call_function(func, args)?)
            }
            IrInstruction::CallIndirect {
                dest, func_ptr, args, ..
            } => {
                let target = match self.eval(frame, func_ptr)? {
                    Value::Function(name) => name,
                    Value::Null => return Err(InterpError::NullPointer("indirect call".to_string())),
                    other => {
                        return Err(InterpError::TypeError(format!(
                            "indirect call through {:?}",
                            other
                        )))
                    }
                };
                let args = self.eval_args(frame, args)?;
                (*dest, self.call_function(&target, args)?)
            }
        };

        if let Some(dest) = dest {
            frame.registers[dest.index()] = value;
        }
        Ok(())
    }

    fn eval_args(&self, frame: &Frame, args: &[IrValue]) -> Result<Vec<Value>, InterpError> {
        args.iter().map(|arg| self.eval(frame, arg)).collect()
    }

    fn eval(&self, frame: &Frame, value: &IrValue) -> Result<Value, InterpError> {
        Ok(match value {
            IrValue::Reg(id) => frame
                .registers
                .get(id.index())
                .cloned()
                .unwrap_or(Value::Undef),
            IrValue::Int { value, .. } => Value::Int(*value),
            IrValue::Null(_) => Value::Null,
            IrValue::Undef(_) => Value::Undef,
            IrValue::Function(name) => Value::Function(name.clone()),
            IrValue::Global(name) | IrValue::Str(name) => {
                let alloc = self
                    .globals
                    .get(name)
                    .copied()
                    .ok_or_else(|| InterpError::TypeError(format!("unknown global @{}", name)))?;
                Value::Ptr(Pointer { alloc, offset: 0 })
            }
        })
    }

    fn read(&self, pointer: Pointer) -> Result<Value, InterpError> {
        self.heap
            .get(pointer.alloc)
            .and_then(|cells| cells.get(pointer.offset))
            .cloned()
            .ok_or_else(|| InterpError::OutOfBounds(format!("read at {:?}", pointer)))
    }

    fn write(&mut self, pointer: Pointer, value: Value) -> Result<(), InterpError> {
        let cell = self
            .heap
            .get_mut(pointer.alloc)
            .and_then(|cells| cells.get_mut(pointer.offset))
            .ok_or_else(|| InterpError::OutOfBounds(format!("write at {:?}", pointer)))?;
        *cell = value;
        Ok(())
    }

    fn cell_count(&self, ty: &IrType) -> usize {
        match ty {
            IrType::Struct(name) => self
                .module
                .struct_fields(name)
                .map(|fields| fields.iter().map(|f| self.cell_count(f)).sum())
                .unwrap_or(0),
            IrType::Array(element, count) => self.cell_count(element) * count,
            _ => 1,
        }
    }

    fn field_offset(&self, struct_name: &str, index: usize) -> usize {
        self.module
            .struct_fields(struct_name)
            .map(|fields| fields.iter().take(index).map(|f| self.cell_count(f)).sum())
            .unwrap_or(0)
    }

    // === Runtime primitives ===

    fn builtin_alloc(&mut self, args: &[Value]) -> Result<Value, InterpError> {
        let size = args
            .first()
            .ok_or_else(|| InterpError::TypeError("allocator called without a size".to_string()))?
            .as_int("allocator")?;
        // One cell per byte is always enough for the flattened layout
        let cells = vec![Value::Undef; size.max(1) as usize];
        let alloc = self.allocate(cells);
        Ok(Value::Ptr(Pointer { alloc, offset: 0 }))
    }

    fn read_c_string(&self, value: &Value) -> Result<String, InterpError> {
        let pointer = value.as_pointer("string read")?;
        let mut bytes = Vec::new();
        let mut offset = pointer.offset;
        loop {
            let byte = self
                .read(Pointer {
                    alloc: pointer.alloc,
                    offset,
                })?
                .as_int("string read")?;
            if byte == 0 {
                break;
            }
            bytes.push(byte as u8);
            offset += 1;
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn builtin_format(&mut self, args: &[Value]) -> Result<Value, InterpError> {
        let format = args
            .first()
            .ok_or_else(|| InterpError::Format("missing format string".to_string()))?;
        let format = self.read_c_string(format)?;
        let mut rest = args[1..].iter();
        let mut next_arg = |spec: char| {
            rest.next()
                .ok_or_else(|| InterpError::Format(format!("missing argument for %{}", spec)))
        };

        let mut out = String::new();
        let mut chars = format.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('%') => out.push('%'),
                Some(spec @ ('d' | 'i')) => out.push_str(&next_arg(spec)?.as_int("printf")?.to_string()),
                Some('u') => out.push_str(&(next_arg('u')?.as_int("printf")? as u32).to_string()),
                Some('x') => out.push_str(&format!("{:x}", next_arg('x')?.as_int("printf")? as u32)),
                Some('c') => out.push((next_arg('c')?.as_int("printf")? as u8) as char),
                Some('s') => {
                    let arg = next_arg('s')?.clone();
                    out.push_str(&self.read_c_string(&arg)?);
                }
                Some(other) => {
                    return Err(InterpError::Format(format!("unsupported conversion %{}", other)))
                }
                None => return Err(InterpError::Format("dangling %".to_string())),
            }
        }

        let written = out.len() as i64;
        self.stdout.push_str(&out);
        Ok(Value::Int(written))
    }
}

fn flatten_constant(constant: &IrConstant, cells: &mut Vec<Value>) {
    match constant {
        IrConstant::Int { value, .. } => cells.push(Value::Int(*value)),
        IrConstant::Null(_) => cells.push(Value::Null),
        IrConstant::Bytes(bytes) => cells.extend(bytes.iter().map(|b| Value::Int(*b as i64))),
        IrConstant::Function(name) => cells.push(Value::Function(name.clone())),
        IrConstant::Struct { fields, .. } => {
            for field in fields {
                flatten_constant(field, cells);
            }
        }
    }
}

/// Run `main` of a module with the given runtime symbol names
pub fn execute(module: &IrModule, allocator: &str, formatter: &str) -> Result<RunOutput, InterpError> {
    Interpreter::new(module, allocator, formatter).run_main()
}
