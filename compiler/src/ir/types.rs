//! IR Type System
//!
//! Types follow LLVM's typed-pointer model: `i32`, `i8*`, `%Point*`,
//! `[6 x i8]`, `i32 (i8*, ...)`. Struct types are referred to by name and
//! their bodies live in the module, so the same type can be used before its
//! layout is known.

use super::IrId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// IR type representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrType {
    /// No value
    Void,

    /// Integer types
    I1,
    I8,
    I32,
    I64,

    /// Pointer to a value of the inner type
    Ptr(Box<IrType>),

    /// Named struct type, body held by the module
    Struct(String),

    /// Fixed-size array
    Array(Box<IrType>, usize),

    /// Function signature
    Function {
        params: Vec<IrType>,
        return_type: Box<IrType>,
        varargs: bool,
    },
}

impl IrType {
    pub fn ptr(inner: IrType) -> Self {
        IrType::Ptr(Box::new(inner))
    }

    /// `i8*`, the stand-in for `char*` and `void*`
    pub fn byte_ptr() -> Self {
        IrType::ptr(IrType::I8)
    }

    /// Pointer to the named struct, e.g. `%Point*`
    pub fn struct_ptr(name: impl Into<String>) -> Self {
        IrType::ptr(IrType::Struct(name.into()))
    }

    pub fn function(params: Vec<IrType>, return_type: IrType, varargs: bool) -> Self {
        IrType::Function {
            params,
            return_type: Box::new(return_type),
            varargs,
        }
    }

    /// Wrap `self` in a pointer
    pub fn pointer_to(&self) -> Self {
        IrType::ptr(self.clone())
    }

    pub fn is_integer(&self) -> bool {
        self.int_bits().is_some()
    }

    pub fn int_bits(&self) -> Option<u32> {
        match self {
            IrType::I1 => Some(1),
            IrType::I8 => Some(8),
            IrType::I32 => Some(32),
            IrType::I64 => Some(64),
            _ => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }

    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    /// Name of the struct this type points to, if it is `%Name*`
    pub fn pointee_struct(&self) -> Option<&str> {
        match self.pointee() {
            Some(IrType::Struct(name)) => Some(name),
            _ => None,
        }
    }

    /// Parameters, return type and varargs flag of a function type
    pub fn function_parts(&self) -> Option<(&[IrType], &IrType, bool)> {
        match self {
            IrType::Function {
                params,
                return_type,
                varargs,
            } => Some((params, return_type, *varargs)),
            _ => None,
        }
    }

    /// Signature behind a function pointer type
    pub fn pointee_function(&self) -> Option<(&[IrType], &IrType, bool)> {
        self.pointee().and_then(IrType::function_parts)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, IrType::Void)
    }

    /// Truncate/sign-extend `value` to this integer type's width
    pub fn wrap(&self, value: i64) -> i64 {
        match self {
            IrType::I1 => value & 1,
            IrType::I8 => value as i8 as i64,
            IrType::I32 => value as i32 as i64,
            _ => value,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::I1 => write!(f, "i1"),
            IrType::I8 => write!(f, "i8"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::Ptr(inner) => write!(f, "{}*", inner),
            IrType::Struct(name) => write!(f, "%{}", name),
            IrType::Array(element, count) => write!(f, "[{} x {}]", count, element),
            IrType::Function {
                params,
                return_type,
                varargs,
            } => {
                write!(f, "{} (", return_type)?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                if *varargs {
                    if !params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Instruction operand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrValue {
    /// Result of an instruction or a parameter
    Reg(IrId),

    /// Integer constant of the given type
    Int { ty: IrType, value: i64 },

    /// Null pointer of the given type
    Null(IrType),

    /// Undefined value of the given type
    Undef(IrType),

    /// Address of a global variable
    Global(String),

    /// Address of a function
    Function(String),

    /// `i8*` to the first byte of a string constant global
    Str(String),
}

impl IrValue {
    pub fn int(ty: IrType, value: i64) -> Self {
        IrValue::Int {
            value: ty.wrap(value),
            ty,
        }
    }

    pub fn i32(value: i64) -> Self {
        IrValue::int(IrType::I32, value)
    }

    pub fn i64(value: i64) -> Self {
        IrValue::int(IrType::I64, value)
    }

    pub fn bool(value: bool) -> Self {
        IrValue::int(IrType::I1, value as i64)
    }

    pub fn as_reg(&self) -> Option<IrId> {
        match self {
            IrValue::Reg(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            IrValue::Int { value, .. } => Some(*value),
            _ => None,
        }
    }
}

impl From<IrId> for IrValue {
    fn from(id: IrId) -> Self {
        IrValue::Reg(id)
    }
}

/// Global initializer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IrConstant {
    Int { ty: IrType, value: i64 },
    Null(IrType),
    /// Raw bytes of an `[N x i8]` array, terminator included
    Bytes(Vec<u8>),
    /// Function address
    Function(String),
    /// Literal of a named struct type
    Struct { name: String, fields: Vec<IrConstant> },
}
