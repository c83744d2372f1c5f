//! Compilation errors
//!
//! Any error aborts the whole compilation unit; no artifact is written.

use crate::error_codes::{self, ErrorCode};
use crate::interpreter::InterpError;
use crate::ir::validation::ValidationError;
use crate::ir::IrType;
use parser::ParseError;
use std::fmt;

pub type Result<T> = std::result::Result<T, CompileError>;

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Source text is not a well-formed s-expression program
    Parse(ParseError),

    /// Name not found anywhere on the scope chain
    UndefinedSymbol { name: String },

    UnknownClass { name: String },

    UnknownField { class: String, field: String },

    UnknownMethod { class: String, method: String },

    DuplicateClass { name: String },

    /// Special form with the wrong arity or shape
    MalformedForm { form: String, reason: String },

    /// A value cannot be converted to the type its destination requires
    TypeMismatch {
        expected: String,
        found: String,
        context: String,
    },

    /// Generated IR failed structural validation
    InvalidIr(Vec<ValidationError>),

    Config(String),

    Io { path: String, message: String },

    /// The compiled program failed while the interpreter was running it
    Runtime(InterpError),

    /// The builder lost its insertion point or rejected an instruction
    Internal(String),
}

impl CompileError {
    pub fn undefined(name: impl Into<String>) -> Self {
        CompileError::UndefinedSymbol { name: name.into() }
    }

    pub fn unknown_class(name: impl Into<String>) -> Self {
        CompileError::UnknownClass { name: name.into() }
    }

    pub fn malformed(form: impl Into<String>, reason: impl Into<String>) -> Self {
        CompileError::MalformedForm {
            form: form.into(),
            reason: reason.into(),
        }
    }

    pub fn mismatch(expected: &IrType, found: &IrType, context: impl Into<String>) -> Self {
        CompileError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
            context: context.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CompileError::Internal(message.into())
    }

    /// Numeric diagnostic code, see [`error_codes`]
    pub fn code(&self) -> u16 {
        match self {
            CompileError::Parse(_) => error_codes::PARSE_ERROR,
            CompileError::MalformedForm { .. } => error_codes::MALFORMED_FORM,
            CompileError::TypeMismatch { .. } => error_codes::TYPE_MISMATCH,
            CompileError::UndefinedSymbol { .. } => error_codes::UNDEFINED_SYMBOL,
            CompileError::UnknownClass { .. } => error_codes::UNKNOWN_CLASS,
            CompileError::UnknownField { .. } => error_codes::UNKNOWN_FIELD,
            CompileError::UnknownMethod { .. } => error_codes::UNKNOWN_METHOD,
            CompileError::DuplicateClass { .. } => error_codes::DUPLICATE_CLASS,
            CompileError::InvalidIr(_) => error_codes::INVALID_IR,
            CompileError::Config(_) => error_codes::CONFIG_ERROR,
            CompileError::Io { .. } => error_codes::IO_ERROR,
            CompileError::Runtime(_) => error_codes::RUNTIME_ERROR,
            CompileError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    pub fn error_code(&self) -> Option<&'static ErrorCode> {
        error_codes::get_error_code(self.code())
    }

    /// Multi-line rendering for the command line:
    ///
    /// ```text
    /// error[E2001]: undefined symbol 'y'
    ///   = help: Declare the name with var or def before using it
    /// ```
    pub fn diagnostic(&self) -> String {
        let mut out = format!(
            "error[{}]: {}",
            error_codes::format_error_code(self.code()),
            self
        );
        if let Some(help) = self.error_code().and_then(|code| code.help) {
            out.push_str("\n  = help: ");
            out.push_str(help);
        }
        out
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Parse(err) => write!(f, "parse error: {}", err),
            CompileError::UndefinedSymbol { name } => write!(f, "undefined symbol '{}'", name),
            CompileError::UnknownClass { name } => write!(f, "unknown class '{}'", name),
            CompileError::UnknownField { class, field } => {
                write!(f, "class '{}' has no field '{}'", class, field)
            }
            CompileError::UnknownMethod { class, method } => {
                write!(f, "class '{}' has no method '{}'", class, method)
            }
            CompileError::DuplicateClass { name } => {
                write!(f, "class '{}' is already defined", name)
            }
            CompileError::MalformedForm { form, reason } => {
                write!(f, "malformed ({} ...): {}", form, reason)
            }
            CompileError::TypeMismatch {
                expected,
                found,
                context,
            } => write!(
                f,
                "type mismatch in {}: expected {}, found {}",
                context, expected, found
            ),
            CompileError::InvalidIr(errors) => {
                write!(f, "generated IR is invalid ({} problems)", errors.len())?;
                for err in errors {
                    write!(f, "\n    {}", err)?;
                }
                Ok(())
            }
            CompileError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            CompileError::Io { path, message } => write!(f, "{}: {}", path, message),
            CompileError::Runtime(err) => write!(f, "program aborted: {}", err),
            CompileError::Internal(msg) => write!(f, "internal compiler error: {}", msg),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Parse(err) => Some(err),
            CompileError::Runtime(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ParseError> for CompileError {
    fn from(err: ParseError) -> Self {
        CompileError::Parse(err)
    }
}

impl From<InterpError> for CompileError {
    fn from(err: InterpError) -> Self {
        CompileError::Runtime(err)
    }
}
