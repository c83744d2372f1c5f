//! Eva compiler
//!
//! Compiles Eva, a small s-expression language with classes and single
//! inheritance, into an SSA IR modelled on LLVM's textual form.
//!
//! ```text
//! source ─parser─▶ Exp ─codegen─▶ IrModule ─validation─▶ printer / interpreter
//! ```
//!
//! Most callers only need [`pipeline::compile_source`] and
//! [`pipeline::emit`].

pub mod codegen;
pub mod config;
pub mod error;
pub mod error_codes;
pub mod interpreter;
pub mod ir;
pub mod logging;
pub mod pipeline;

pub use codegen::compile_program;
pub use config::{CompilerConfig, EmitKind};
pub use error::{CompileError, Result};
pub use interpreter::{InterpError, RunOutput};
pub use ir::IrModule;
