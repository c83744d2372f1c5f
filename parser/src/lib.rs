//! Eva reader
//!
//! Turns Eva source text into the [`Exp`] tree consumed by the compiler.

pub mod ast;
pub mod error;
pub mod sexpr;

pub use ast::Exp;
pub use error::ParseError;
pub use sexpr::{parse_expression, parse_program};
