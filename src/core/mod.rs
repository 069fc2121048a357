//! Core data types: the expression tree and the crate-wide error type.

mod display;
mod error;
mod expr;

pub use error::{EngineError, Result};
pub use expr::{BinaryOp, Expr, UnaryOp};
