//! # fitexpr
//!
//! Core expression engine for peak-fitting models: algebraic trees with
//! constant folding and simplification, symbolic differentiation, a
//! compact bytecode with two stack-machine interpreters, and a manager
//! for the dependency graph of named variables and model functions.
//!
//! ```text
//!                 ┌─────────────┐
//!    Expr tree ──▶│  simplify   │──▶ canonical tree
//!                 └─────────────┘
//!                        │
//!                        ▼
//!                 ┌─────────────┐       ┌──────────────┐
//!                 │    diff     │──────▶│   Compiler   │──▶ Program
//!                 └─────────────┘       └──────────────┘
//!                                              │
//!                       ┌──────────────────────┴─────────────────────┐
//!                       ▼                                            ▼
//!              run_for_variable                              run_value_only /
//!        (recompute a compound variable)                    run_with_derivs
//!                                                      (specialized hot path)
//! ```
//!
//! The [`VariableManager`] ties it together: simple variables own slots
//! of a global parameter array, compound variables are formulas over
//! other variables, and functions are formulas over variables and the
//! scan coordinate `x`. Every mutation keeps the graph topologically
//! ordered and every value consistent.
//!
//! ## Quick example
//!
//! ```
//! use fitexpr::{Expr, VariableManager};
//! use fitexpr::simplify::{add, mul};
//!
//! let mut mgr = VariableManager::new();
//! mgr.assign_simple("a", 2.0, None).unwrap();
//! mgr.assign_simple("b", 3.0, None).unwrap();
//! // f(a, b; x) = a*x^2 + b, with x as the trailing index
//! let tree = add(
//!     mul(Expr::var(0), mul(Expr::var(2), Expr::var(2))),
//!     Expr::var(1),
//! );
//! mgr.add_function(Some("f"), &tree, vec!["a".into(), "b".into()])
//!     .unwrap();
//! assert_eq!(mgr.function_value("f", 5.0).unwrap(), 53.0);
//! ```

pub mod core;
pub mod diff;
pub mod graph;
pub mod math;
pub mod simplify;
pub mod vm;

pub use crate::core::{BinaryOp, EngineError, Expr, Result, UnaryOp};
pub use crate::diff::{derive, differentiate};
pub use crate::graph::{Domain, Function, Multi, ParMult, Variable, VariableManager};
pub use crate::simplify::simplify;
pub use crate::vm::{
    run_for_variable, run_value_only, run_with_derivs, Compiler, Instr, Program,
    MAX_STACK_DEPTH,
};

#[cfg(test)]
mod tests;
