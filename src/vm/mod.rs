//! Bytecode compilation and evaluation.
//!
//! ```text
//! ┌──────────┐     ┌──────────┐     ┌─────────────────────────────┐
//! │   Expr   │ --> │ Compiler │ --> │           Program           │
//! │  (tree)  │     │          │     │ code + constants + offsets  │
//! └──────────┘     └──────────┘     └─────────────────────────────┘
//!                                            │
//!                      ┌─────────────────────┴──────────────────┐
//!                      ▼                                        ▼
//!            ┌───────────────────┐                  ┌─────────────────────┐
//!            │ run_for_variable  │                  │   replace_symbols   │
//!            │ (recompute graph) │                  │ then run_value_only │
//!            └───────────────────┘                  │  / run_with_derivs  │
//!                                                   └─────────────────────┘
//! ```
//!
//! The left path recomputes variables after a parameter change: symbols
//! are read live from the variable list. The right path is the per-sample
//! hot loop: symbols are substituted once per parameter change, so only
//! the scan coordinate varies and the interpreter needs no checks (the
//! compiler validated the stack depth).

mod compiler;
mod execution;
mod instruction;

pub use compiler::{Compiler, MAX_STACK_DEPTH};
pub use execution::{run_for_variable, run_value_only, run_with_derivs};
pub use instruction::{Instr, Program};
