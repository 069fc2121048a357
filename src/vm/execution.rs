//! Stack-machine interpreters.
//!
//! Two contexts execute the same instruction set:
//!
//! - [`run_for_variable`]: variable recomputation. `Symbol(i)` reads the
//!   current value of the variable at list position `i`, `PutDeriv` fills
//!   the partial-derivative buffer. This path validates the stack and the
//!   operator set, since it is the first thing that runs after a user
//!   definition is accepted.
//! - [`run_with_derivs`] / [`run_value_only`]: the per-sample hot path.
//!   It only accepts specialized programs (symbols already replaced by
//!   constants), relies on the compiler's stack bound, and has no error
//!   return. A leftover `Symbol` here is a bug in the caller, not bad
//!   user input, and panics.

use crate::core::{EngineError, Result};

use super::compiler::MAX_STACK_DEPTH;
use super::instruction::{Instr, Program};

/// Execute a variable's program. `Symbol(i)` reads `var_values[i]`,
/// `PutDeriv(i)` stores into `derivatives[i]`; returns the value.
///
/// # Errors
///
/// `NotAllowedInContext` for operators that have no meaning in variable
/// formulas, `StackOverflow` if the stack budget is exceeded (unreachable
/// for compiler-produced programs, kept as a hard runtime check).
pub fn run_for_variable(
    prog: &Program,
    var_values: &[f64],
    derivatives: &mut [f64],
) -> Result<f64> {
    let mut stack = [0.0_f64; MAX_STACK_DEPTH];
    let mut sp = 0_usize;
    for instr in prog.code() {
        match *instr {
            Instr::Number(i) => {
                if sp == MAX_STACK_DEPTH {
                    return Err(overflow());
                }
                stack[sp] = prog.numbers[i as usize];
                sp += 1;
            }
            Instr::Symbol(i) => {
                if sp == MAX_STACK_DEPTH {
                    return Err(overflow());
                }
                stack[sp] = var_values[i as usize];
                sp += 1;
            }
            Instr::X => return Err(EngineError::NotAllowedInContext("x")),
            Instr::PutDeriv(i) => {
                sp -= 1;
                derivatives[i as usize] = stack[sp];
            }
            Instr::Un(op) => {
                stack[sp - 1] = op.apply(stack[sp - 1]);
            }
            Instr::Bin(op) => {
                if !op.differentiable() {
                    return Err(EngineError::NotAllowedInContext(op.name()));
                }
                sp -= 1;
                stack[sp - 1] = op.apply(stack[sp - 1], stack[sp]);
            }
        }
    }
    debug_assert_eq!(sp, 1);
    Ok(stack[0])
}

fn overflow() -> EngineError {
    EngineError::StackOverflow {
        needed: MAX_STACK_DEPTH + 1,
        limit: MAX_STACK_DEPTH,
    }
}

// Shared hot-path loop. No bounds or operator checks: the compiler bounds
// the stack and differentiation already rejected non-arithmetic operators.
fn run_specialized(prog: &Program, from: usize, x: f64, derivatives: &mut [f64]) -> f64 {
    debug_assert!(prog.max_stack <= MAX_STACK_DEPTH);
    let mut stack = [0.0_f64; MAX_STACK_DEPTH];
    let mut sp = 0_usize;
    for instr in &prog.code[from..] {
        match *instr {
            Instr::Number(i) => {
                stack[sp] = prog.numbers[i as usize];
                sp += 1;
            }
            Instr::X => {
                stack[sp] = x;
                sp += 1;
            }
            Instr::PutDeriv(i) => {
                sp -= 1;
                derivatives[i as usize] = stack[sp];
            }
            Instr::Un(op) => {
                stack[sp - 1] = op.apply(stack[sp - 1]);
            }
            Instr::Bin(op) => {
                sp -= 1;
                stack[sp - 1] = op.apply(stack[sp - 1], stack[sp]);
            }
            Instr::Symbol(_) => panic!("unspecialized symbol in function program"),
        }
    }
    debug_assert_eq!(sp, 1);
    stack[0]
}

/// Evaluate a specialized program at `x`, filling the derivative buffer
/// and returning the value.
#[must_use]
pub fn run_with_derivs(prog: &Program, x: f64, derivatives: &mut [f64]) -> f64 {
    run_specialized(prog, 0, x, derivatives)
}

/// Evaluate only the value suffix of a specialized program at `x`.
#[must_use]
pub fn run_value_only(prog: &Program, x: f64) -> f64 {
    run_specialized(prog, prog.value_offset, x, &mut [])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BinaryOp, Expr, UnaryOp};
    use crate::vm::Compiler;

    fn bin(op: BinaryOp, a: Expr, b: Expr) -> Expr {
        Expr::Binary(op, Box::new(a), Box::new(b))
    }

    #[test]
    fn variable_program_reads_other_variables() {
        // $0 + 2*$1 with slot map [0, 1]
        let e = bin(
            BinaryOp::Add,
            Expr::var(0),
            bin(BinaryOp::Mul, Expr::num(2.0), Expr::var(1)),
        );
        let prog = Compiler::tree(&e, &[0, 1]).unwrap();
        let v = run_for_variable(&prog, &[1.0, 2.0], &mut []).unwrap();
        assert_eq!(v, 5.0);
    }

    #[test]
    fn put_deriv_fills_buffer() {
        let derivs = [Expr::num(1.0), Expr::num(2.0)];
        let value = bin(BinaryOp::Add, Expr::var(0), Expr::var(1));
        let prog = Compiler::with_derivatives(&derivs, &value, &[0, 1]).unwrap();
        let mut buf = [0.0; 2];
        let v = run_for_variable(&prog, &[10.0, 20.0], &mut buf).unwrap();
        assert_eq!(v, 30.0);
        assert_eq!(buf, [1.0, 2.0]);
    }

    #[test]
    fn x_is_rejected_for_variables() {
        let e = Expr::var(0); // past the empty map: this is x
        let prog = Compiler::tree(&e, &[]).unwrap();
        let err = run_for_variable(&prog, &[], &mut []).unwrap_err();
        assert!(matches!(err, crate::core::EngineError::NotAllowedInContext("x")));
    }

    #[test]
    fn modulo_is_rejected_for_variables() {
        let e = bin(BinaryOp::Mod, Expr::var(0), Expr::num(2.0));
        let prog = Compiler::tree(&e, &[0]).unwrap();
        let err = run_for_variable(&prog, &[7.0], &mut []).unwrap_err();
        assert_eq!(
            err.to_string(),
            "`%` is not allowed for variables and functions"
        );
    }

    #[test]
    fn specialized_value_only_skips_derivative_code() {
        // value: sin(x) * $0   with $0 -> 0.5 after specialization
        let derivs = [Expr::Unary(UnaryOp::Sin, Box::new(Expr::var(1)))];
        let value = bin(
            BinaryOp::Mul,
            Expr::Unary(UnaryOp::Sin, Box::new(Expr::var(1))),
            Expr::var(0),
        );
        let mut prog = Compiler::with_derivatives(&derivs, &value, &[0]).unwrap();
        prog.replace_symbols(&[0.5]);
        let x = 1.2;
        let v = run_value_only(&prog, x);
        assert!((v - x.sin() * 0.5).abs() < 1e-15);

        let mut buf = [0.0; 1];
        let v2 = run_with_derivs(&prog, x, &mut buf);
        assert_eq!(v, v2);
        assert!((buf[0] - x.sin()).abs() < 1e-15);
    }
}
