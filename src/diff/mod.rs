//! Symbolic differentiation.
//!
//! Differentiation walks *compiled* code backwards instead of recursing
//! over the tree: the last instruction is the root operator, and each
//! recursive step consumes the operand code that precedes it. For `len`
//! differentiation directions it returns `len + 1` trees: one derivative
//! per direction, then the reconstructed value tree. Direction `k` is
//! `Symbol(k)`; the scan coordinate (`X`) is the trailing direction
//! `len - 1`.
//!
//! Every returned tree passes through the simplifier at each level, so
//! products with a zero factor and the power rule's degenerate cases fold
//! away before they reach the bytecode emitter.

use std::f64::consts::{LN_10, PI};

use crate::core::{BinaryOp, EngineError, Expr, Result, UnaryOp};
use crate::simplify::{add, div, mul, neg, pow, simplify, sqr, sub, unary};
use crate::vm::{Compiler, Instr, Program};

/// Differentiate a compiled value-only program in `len` directions.
///
/// # Errors
///
/// `NotAllowedInContext` when the code contains an operator with no
/// derivative (`%`, `min`, `max`, `digamma`), or the scan coordinate
/// with `len == 0` (no direction left to assign it to).
pub fn derive(prog: &Program, len: usize) -> Result<Vec<Expr>> {
    let mut pos = prog.code().len();
    let result = step(prog.code(), prog.numbers(), &mut pos, len)?;
    debug_assert_eq!(pos, 0);
    Ok(result)
}

/// Differentiate a formula tree with `nvars` bound parameters.
///
/// With `with_x` the tree may also reference `Var(nvars)` (the scan
/// coordinate) and the result has `nvars + 2` entries: the derivative in
/// each parameter, the derivative in x, then the value tree. Without it
/// the result has `nvars + 1` entries.
///
/// # Errors
///
/// Compilation errors plus everything [`derive`] reports.
pub fn differentiate(tree: &Expr, nvars: usize, with_x: bool) -> Result<Vec<Expr>> {
    let slot_map: Vec<usize> = (0..nvars).collect();
    let prog = Compiler::tree(tree, &slot_map)?;
    derive(&prog, nvars + usize::from(with_x))
}

fn step(code: &[Instr], numbers: &[f64], pos: &mut usize, len: usize) -> Result<Vec<Expr>> {
    debug_assert!(*pos > 0);
    *pos -= 1;
    let instr = code[*pos];
    let mut result = vec![Expr::Const(0.0); len + 1];
    match instr {
        Instr::Number(i) => {
            result[len] = Expr::Const(numbers[i as usize]);
        }
        Instr::Symbol(k) => {
            result[k as usize] = Expr::Const(1.0);
            result[len] = Expr::Var(k as usize);
        }
        Instr::X => {
            if len == 0 {
                return Err(EngineError::NotAllowedInContext("x"));
            }
            result[len - 1] = Expr::Const(1.0);
            result[len] = Expr::Var(len - 1);
        }
        Instr::Un(op) => {
            let arg = step(code, numbers, pos, len)?;
            let a = arg[len].clone();
            for k in 0..len {
                let da = arg[k].clone();
                result[k] = unary_rule(op, &a, da)?;
            }
            result[len] = unary(op, a);
        }
        Instr::Bin(op) => {
            // Post-order code: the right operand's code ends just before
            // the operator, so it is consumed first.
            let right = step(code, numbers, pos, len)?;
            let left = step(code, numbers, pos, len)?;
            let a = left[len].clone();
            let b = right[len].clone();
            for k in 0..len {
                let da = left[k].clone();
                let db = right[k].clone();
                result[k] = binary_rule(op, &a, &b, da, db)?;
            }
            result[len] = match op {
                BinaryOp::Add => add(a, b),
                BinaryOp::Sub => sub(a, b),
                BinaryOp::Mul => mul(a, b),
                BinaryOp::Div => div(a, b),
                BinaryOp::Pow => pow(a, b),
                other => return Err(EngineError::NotAllowedInContext(other.name())),
            };
        }
        Instr::PutDeriv(_) => {
            unreachable!("differentiating a program that already stores derivatives")
        }
    }
    Ok(result.into_iter().map(simplify).collect())
}

fn unary_rule(op: UnaryOp, a: &Expr, da: Expr) -> Result<Expr> {
    let a = a.clone();
    Ok(match op {
        UnaryOp::Neg => neg(da),
        UnaryOp::Sqrt => div(da, mul(Expr::num(2.0), unary(UnaryOp::Sqrt, a))),
        UnaryOp::Exp => mul(unary(UnaryOp::Exp, a), da),
        UnaryOp::Ln => div(da, a),
        UnaryOp::Log10 => div(da, mul(a, Expr::num(LN_10))),
        UnaryOp::Sin => mul(unary(UnaryOp::Cos, a), da),
        UnaryOp::Cos => mul(neg(unary(UnaryOp::Sin, a)), da),
        UnaryOp::Tan => div(da, sqr(unary(UnaryOp::Cos, a))),
        UnaryOp::Asin => div(da, unary(UnaryOp::Sqrt, sub(Expr::num(1.0), sqr(a)))),
        UnaryOp::Acos => neg(div(da, unary(UnaryOp::Sqrt, sub(Expr::num(1.0), sqr(a))))),
        UnaryOp::Atan => div(da, add(Expr::num(1.0), sqr(a))),
        UnaryOp::Sinh => mul(unary(UnaryOp::Cosh, a), da),
        UnaryOp::Cosh => mul(unary(UnaryOp::Sinh, a), da),
        UnaryOp::Tanh => div(da, sqr(unary(UnaryOp::Cosh, a))),
        UnaryOp::Erf => mul(
            mul(
                Expr::num(2.0 / PI.sqrt()),
                unary(UnaryOp::Exp, neg(sqr(a))),
            ),
            da,
        ),
        UnaryOp::Erfc => mul(
            mul(
                Expr::num(-2.0 / PI.sqrt()),
                unary(UnaryOp::Exp, neg(sqr(a))),
            ),
            da,
        ),
        UnaryOp::Abs => mul(div(unary(UnaryOp::Abs, a.clone()), a), da),
        UnaryOp::Lgamma => mul(unary(UnaryOp::Digamma, a), da),
        UnaryOp::Digamma => return Err(EngineError::NotAllowedInContext("digamma")),
    })
}

fn binary_rule(op: BinaryOp, a: &Expr, b: &Expr, da: Expr, db: Expr) -> Result<Expr> {
    let (a, b) = (a.clone(), b.clone());
    Ok(match op {
        BinaryOp::Add => add(da, db),
        BinaryOp::Sub => sub(da, db),
        BinaryOp::Mul => add(mul(da, b), mul(a, db)),
        BinaryOp::Div => div(sub(mul(da, b.clone()), mul(a, db)), sqr(b)),
        BinaryOp::Pow => {
            // d(a^b) = a^b * (b*da/a + ln(a)*db). The ln factor is only
            // materialized when db can be nonzero, so constant negative
            // bases never meet ln().
            let term1 = div(mul(b.clone(), da), a.clone());
            let term2 = if db == Expr::Const(0.0) {
                Expr::Const(0.0)
            } else {
                mul(unary(UnaryOp::Ln, a.clone()), db)
            };
            mul(pow(a, b), add(term1, term2))
        }
        other => return Err(EngineError::NotAllowedInContext(other.name())),
    })
}
