//! Additive term collection.
//!
//! Flattens a `+`/`-`/negation spine into `(coefficient, base)` pairs,
//! merging structurally equal bases, folding all constants into a single
//! term, and applying the `sin^2 + cos^2 -> 1` rewrite before rebuilding a
//! left-associated sum.

use crate::core::{BinaryOp, Expr, UnaryOp};

use super::factors::simplify_factors;
use super::{add, mul, oneover, sub};

// A collected term: coefficient * base. The constant part of the sum is a
// term whose base is the literal 1. `base == None` marks a term consumed
// by a rewrite.
struct Term {
    base: Option<Expr>,
    coeff: f64,
}

fn is_multiplicative(e: &Expr) -> bool {
    matches!(
        e,
        Expr::Binary(BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow, _, _)
            | Expr::Unary(UnaryOp::Sqrt, _)
    )
}

fn merge_leaf(a: Expr, m: f64, v: &mut Vec<Term>) {
    if let Expr::Const(val) = a {
        for t in v.iter_mut() {
            if matches!(&t.base, Some(Expr::Const(c)) if *c == 1.0) {
                t.coeff += m * val;
                return;
            }
        }
        v.push(Term {
            base: Some(Expr::Const(1.0)),
            coeff: m * val,
        });
    } else {
        for t in v.iter_mut() {
            if t.base.as_ref() == Some(&a) {
                t.coeff += m;
                return;
            }
        }
        v.push(Term {
            base: Some(a),
            coeff: m,
        });
    }
}

fn collect(mut a: Expr, m: f64, v: &mut Vec<Term>) {
    if is_multiplicative(&a) {
        a = simplify_factors(a);
    }
    match a {
        Expr::Binary(BinaryOp::Add, c1, c2) => {
            collect(*c1, m, v);
            collect(*c2, m, v);
        }
        Expr::Binary(BinaryOp::Sub, c1, c2) => {
            collect(*c1, m, v);
            collect(*c2, -m, v);
        }
        Expr::Unary(UnaryOp::Neg, c) => collect(*c, -m, v),
        Expr::Binary(BinaryOp::Mul, c1, c2) => match c1.const_value() {
            Some(k) => collect(*c2, m * k, v),
            None => merge_leaf(Expr::Binary(BinaryOp::Mul, c1, c2), m, v),
        },
        Expr::Binary(BinaryOp::Div, c1, c2) => match c1.const_value() {
            Some(k) if k != 1.0 => collect(oneover(*c2), m * k, v),
            _ => merge_leaf(Expr::Binary(BinaryOp::Div, c1, c2), m, v),
        },
        leaf => merge_leaf(leaf, m, v),
    }
}

// Matches bases of the form sin(t)^2 / cos(t)^2, returning the argument.
fn squared_trig(base: &Expr, trig: UnaryOp) -> Option<&Expr> {
    if let Expr::Binary(BinaryOp::Pow, b, e) = base {
        if e.const_value() == Some(2.0) {
            if let Expr::Unary(op, arg) = b.as_ref() {
                if *op == trig {
                    return Some(arg);
                }
            }
        }
    }
    None
}

// a*sin(t)^2 + b*cos(t)^2  ->  (a-b)*sin(t)^2 + b, same argument required.
fn pythagorean_rewrite(v: &mut Vec<Term>) {
    let mut to_add = 0.0;
    for i in 0..v.len() {
        let arg = match v[i].base.as_ref().and_then(|b| squared_trig(b, UnaryOp::Sin)) {
            Some(arg) => arg.clone(),
            None => continue,
        };
        for j in 0..v.len() {
            if i == j {
                continue;
            }
            let matches_cos = v[j]
                .base
                .as_ref()
                .and_then(|b| squared_trig(b, UnaryOp::Cos))
                == Some(&arg);
            if matches_cos {
                let k = v[j].coeff;
                v[i].coeff -= k;
                to_add += k;
                v[j].base = None;
            }
        }
    }
    if to_add != 0.0 {
        merge_leaf(Expr::Const(to_add), 1.0, v);
    }
}

fn rebuild_term(coeff: f64, base: Expr) -> Expr {
    if base.const_value() == Some(1.0) {
        Expr::Const(coeff)
    } else {
        mul(Expr::Const(coeff), base)
    }
}

/// Simplify routing on the root operator: additive spines are collected
/// here, multiplicative roots are handed to factor collection, anything
/// else is already in normal form.
pub(crate) fn simplify_terms(a: Expr) -> Expr {
    if is_multiplicative(&a) {
        return simplify_factors(a);
    }
    if !matches!(
        a,
        Expr::Binary(BinaryOp::Add | BinaryOp::Sub, _, _) | Expr::Unary(UnaryOp::Neg, _)
    ) {
        return a;
    }

    let mut v = Vec::new();
    collect(a, 1.0, &mut v);
    pythagorean_rewrite(&mut v);

    let mut ret: Option<Expr> = None;
    for t in v {
        let base = match t.base {
            Some(b) if t.coeff != 0.0 => b,
            _ => continue,
        };
        ret = Some(match ret {
            None => rebuild_term(t.coeff, base),
            Some(prev) if t.coeff < 0.0 => sub(prev, rebuild_term(-t.coeff, base)),
            Some(prev) => add(prev, rebuild_term(t.coeff, base)),
        });
    }
    ret.unwrap_or(Expr::Const(0.0))
}
