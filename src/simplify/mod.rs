//! Algebraic simplification.
//!
//! Two layers work together here:
//!
//! - smart constructors (`add`, `mul`, `pow`, ...) that fold constant
//!   operands on the spot and apply value-preserving identities, so that
//!   trees built by the differentiation engine never accumulate `x*1`,
//!   `x+0` or `--x` noise;
//! - the collection passes ([`terms`] and [`factors`]) that flatten an
//!   additive or multiplicative spine into `(coefficient, base)` or
//!   `(base, exponent)` pairs, merge structurally equal bases and rebuild
//!   a compact tree.
//!
//! Only `+`, `-`, unary negation and (recursively) `*`, `/`, `sqrt`, `^`
//! are decomposed; every other operator is an opaque leaf. All rewrites
//! preserve the mathematical value exactly; in particular `0^k` is folded
//! only for constant positive `k`.

mod factors;
mod terms;

use crate::core::{BinaryOp, Expr, UnaryOp};

/// Simplify a whole tree: collect additive terms (or multiplicative
/// factors, depending on the root operator), merge equal bases, fold
/// constants. Idempotent.
#[must_use]
pub fn simplify(t: Expr) -> Expr {
    terms::simplify_terms(t)
}

fn boxed(op: BinaryOp, a: Expr, b: Expr) -> Expr {
    Expr::Binary(op, Box::new(a), Box::new(b))
}

/// `-a` with folding: constants negate, double negation unwraps.
#[must_use]
pub fn neg(a: Expr) -> Expr {
    match a {
        Expr::Const(v) => Expr::Const(-v),
        Expr::Unary(UnaryOp::Neg, c) => *c,
        other => Expr::Unary(UnaryOp::Neg, Box::new(other)),
    }
}

// Shared by `add` and `sub`; `op` is Add or Sub.
fn add_or_sub(op: BinaryOp, a: Expr, b: Expr) -> Expr {
    let neg_op = if op == BinaryOp::Add {
        BinaryOp::Sub
    } else {
        BinaryOp::Add
    };
    if let (Some(x), Some(y)) = (a.const_value(), b.const_value()) {
        return Expr::Const(op.apply(x, y));
    }
    if a.const_value() == Some(0.0) {
        return if op == BinaryOp::Add { b } else { neg(b) };
    }
    if b.const_value() == Some(0.0) {
        return a;
    }
    match b {
        // a + (-b)  ->  a - b   (and the subtraction dual)
        Expr::Unary(UnaryOp::Neg, c) => add_or_sub(neg_op, a, *c),
        // a + (-2)*t  ->  a - 2*t
        Expr::Binary(bop @ (BinaryOp::Mul | BinaryOp::Div), c1, c2)
            if matches!(c1.as_ref(), Expr::Const(v) if *v < 0.0) =>
        {
            let flipped = boxed(bop, neg(*c1), *c2);
            add_or_sub(neg_op, a, flipped)
        }
        b if a == b => {
            if op == BinaryOp::Add {
                mul(Expr::Const(2.0), a)
            } else {
                Expr::Const(0.0)
            }
        }
        b => boxed(op, a, b),
    }
}

/// `a + b` with constant folding and sign normalization.
#[must_use]
pub fn add(a: Expr, b: Expr) -> Expr {
    add_or_sub(BinaryOp::Add, a, b)
}

/// `a - b` with constant folding and sign normalization.
#[must_use]
pub fn sub(a: Expr, b: Expr) -> Expr {
    add_or_sub(BinaryOp::Sub, a, b)
}

/// `a * b` with constant folding; merges a constant into a
/// constant-headed product or quotient on the other side.
#[must_use]
pub fn mul(a: Expr, b: Expr) -> Expr {
    if let (Some(x), Some(y)) = (a.const_value(), b.const_value()) {
        return Expr::Const(x * y);
    }
    if a.const_value() == Some(0.0) || b.const_value() == Some(0.0) {
        return Expr::Const(0.0);
    }
    if a.const_value() == Some(1.0) {
        return b;
    }
    if b.const_value() == Some(1.0) {
        return a;
    }
    if a.const_value() == Some(-1.0) {
        return neg(b);
    }
    if b.const_value() == Some(-1.0) {
        return neg(a);
    }
    // c1 * (c2 * t) -> (c1*c2) * t, same for quotients, on either side.
    if let Some(x) = a.const_value() {
        return match b {
            Expr::Binary(bop @ (BinaryOp::Mul | BinaryOp::Div), c1, c2) => {
                if let Some(y) = c1.const_value() {
                    match bop {
                        BinaryOp::Mul => mul(Expr::Const(x * y), *c2),
                        _ => div(Expr::Const(x * y), *c2),
                    }
                } else {
                    boxed(BinaryOp::Mul, a, boxed(bop, *c1, *c2))
                }
            }
            b => boxed(BinaryOp::Mul, a, b),
        };
    }
    if b.is_const() {
        // Keep the constant in front.
        return mul(b, a);
    }
    boxed(BinaryOp::Mul, a, b)
}

/// `a / b` with constant folding; `0/x` folds to 0 without looking at `x`.
#[must_use]
pub fn div(a: Expr, b: Expr) -> Expr {
    if let (Some(x), Some(y)) = (a.const_value(), b.const_value()) {
        return Expr::Const(x / y);
    }
    if a.const_value() == Some(0.0) {
        return Expr::Const(0.0);
    }
    if b.const_value() == Some(1.0) {
        return a;
    }
    if b.const_value() == Some(-1.0) {
        return neg(a);
    }
    boxed(BinaryOp::Div, a, b)
}

/// `a ^ b` with constant folding.
///
/// `0^k` folds to 0 only for constant `k > 0`; folding it for unknown or
/// negative exponents would silently turn an infinity into a zero.
#[must_use]
pub fn pow(a: Expr, b: Expr) -> Expr {
    if let (Some(x), Some(y)) = (a.const_value(), b.const_value()) {
        return Expr::Const(x.powf(y));
    }
    if b.const_value() == Some(0.0) {
        return Expr::Const(1.0);
    }
    if a.const_value() == Some(0.0) && matches!(b.const_value(), Some(k) if k > 0.0) {
        return Expr::Const(0.0);
    }
    if a.const_value() == Some(1.0) {
        return Expr::Const(1.0);
    }
    if b.const_value() == Some(1.0) {
        return a;
    }
    if b.const_value() == Some(-1.0) {
        return div(Expr::Const(1.0), a);
    }
    boxed(BinaryOp::Pow, a, b)
}

/// `1 / a`.
#[must_use]
pub fn oneover(a: Expr) -> Expr {
    div(Expr::Const(1.0), a)
}

/// `a * a`.
#[must_use]
pub fn sqr(a: Expr) -> Expr {
    mul(a.clone(), a)
}

/// Apply a unary operator, folding constant arguments numerically and
/// simplifying non-constant ones.
#[must_use]
pub fn unary(op: UnaryOp, a: Expr) -> Expr {
    if op == UnaryOp::Neg {
        return neg(a);
    }
    match a.const_value() {
        Some(v) => Expr::Const(op.apply(v)),
        None => Expr::Unary(op, Box::new(simplify(a))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BinaryOp, Expr, UnaryOp};

    #[test]
    fn constant_folding() {
        assert_eq!(add(Expr::num(2.0), Expr::num(3.0)), Expr::num(5.0));
        assert_eq!(mul(Expr::num(2.0), Expr::num(3.0)), Expr::num(6.0));
        assert_eq!(pow(Expr::num(2.0), Expr::num(10.0)), Expr::num(1024.0));
        assert_eq!(unary(UnaryOp::Sin, Expr::num(0.0)), Expr::num(0.0));
    }

    #[test]
    fn identity_elimination() {
        let x = Expr::var(0);
        assert_eq!(add(x.clone(), Expr::num(0.0)), x);
        assert_eq!(mul(x.clone(), Expr::num(1.0)), x);
        assert_eq!(mul(x.clone(), Expr::num(0.0)), Expr::num(0.0));
        assert_eq!(div(x.clone(), Expr::num(1.0)), x);
        assert_eq!(pow(x.clone(), Expr::num(1.0)), x);
        assert_eq!(pow(x.clone(), Expr::num(0.0)), Expr::num(1.0));
        assert_eq!(neg(neg(x.clone())), x);
    }

    #[test]
    fn sign_normalization() {
        let x = Expr::var(0);
        let y = Expr::var(1);
        // x + (-y)  ->  x - y
        let e = add(x.clone(), neg(y.clone()));
        assert_eq!(e, Expr::Binary(BinaryOp::Sub, Box::new(x.clone()), Box::new(y.clone())));
        // x - (-2)*y  ->  x + 2*y
        let e = sub(x.clone(), mul(Expr::num(-2.0), y.clone()));
        assert_eq!(e.to_string(), "$0+2*$1");
    }

    #[test]
    fn equal_operands() {
        let x = Expr::var(0);
        assert_eq!(sub(x.clone(), x.clone()), Expr::num(0.0));
        assert_eq!(add(x.clone(), x.clone()).to_string(), "2*$0");
    }

    #[test]
    fn zero_base_power_guard() {
        let b = Expr::var(0);
        // 0^b stays symbolic when the exponent is unknown or negative.
        assert_eq!(
            pow(Expr::num(0.0), b.clone()).to_string(),
            "0^$0"
        );
        assert_eq!(
            pow(Expr::num(0.0), Expr::num(-2.0)),
            Expr::num(f64::INFINITY)
        );
        assert_eq!(pow(Expr::num(0.0), Expr::num(3.0)), Expr::num(0.0));
    }

    #[test]
    fn constant_merging_through_products() {
        let x = Expr::var(0);
        // 2 * (3 * x) -> 6 * x
        let e = mul(Expr::num(2.0), mul(Expr::num(3.0), x.clone()));
        assert_eq!(e.to_string(), "6*$0");
        // 2 * (3 / x) -> 6 / x
        let e = mul(Expr::num(2.0), div(Expr::num(3.0), x.clone()));
        assert_eq!(e.to_string(), "6/$0");
    }
}
