//! Expression tree for model formulas.
//!
//! Nodes reference formal parameters by a tree-local index (`Var(k)`); the
//! binding of indices to named variables or to the scan coordinate happens
//! later, when a tree is compiled against a symbol slot map. Structural
//! equality (`PartialEq`) is what the simplifier uses to merge terms and
//! factors, so constants compare by exact `f64` equality.

use crate::math;

/// Unary operators. Every one of them is a plain `f64 -> f64` map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Sqrt,
    Exp,
    Ln,
    Log10,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Erf,
    Erfc,
    Abs,
    Lgamma,
    Digamma,
}

impl UnaryOp {
    /// Apply the operator numerically.
    #[must_use]
    pub fn apply(self, z: f64) -> f64 {
        match self {
            UnaryOp::Neg => -z,
            UnaryOp::Sqrt => z.sqrt(),
            UnaryOp::Exp => z.exp(),
            UnaryOp::Ln => z.ln(),
            UnaryOp::Log10 => z.log10(),
            UnaryOp::Sin => z.sin(),
            UnaryOp::Cos => z.cos(),
            UnaryOp::Tan => z.tan(),
            UnaryOp::Asin => z.asin(),
            UnaryOp::Acos => z.acos(),
            UnaryOp::Atan => z.atan(),
            UnaryOp::Sinh => z.sinh(),
            UnaryOp::Cosh => z.cosh(),
            UnaryOp::Tanh => z.tanh(),
            UnaryOp::Erf => math::erf(z),
            UnaryOp::Erfc => math::erfc(z),
            UnaryOp::Abs => z.abs(),
            UnaryOp::Lgamma => math::lgamma(z),
            UnaryOp::Digamma => math::digamma(z),
        }
    }

    /// Operator name as written in formulas.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Exp => "exp",
            UnaryOp::Ln => "ln",
            UnaryOp::Log10 => "log10",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::Asin => "asin",
            UnaryOp::Acos => "acos",
            UnaryOp::Atan => "atan",
            UnaryOp::Sinh => "sinh",
            UnaryOp::Cosh => "cosh",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Erf => "erf",
            UnaryOp::Erfc => "erfc",
            UnaryOp::Abs => "abs",
            UnaryOp::Lgamma => "lgamma",
            UnaryOp::Digamma => "digamma",
        }
    }
}

/// Binary operators. `Mod`, `Min` and `Max` are evaluable (they exist for
/// data-transform expressions sharing this opcode set) but have no
/// derivative, so binding a formula that uses them to a variable or
/// function fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Mod,
    Min,
    Max,
}

impl BinaryOp {
    /// Apply the operator numerically.
    #[must_use]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
            BinaryOp::Mod => a - (a / b).floor() * b,
            BinaryOp::Min => a.min(b),
            BinaryOp::Max => a.max(b),
        }
    }

    /// Operator name as written in formulas.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Mod => "%",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
        }
    }

    /// True for the operators a variable or function formula may contain.
    #[must_use]
    pub fn differentiable(self) -> bool {
        !matches!(self, BinaryOp::Mod | BinaryOp::Min | BinaryOp::Max)
    }
}

/// A formula tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal (or a folded constant subexpression).
    Const(f64),
    /// Formal parameter, indexed tree-locally. When a tree with `n` bound
    /// parameters contains `Var(n)`, that index denotes the scan coordinate.
    Var(usize),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Numeric literal.
    #[must_use]
    pub fn num(v: f64) -> Self {
        Expr::Const(v)
    }

    /// Formal parameter reference.
    #[must_use]
    pub fn var(k: usize) -> Self {
        Expr::Var(k)
    }

    /// The constant value, if this node is a literal.
    #[must_use]
    pub fn const_value(&self) -> Option<f64> {
        match self {
            Expr::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// True if this node is a numeric literal.
    #[must_use]
    pub fn is_const(&self) -> bool {
        matches!(self, Expr::Const(_))
    }

    /// Evaluate the tree directly, reading `Var(k)` from `values[k]`.
    ///
    /// This is the slow reference interpreter; compiled bytecode must
    /// produce the same results (the round-trip tests rely on it).
    #[must_use]
    pub fn eval_with(&self, values: &[f64]) -> f64 {
        match self {
            Expr::Const(v) => *v,
            Expr::Var(k) => values[*k],
            Expr::Unary(op, a) => op.apply(a.eval_with(values)),
            Expr::Binary(op, a, b) => op.apply(a.eval_with(values), b.eval_with(values)),
        }
    }

    /// Largest `Var` index in the tree, or `None` if it has no parameters.
    #[must_use]
    pub fn max_var(&self) -> Option<usize> {
        match self {
            Expr::Const(_) => None,
            Expr::Var(k) => Some(*k),
            Expr::Unary(_, a) => a.max_var(),
            Expr::Binary(_, a, b) => match (a.max_var(), b.max_var()) {
                (Some(x), Some(y)) => Some(x.max(y)),
                (x, None) => x,
                (None, y) => y,
            },
        }
    }
}
