//! Named variables of the fitted model.

use crate::core::{EngineError, Expr, Result};
use crate::vm::{run_for_variable, Compiler, Program};

/// One chain-rule entry: this variable's value changes by `mult` per unit
/// of the free parameter in slot `p`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParMult {
    pub p: usize,
    pub mult: f64,
}

/// Numeric-domain metadata of a simple variable: the expected center and
/// spread of its value. Fitting methods that randomize starting points
/// read it; nothing in this crate interprets it beyond storage.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Domain {
    pub center: Option<f64>,
    pub sigma: Option<f64>,
}

impl Domain {
    /// True if neither bound was ever set.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.center.is_none() && self.sigma.is_none()
    }
}

#[derive(Debug, Clone)]
enum Kind {
    /// Owns one slot of the global parameter array.
    Simple { nr: usize },
    /// Defined by a formula over other variables.
    Compound {
        /// n derivative trees followed by the value tree.
        op_trees: Vec<Expr>,
        program: Program,
        /// Partial derivatives with respect to each referenced variable,
        /// refreshed on every recompute.
        derivatives: Vec<f64>,
    },
    /// Holds a snapshot copied from another variable; used by composite
    /// function instances that alias an argument.
    Mirror,
}

/// A named variable: simple (one fitted parameter), compound (formula
/// over other variables) or mirror (externally filled snapshot).
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    kind: Kind,
    /// Names of the referenced variables, in formula order. Empty for
    /// simple and mirror variables.
    varnames: Vec<String>,
    /// Current list positions of `varnames`, refreshed by re-linking.
    var_idx: Vec<usize>,
    value: f64,
    recursive_derivatives: Vec<ParMult>,
    domain: Domain,
}

impl Variable {
    pub(crate) fn simple(name: impl Into<String>, nr: usize) -> Self {
        Variable {
            name: name.into(),
            kind: Kind::Simple { nr },
            varnames: Vec::new(),
            var_idx: Vec::new(),
            value: 0.0,
            recursive_derivatives: vec![ParMult { p: nr, mult: 1.0 }],
            domain: Domain::default(),
        }
    }

    /// `op_trees` holds one derivative tree per name in `varnames`,
    /// followed by the value tree.
    pub(crate) fn compound(
        name: impl Into<String>,
        varnames: Vec<String>,
        op_trees: Vec<Expr>,
    ) -> Self {
        debug_assert_eq!(op_trees.len(), varnames.len() + 1);
        let n = varnames.len();
        Variable {
            name: name.into(),
            kind: Kind::Compound {
                op_trees,
                program: Program::default(),
                derivatives: vec![0.0; n],
            },
            varnames,
            var_idx: Vec::new(),
            value: 0.0,
            recursive_derivatives: Vec::new(),
            domain: Domain::default(),
        }
    }

    pub(crate) fn mirror(name: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            kind: Kind::Mirror,
            varnames: Vec::new(),
            var_idx: Vec::new(),
            value: 0.0,
            recursive_derivatives: Vec::new(),
            domain: Domain::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Auto variables (created under a generated `_N` name) are swept
    /// away once nothing references them.
    #[must_use]
    pub fn is_auto(&self) -> bool {
        self.name.starts_with('_')
    }

    #[must_use]
    pub fn is_simple(&self) -> bool {
        matches!(self.kind, Kind::Simple { .. })
    }

    #[must_use]
    pub fn is_mirror(&self) -> bool {
        matches!(self.kind, Kind::Mirror)
    }

    /// The owned parameter slot, for simple variables.
    #[must_use]
    pub fn parameter_slot(&self) -> Option<usize> {
        match self.kind {
            Kind::Simple { nr } => Some(nr),
            _ => None,
        }
    }

    #[must_use]
    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn set_domain(&mut self, domain: Domain) {
        self.domain = domain;
    }

    /// Names of referenced variables (formula order).
    #[must_use]
    pub fn varnames(&self) -> &[String] {
        &self.varnames
    }

    /// Current positions of the referenced variables.
    #[must_use]
    pub fn var_idx(&self) -> &[usize] {
        &self.var_idx
    }

    /// Chain-rule mapping of this variable to free parameter slots.
    #[must_use]
    pub fn recursive_derivatives(&self) -> &[ParMult] {
        &self.recursive_derivatives
    }

    pub(crate) fn op_trees(&self) -> Option<&[Expr]> {
        match &self.kind {
            Kind::Compound { op_trees, .. } => Some(op_trees),
            _ => None,
        }
    }

    /// Largest referenced position, if any.
    pub(crate) fn max_var_idx(&self) -> Option<usize> {
        self.var_idx.iter().copied().max()
    }

    /// Resolve `varnames` to positions and recompile the bytecode against
    /// the new slot map.
    ///
    /// # Errors
    ///
    /// `UndefinedVariable` when a referenced name no longer resolves.
    pub(crate) fn set_var_idx(
        &mut self,
        resolve: &dyn Fn(&str) -> Option<usize>,
    ) -> Result<()> {
        let mut idx = Vec::with_capacity(self.varnames.len());
        for n in &self.varnames {
            idx.push(resolve(n).ok_or_else(|| EngineError::undefined_variable(n))?);
        }
        self.var_idx = idx;
        if let Kind::Compound {
            op_trees, program, ..
        } = &mut self.kind
        {
            let n = self.varnames.len();
            *program = Compiler::with_derivatives(&op_trees[..n], &op_trees[n], &self.var_idx)?;
        }
        Ok(())
    }

    /// Refresh value and chain-rule list. `values_by_pos` and
    /// `recs_by_pos` cover all positions below this variable's own (the
    /// topological order guarantees that is enough).
    pub(crate) fn recalculate(
        &mut self,
        values_by_pos: &[f64],
        recs_by_pos: &[Vec<ParMult>],
        parameters: &[f64],
    ) -> Result<()> {
        match &mut self.kind {
            Kind::Simple { nr } => {
                self.value = parameters[*nr];
                self.recursive_derivatives = vec![ParMult { p: *nr, mult: 1.0 }];
            }
            Kind::Compound {
                program,
                derivatives,
                ..
            } => {
                self.value = run_for_variable(program, values_by_pos, derivatives)?;
                self.recursive_derivatives.clear();
                for (i, &pos) in self.var_idx.iter().enumerate() {
                    let d = derivatives[i];
                    for pm in &recs_by_pos[pos] {
                        self.recursive_derivatives.push(ParMult {
                            p: pm.p,
                            mult: pm.mult * d,
                        });
                    }
                }
            }
            // Snapshots are written by the owner of the original.
            Kind::Mirror => {}
        }
        Ok(())
    }

    /// Install a snapshot into a mirror variable.
    pub(crate) fn set_snapshot(&mut self, value: f64, recursive_derivatives: Vec<ParMult>) {
        debug_assert!(self.is_mirror());
        self.value = value;
        self.recursive_derivatives = recursive_derivatives;
    }

    /// Parameter slot `k` was removed from the global array; shift every
    /// stored slot number above it down by one.
    pub(crate) fn erased_parameter(&mut self, k: usize) {
        if let Kind::Simple { nr } = &mut self.kind {
            if *nr > k {
                *nr -= 1;
            }
        }
        for pm in &mut self.recursive_derivatives {
            if pm.p > k {
                pm.p -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::differentiate;
    use crate::simplify::{add, mul};
    use crate::core::Expr;

    #[test]
    fn simple_variable_tracks_its_slot() {
        let mut v = Variable::simple("a", 2);
        v.recalculate(&[], &[], &[0.0, 0.0, 42.0]).unwrap();
        assert_eq!(v.value(), 42.0);
        assert_eq!(v.recursive_derivatives(), &[ParMult { p: 2, mult: 1.0 }]);
    }

    #[test]
    fn compound_variable_composes_chain_rule() {
        // c = a + 2*b with a, b at positions 0 and 1, owning slots 0 and 1
        let tree = add(Expr::var(0), mul(Expr::num(2.0), Expr::var(1)));
        let trees = differentiate(&tree, 2, false).unwrap();
        let mut c = Variable::compound("c", vec!["a".into(), "b".into()], trees);
        let resolve = |n: &str| match n {
            "a" => Some(0),
            "b" => Some(1),
            _ => None,
        };
        c.set_var_idx(&resolve).unwrap();

        let values = vec![1.0, 2.0];
        let recs = vec![
            vec![ParMult { p: 0, mult: 1.0 }],
            vec![ParMult { p: 1, mult: 1.0 }],
        ];
        c.recalculate(&values, &recs, &[1.0, 2.0]).unwrap();
        assert_eq!(c.value(), 5.0);
        assert_eq!(
            c.recursive_derivatives(),
            &[ParMult { p: 0, mult: 1.0 }, ParMult { p: 1, mult: 2.0 }]
        );
    }

    #[test]
    fn erased_parameter_shifts_slots() {
        let mut v = Variable::simple("a", 2);
        v.recalculate(&[], &[], &[0.0, 0.0, 7.0]).unwrap();
        v.erased_parameter(1);
        assert_eq!(v.parameter_slot(), Some(1));
        assert_eq!(v.recursive_derivatives(), &[ParMult { p: 1, mult: 1.0 }]);
    }

    #[test]
    fn undefined_reference_is_reported() {
        let tree = Expr::var(0);
        let trees = differentiate(&tree, 1, false).unwrap();
        let mut v = Variable::compound("c", vec!["ghost".into()], trees);
        let err = v.set_var_idx(&|_| None).unwrap_err();
        assert_eq!(err.to_string(), "undefined variable: $ghost");
    }
}
