//! The dependency graph of named variables and functions.
//!
//! Variables live in a generational arena; a separate position vector
//! keeps them topologically ordered (every variable's references point to
//! strictly smaller positions), so one forward sweep recomputes the whole
//! graph after a parameter change. Definitions are atomic: name
//! resolution, cycle detection and compilation all happen before anything
//! is mutated, so a rejected definition leaves the graph exactly as it
//! was.

mod function;
mod variable;

pub use function::{Function, Multi};
pub use variable::{Domain, ParMult, Variable};

use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};

use crate::core::{EngineError, Expr, Result};
use crate::diff::differentiate;

new_key_type! {
    /// Generational key of a variable in the arena.
    pub struct VarKey;
}

/// Owns all variables, functions and the global parameter array.
#[derive(Default)]
pub struct VariableManager {
    arena: SlotMap<VarKey, Variable>,
    /// Topologically ordered keys; list positions are what `var_idx`
    /// entries and `Symbol` operands refer to.
    order: Vec<VarKey>,
    functions: Vec<Function>,
    parameters: Vec<f64>,
    var_seq: u32,
    func_seq: u32,
}

impl VariableManager {
    #[must_use]
    pub fn new() -> Self {
        VariableManager::default()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Current list position of a variable.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.order
            .iter()
            .position(|&k| self.arena[k].name() == name)
    }

    /// Variables in topological order.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> + '_ {
        self.order.iter().map(move |&k| &self.arena[k])
    }

    #[must_use]
    pub fn find_variable(&self, name: &str) -> Option<&Variable> {
        self.position(name).map(|p| self.var_at(p))
    }

    /// Current value of a variable.
    ///
    /// # Errors
    ///
    /// `UndefinedVariable` when the name is unknown.
    pub fn variable_value(&self, name: &str) -> Result<f64> {
        self.find_variable(name)
            .map(Variable::value)
            .ok_or_else(|| EngineError::undefined_variable(name))
    }

    /// The global parameter array (one slot per simple variable).
    #[must_use]
    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    #[must_use]
    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name() == name)
    }

    /// Functions in definition order.
    pub fn functions(&self) -> impl Iterator<Item = &Function> + '_ {
        self.functions.iter()
    }

    fn var_at(&self, pos: usize) -> &Variable {
        &self.arena[self.order[pos]]
    }

    fn name_index(&self) -> FxHashMap<String, usize> {
        let mut m = FxHashMap::default();
        for (i, &key) in self.order.iter().enumerate() {
            m.insert(self.arena[key].name().to_string(), i);
        }
        m
    }

    // =========================================================================
    // Definition
    // =========================================================================

    /// Define (or redefine) a simple variable owning a fresh parameter
    /// slot initialized to `value`. Any slot the old definition owned is
    /// reclaimed by compaction.
    ///
    /// # Errors
    ///
    /// Only the recompute of dependent formulas can fail here.
    pub fn assign_simple(
        &mut self,
        name: &str,
        value: f64,
        domain: Option<Domain>,
    ) -> Result<String> {
        let nr = self.parameters.len();
        self.parameters.push(value);
        let mut var = Variable::simple(name, nr);
        if let Some(d) = domain {
            var.set_domain(d);
        }
        let name = self.install_raw(var)?;
        self.compact_parameters();
        self.use_parameters()?;
        Ok(name)
    }

    /// Define (or redefine) a compound variable. `tree` references the
    /// names in `varnames` as `Var(0..n)` in order.
    ///
    /// The definition is atomic: undefined references, dependency cycles
    /// and non-differentiable operators are all reported before the graph
    /// changes.
    ///
    /// # Errors
    ///
    /// `DependsOnX`, `UnboundArgument`, `DependencyLoop`, plus
    /// differentiation and compilation errors.
    pub fn assign(&mut self, name: &str, tree: &Expr, varnames: Vec<String>) -> Result<String> {
        if varnames.iter().any(|n| n == "x") {
            return Err(EngineError::DependsOnX(name.to_string()));
        }
        let n = varnames.len();
        if let Some(m) = tree.max_var() {
            if m == n {
                return Err(EngineError::DependsOnX(name.to_string()));
            }
            if m > n {
                return Err(EngineError::UnboundArgument { index: m, bound: n });
            }
        }
        let trees = differentiate(tree, n, false)?;
        let var = Variable::compound(name, varnames, trees);
        let name = self.install_raw(var)?;
        self.compact_parameters();
        self.use_parameters()?;
        Ok(name)
    }

    /// Define a mirror variable; its value and chain-rule list are
    /// installed later through [`set_mirror_snapshot`].
    ///
    /// [`set_mirror_snapshot`]: VariableManager::set_mirror_snapshot
    ///
    /// # Errors
    ///
    /// `DependencyLoop` cannot occur; redefinition errors propagate.
    pub fn define_mirror(&mut self, name: &str) -> Result<String> {
        self.install_raw(Variable::mirror(name))
    }

    /// Copy a snapshot (value plus chain-rule list) into a mirror
    /// variable. The next recompute propagates it to dependents.
    ///
    /// # Errors
    ///
    /// `UndefinedVariable` when the name is unknown.
    pub fn set_mirror_snapshot(
        &mut self,
        name: &str,
        value: f64,
        recursive_derivatives: Vec<ParMult>,
    ) -> Result<()> {
        let pos = self
            .position(name)
            .ok_or_else(|| EngineError::undefined_variable(name))?;
        let key = self.order[pos];
        debug_assert!(self.arena[key].is_mirror());
        self.arena[key].set_snapshot(value, recursive_derivatives);
        Ok(())
    }

    // Resolve, cycle-check and insert/replace a variable. No sweep, no
    // recompute; callers sequence those (the copy machinery installs
    // several variables before the first sweep may run).
    fn install_raw(&mut self, mut var: Variable) -> Result<String> {
        let index = self.name_index();
        var.set_var_idx(&|n| index.get(n).copied())?;
        let name = var.name().to_string();
        match self.position(&name) {
            Some(pos) => {
                if self.would_loop(&var, pos) {
                    return Err(EngineError::DependencyLoop(name));
                }
                let key = self.order[pos];
                if var.domain().is_unset() {
                    var.set_domain(self.arena[key].domain());
                }
                self.arena[key] = var;
                log::debug!("variable ${} redefined (position {})", name, pos);
                let needs_sort = self.arena[key].max_var_idx().map_or(false, |m| m > pos);
                if needs_sort {
                    self.sort_variables()?;
                }
            }
            None => {
                let key = self.arena.insert(var);
                self.order.push(key);
                log::debug!("new variable ${} (position {})", name, self.order.len() - 1);
            }
        }
        Ok(name)
    }

    // Would replacing position `pos` with `var` close a cycle?
    fn would_loop(&self, var: &Variable, pos: usize) -> bool {
        var.var_idx()
            .iter()
            .any(|&j| j == pos || self.is_dependent_on(j, pos))
    }

    // Does the variable at position `i` depend (transitively) on `pos`?
    fn is_dependent_on(&self, i: usize, pos: usize) -> bool {
        self.var_at(i)
            .var_idx()
            .iter()
            .any(|&j| j == pos || self.is_dependent_on(j, pos))
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Delete variables by name or `*` glob pattern. A variable that
    /// anything still references cannot be deleted; the error names the
    /// first referrer. A pattern matching nothing deletes nothing.
    ///
    /// # Errors
    ///
    /// `UndefinedVariable` (exact names only), `StillReferenced`.
    pub fn delete_variables(&mut self, names: &[&str]) -> Result<()> {
        let mut targets = Vec::new();
        for name in names {
            if name.contains('*') {
                targets.extend(
                    (0..self.order.len()).filter(|&pos| match_glob(self.var_at(pos).name(), name)),
                );
            } else {
                targets.push(
                    self.position(name)
                        .ok_or_else(|| EngineError::undefined_variable(*name))?,
                );
            }
        }
        targets.sort_unstable();
        targets.dedup();
        // Descending order: removing a position only shifts the ones
        // above it, and a referrer within the set dies before its
        // dependency is checked.
        for &pos in targets.iter().rev() {
            let name = self.var_at(pos).name().to_string();
            if let Some(referrer) = self.first_referrer(pos) {
                return Err(EngineError::still_referenced(name, referrer));
            }
            let key = self.order.remove(pos);
            self.arena.remove(key);
            self.relink_all()?;
            log::debug!("deleted variable ${}", name);
        }
        self.remove_unreferred()?;
        self.use_parameters()
    }

    /// Delete functions by name or `*` glob pattern and sweep their
    /// orphaned auto arguments.
    ///
    /// # Errors
    ///
    /// `UndefinedFunction` (exact names only).
    pub fn delete_functions(&mut self, names: &[&str]) -> Result<()> {
        let mut targets = Vec::new();
        for name in names {
            if name.contains('*') {
                targets.extend(
                    self.functions
                        .iter()
                        .enumerate()
                        .filter(|(_, f)| match_glob(f.name(), name))
                        .map(|(j, _)| j),
                );
            } else {
                targets.push(
                    self.functions
                        .iter()
                        .position(|f| f.name() == *name)
                        .ok_or_else(|| EngineError::UndefinedFunction((*name).to_string()))?,
                );
            }
        }
        targets.sort_unstable();
        targets.dedup();
        for &pos in targets.iter().rev() {
            log::debug!("deleted function %{}", self.functions[pos].name());
            self.functions.remove(pos);
        }
        self.remove_unreferred()
    }

    // First thing still referencing position `pos`: a later variable
    // ("$name") or any function ("%name").
    fn first_referrer(&self, pos: usize) -> Option<String> {
        for (j, &key) in self.order.iter().enumerate() {
            if j != pos && self.arena[key].var_idx().contains(&pos) {
                return Some(format!("${}", self.arena[key].name()));
            }
        }
        for f in &self.functions {
            if f.var_idx().contains(&pos) {
                return Some(format!("%{}", f.name()));
            }
        }
        None
    }

    // Sweep unreferenced auto variables until none is left, then compact
    // the parameter array. Runs after deletions and copy installs; plain
    // assignment must not trigger it, or a freshly typed auto variable
    // would vanish before anything references it.
    fn remove_unreferred(&mut self) -> Result<()> {
        loop {
            let target = (0..self.order.len()).rev().find(|&pos| {
                self.var_at(pos).is_auto() && self.first_referrer(pos).is_none()
            });
            match target {
                Some(pos) => {
                    let key = self.order.remove(pos);
                    let name = self.arena[key].name().to_string();
                    self.arena.remove(key);
                    self.relink_all()?;
                    log::debug!("swept unreferenced variable ${}", name);
                }
                None => break,
            }
        }
        self.compact_parameters();
        Ok(())
    }

    // Remove parameter slots no simple variable owns; every stored slot
    // number above a removed one shifts down.
    fn compact_parameters(&mut self) {
        let mut owned = vec![false; self.parameters.len()];
        for &key in &self.order {
            if let Some(nr) = self.arena[key].parameter_slot() {
                owned[nr] = true;
            }
        }
        for k in (0..owned.len()).rev() {
            if owned[k] {
                continue;
            }
            self.parameters.remove(k);
            for i in 0..self.order.len() {
                let key = self.order[i];
                self.arena[key].erased_parameter(k);
            }
            for f in &mut self.functions {
                f.erased_parameter(k);
            }
            log::debug!("compacted parameter slot {}", k);
        }
    }

    // =========================================================================
    // Ordering and recomputation
    // =========================================================================

    // Restore the topological invariant by swapping a variable downward
    // while one of its references sits above it, re-linking after every
    // swap.
    fn sort_variables(&mut self) -> Result<()> {
        let mut pos = 0;
        while pos < self.order.len() {
            match self.var_at(pos).max_var_idx() {
                Some(m) if m > pos => {
                    self.order.swap(pos, m);
                    self.relink_all()?;
                }
                _ => pos += 1,
            }
        }
        log::debug!("re-sorted {} variables", self.order.len());
        Ok(())
    }

    // Refresh every var_idx (and compound bytecode) from names.
    fn relink_all(&mut self) -> Result<()> {
        let index = self.name_index();
        let resolve = |n: &str| index.get(n).copied();
        for i in 0..self.order.len() {
            let key = self.order[i];
            self.arena[key].set_var_idx(&resolve)?;
        }
        for f in &mut self.functions {
            f.set_var_idx(&resolve)?;
        }
        Ok(())
    }

    /// Recompute every variable in topological order, then re-specialize
    /// every function to the fresh values.
    ///
    /// # Errors
    ///
    /// Evaluation errors from variable programs.
    pub fn use_parameters(&mut self) -> Result<()> {
        let mut values: Vec<f64> = Vec::with_capacity(self.order.len());
        let mut recs: Vec<Vec<ParMult>> = Vec::with_capacity(self.order.len());
        for i in 0..self.order.len() {
            let key = self.order[i];
            self.arena[key].recalculate(&values, &recs, &self.parameters)?;
            let v = &self.arena[key];
            values.push(v.value());
            recs.push(v.recursive_derivatives().to_vec());
        }
        for f in &mut self.functions {
            f.precompute(&values, &recs);
        }
        Ok(())
    }

    /// Replace the whole parameter array and recompute (the fitting loop
    /// calls this once per iteration).
    ///
    /// # Errors
    ///
    /// Same as [`use_parameters`](VariableManager::use_parameters).
    pub fn use_external_parameters(&mut self, values: &[f64]) -> Result<()> {
        debug_assert_eq!(values.len(), self.parameters.len());
        self.parameters.clear();
        self.parameters.extend_from_slice(values);
        self.use_parameters()
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// Define (or replace) a function. `tree` references the names in
    /// `varnames` as `Var(0..n)` and the scan coordinate as `Var(n)`.
    /// Without an explicit name an `F<N>` name is generated.
    ///
    /// # Errors
    ///
    /// `UndefinedVariable` for unresolvable arguments, plus
    /// differentiation and compilation errors.
    pub fn add_function(
        &mut self,
        name: Option<&str>,
        tree: &Expr,
        varnames: Vec<String>,
    ) -> Result<String> {
        let name = match name {
            Some(n) => n.to_string(),
            None => self.next_func_name(),
        };
        let mut f = Function::new(&name, tree, varnames)?;
        let index = self.name_index();
        f.set_var_idx(&|n| index.get(n).copied())?;
        match self.functions.iter().position(|g| g.name() == name) {
            Some(i) => {
                self.functions[i] = f;
                log::debug!("function %{} replaced", name);
            }
            None => {
                self.functions.push(f);
                log::debug!("new function %{}", name);
            }
        }
        self.remove_unreferred()?;
        self.use_parameters()?;
        Ok(name)
    }

    /// Value of a function at `x`.
    ///
    /// # Errors
    ///
    /// `UndefinedFunction`.
    pub fn function_value(&self, name: &str, x: f64) -> Result<f64> {
        self.find_function(name)
            .map(|f| f.value(x))
            .ok_or_else(|| EngineError::UndefinedFunction(name.to_string()))
    }

    /// Value of a function at `x`, accumulating derivatives into `dy_da`
    /// (one cell per parameter plus a trailing d/dx cell).
    ///
    /// # Errors
    ///
    /// `UndefinedFunction`.
    pub fn function_value_and_derivatives(
        &mut self,
        name: &str,
        x: f64,
        dy_da: &mut [f64],
    ) -> Result<f64> {
        let f = self
            .functions
            .iter_mut()
            .find(|f| f.name() == name)
            .ok_or_else(|| EngineError::UndefinedFunction(name.to_string()))?;
        Ok(f.value_and_put_derivatives(x, dy_da))
    }

    // =========================================================================
    // Copies
    // =========================================================================

    /// Deep-copy a variable under a new name. Everything the source
    /// transitively depends on is copied too, under generated `_N` names,
    /// with references remapped to the copies.
    ///
    /// # Errors
    ///
    /// `UndefinedVariable` when the source is unknown.
    pub fn assign_var_copy(&mut self, new_name: &str, source: &str) -> Result<String> {
        let spos = self
            .position(source)
            .ok_or_else(|| EngineError::undefined_variable(source))?;
        let deps = self.transitive_deps(&[spos]);
        let mut map: FxHashMap<usize, String> = FxHashMap::default();
        for &pos in &deps {
            let name = if pos == spos {
                new_name.to_string()
            } else {
                self.next_var_name()
            };
            map.insert(pos, name);
        }
        for &pos in &deps {
            self.copy_one(pos, &map)?;
        }
        self.remove_unreferred()?;
        self.use_parameters()?;
        Ok(new_name.to_string())
    }

    /// Deep-copy a function under a new name (generated when `None`),
    /// copying its argument variables transitively with shared
    /// dependencies copied once.
    ///
    /// # Errors
    ///
    /// `UndefinedFunction` when the source is unknown.
    pub fn copy_function(&mut self, new_name: Option<&str>, source: &str) -> Result<String> {
        let f = self
            .find_function(source)
            .ok_or_else(|| EngineError::UndefinedFunction(source.to_string()))?;
        let roots = f.var_idx().to_vec();
        let tree = f.value_tree().clone();

        let deps = self.transitive_deps(&roots);
        let mut map: FxHashMap<usize, String> = FxHashMap::default();
        for &pos in &deps {
            let name = self.next_var_name();
            map.insert(pos, name);
        }
        for &pos in &deps {
            self.copy_one(pos, &map)?;
        }
        let new_varnames: Vec<String> = roots.iter().map(|p| map[p].clone()).collect();
        self.add_function(new_name, &tree, new_varnames)
    }

    // Positions the roots depend on (roots included), ascending. The
    // topological invariant makes ascending order a valid copy order.
    fn transitive_deps(&self, roots: &[usize]) -> Vec<usize> {
        let mut seen = vec![false; self.order.len()];
        let mut stack: Vec<usize> = roots.to_vec();
        while let Some(pos) = stack.pop() {
            if seen[pos] {
                continue;
            }
            seen[pos] = true;
            stack.extend_from_slice(self.var_at(pos).var_idx());
        }
        (0..self.order.len()).filter(|&i| seen[i]).collect()
    }

    // Install one copy; `map` renames every position in the copied set.
    fn copy_one(&mut self, pos: usize, map: &FxHashMap<usize, String>) -> Result<()> {
        let src = self.var_at(pos);
        let new_name = map[&pos].clone();
        if src.is_simple() {
            let value = src.value();
            let domain = src.domain();
            let nr = self.parameters.len();
            self.parameters.push(value);
            let mut var = Variable::simple(new_name, nr);
            var.set_domain(domain);
            self.install_raw(var)?;
        } else if src.is_mirror() {
            let value = src.value();
            let recs = src.recursive_derivatives().to_vec();
            let name = self.install_raw(Variable::mirror(new_name))?;
            self.set_mirror_snapshot(&name, value, recs)?;
        } else {
            let varnames: Vec<String> = src
                .var_idx()
                .iter()
                .map(|p| map[p].clone())
                .collect();
            let trees = match src.op_trees() {
                Some(t) => t.to_vec(),
                None => unreachable!("compound variable without formula"),
            };
            let var = Variable::compound(new_name, varnames, trees);
            self.install_raw(var)?;
        }
        Ok(())
    }

    // =========================================================================
    // Name generation
    // =========================================================================

    /// Next free auto variable name (`_1`, `_2`, ...).
    pub fn next_var_name(&mut self) -> String {
        loop {
            self.var_seq += 1;
            let name = format!("_{}", self.var_seq);
            if self.position(&name).is_none() {
                return name;
            }
        }
    }

    /// Next free function name (`F1`, `F2`, ...).
    pub fn next_func_name(&mut self) -> String {
        loop {
            self.func_seq += 1;
            let name = format!("F{}", self.func_seq);
            if self.find_function(&name).is_none() {
                return name;
            }
        }
    }
}

// Literal match with `*` standing for any (possibly empty) substring.
fn match_glob(name: &str, pattern: &str) -> bool {
    match pattern.split_once('*') {
        None => name == pattern,
        Some((head, tail)) => match name.strip_prefix(head) {
            Some(rest) => rest
                .char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(rest.len()))
                .any(|i| match_glob(&rest[i..], tail)),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simplify::{add, mul};

    fn compound_tree_2(coeff: f64) -> Expr {
        // $0 + coeff * $1
        add(Expr::var(0), mul(Expr::num(coeff), Expr::var(1)))
    }

    #[test]
    fn simple_then_compound_definition() {
        let mut mgr = VariableManager::new();
        mgr.assign_simple("a", 1.0, None).unwrap();
        mgr.assign_simple("b", 2.0, None).unwrap();
        mgr.assign(
            "c",
            &compound_tree_2(2.0),
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        assert_eq!(mgr.variable_value("c").unwrap(), 5.0);
        let c = mgr.find_variable("c").unwrap();
        assert_eq!(
            c.recursive_derivatives(),
            &[ParMult { p: 0, mult: 1.0 }, ParMult { p: 1, mult: 2.0 }]
        );
    }

    #[test]
    fn topological_invariant_holds_after_mutations() {
        let mut mgr = VariableManager::new();
        mgr.assign_simple("a", 1.0, None).unwrap();
        mgr.assign_simple("b", 2.0, None).unwrap();
        mgr.assign_simple("c", 3.0, None).unwrap();
        // Redefine a in terms of c: position 0 now depends on position 2.
        mgr.assign("a", &add(Expr::var(0), Expr::num(1.0)), vec!["c".into()])
            .unwrap();
        for (i, v) in mgr.variables().enumerate() {
            for &j in v.var_idx() {
                assert!(j < i, "variable ${} references a later position", v.name());
            }
        }
        assert_eq!(mgr.variable_value("a").unwrap(), 4.0);
    }

    #[test]
    fn cycle_is_rejected_and_graph_unchanged() {
        let mut mgr = VariableManager::new();
        mgr.assign_simple("b", 1.0, None).unwrap();
        mgr.assign("a", &add(Expr::var(0), Expr::num(1.0)), vec!["b".into()])
            .unwrap();
        // b = a * 2 would close a loop.
        let err = mgr
            .assign("b", &mul(Expr::num(2.0), Expr::var(0)), vec!["a".into()])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "detected loop in variable dependencies of $b"
        );
        // b is still the simple variable it was.
        let b = mgr.find_variable("b").unwrap();
        assert!(b.is_simple());
        assert_eq!(b.value(), 1.0);
        assert_eq!(mgr.variable_value("a").unwrap(), 2.0);
    }

    #[test]
    fn self_reference_is_a_loop() {
        let mut mgr = VariableManager::new();
        mgr.assign_simple("a", 1.0, None).unwrap();
        let err = mgr
            .assign("a", &add(Expr::var(0), Expr::num(1.0)), vec!["a".into()])
            .unwrap_err();
        assert!(matches!(err, EngineError::DependencyLoop(_)));
    }

    #[test]
    fn protected_delete_names_first_referrer() {
        let mut mgr = VariableManager::new();
        mgr.assign_simple("a", 1.0, None).unwrap();
        mgr.assign("b", &add(Expr::var(0), Expr::num(1.0)), vec!["a".into()])
            .unwrap();
        let err = mgr.delete_variables(&["a"]).unwrap_err();
        assert_eq!(err.to_string(), "can't delete $a because $b depends on it");
        // Deleting the referrer first unblocks the delete.
        mgr.delete_variables(&["b"]).unwrap();
        mgr.delete_variables(&["a"]).unwrap();
        assert!(mgr.find_variable("a").is_none());
        assert!(mgr.parameters().is_empty());
    }

    #[test]
    fn glob_delete_expands_against_both_lists() {
        let mut mgr = VariableManager::new();
        mgr.assign_simple("_1", 1.0, None).unwrap();
        mgr.assign_simple("_2", 2.0, None).unwrap();
        mgr.assign_simple("keep", 3.0, None).unwrap();
        mgr.delete_variables(&["_*"]).unwrap();
        assert!(mgr.find_variable("_1").is_none());
        assert!(mgr.find_variable("_2").is_none());
        assert_eq!(mgr.parameters(), &[3.0]);
        // Matching nothing is not an error; an unknown exact name is.
        mgr.delete_variables(&["_*"]).unwrap();
        assert!(mgr.delete_variables(&["_1"]).is_err());

        let tree = mul(Expr::var(0), Expr::var(1));
        mgr.add_function(Some("f1"), &tree, vec!["keep".into()]).unwrap();
        mgr.add_function(Some("f2"), &tree, vec!["keep".into()]).unwrap();
        mgr.delete_functions(&["f*"]).unwrap();
        assert!(mgr.find_function("f1").is_none());
        assert!(mgr.find_function("f2").is_none());
        assert!(mgr.find_variable("keep").is_some());
    }

    #[test]
    fn glob_delete_removes_referrers_in_the_same_sweep() {
        let mut mgr = VariableManager::new();
        mgr.assign_simple("_1", 1.0, None).unwrap();
        mgr.assign("_2", &add(Expr::var(0), Expr::num(1.0)), vec!["_1".into()])
            .unwrap();
        // _2 depends on _1; deleting both in one pattern still works
        // because the referrer goes first.
        mgr.delete_variables(&["_*"]).unwrap();
        assert_eq!(mgr.variables().count(), 0);
        assert!(mgr.parameters().is_empty());
    }

    #[test]
    fn glob_matching_is_literal_except_star() {
        assert!(match_glob("_1", "_*"));
        assert!(match_glob("_", "_*"));
        assert!(match_glob("bg0", "*0"));
        assert!(match_glob("abc", "a*c"));
        assert!(match_glob("ac", "a*c"));
        assert!(!match_glob("abd", "a*c"));
        assert!(!match_glob("keep", "_*"));
        assert!(!match_glob("ab", "a"));
    }

    #[test]
    fn parameter_compaction_shifts_slots() {
        let mut mgr = VariableManager::new();
        mgr.assign_simple("a", 10.0, None).unwrap();
        mgr.assign_simple("b", 20.0, None).unwrap();
        mgr.assign_simple("c", 30.0, None).unwrap();
        assert_eq!(mgr.parameters(), &[10.0, 20.0, 30.0]);
        mgr.delete_variables(&["b"]).unwrap();
        assert_eq!(mgr.parameters(), &[10.0, 30.0]);
        assert_eq!(mgr.find_variable("c").unwrap().parameter_slot(), Some(1));
        assert_eq!(mgr.variable_value("c").unwrap(), 30.0);
    }

    #[test]
    fn redefining_simple_reclaims_old_slot() {
        let mut mgr = VariableManager::new();
        mgr.assign_simple("a", 1.0, None).unwrap();
        mgr.assign_simple("b", 2.0, None).unwrap();
        mgr.assign_simple("a", 5.0, None).unwrap();
        // Still two slots: the orphaned one was compacted away.
        assert_eq!(mgr.parameters().len(), 2);
        assert_eq!(mgr.variable_value("a").unwrap(), 5.0);
        assert_eq!(mgr.variable_value("b").unwrap(), 2.0);
    }

    #[test]
    fn auto_variables_are_swept_when_orphaned() {
        let mut mgr = VariableManager::new();
        mgr.assign_simple("_1", 1.0, None).unwrap();
        mgr.assign("v", &add(Expr::var(0), Expr::num(1.0)), vec!["_1".into()])
            .unwrap();
        assert!(mgr.find_variable("_1").is_some());
        mgr.delete_variables(&["v"]).unwrap();
        // The auto variable lost its only referrer.
        assert!(mgr.find_variable("_1").is_none());
        assert!(mgr.parameters().is_empty());
    }

    #[test]
    fn external_parameters_recompute_the_graph() {
        let mut mgr = VariableManager::new();
        mgr.assign_simple("a", 1.0, None).unwrap();
        mgr.assign("b", &mul(Expr::num(3.0), Expr::var(0)), vec!["a".into()])
            .unwrap();
        assert_eq!(mgr.variable_value("b").unwrap(), 3.0);
        mgr.use_external_parameters(&[2.0]).unwrap();
        assert_eq!(mgr.variable_value("a").unwrap(), 2.0);
        assert_eq!(mgr.variable_value("b").unwrap(), 6.0);
    }

    #[test]
    fn variable_copy_remaps_dependencies() {
        let mut mgr = VariableManager::new();
        mgr.assign_simple("a", 2.0, None).unwrap();
        mgr.assign("b", &mul(Expr::num(10.0), Expr::var(0)), vec!["a".into()])
            .unwrap();
        mgr.assign_var_copy("b2", "b").unwrap();
        assert_eq!(mgr.variable_value("b2").unwrap(), 20.0);
        // The copy has its own parameter: changing a does not move b2.
        let slot_a = mgr.find_variable("a").unwrap().parameter_slot().unwrap();
        let mut params = mgr.parameters().to_vec();
        params[slot_a] = 5.0;
        mgr.use_external_parameters(&params).unwrap();
        assert_eq!(mgr.variable_value("b").unwrap(), 50.0);
        assert_eq!(mgr.variable_value("b2").unwrap(), 20.0);
    }

    #[test]
    fn function_copy_shares_copied_dependencies() {
        let mut mgr = VariableManager::new();
        mgr.assign_simple("a", 2.0, None).unwrap();
        // f(a; x) = a * x
        let tree = mul(Expr::var(0), Expr::var(1));
        mgr.add_function(Some("f"), &tree, vec!["a".into()]).unwrap();
        let copy = mgr.copy_function(None, "f").unwrap();
        assert_eq!(mgr.function_value(&copy, 3.0).unwrap(), 6.0);
        // The copy is bound to a fresh auto variable, not to a.
        let arg = mgr.find_function(&copy).unwrap().varnames()[0].clone();
        assert_ne!(arg, "a");
        assert!(mgr.find_variable(&arg).unwrap().is_auto());
    }

    #[test]
    fn mirror_snapshot_feeds_dependents() {
        let mut mgr = VariableManager::new();
        mgr.define_mirror("m").unwrap();
        mgr.set_mirror_snapshot("m", 4.0, vec![ParMult { p: 0, mult: 1.0 }])
            .unwrap();
        mgr.assign("d", &mul(Expr::num(2.0), Expr::var(0)), vec!["m".into()])
            .unwrap();
        assert_eq!(mgr.variable_value("d").unwrap(), 8.0);
        let d = mgr.find_variable("d").unwrap();
        assert_eq!(d.recursive_derivatives(), &[ParMult { p: 0, mult: 2.0 }]);
    }
}
