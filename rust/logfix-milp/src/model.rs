//! The MILP model: a variable registry plus a constraint list.
//!
//! `Model` is the only stateful piece of the encoder. Variables are keyed by
//! [`VarKey`] and declared at most once; gadget outputs are merged into
//! pre-declared variables through [`Model::absorb`]. Two evaluation helpers
//! make the model testable without a solver:
//!
//! - [`Model::violations`] checks a full assignment against every
//!   constraint, domain and bound.
//! - [`Model::complete`] derives the values of defined variables from a
//!   seed of primary ones, producing a witness (or a MIP start).

use crate::gadgets::Encoding;
use crate::linear::{Assignment, Constraint, Definition, Domain, LinExpr, VarKey, Variable};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;

/// Relative tolerance used by [`Model::violations`].
pub const FEASIBILITY_TOLERANCE: f64 = 1e-7;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("variable `{0}` declared twice")]
    DuplicateVariable(String),
    #[error("variable `{0}` is not declared")]
    UnknownVariable(String),
    #[error("variable `{0}` redeclared with a different domain")]
    DomainConflict(String),
    #[error("variable `{0}` already has a definition")]
    Redefined(String),
    #[error("variable `{0}` has neither a value nor a definition")]
    Undetermined(String),
    #[error("definition of `{0}` depends on itself")]
    DefinitionCycle(String),
    #[error("statement #{stmt}: `{expr}` is not linear in the attributes")]
    NonLinear { stmt: usize, expr: String },
    #[error("statement #{stmt}: unknown attribute `{attribute}`")]
    UnknownAttribute { stmt: usize, attribute: String },
    #[error("statement #{stmt}: `{text}` is not a number")]
    NonNumericValue { stmt: usize, text: String },
    #[error("statement #{stmt}: division by zero")]
    DivisionByZero { stmt: usize },
    #[error("statement #{stmt}: INSERT has {found} values for {expected} attributes")]
    InsertArity {
        stmt: usize,
        expected: usize,
        found: usize,
    },
}

/// One way an assignment fails the model.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    Unassigned { var: String },
    Domain { var: String, value: f64 },
    Bound { var: String, value: f64 },
    Constraint { label: String, excess: f64 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Unassigned { var } => write!(f, "{} has no value", var),
            Violation::Domain { var, value } => write!(f, "{} = {} is outside its domain", var, value),
            Violation::Bound { var, value } => write!(f, "{} = {} is outside its bounds", var, value),
            Violation::Constraint { label, excess } => {
                write!(f, "{} violated by {}", label, excess)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelStats {
    pub binaries: usize,
    pub integers: usize,
    pub continuous: usize,
    pub constraints: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    variables: Vec<Variable>,
    by_key: HashMap<VarKey, usize>,
    by_name: HashMap<String, usize>,
    constraints: Vec<Constraint>,
    objective: Option<LinExpr>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registry ────────────────────────────────────────────────────

    pub fn declare(&mut self, var: Variable) -> Result<(), ModelError> {
        let name = var.key.to_string();
        if self.by_key.contains_key(&var.key) || self.by_name.contains_key(&name) {
            return Err(ModelError::DuplicateVariable(name));
        }
        let idx = self.variables.len();
        self.by_key.insert(var.key.clone(), idx);
        self.by_name.insert(name, idx);
        self.variables.push(var);
        Ok(())
    }

    /// Merge a gadget encoding and return its output key.
    ///
    /// Variables the model already knows keep their declaration; the
    /// encoding may add a definition (once) and tighten bounds, but not
    /// change the domain.
    pub fn absorb(&mut self, encoding: Encoding) -> Result<VarKey, ModelError> {
        for var in encoding.vars {
            match self.by_key.get(&var.key).copied() {
                Some(idx) => {
                    let existing = &mut self.variables[idx];
                    if existing.domain != var.domain {
                        return Err(ModelError::DomainConflict(var.key.to_string()));
                    }
                    if let Some(def) = var.definition {
                        if existing.definition.is_some() {
                            return Err(ModelError::Redefined(var.key.to_string()));
                        }
                        existing.definition = Some(def);
                    }
                    existing.lower = tighter(existing.lower, var.lower, f64::max);
                    existing.upper = tighter(existing.upper, var.upper, f64::min);
                }
                None => self.declare(var)?,
            }
        }
        self.constraints.extend(encoding.constraints);
        Ok(encoding.output)
    }

    pub fn constrain(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    /// Attach a definition to a declared variable.
    pub fn define(&mut self, key: &VarKey, definition: Definition) -> Result<(), ModelError> {
        let idx = self.index(key)?;
        let var = &mut self.variables[idx];
        if var.definition.is_some() {
            return Err(ModelError::Redefined(key.to_string()));
        }
        var.definition = Some(definition);
        Ok(())
    }

    /// Constrain `key = expr` and record it as the definition of `key`.
    pub fn equate(&mut self, key: &VarKey, expr: LinExpr) -> Result<(), ModelError> {
        let definition = if expr.is_constant() {
            Definition::Fixed(expr.constant_part())
        } else {
            Definition::Expr(expr.clone())
        };
        self.define(key, definition)?;
        self.constrain(Constraint::eq(format!("def_{}", key), LinExpr::var(key.clone()), expr));
        Ok(())
    }

    pub fn fix(&mut self, key: &VarKey, value: f64) -> Result<(), ModelError> {
        self.equate(key, LinExpr::constant(value))
    }

    pub fn set_objective(&mut self, objective: LinExpr) {
        self.objective = Some(objective);
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> Option<&LinExpr> {
        self.objective.as_ref()
    }

    pub fn get(&self, key: &VarKey) -> Option<&Variable> {
        self.by_key.get(key).map(|&i| &self.variables[i])
    }

    pub fn contains(&self, key: &VarKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Resolve a solver-facing name back to its key.
    pub fn lookup(&self, name: &str) -> Option<&VarKey> {
        self.by_name.get(name).map(|&i| &self.variables[i].key)
    }

    pub fn stats(&self) -> ModelStats {
        let mut stats = ModelStats {
            constraints: self.constraints.len(),
            ..ModelStats::default()
        };
        for v in &self.variables {
            match v.domain {
                Domain::Binary => stats.binaries += 1,
                Domain::Integer => stats.integers += 1,
                Domain::Continuous => stats.continuous += 1,
            }
        }
        stats
    }

    fn index(&self, key: &VarKey) -> Result<usize, ModelError> {
        self.by_key
            .get(key)
            .copied()
            .ok_or_else(|| ModelError::UnknownVariable(key.to_string()))
    }

    /// Every variable referenced by a constraint or the objective must be
    /// declared, since solvers would otherwise give it default bounds.
    pub fn check_references(&self) -> Result<(), ModelError> {
        let referenced = self
            .constraints
            .iter()
            .flat_map(|c| c.expr.keys())
            .chain(self.objective.iter().flat_map(|o| o.keys()));
        for key in referenced {
            self.index(key)?;
        }
        Ok(())
    }

    // ── Evaluation ──────────────────────────────────────────────────

    pub fn violations(&self, assignment: &Assignment) -> Vec<Violation> {
        self.violations_with(assignment, FEASIBILITY_TOLERANCE)
    }

    /// Check `assignment` against domains, bounds and constraints.
    ///
    /// A constraint counts as violated when its excess exceeds
    /// `tolerance * (1 + scale)`, where scale is the magnitude of its
    /// evaluated terms.
    pub fn violations_with(&self, assignment: &Assignment, tolerance: f64) -> Vec<Violation> {
        let mut out = Vec::new();
        for var in &self.variables {
            let name = var.key.to_string();
            let Some(value) = assignment.get(&var.key) else {
                out.push(Violation::Unassigned { var: name });
                continue;
            };
            let slack = tolerance * (1.0 + value.abs());
            let integral = matches!(var.domain, Domain::Binary | Domain::Integer);
            if !value.is_finite() || (integral && (value - value.round()).abs() > slack.max(1e-6)) {
                out.push(Violation::Domain { var: name.clone(), value });
            }
            let below = var.lower.is_some_and(|lo| value < lo - slack);
            let above = var.upper.is_some_and(|hi| value > hi + slack);
            if below || above {
                out.push(Violation::Bound { var: name, value });
            }
        }

        let mut missing = BTreeSet::new();
        for c in &self.constraints {
            match c.excess(assignment) {
                Some(excess) => {
                    let scale = c.expr.magnitude_with(|k| assignment.get(k)) + c.rhs.abs();
                    if excess > tolerance * (1.0 + scale) {
                        out.push(Violation::Constraint {
                            label: c.label.clone(),
                            excess,
                        });
                    }
                }
                None => {
                    for k in c.expr.keys().filter(|k| !assignment.contains(k)) {
                        if !self.contains(k) {
                            missing.insert(k.to_string());
                        }
                    }
                }
            }
        }
        out.extend(missing.into_iter().map(|var| Violation::Unassigned { var }));
        out
    }

    pub fn is_feasible(&self, assignment: &Assignment) -> bool {
        self.violations(assignment).is_empty()
    }

    /// Value of the objective under `assignment` (0 for a pure
    /// feasibility model).
    pub fn objective_value(&self, assignment: &Assignment) -> Option<f64> {
        match &self.objective {
            Some(o) => o.eval(assignment),
            None => Some(0.0),
        }
    }

    /// Extend `seed` with the value of every defined variable.
    ///
    /// Seeded values win over definitions. Fails if a declared variable has
    /// neither, or if definitions form a cycle.
    pub fn complete(&self, seed: &Assignment) -> Result<Assignment, ModelError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Fresh,
            Open,
            Done,
        }

        let mut values = seed.clone();
        let mut marks = vec![Mark::Fresh; self.variables.len()];

        for root in 0..self.variables.len() {
            let mut stack = vec![(root, false)];
            while let Some((idx, expanded)) = stack.pop() {
                let var = &self.variables[idx];
                if marks[idx] == Mark::Done || values.contains(&var.key) {
                    marks[idx] = Mark::Done;
                    continue;
                }
                let definition = var
                    .definition
                    .as_ref()
                    .ok_or_else(|| ModelError::Undetermined(var.key.to_string()))?;
                if expanded {
                    let value = evaluate(definition, &values)
                        .ok_or_else(|| ModelError::Undetermined(var.key.to_string()))?;
                    values.insert(var.key.clone(), value);
                    marks[idx] = Mark::Done;
                    continue;
                }
                if marks[idx] == Mark::Open {
                    return Err(ModelError::DefinitionCycle(var.key.to_string()));
                }
                marks[idx] = Mark::Open;
                stack.push((idx, true));
                for dep in definition.dependencies() {
                    if values.contains(dep) {
                        continue;
                    }
                    let d = self.index(dep)?;
                    match marks[d] {
                        Mark::Done => {}
                        Mark::Open => return Err(ModelError::DefinitionCycle(dep.to_string())),
                        Mark::Fresh => stack.push((d, false)),
                    }
                }
            }
        }
        Ok(values)
    }
}

fn tighter(a: Option<f64>, b: Option<f64>, pick: fn(f64, f64) -> f64) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(pick(x, y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn evaluate(definition: &Definition, values: &Assignment) -> Option<f64> {
    let at = |e: &LinExpr| e.eval(values);
    Some(match definition {
        Definition::Fixed(v) => *v,
        Definition::Expr(e) => at(e)?,
        Definition::Product { indicator, value } => {
            if at(indicator)? >= 0.5 {
                at(value)?
            } else {
                0.0
            }
        }
        Definition::Holds(e) => {
            let v = at(e)?;
            let scale = e.magnitude_with(|k| values.get(k));
            if v <= FEASIBILITY_TOLERANCE * (1.0 + scale) {
                1.0
            } else {
                0.0
            }
        }
        Definition::All(es) => {
            let mut all = true;
            for e in es {
                all &= at(e)? >= 0.5;
            }
            if all {
                1.0
            } else {
                0.0
            }
        }
        Definition::Magnitude(e) => at(e)?.abs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gadgets;

    #[test]
    fn duplicate_declaration_rejected() {
        let mut model = Model::new();
        model.declare(Variable::binary(VarKey::named("b"))).unwrap();
        assert_eq!(
            model.declare(Variable::binary(VarKey::named("b"))),
            Err(ModelError::DuplicateVariable("b".into()))
        );
    }

    #[test]
    fn absorb_fills_pre_declared_variable() {
        let (b, b1, b2) = (VarKey::named("b"), VarKey::named("b1"), VarKey::named("b2"));
        let mut model = Model::new();
        model.declare(Variable::binary(b.clone())).unwrap();
        model
            .absorb(gadgets::and(b.clone(), &b1.into(), &b2.into()))
            .unwrap();
        assert!(model.get(&b).unwrap().definition.is_some());
        assert_eq!(model.constraints().len(), 3);
    }

    #[test]
    fn absorb_rejects_domain_change() {
        let v = VarKey::named("v");
        let mut model = Model::new();
        model.declare(Variable::continuous(v.clone())).unwrap();
        let err = model
            .absorb(gadgets::and(v, &LinExpr::constant(1.0), &LinExpr::constant(1.0)))
            .unwrap_err();
        assert_eq!(err, ModelError::DomainConflict("v".into()));
    }

    #[test]
    fn second_definition_rejected() {
        let v = VarKey::named("v");
        let mut model = Model::new();
        model.declare(Variable::continuous(v.clone())).unwrap();
        model.fix(&v, 1.0).unwrap();
        assert_eq!(model.fix(&v, 2.0), Err(ModelError::Redefined("v".into())));
    }

    #[test]
    fn complete_detects_cycles() {
        let (a, b) = (VarKey::named("a"), VarKey::named("b"));
        let mut model = Model::new();
        model.declare(Variable::continuous(a.clone())).unwrap();
        model.declare(Variable::continuous(b.clone())).unwrap();
        model.equate(&a, LinExpr::var(b.clone()) + 1.0).unwrap();
        model.equate(&b, LinExpr::var(a.clone()) + 1.0).unwrap();
        assert!(matches!(
            model.complete(&Assignment::new()),
            Err(ModelError::DefinitionCycle(_))
        ));
        let seeded = model.complete(&Assignment::new().with(b.clone(), 4.0)).unwrap();
        assert_eq!(seeded.get(&a), Some(5.0));
    }

    #[test]
    fn complete_requires_primary_values() {
        let a = VarKey::named("a");
        let mut model = Model::new();
        model.declare(Variable::continuous(a)).unwrap();
        assert_eq!(
            model.complete(&Assignment::new()),
            Err(ModelError::Undetermined("a".into()))
        );
    }

    #[test]
    fn binary_domain_checked() {
        let b = VarKey::named("b");
        let mut model = Model::new();
        model.declare(Variable::binary(b.clone())).unwrap();
        let v = model.violations(&Assignment::new().with(b, 0.5));
        assert!(matches!(v[0], Violation::Domain { .. }));
    }

    #[test]
    fn unknown_reference_is_reported() {
        let mut model = Model::new();
        model.constrain(Constraint::le(
            "c",
            LinExpr::var(VarKey::named("ghost")),
            LinExpr::constant(1.0),
        ));
        assert_eq!(
            model.check_references(),
            Err(ModelError::UnknownVariable("ghost".into()))
        );
    }
}
