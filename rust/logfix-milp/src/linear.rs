//! Linear-model IR: variable keys, linear expressions and constraints.
//!
//! Every decision variable is addressed by a [`VarKey`] derived purely from
//! logical indices (statement, tuple, attribute, literal site), so two
//! assemblies of the same input produce identical names. The textual name of
//! a key is its `Display` form and is what solver backends see.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

// ── Keys ────────────────────────────────────────────────────────────

/// Where a correctable literal constant lives in the log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "site", rename_all = "lowercase")]
pub enum SlotKey {
    /// Literal of the SET expression of `column`.
    Set { stmt: usize, column: String },
    /// Right operand of WHERE condition number `cond` (on `attribute`).
    Where {
        stmt: usize,
        attribute: String,
        cond: usize,
    },
    /// INSERT value for `column`.
    Insert { stmt: usize, column: String },
}

impl SlotKey {
    pub fn stmt(&self) -> usize {
        match self {
            SlotKey::Set { stmt, .. } | SlotKey::Where { stmt, .. } | SlotKey::Insert { stmt, .. } => {
                *stmt
            }
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Set { stmt, column } => write!(f, "set_q{}_{}", stmt, column),
            SlotKey::Where {
                stmt,
                attribute,
                cond,
            } => write!(f, "where_q{}_{}_{}", stmt, attribute, cond),
            SlotKey::Insert { stmt, column } => write!(f, "ins_q{}_{}", stmt, column),
        }
    }
}

/// Role of an auxiliary variable hanging off another variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Truth of a comparison.
    Holds,
    /// Forward (`a <= b`) leg of an equality test.
    Forward,
    /// Backward (`b <= a`) leg of an equality test.
    Backward,
    /// Running conjunction over the first `k + 1` conditions.
    Partial(usize),
    /// "Output equals the ghost value" test of an error indicator.
    Ghost,
    /// Agreement between the modeled and the asserted presence.
    Agree,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Holds => write!(f, "holds"),
            Role::Forward => write!(f, "fwd"),
            Role::Backward => write!(f, "bwd"),
            Role::Partial(k) => write!(f, "all{}", k),
            Role::Ghost => write!(f, "ghost"),
            Role::Agree => write!(f, "agree"),
        }
    }
}

/// Deterministic identity of a model variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum VarKey {
    /// `x`: statement `stmt` acts on tuple `tuple`.
    Select { stmt: usize, tuple: usize },
    /// `e`: statement `stmt` is implicated by the complaint on `tuple`.
    Error { stmt: usize, tuple: usize },
    /// `s`: the WHERE clause holds on the pre-statement tuple.
    Sigma { stmt: usize, tuple: usize },
    /// `m`: signed margin of condition `cond` (lhs minus rhs).
    Margin {
        stmt: usize,
        tuple: usize,
        cond: usize,
    },
    /// `p`: tuple present at log position `pos` (before statement `pos`).
    Presence { pos: usize, tuple: usize },
    /// Pre-statement value of an attribute.
    In {
        stmt: usize,
        tuple: usize,
        attr: String,
    },
    /// Post-statement value of an attribute.
    Out {
        stmt: usize,
        tuple: usize,
        attr: String,
    },
    /// `u`: contribution of the applied branch.
    Applied {
        stmt: usize,
        tuple: usize,
        attr: String,
    },
    /// `v`: contribution of the retained branch.
    Retained {
        stmt: usize,
        tuple: usize,
        attr: String,
    },
    /// Correctable literal constant.
    Const(SlotKey),
    /// Absolute deviation of a literal from its logged value.
    Deviation(SlotKey),
    /// Auxiliary variable owned by another variable.
    Aux { of: Box<VarKey>, role: Role },
    /// Free-form variable for encodings built outside the log model.
    Named(String),
}

impl VarKey {
    pub fn named(name: impl Into<String>) -> Self {
        VarKey::Named(name.into())
    }

    pub fn aux(&self, role: Role) -> Self {
        VarKey::Aux {
            of: Box::new(self.clone()),
            role,
        }
    }

    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for VarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarKey::Select { stmt, tuple } => write!(f, "x_q{}_t{}", stmt, tuple),
            VarKey::Error { stmt, tuple } => write!(f, "e_q{}_t{}", stmt, tuple),
            VarKey::Sigma { stmt, tuple } => write!(f, "s_q{}_t{}", stmt, tuple),
            VarKey::Margin { stmt, tuple, cond } => write!(f, "m_q{}_t{}_c{}", stmt, tuple, cond),
            VarKey::Presence { pos, tuple } => write!(f, "p_q{}_t{}", pos, tuple),
            VarKey::In { stmt, tuple, attr } => write!(f, "in_q{}_t{}_{}", stmt, tuple, attr),
            VarKey::Out { stmt, tuple, attr } => write!(f, "out_q{}_t{}_{}", stmt, tuple, attr),
            VarKey::Applied { stmt, tuple, attr } => {
                write!(f, "u_out_q{}_t{}_{}", stmt, tuple, attr)
            }
            VarKey::Retained { stmt, tuple, attr } => {
                write!(f, "v_out_q{}_t{}_{}", stmt, tuple, attr)
            }
            VarKey::Const(slot) => write!(f, "const_{}", slot),
            VarKey::Deviation(slot) => write!(f, "dev_{}", slot),
            VarKey::Aux { of, role } => write!(f, "{}_{}", role, of),
            VarKey::Named(name) => f.write_str(name),
        }
    }
}

// ── Variables ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Binary,
    Integer,
    Continuous,
}

/// How a variable's value follows from other variables.
///
/// Definitions never reach a solver. They let [`crate::Model::complete`]
/// derive a full assignment from the primary variables, which is how
/// encodings are checked without a MILP backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Fixed(f64),
    Expr(LinExpr),
    /// `indicator * value` with a binary indicator.
    Product { indicator: LinExpr, value: LinExpr },
    /// 1 when `expr <= 0`, else 0.
    Holds(LinExpr),
    /// 1 when every operand is 1.
    All(Vec<LinExpr>),
    /// `|expr|`.
    Magnitude(LinExpr),
}

impl Definition {
    /// Keys this definition reads.
    pub fn dependencies(&self) -> Vec<&VarKey> {
        match self {
            Definition::Fixed(_) => Vec::new(),
            Definition::Expr(e) | Definition::Holds(e) | Definition::Magnitude(e) => {
                e.keys().collect()
            }
            Definition::Product { indicator, value } => indicator.keys().chain(value.keys()).collect(),
            Definition::All(es) => es.iter().flat_map(|e| e.keys()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub key: VarKey,
    pub domain: Domain,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub definition: Option<Definition>,
}

impl Variable {
    pub fn binary(key: VarKey) -> Self {
        Self {
            key,
            domain: Domain::Binary,
            lower: Some(0.0),
            upper: Some(1.0),
            definition: None,
        }
    }

    /// Continuous and unbounded.
    pub fn continuous(key: VarKey) -> Self {
        Self {
            key,
            domain: Domain::Continuous,
            lower: None,
            upper: None,
            definition: None,
        }
    }

    pub fn integer(key: VarKey) -> Self {
        Self {
            key,
            domain: Domain::Integer,
            lower: None,
            upper: None,
            definition: None,
        }
    }

    pub fn bounded(mut self, lower: f64, upper: f64) -> Self {
        self.lower = Some(lower);
        self.upper = Some(upper);
        self
    }

    pub fn at_least(mut self, lower: f64) -> Self {
        self.lower = Some(lower);
        self
    }

    pub fn defined(mut self, definition: Definition) -> Self {
        self.definition = Some(definition);
        self
    }
}

// ── Linear expressions ──────────────────────────────────────────────

/// `sum(coef * var) + constant`, kept in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: BTreeMap<VarKey, f64>,
    constant: f64,
}

impl LinExpr {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn var(key: VarKey) -> Self {
        Self::term(key, 1.0)
    }

    pub fn term(key: VarKey, coef: f64) -> Self {
        let mut e = Self::zero();
        e.add_term(key, coef);
        e
    }

    /// `1 - key`, the complement of a binary.
    pub fn not(key: VarKey) -> Self {
        Self::constant(1.0) - Self::var(key)
    }

    pub fn add_term(&mut self, key: VarKey, coef: f64) {
        let c = self.coefficient(&key) + coef;
        if c == 0.0 {
            self.terms.remove(&key);
        } else {
            self.terms.insert(key, c);
        }
    }

    pub fn terms(&self) -> impl Iterator<Item = (&VarKey, f64)> {
        self.terms.iter().map(|(k, c)| (k, *c))
    }

    pub fn keys(&self) -> impl Iterator<Item = &VarKey> {
        self.terms.keys()
    }

    pub fn coefficient(&self, key: &VarKey) -> f64 {
        self.terms.get(key).copied().unwrap_or(0.0)
    }

    pub fn constant_part(&self) -> f64 {
        self.constant
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// Same terms, constant dropped.
    pub fn linear_part(&self) -> Self {
        Self {
            terms: self.terms.clone(),
            constant: 0.0,
        }
    }

    /// Evaluate with `lookup`; `None` if a variable has no value.
    pub fn eval_with<F>(&self, mut lookup: F) -> Option<f64>
    where
        F: FnMut(&VarKey) -> Option<f64>,
    {
        let mut total = self.constant;
        for (k, c) in &self.terms {
            total += c * lookup(k)?;
        }
        Some(total)
    }

    pub fn eval(&self, assignment: &Assignment) -> Option<f64> {
        self.eval_with(|k| assignment.get(k))
    }

    /// Sum of `|coef * value|` over the terms plus `|constant|`, the scale
    /// used for relative feasibility tolerances.
    pub fn magnitude_with<F>(&self, mut lookup: F) -> f64
    where
        F: FnMut(&VarKey) -> Option<f64>,
    {
        self.terms
            .iter()
            .map(|(k, c)| (c * lookup(k).unwrap_or(0.0)).abs())
            .sum::<f64>()
            + self.constant.abs()
    }
}

impl From<VarKey> for LinExpr {
    fn from(key: VarKey) -> Self {
        LinExpr::var(key)
    }
}

impl From<&VarKey> for LinExpr {
    fn from(key: &VarKey) -> Self {
        LinExpr::var(key.clone())
    }
}

impl From<f64> for LinExpr {
    fn from(value: f64) -> Self {
        LinExpr::constant(value)
    }
}

impl Add for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: LinExpr) -> LinExpr {
        for (k, c) in rhs.terms {
            self.add_term(k, c);
        }
        self.constant += rhs.constant;
        self
    }
}

impl Add<f64> for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: f64) -> LinExpr {
        self.constant += rhs;
        self
    }
}

impl Sub for LinExpr {
    type Output = LinExpr;

    fn sub(self, rhs: LinExpr) -> LinExpr {
        self + (-rhs)
    }
}

impl Sub<f64> for LinExpr {
    type Output = LinExpr;

    fn sub(mut self, rhs: f64) -> LinExpr {
        self.constant -= rhs;
        self
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;

    fn neg(self) -> LinExpr {
        self * -1.0
    }
}

impl Mul<f64> for LinExpr {
    type Output = LinExpr;

    fn mul(mut self, k: f64) -> LinExpr {
        if k == 0.0 {
            return LinExpr::zero();
        }
        for c in self.terms.values_mut() {
            *c *= k;
        }
        self.constant *= k;
        self
    }
}

impl fmt::Display for LinExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, c) in &self.terms {
            let sign = if *c < 0.0 { "-" } else { "+" };
            if first {
                if *c < 0.0 {
                    write!(f, "-")?;
                }
            } else {
                write!(f, " {} ", sign)?;
            }
            if c.abs() != 1.0 {
                write!(f, "{} ", c.abs())?;
            }
            write!(f, "{}", k)?;
            first = false;
        }
        if first {
            write!(f, "{}", self.constant)
        } else if self.constant != 0.0 {
            let sign = if self.constant < 0.0 { "-" } else { "+" };
            write!(f, " {} {}", sign, self.constant.abs())
        } else {
            Ok(())
        }
    }
}

// ── Constraints ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sense::Le => write!(f, "<="),
            Sense::Ge => write!(f, ">="),
            Sense::Eq => write!(f, "="),
        }
    }
}

/// `expr <sense> rhs`, with every variable term on the left.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub label: String,
    pub expr: LinExpr,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    /// Normalize `lhs <sense> rhs` into `terms <sense> constant`.
    pub fn new(label: impl Into<String>, lhs: LinExpr, sense: Sense, rhs: LinExpr) -> Self {
        let diff = lhs - rhs;
        let rhs = -diff.constant_part();
        Self {
            label: label.into(),
            expr: diff.linear_part(),
            sense,
            rhs,
        }
    }

    pub fn le(label: impl Into<String>, lhs: LinExpr, rhs: LinExpr) -> Self {
        Self::new(label, lhs, Sense::Le, rhs)
    }

    pub fn ge(label: impl Into<String>, lhs: LinExpr, rhs: LinExpr) -> Self {
        Self::new(label, lhs, Sense::Ge, rhs)
    }

    pub fn eq(label: impl Into<String>, lhs: LinExpr, rhs: LinExpr) -> Self {
        Self::new(label, lhs, Sense::Eq, rhs)
    }

    /// How far the constraint is from holding (0 when satisfied), or
    /// `None` if a variable is unassigned.
    pub fn excess(&self, assignment: &Assignment) -> Option<f64> {
        let lhs = self.expr.eval(assignment)?;
        Some(match self.sense {
            Sense::Le => (lhs - self.rhs).max(0.0),
            Sense::Ge => (self.rhs - lhs).max(0.0),
            Sense::Eq => (lhs - self.rhs).abs(),
        })
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {} {}", self.label, self.expr, self.sense, self.rhs)
    }
}

// ── Assignments ─────────────────────────────────────────────────────

/// Values for (some of) a model's variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    values: HashMap<VarKey, f64>,
}

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: VarKey, value: f64) {
        self.values.insert(key, value);
    }

    pub fn with(mut self, key: VarKey, value: f64) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &VarKey) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn contains(&self, key: &VarKey) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VarKey, f64)> {
        self.values.iter().map(|(k, v)| (k, *v))
    }

    /// True when the binary `key` is set (>= 0.5).
    pub fn is_set(&self, key: &VarKey) -> bool {
        self.get(key).is_some_and(|v| v >= 0.5)
    }
}

impl FromIterator<(VarKey, f64)> for Assignment {
    fn from_iter<I: IntoIterator<Item = (VarKey, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl Extend<(VarKey, f64)> for Assignment {
    fn extend<I: IntoIterator<Item = (VarKey, f64)>>(&mut self, iter: I) {
        self.values.extend(iter);
    }
}
