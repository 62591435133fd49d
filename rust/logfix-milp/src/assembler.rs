//! Per-statement constraint assembly.
//!
//! Walks the log in order and, for every statement and every tuple of the
//! provenance relation, emits the constraints that tie the tuple's
//! post-statement values to its pre-statement values:
//!
//! ```text
//! UPDATE   x = s AND p;  u = x * new;  v = (1 - x) * in;  out = u + v;  p' = p
//! DELETE   x = s AND p;  u = G * x;    v = (1 - x) * in;  out = u + v;  p' = p - x
//! INSERT   x = [j is the inserted tuple];  out = literals (or in);  p' = p + x
//! UNKNOWN  x = 0;  out = in;  p' = p
//! ```
//!
//! Every `in` is tied to its presence bit (`ghost_link`), consecutive
//! statements are chained with `in[i+1] = out[i]`, and the last `out` is
//! anchored to the targets derived from the final state and complaints.

use crate::config::EncodingParams;
use crate::gadgets::{self, Encoding};
use crate::linear::{Constraint, LinExpr, Role, SlotKey, VarKey};
use crate::model::{Model, ModelError};
use crate::provenance::Relation;
use crate::targets::{Anchor, Targets};
use crate::variables::{slot_of, VariableSets};
use logfix_core::{ArithOp, Assignment, CmpOp, Condition, Expression, Literal, LiteralSite, Operand, Statement};
use tracing::debug;

pub struct Assembler<'a> {
    model: &'a mut Model,
    sets: &'a VariableSets,
    relation: &'a Relation,
    log: &'a [Statement],
    params: EncodingParams,
}

impl<'a> Assembler<'a> {
    pub fn new(
        model: &'a mut Model,
        sets: &'a VariableSets,
        relation: &'a Relation,
        log: &'a [Statement],
        params: EncodingParams,
    ) -> Self {
        Self {
            model,
            sets,
            relation,
            log,
            params,
        }
    }

    pub fn assemble(mut self, targets: &Targets) -> Result<(), ModelError> {
        let log = self.log;
        let n = log.len();
        if n == 0 {
            return Ok(());
        }
        self.initial_state()?;
        for (i, stmt) in log.iter().enumerate() {
            self.link_presence(i, |sets, j, a| sets.input(i, j, a));
            match stmt {
                Statement::Update {
                    assignments,
                    conditions,
                    ..
                } => self.update(i, assignments, conditions)?,
                Statement::Delete { conditions, .. } => self.delete(i, conditions)?,
                Statement::Insert {
                    columns, values, ..
                } => self.insert(i, columns.as_deref(), values)?,
                Statement::Unknown { .. } => self.pass_through(i)?,
            }
            if i + 1 < n {
                self.chain(i)?;
            }
            debug!(stmt = i, kind = stmt.kind(), "encoded statement");
        }
        self.link_presence(n, |sets, j, a| sets.output(n - 1, j, a));
        self.anchor(targets);
        self.error_indicators(targets)?;
        self.pin_literals();
        Ok(())
    }

    // ── Tuple state ─────────────────────────────────────────────────

    fn initial_state(&mut self) -> Result<(), ModelError> {
        let sets = self.sets;
        let relation = self.relation;
        let ghost = self.params.ghost;
        for (j, tuple) in relation.tuples().iter().enumerate() {
            let present = if tuple.is_initial() { 1.0 } else { 0.0 };
            self.model.fix(&self.sets.presence(0, j), present)?;
            for a in &sets.attributes {
                let value = tuple
                    .values
                    .as_ref()
                    .and_then(|row| row.get(a).copied())
                    .unwrap_or(ghost);
                self.model.fix(&self.sets.input(0, j, a), value)?;
            }
        }
        Ok(())
    }

    /// Tie the values chosen by `value_of` to presence bit `pos`.
    fn link_presence<F>(&mut self, pos: usize, value_of: F)
    where
        F: Fn(&VariableSets, usize, &str) -> VarKey,
    {
        let sets = self.sets;
        let p = self.params;
        for j in 0..self.sets.tuples {
            let presence = self.sets.presence(pos, j);
            for a in &sets.attributes {
                let y = LinExpr::var(value_of(self.sets, j, a));
                for c in gadgets::ghost_link(&presence, &y, p.ghost, p.domain, p.big_m) {
                    self.model.constrain(c);
                }
            }
        }
    }

    fn chain(&mut self, i: usize) -> Result<(), ModelError> {
        let sets = self.sets;
        for j in 0..self.sets.tuples {
            for a in &sets.attributes {
                self.model.equate(
                    &self.sets.input(i + 1, j, a),
                    LinExpr::var(self.sets.output(i, j, a)),
                )?;
            }
        }
        Ok(())
    }

    fn keep_presence(&mut self, i: usize, j: usize) -> Result<(), ModelError> {
        self.model.equate(
            &self.sets.presence(i + 1, j),
            LinExpr::var(self.sets.presence(i, j)),
        )
    }

    /// `out = u + v` for every attribute of tuple `j`.
    fn combine(&mut self, i: usize, j: usize) -> Result<(), ModelError> {
        let sets = self.sets;
        for a in &sets.attributes {
            self.model.absorb(gadgets::sum(
                self.sets.output(i, j, a),
                &LinExpr::var(self.sets.applied(i, j, a)),
                &LinExpr::var(self.sets.retained(i, j, a)),
            ))?;
        }
        Ok(())
    }

    /// `v = (1 - x) * in` for every attribute of tuple `j`.
    fn retain_unselected(&mut self, i: usize, j: usize) -> Result<(), ModelError> {
        let sets = self.sets;
        let not_x = LinExpr::not(self.sets.select(i, j));
        for a in &sets.attributes {
            self.model.absorb(gadgets::signed_indicator_product(
                self.sets.retained(i, j, a),
                &not_x,
                &LinExpr::var(self.sets.input(i, j, a)),
                self.params.big_m,
            ))?;
        }
        Ok(())
    }

    // ── Statements ──────────────────────────────────────────────────

    fn update(
        &mut self,
        i: usize,
        assignments: &[Assignment],
        conditions: &[Condition],
    ) -> Result<(), ModelError> {
        let sets = self.sets;
        for asg in assignments {
            self.check_attribute(i, &asg.column)?;
        }
        for j in 0..self.sets.tuples {
            self.where_clause(i, j, conditions)?;
            self.select(i, j)?;
            let x = LinExpr::var(self.sets.select(i, j));
            for a in &sets.attributes {
                let new = match assignments.iter().find(|asg| asg.column == *a) {
                    Some(asg) => self.set_value(i, j, &asg.column, &asg.expr)?,
                    None => LinExpr::var(self.sets.input(i, j, a)),
                };
                self.model.absorb(gadgets::signed_indicator_product(
                    self.sets.applied(i, j, a),
                    &x,
                    &new,
                    self.params.big_m,
                ))?;
            }
            self.retain_unselected(i, j)?;
            self.combine(i, j)?;
            self.keep_presence(i, j)?;
        }
        Ok(())
    }

    fn delete(&mut self, i: usize, conditions: &[Condition]) -> Result<(), ModelError> {
        let sets = self.sets;
        for j in 0..self.sets.tuples {
            self.where_clause(i, j, conditions)?;
            self.select(i, j)?;
            let x = self.sets.select(i, j);
            for a in &sets.attributes {
                self.model.equate(
                    &self.sets.applied(i, j, a),
                    LinExpr::term(x.clone(), self.params.ghost),
                )?;
            }
            self.retain_unselected(i, j)?;
            self.combine(i, j)?;
            self.model.equate(
                &self.sets.presence(i + 1, j),
                LinExpr::var(self.sets.presence(i, j)) - LinExpr::var(x),
            )?;
        }
        Ok(())
    }

    fn insert(
        &mut self,
        i: usize,
        columns: Option<&[String]>,
        values: &[Literal],
    ) -> Result<(), ModelError> {
        let sets = self.sets;
        let names: Vec<String> = match columns {
            Some(cols) => cols.to_vec(),
            None => self.sets.attributes.clone(),
        };
        if names.len() != values.len() {
            return Err(ModelError::InsertArity {
                stmt: i,
                expected: names.len(),
                found: values.len(),
            });
        }
        for (name, lit) in names.iter().zip(values) {
            self.check_attribute(i, name)?;
            if lit.value.is_none() {
                return Err(ModelError::NonNumericValue {
                    stmt: i,
                    text: lit.text.clone(),
                });
            }
        }

        let inserted = self.relation.inserted_by(i);
        for j in 0..self.sets.tuples {
            let chosen = inserted == Some(j);
            let flag = if chosen { 1.0 } else { 0.0 };
            self.model.fix(&self.sets.sigma(i, j), flag)?;
            self.model.fix(&self.sets.select(i, j), flag)?;
            for a in &sets.attributes {
                let (u, v) = (self.sets.applied(i, j, a), self.sets.retained(i, j, a));
                if chosen {
                    let value = if names.contains(a) {
                        LinExpr::var(VarKey::Const(SlotKey::Insert {
                            stmt: i,
                            column: a.clone(),
                        }))
                    } else {
                        LinExpr::zero()
                    };
                    self.model.equate(&u, value)?;
                    self.model.fix(&v, 0.0)?;
                } else {
                    self.model.fix(&u, 0.0)?;
                    self.model.equate(&v, LinExpr::var(self.sets.input(i, j, a)))?;
                }
            }
            self.combine(i, j)?;
            if chosen {
                self.model.fix(&self.sets.presence(i + 1, j), 1.0)?;
            } else {
                self.keep_presence(i, j)?;
            }
        }
        Ok(())
    }

    fn pass_through(&mut self, i: usize) -> Result<(), ModelError> {
        let sets = self.sets;
        for j in 0..self.sets.tuples {
            self.model.fix(&self.sets.sigma(i, j), 0.0)?;
            self.model.fix(&self.sets.select(i, j), 0.0)?;
            for a in &sets.attributes {
                self.model.fix(&self.sets.applied(i, j, a), 0.0)?;
                self.model.equate(
                    &self.sets.retained(i, j, a),
                    LinExpr::var(self.sets.input(i, j, a)),
                )?;
            }
            self.combine(i, j)?;
            self.keep_presence(i, j)?;
        }
        Ok(())
    }

    // ── Selection ───────────────────────────────────────────────────

    /// `s[i, j]`: conjunction of the WHERE conditions on the pre-statement
    /// tuple, 1 when there are none.
    fn where_clause(&mut self, i: usize, j: usize, conditions: &[Condition]) -> Result<(), ModelError> {
        let s = self.sets.sigma(i, j);
        if conditions.is_empty() {
            return self.model.fix(&s, 1.0);
        }
        let last = conditions.len() - 1;
        let mut acc: Option<LinExpr> = None;
        for (k, cond) in conditions.iter().enumerate() {
            let margin = self.sets.margin(i, j, k);
            let lhs = self.attribute(i, j, &cond.attribute)?;
            let rhs = self.operand(i, j, &cond.value, &LiteralSite::Where { index: k })?;
            self.model.equate(&margin, lhs - rhs)?;

            let holds = margin.aux(Role::Holds);
            let holds = self
                .model
                .absorb(comparison(holds, &LinExpr::var(margin), cond.op, &self.params))?;
            acc = Some(match acc {
                None => LinExpr::var(holds),
                Some(prev) => {
                    let out = if k == last {
                        s.clone()
                    } else {
                        s.aux(Role::Partial(k))
                    };
                    let out = self
                        .model
                        .absorb(gadgets::and(out, &prev, &LinExpr::var(holds)))?;
                    LinExpr::var(out)
                }
            });
        }
        if conditions.len() == 1 {
            if let Some(single) = acc {
                self.model.equate(&s, single)?;
            }
        }
        Ok(())
    }

    /// `x[i, j] = s[i, j] AND p[i, j]`: only present tuples are selected.
    fn select(&mut self, i: usize, j: usize) -> Result<(), ModelError> {
        self.model.absorb(gadgets::and(
            self.sets.select(i, j),
            &LinExpr::var(self.sets.sigma(i, j)),
            &LinExpr::var(self.sets.presence(i, j)),
        ))?;
        Ok(())
    }

    // ── Expressions ─────────────────────────────────────────────────

    fn check_attribute(&self, stmt: usize, name: &str) -> Result<(), ModelError> {
        if self.relation.schema().contains(name) {
            Ok(())
        } else {
            Err(ModelError::UnknownAttribute {
                stmt,
                attribute: name.to_string(),
            })
        }
    }

    fn attribute(&self, i: usize, j: usize, name: &str) -> Result<LinExpr, ModelError> {
        self.check_attribute(i, name)?;
        Ok(LinExpr::var(self.sets.input(i, j, name)))
    }

    fn operand(&self, i: usize, j: usize, operand: &Operand, site: &LiteralSite) -> Result<LinExpr, ModelError> {
        match operand {
            Operand::Attribute { name, .. } => self.attribute(i, j, name),
            Operand::Literal(lit) => {
                if lit.value.is_none() {
                    return Err(ModelError::NonNumericValue {
                        stmt: i,
                        text: lit.text.clone(),
                    });
                }
                let slot = slot_of(i, &self.log[i], site, &self.sets.attributes)?;
                Ok(LinExpr::var(VarKey::Const(slot)))
            }
        }
    }

    /// Linear form of a SET expression. Scaling factors are taken from the
    /// logged literal, which stays pinned.
    fn set_value(&self, i: usize, j: usize, column: &str, expr: &Expression) -> Result<LinExpr, ModelError> {
        let site = LiteralSite::Set {
            column: column.to_string(),
        };
        let non_linear = || ModelError::NonLinear {
            stmt: i,
            expr: expr.to_string(),
        };
        let factor = |lit: &Literal| {
            lit.value.ok_or_else(|| ModelError::NonNumericValue {
                stmt: i,
                text: lit.text.clone(),
            })
        };
        match expr {
            Expression::Operand { operand } => self.operand(i, j, operand, &site),
            Expression::Binary { left, op, right } => match op {
                ArithOp::Add => Ok(self.operand(i, j, left, &site)? + self.operand(i, j, right, &site)?),
                ArithOp::Sub => Ok(self.operand(i, j, left, &site)? - self.operand(i, j, right, &site)?),
                ArithOp::Mul => match (left, right) {
                    (Operand::Attribute { name, .. }, Operand::Literal(lit))
                    | (Operand::Literal(lit), Operand::Attribute { name, .. }) => {
                        Ok(self.attribute(i, j, name)? * factor(lit)?)
                    }
                    _ => Err(non_linear()),
                },
                ArithOp::Div => match (left, right) {
                    (Operand::Attribute { name, .. }, Operand::Literal(lit)) => {
                        let k = factor(lit)?;
                        if k == 0.0 {
                            return Err(ModelError::DivisionByZero { stmt: i });
                        }
                        Ok(self.attribute(i, j, name)? * (1.0 / k))
                    }
                    _ => Err(non_linear()),
                },
            },
        }
    }

    // ── End state ───────────────────────────────────────────────────

    fn anchor(&mut self, targets: &Targets) {
        let n = self.sets.statements;
        for (j, anchor) in targets.anchors.iter().enumerate() {
            let p = self.sets.presence(n, j);
            match anchor {
                Anchor::Present { values } => {
                    self.model.constrain(Constraint::eq(
                        format!("anchor_{}", p),
                        LinExpr::var(p),
                        LinExpr::constant(1.0),
                    ));
                    for (a, v) in values {
                        if !self.relation.schema().contains(a) {
                            continue;
                        }
                        let out = self.sets.output(n - 1, j, a);
                        self.model.constrain(Constraint::eq(
                            format!("anchor_{}", out),
                            LinExpr::var(out),
                            LinExpr::constant(*v),
                        ));
                    }
                }
                Anchor::Absent => self.model.constrain(Constraint::eq(
                    format!("anchor_{}", p),
                    LinExpr::var(p),
                    LinExpr::zero(),
                )),
                Anchor::Free => {}
            }
        }
    }

    /// `e[i, j] = 1 - (out[i, j, key] == G AND complaint asserts deletion)`
    /// for complaint tuples; 0 everywhere else.
    fn error_indicators(&mut self, targets: &Targets) -> Result<(), ModelError> {
        let p = self.params;
        let key = self.sets.key_attribute.clone();
        for j in 0..self.sets.tuples {
            let complaint = targets.complaints.get(j).copied().flatten();
            for i in 0..self.sets.statements {
                let e = self.sets.error(i, j);
                let Some(target) = complaint else {
                    self.model.fix(&e, 0.0)?;
                    continue;
                };
                let ghost = self.model.absorb(gadgets::equal(
                    e.aux(Role::Ghost),
                    &LinExpr::var(self.sets.output(i, j, &key)),
                    &LinExpr::constant(p.ghost),
                    p.big_m,
                ))?;
                let asserted = LinExpr::constant(if target.absent { 1.0 } else { 0.0 });
                let agree = self
                    .model
                    .absorb(gadgets::and(e.aux(Role::Agree), &LinExpr::var(ghost), &asserted))?;
                self.model.equate(&e, LinExpr::not(agree))?;
            }
        }
        Ok(())
    }

    fn pin_literals(&mut self) {
        for lit in self.sets.literals.iter().filter(|l| !l.correctable) {
            self.model.constrain(Constraint::eq(
                format!("pin_{}", lit.key),
                LinExpr::var(lit.key.clone()),
                LinExpr::constant(lit.original),
            ));
        }
    }
}

/// Truth of `margin <op> 0` as a binary, exact in both directions up to
/// the strictness gap.
fn comparison(out: VarKey, margin: &LinExpr, op: CmpOp, params: &EncodingParams) -> Encoding {
    let (m, eps) = (params.big_m, params.epsilon);
    let zero = LinExpr::zero();
    match op {
        CmpOp::Le => gadgets::less_or_equal_iff(out, margin, &zero, m, eps),
        CmpOp::Lt => gadgets::less_or_equal_iff(out, &(margin.clone() + eps), &zero, m, eps),
        CmpOp::Ge => gadgets::less_or_equal_iff(out, &(-margin.clone()), &zero, m, eps),
        CmpOp::Gt => gadgets::less_or_equal_iff(out, &(-margin.clone() + eps), &zero, m, eps),
        CmpOp::Eq => {
            let fwd = gadgets::less_or_equal_iff(out.aux(Role::Forward), margin, &zero, m, eps);
            let bwd = gadgets::less_or_equal_iff(out.aux(Role::Backward), &(-margin.clone()), &zero, m, eps);
            let mut enc = gadgets::and(out, &fwd.output_expr(), &bwd.output_expr());
            enc.merge(fwd);
            enc.merge(bwd);
            enc
        }
    }
}
