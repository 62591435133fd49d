//! Variable factory.
//!
//! Declares every per-statement, per-tuple variable of the encoding up
//! front, with its domain and bounds. Definitions are attached later by
//! the assembler, gadget by gadget. Keys are pure functions of logical
//! indices, so the accessors below simply build them.

use crate::config::{EncodingConfig, EncodingParams};
use crate::linear::{SlotKey, VarKey, Variable};
use crate::model::{Model, ModelError};
use crate::provenance::Relation;
use logfix_core::{ArithOp, Expression, LiteralSite, Span, Statement};
use serde::Serialize;

/// A numeric literal of the log, lifted to a decision variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiteralVar {
    pub key: VarKey,
    pub slot: SlotKey,
    pub site: LiteralSite,
    pub original: f64,
    pub text: String,
    pub span: Span,
    /// Pinned literals keep their logged value: identity keys of INSERTs
    /// and factors of `*` and `/`.
    pub correctable: bool,
    pub integral: bool,
}

/// Index space of the encoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableSets {
    pub statements: usize,
    pub tuples: usize,
    pub attributes: Vec<String>,
    pub key_attribute: String,
    pub literals: Vec<LiteralVar>,
}

impl VariableSets {
    pub fn allocate(
        model: &mut Model,
        relation: &Relation,
        log: &[Statement],
        params: &EncodingParams,
        config: &EncodingConfig,
    ) -> Result<Self, ModelError> {
        let schema = relation.schema();
        let sets = VariableSets {
            statements: log.len(),
            tuples: relation.len(),
            attributes: schema.attributes.clone(),
            key_attribute: schema.key.clone(),
            literals: collect_literals(log, &schema.attributes, &schema.key, config)?,
        };
        let (n, t) = (sets.statements, sets.tuples);

        for j in 0..t {
            for pos in 0..=n {
                model.declare(Variable::binary(sets.presence(pos, j)))?;
            }
        }
        for i in 0..n {
            let conditions = log[i].conditions().len();
            for j in 0..t {
                model.declare(Variable::binary(sets.select(i, j)))?;
                model.declare(Variable::binary(sets.sigma(i, j)))?;
                model.declare(Variable::binary(sets.error(i, j)))?;
                for k in 0..conditions {
                    model.declare(Variable::continuous(sets.margin(i, j, k)))?;
                }
                for a in &sets.attributes {
                    model.declare(
                        Variable::continuous(sets.input(i, j, a)).bounded(-params.ghost, params.ghost),
                    )?;
                    model.declare(
                        Variable::continuous(sets.output(i, j, a)).bounded(-params.ghost, params.ghost),
                    )?;
                    model.declare(Variable::continuous(sets.applied(i, j, a)))?;
                    model.declare(Variable::continuous(sets.retained(i, j, a)))?;
                }
            }
        }
        for lit in &sets.literals {
            let var = if lit.integral {
                Variable::integer(lit.key.clone())
            } else {
                Variable::continuous(lit.key.clone())
            };
            model.declare(var.bounded(-params.domain, params.domain))?;
        }
        Ok(sets)
    }

    // ── Key builders ────────────────────────────────────────────────

    pub fn select(&self, stmt: usize, tuple: usize) -> VarKey {
        VarKey::Select { stmt, tuple }
    }

    pub fn error(&self, stmt: usize, tuple: usize) -> VarKey {
        VarKey::Error { stmt, tuple }
    }

    pub fn sigma(&self, stmt: usize, tuple: usize) -> VarKey {
        VarKey::Sigma { stmt, tuple }
    }

    pub fn margin(&self, stmt: usize, tuple: usize, cond: usize) -> VarKey {
        VarKey::Margin { stmt, tuple, cond }
    }

    pub fn presence(&self, pos: usize, tuple: usize) -> VarKey {
        VarKey::Presence { pos, tuple }
    }

    pub fn input(&self, stmt: usize, tuple: usize, attr: &str) -> VarKey {
        VarKey::In {
            stmt,
            tuple,
            attr: attr.to_string(),
        }
    }

    pub fn output(&self, stmt: usize, tuple: usize, attr: &str) -> VarKey {
        VarKey::Out {
            stmt,
            tuple,
            attr: attr.to_string(),
        }
    }

    pub fn applied(&self, stmt: usize, tuple: usize, attr: &str) -> VarKey {
        VarKey::Applied {
            stmt,
            tuple,
            attr: attr.to_string(),
        }
    }

    pub fn retained(&self, stmt: usize, tuple: usize, attr: &str) -> VarKey {
        VarKey::Retained {
            stmt,
            tuple,
            attr: attr.to_string(),
        }
    }

    // ── Literals ────────────────────────────────────────────────────

    pub fn literal(&self, slot: &SlotKey) -> Option<&LiteralVar> {
        self.literals.iter().find(|l| &l.slot == slot)
    }

    pub fn literals_of(&self, stmt: usize) -> impl Iterator<Item = &LiteralVar> {
        self.literals.iter().filter(move |l| l.slot.stmt() == stmt)
    }

    pub fn correctable(&self) -> impl Iterator<Item = &LiteralVar> {
        self.literals.iter().filter(|l| l.correctable)
    }

    pub fn error_keys(&self) -> impl Iterator<Item = VarKey> + '_ {
        (0..self.statements)
            .flat_map(move |i| (0..self.tuples).map(move |j| VarKey::Error { stmt: i, tuple: j }))
    }
}

/// Slot of the literal at `site` in statement `stmt`.
pub fn slot_of(
    stmt: usize,
    statement: &Statement,
    site: &LiteralSite,
    attributes: &[String],
) -> Result<SlotKey, ModelError> {
    Ok(match site {
        LiteralSite::Set { column } => SlotKey::Set {
            stmt,
            column: column.clone(),
        },
        LiteralSite::Where { index } => {
            let attribute = statement
                .conditions()
                .get(*index)
                .map(|c| c.attribute.clone())
                .unwrap_or_default();
            SlotKey::Where {
                stmt,
                attribute,
                cond: *index,
            }
        }
        LiteralSite::Insert { index } => {
            let column = match statement {
                Statement::Insert {
                    columns: Some(cols),
                    ..
                } => cols.get(*index).cloned(),
                _ => attributes.get(*index).cloned(),
            };
            let column = column.ok_or_else(|| ModelError::InsertArity {
                stmt,
                expected: attributes.len(),
                found: index + 1,
            })?;
            SlotKey::Insert { stmt, column }
        }
    })
}

fn collect_literals(
    log: &[Statement],
    attributes: &[String],
    key: &str,
    config: &EncodingConfig,
) -> Result<Vec<LiteralVar>, ModelError> {
    let mut out = Vec::new();
    for (i, stmt) in log.iter().enumerate() {
        for (site, lit) in stmt.literals() {
            let Some(value) = lit.value else {
                continue;
            };
            let slot = slot_of(i, stmt, &site, attributes)?;
            let correctable = match (&slot, stmt) {
                (SlotKey::Insert { column, .. }, _) => column != key,
                (SlotKey::Set { column, .. }, Statement::Update { assignments, .. }) => !assignments
                    .iter()
                    .any(|a| a.column == *column && is_scaling(&a.expr)),
                _ => true,
            };
            out.push(LiteralVar {
                key: VarKey::Const(slot.clone()),
                slot,
                site,
                original: value,
                text: lit.text.clone(),
                span: lit.span,
                correctable,
                integral: config.integral_literals && lit.is_integral(),
            });
        }
    }
    Ok(out)
}

fn is_scaling(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::Binary {
            op: ArithOp::Mul | ArithOp::Div,
            ..
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Magnitudes;
    use logfix_core::{parse_log, Schema};

    #[test]
    fn literals_are_classified() {
        let schema = Schema::new("T", "id", vec!["id".into(), "A".into(), "B".into()]).unwrap();
        let log = parse_log(&[
            "UPDATE T SET B=A*2 WHERE A>=10",
            "INSERT INTO T VALUES (3, 4, 5)",
            "UPDATE T SET A=A+1",
        ]);
        let relation = Relation::build(&schema, &[], &log);
        let config = EncodingConfig::default();
        let params = config.resolve(&Magnitudes::default()).unwrap();
        let mut model = Model::new();
        let sets = VariableSets::allocate(&mut model, &relation, &log, &params, &config).unwrap();

        let names: Vec<String> = sets.literals.iter().map(|l| l.key.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "const_set_q0_B",
                "const_where_q0_A_0",
                "const_ins_q1_id",
                "const_ins_q1_A",
                "const_ins_q1_B",
                "const_set_q2_A",
            ]
        );
        let pinned: Vec<bool> = sets.literals.iter().map(|l| l.correctable).collect();
        assert_eq!(pinned, vec![false, true, false, true, true, true]);
        assert!(model.contains(&sets.presence(3, 0)));
        assert!(model.contains(&sets.margin(0, 0, 0)));
        assert!(!model.contains(&sets.margin(2, 0, 0)));
    }
}
