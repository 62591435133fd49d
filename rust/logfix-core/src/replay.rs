//! Concrete execution of a parsed log.
//!
//! This is the reference semantics the MILP encoding mirrors: WHERE
//! conditions and SET expressions are evaluated on the row as it was
//! before the statement, DELETE removes rows, INSERT appends one row
//! (unlisted columns default to 0) and unknown statements do nothing.

use crate::statement::{Condition, Expression, Operand, Statement};
use crate::table::{key_bits, Row, Schema};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReplayError {
    #[error("statement #{stmt}: unknown attribute `{attribute}`")]
    UnknownAttribute { stmt: usize, attribute: String },
    #[error("statement #{stmt}: `{text}` is not a number")]
    NonNumeric { stmt: usize, text: String },
    #[error("statement #{stmt}: division by zero")]
    DivisionByZero { stmt: usize },
    #[error("statement #{stmt}: INSERT has {found} values for {expected} attributes")]
    Arity {
        stmt: usize,
        expected: usize,
        found: usize,
    },
}

/// An in-memory single-table database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Database {
    schema: Schema,
    rows: Vec<Row>,
}

impl Database {
    pub fn new(schema: Schema, rows: Vec<Row>) -> Self {
        Self { schema, rows }
    }

    /// Run `log` from `initial` and return the resulting database.
    pub fn replay(schema: &Schema, initial: &[Row], log: &[Statement]) -> Result<Self, ReplayError> {
        let mut db = Self::new(schema.clone(), initial.to_vec());
        for (i, stmt) in log.iter().enumerate() {
            db.apply(i, stmt)?;
        }
        Ok(db)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// The last row whose identity key equals `key`.
    pub fn find(&self, key: f64) -> Option<&Row> {
        self.rows
            .iter()
            .rev()
            .find(|r| self.schema.key_of(r).map(key_bits) == Some(key_bits(key)))
    }

    /// Apply statement number `stmt` of the log.
    pub fn apply(&mut self, stmt: usize, statement: &Statement) -> Result<(), ReplayError> {
        match statement {
            Statement::Update {
                assignments,
                conditions,
                ..
            } => {
                let mut updated = Vec::with_capacity(self.rows.len());
                for row in &self.rows {
                    if !matches_all(stmt, row, conditions)? {
                        updated.push(row.clone());
                        continue;
                    }
                    let mut next = row.clone();
                    for a in assignments {
                        if !self.schema.contains(&a.column) {
                            return Err(ReplayError::UnknownAttribute {
                                stmt,
                                attribute: a.column.clone(),
                            });
                        }
                        next.insert(a.column.clone(), evaluate(stmt, row, &a.expr)?);
                    }
                    updated.push(next);
                }
                self.rows = updated;
            }
            Statement::Delete { conditions, .. } => {
                // Evaluate every row before touching the table so an error leaves it intact.
                let doomed = self
                    .rows
                    .iter()
                    .map(|row| matches_all(stmt, row, conditions))
                    .collect::<Result<Vec<bool>, _>>()?;
                let mut doomed = doomed.into_iter();
                self.rows.retain(|_| !doomed.next().unwrap_or(false));
            }
            Statement::Insert {
                columns, values, ..
            } => {
                let names: Vec<String> = match columns {
                    Some(cols) => cols.clone(),
                    None => self.schema.attributes.clone(),
                };
                if names.len() != values.len() {
                    return Err(ReplayError::Arity {
                        stmt,
                        expected: names.len(),
                        found: values.len(),
                    });
                }
                let mut row: Row = self
                    .schema
                    .attributes
                    .iter()
                    .map(|a| (a.clone(), 0.0))
                    .collect();
                for (name, lit) in names.iter().zip(values) {
                    if !self.schema.contains(name) {
                        return Err(ReplayError::UnknownAttribute {
                            stmt,
                            attribute: name.clone(),
                        });
                    }
                    let value = lit.value.ok_or_else(|| ReplayError::NonNumeric {
                        stmt,
                        text: lit.text.clone(),
                    })?;
                    row.insert(name.clone(), value);
                }
                self.rows.push(row);
            }
            Statement::Unknown { .. } => {}
        }
        Ok(())
    }
}

fn operand_value(stmt: usize, row: &Row, operand: &Operand) -> Result<f64, ReplayError> {
    match operand {
        Operand::Attribute { name, .. } => {
            row.get(name)
                .copied()
                .ok_or_else(|| ReplayError::UnknownAttribute {
                    stmt,
                    attribute: name.clone(),
                })
        }
        Operand::Literal(lit) => lit.value.ok_or_else(|| ReplayError::NonNumeric {
            stmt,
            text: lit.text.clone(),
        }),
    }
}

fn evaluate(stmt: usize, row: &Row, expr: &Expression) -> Result<f64, ReplayError> {
    match expr {
        Expression::Operand { operand } => operand_value(stmt, row, operand),
        Expression::Binary { left, op, right } => {
            let l = operand_value(stmt, row, left)?;
            let r = operand_value(stmt, row, right)?;
            if *op == crate::statement::ArithOp::Div && r == 0.0 {
                return Err(ReplayError::DivisionByZero { stmt });
            }
            Ok(op.apply(l, r))
        }
    }
}

fn matches_all(stmt: usize, row: &Row, conditions: &[Condition]) -> Result<bool, ReplayError> {
    for c in conditions {
        let lhs = row
            .get(&c.attribute)
            .copied()
            .ok_or_else(|| ReplayError::UnknownAttribute {
                stmt,
                attribute: c.attribute.clone(),
            })?;
        let rhs = operand_value(stmt, row, &c.value)?;
        if !c.op.holds(lhs, rhs) {
            return Ok(false);
        }
    }
    Ok(true)
}
