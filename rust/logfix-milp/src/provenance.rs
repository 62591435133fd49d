//! The provenance relation `R`: every tuple that exists at any point of the
//! log, in a fixed order.
//!
//! Rows of the initial state come first, in input order. Each INSERT then
//! contributes one placeholder tuple, in log order. A tuple keeps its index
//! for the whole encoding, so variable keys never depend on which tuples
//! happen to be present.

use logfix_core::{key_bits, Row, Schema, Statement};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", content = "stmt", rename_all = "lowercase")]
pub enum Origin {
    Initial,
    /// Created by the INSERT at this log position.
    Inserted(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tuple {
    pub origin: Origin,
    /// Initial-state values; `None` for INSERT placeholders.
    pub values: Option<Row>,
    /// Identity key as logged. An INSERT whose key value is not numeric
    /// has none.
    pub key: Option<f64>,
}

impl Tuple {
    pub fn is_initial(&self) -> bool {
        self.origin == Origin::Initial
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relation {
    schema: Schema,
    tuples: Vec<Tuple>,
}

impl Relation {
    pub fn build(schema: &Schema, initial: &[Row], log: &[Statement]) -> Self {
        let mut tuples: Vec<Tuple> = initial
            .iter()
            .map(|row| Tuple {
                origin: Origin::Initial,
                values: Some(row.clone()),
                key: schema.key_of(row),
            })
            .collect();

        for (i, stmt) in log.iter().enumerate() {
            if let Statement::Insert {
                columns, values, ..
            } = stmt
            {
                let position = match columns {
                    Some(cols) => cols.iter().position(|c| *c == schema.key),
                    None => schema.position(&schema.key),
                };
                let key = position.and_then(|p| values.get(p)).and_then(|lit| lit.value);
                tuples.push(Tuple {
                    origin: Origin::Inserted(i),
                    values: None,
                    key,
                });
            }
        }
        Self {
            schema: schema.clone(),
            tuples,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn attributes(&self) -> &[String] {
        &self.schema.attributes
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn tuples(&self) -> &[Tuple] {
        &self.tuples
    }

    pub fn tuple(&self, j: usize) -> Option<&Tuple> {
        self.tuples.get(j)
    }

    /// Index of the tuple the INSERT at `stmt` creates.
    pub fn inserted_by(&self, stmt: usize) -> Option<usize> {
        self.tuples
            .iter()
            .position(|t| t.origin == Origin::Inserted(stmt))
    }

    /// Indices of tuples carrying `key`, in relation order.
    pub fn with_key(&self, key: f64) -> Vec<usize> {
        self.tuples
            .iter()
            .enumerate()
            .filter(|(_, t)| t.key.map(key_bits) == Some(key_bits(key)))
            .map(|(j, _)| j)
            .collect()
    }
}
