//! Table schema and row helpers.
//!
//! The engine works on a single numeric table. A row is a flat
//! attribute → value map; the [`Schema`] fixes attribute order (needed for
//! `INSERT ... VALUES` without a column list) and names the identity key
//! used to match complaints and final-state rows to tuples.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A flat attribute → value mapping.
pub type Row = BTreeMap<String, f64>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("`{0}` is not a valid attribute name")]
    InvalidIdentifier(String),
    #[error("schema declares attribute `{0}` twice")]
    DuplicateAttribute(String),
    #[error("identity key `{0}` is not one of the schema attributes")]
    MissingKey(String),
    #[error("schema has no attributes")]
    Empty,
    #[error("{context}: missing attribute `{attribute}`")]
    MissingAttribute { context: String, attribute: String },
    #[error("{context}: unknown attribute `{attribute}`")]
    UnknownAttribute { context: String, attribute: String },
    #[error("{context}: value of `{attribute}` is not finite")]
    NonFinite { context: String, attribute: String },
}

/// Ordered attribute list plus the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub table: String,
    pub key: String,
    pub attributes: Vec<String>,
}

impl Schema {
    pub fn new(
        table: impl Into<String>,
        key: impl Into<String>,
        attributes: Vec<String>,
    ) -> Result<Self, SchemaError> {
        let schema = Self {
            table: table.into(),
            key: key.into(),
            attributes,
        };
        schema.validate()?;
        Ok(schema)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.attributes.is_empty() {
            return Err(SchemaError::Empty);
        }
        if !is_identifier(&self.table) {
            return Err(SchemaError::InvalidIdentifier(self.table.clone()));
        }
        for (i, attr) in self.attributes.iter().enumerate() {
            if !is_identifier(attr) {
                return Err(SchemaError::InvalidIdentifier(attr.clone()));
            }
            if self.attributes[..i].contains(attr) {
                return Err(SchemaError::DuplicateAttribute(attr.clone()));
            }
        }
        if !self.contains(&self.key) {
            return Err(SchemaError::MissingKey(self.key.clone()));
        }
        Ok(())
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }

    pub fn position(&self, attribute: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a == attribute)
    }

    pub fn key_of(&self, row: &Row) -> Option<f64> {
        row.get(&self.key).copied()
    }

    /// Check that `row` carries exactly the schema's attributes.
    pub fn check_row(&self, row: &Row, context: &str) -> Result<(), SchemaError> {
        self.check_partial_row(row, context)?;
        for attr in &self.attributes {
            if !row.contains_key(attr) {
                return Err(SchemaError::MissingAttribute {
                    context: context.to_string(),
                    attribute: attr.clone(),
                });
            }
        }
        Ok(())
    }

    /// Check that `row` carries only schema attributes and the key.
    /// Other attributes may be omitted.
    pub fn check_partial_row(&self, row: &Row, context: &str) -> Result<(), SchemaError> {
        for (attr, value) in row {
            if !self.contains(attr) {
                return Err(SchemaError::UnknownAttribute {
                    context: context.to_string(),
                    attribute: attr.clone(),
                });
            }
            if !value.is_finite() {
                return Err(SchemaError::NonFinite {
                    context: context.to_string(),
                    attribute: attr.clone(),
                });
            }
        }
        if !row.contains_key(&self.key) {
            return Err(SchemaError::MissingAttribute {
                context: context.to_string(),
                attribute: self.key.clone(),
            });
        }
        Ok(())
    }
}

/// True for ASCII identifiers (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Normalised bit pattern of a key value, usable as a map key.
/// `-0.0` and `0.0` map to the same bits.
pub fn key_bits(value: f64) -> u64 {
    (value + 0.0).to_bits()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxes() -> Schema {
        Schema::new(
            "Taxes",
            "id",
            vec!["id".into(), "A".into(), "B".into(), "D".into()],
        )
        .unwrap()
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("A"));
        assert!(is_identifier("_tmp1"));
        assert!(!is_identifier("1A"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn key_must_be_an_attribute() {
        let err = Schema::new("T", "pk", vec!["A".into()]).unwrap_err();
        assert_eq!(err, SchemaError::MissingKey("pk".into()));
    }

    #[test]
    fn duplicate_attribute_rejected() {
        let err = Schema::new("T", "A", vec!["A".into(), "A".into()]).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateAttribute("A".into()));
    }

    #[test]
    fn check_row_reports_missing_attribute() {
        let schema = taxes();
        let row: Row = [("id".to_string(), 1.0), ("A".to_string(), 2.0)]
            .into_iter()
            .collect();
        assert!(schema.check_partial_row(&row, "complaint #0").is_ok());
        let err = schema.check_row(&row, "initial row #0").unwrap_err();
        assert!(matches!(err, SchemaError::MissingAttribute { ref attribute, .. } if attribute == "B"));
    }

    #[test]
    fn negative_zero_key_matches_zero() {
        assert_eq!(key_bits(-0.0), key_bits(0.0));
    }
}
