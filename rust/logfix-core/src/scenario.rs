//! Scenario files: everything one diagnosis request needs.
//!
//! ```json
//! {
//!   "table": "Taxes",
//!   "key": "id",
//!   "attributes": ["id", "A", "B", "D"],
//!   "initial":    [{"id": 1, "A": 9500, "B": 500, "D": 8550}],
//!   "final":      [],
//!   "log":        ["DELETE FROM Taxes WHERE A<=20000"],
//!   "complaints": []
//! }
//! ```

use crate::complaint::Complaint;
use crate::parser::parse_log;
use crate::statement::Statement;
use crate::table::{key_bits, Row, Schema, SchemaError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scenario JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("{state} state has two rows with key {key}")]
    DuplicateKey { state: &'static str, key: f64 },
    #[error("complaint #{index} carries no identity key")]
    ComplaintWithoutKey { index: usize },
    #[error("complaint #{index}: `wrong` and `correct` have different keys")]
    ComplaintKeyMismatch { index: usize },
}

/// Initial state, final state, log and complaints for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub table: String,
    pub key: String,
    pub attributes: Vec<String>,
    pub initial: Vec<Row>,
    #[serde(rename = "final", default)]
    pub final_state: Vec<Row>,
    pub log: Vec<String>,
    #[serde(default)]
    pub complaints: Vec<Complaint>,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, ScenarioError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate rows and complaints against the declared schema.
    pub fn validate(&self) -> Result<Schema, ScenarioError> {
        let schema = Schema::new(&self.table, &self.key, self.attributes.clone())?;

        check_state(&schema, &self.initial, "initial")?;
        check_state(&schema, &self.final_state, "final")?;

        for (index, complaint) in self.complaints.iter().enumerate() {
            let context = format!("complaint #{}", index);
            for row in complaint.wrong.iter().chain(complaint.correct.iter()) {
                schema.check_partial_row(row, &context)?;
            }
            if complaint.key(&schema).is_none() {
                return Err(ScenarioError::ComplaintWithoutKey { index });
            }
            if complaint.has_conflicting_keys(&schema) {
                return Err(ScenarioError::ComplaintKeyMismatch { index });
            }
        }
        Ok(schema)
    }

    pub fn parsed_log(&self) -> Vec<Statement> {
        parse_log(&self.log)
    }
}

fn check_state(schema: &Schema, rows: &[Row], state: &'static str) -> Result<(), ScenarioError> {
    let mut seen = HashSet::new();
    for (i, row) in rows.iter().enumerate() {
        schema.check_row(row, &format!("{} row #{}", state, i))?;
        if let Some(key) = schema.key_of(row) {
            if !seen.insert(key_bits(key)) {
                return Err(ScenarioError::DuplicateKey { state, key });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINI: &str = r#"{
        "table": "T",
        "key": "id",
        "attributes": ["id", "A"],
        "initial": [{"id": 1, "A": 10}],
        "final": [{"id": 1, "A": 11}],
        "log": ["UPDATE T SET A=A+1"],
        "complaints": [{"wrong": {"id": 1, "A": 11}, "correct": {"id": 1, "A": 10}}]
    }"#;

    #[test]
    fn loads_and_validates() {
        let scenario = Scenario::from_json(MINI).unwrap();
        let schema = scenario.validate().unwrap();
        assert_eq!(schema.key, "id");
        assert_eq!(scenario.parsed_log().len(), 1);
    }

    #[test]
    fn duplicate_initial_key_rejected() {
        let mut scenario = Scenario::from_json(MINI).unwrap();
        let row = scenario.initial[0].clone();
        scenario.initial.push(row);
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::DuplicateKey { state: "initial", .. })
        ));
    }

    #[test]
    fn complaint_key_mismatch_rejected() {
        let mut scenario = Scenario::from_json(MINI).unwrap();
        if let Some(correct) = scenario.complaints[0].correct.as_mut() {
            correct.insert("id".into(), 2.0);
        }
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::ComplaintKeyMismatch { index: 0 })
        ));
    }

    #[test]
    fn deletion_complaint_uses_wrong_key() {
        let json = MINI.replace(r#""correct": {"id": 1, "A": 10}"#, r#""correct": null"#);
        let scenario = Scenario::from_json(&json).unwrap();
        let schema = scenario.validate().unwrap();
        assert!(scenario.complaints[0].asserts_absent());
        assert_eq!(scenario.complaints[0].key(&schema), Some(1.0));
    }
}
