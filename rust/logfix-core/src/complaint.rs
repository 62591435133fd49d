//! User complaints: asserted ground truth about final tuple values.

use crate::table::{Row, Schema};
use serde::{Deserialize, Serialize};

/// A `(wrong, correct)` pair for one tuple.
///
/// `correct: None` asserts that the tuple must not exist after the log
/// has run. Attributes missing from `correct` are disputed: no value is
/// asserted for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    #[serde(default)]
    pub wrong: Option<Row>,
    #[serde(default)]
    pub correct: Option<Row>,
}

impl Complaint {
    pub fn new(wrong: Option<Row>, correct: Option<Row>) -> Self {
        Self { wrong, correct }
    }

    /// Identity key, taken from `correct` when present.
    pub fn key(&self, schema: &Schema) -> Option<f64> {
        self.correct
            .as_ref()
            .and_then(|r| schema.key_of(r))
            .or_else(|| self.wrong.as_ref().and_then(|r| schema.key_of(r)))
    }

    /// True when both snapshots carry a key and the keys disagree.
    pub fn has_conflicting_keys(&self, schema: &Schema) -> bool {
        match (
            self.wrong.as_ref().and_then(|r| schema.key_of(r)),
            self.correct.as_ref().and_then(|r| schema.key_of(r)),
        ) {
            (Some(w), Some(c)) => w != c,
            _ => false,
        }
    }

    pub fn asserts_absent(&self) -> bool {
        self.correct.is_none()
    }

    /// Asserted final value of `attribute`, if the complaint states one.
    pub fn expected(&self, attribute: &str) -> Option<f64> {
        self.correct.as_ref().and_then(|r| r.get(attribute).copied())
    }
}
