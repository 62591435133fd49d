//! What the end of the log must look like: per-tuple final-state anchors
//! derived from complaints and the observed final state.

use crate::provenance::Relation;
use logfix_core::{key_bits, Complaint, Row, Schema};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Required end state of one tuple.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "anchor", rename_all = "lowercase")]
pub enum Anchor {
    /// Present, with these attribute values.
    Present { values: BTreeMap<String, f64> },
    Absent,
    /// Unconstrained.
    Free,
}

/// A complaint bound to the tuple it talks about.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComplaintTarget {
    pub complaint: usize,
    pub key: f64,
    /// The complaint asserts the tuple must not exist.
    pub absent: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Targets {
    /// One anchor per tuple of the relation.
    pub anchors: Vec<Anchor>,
    /// Complaint covering each tuple, if any.
    pub complaints: Vec<Option<ComplaintTarget>>,
    /// Complaints whose key matches no tuple.
    pub unmatched: Vec<(usize, f64)>,
    /// Keys of final-state rows no tuple can produce.
    pub orphans: Vec<f64>,
}

impl Targets {
    /// Anchor every tuple of `relation`.
    ///
    /// When several tuples share a key, the one created last is the one
    /// the final state and complaints refer to; the others must be gone by
    /// the end of the log. Complaints override the final state.
    pub fn derive(
        relation: &Relation,
        final_state: &[Row],
        complaints: &[Complaint],
        anchor_unreported: bool,
    ) -> Self {
        let schema: &Schema = relation.schema();
        let n = relation.len();
        let mut targets = Targets {
            anchors: vec![Anchor::Free; n],
            complaints: vec![None; n],
            ..Targets::default()
        };

        let mut last_by_key: HashMap<u64, usize> = HashMap::new();
        for (j, t) in relation.tuples().iter().enumerate() {
            if let Some(k) = t.key {
                if let Some(prev) = last_by_key.insert(key_bits(k), j) {
                    targets.anchors[prev] = Anchor::Absent;
                }
            }
        }

        if anchor_unreported {
            let finals: HashMap<u64, &Row> = final_state
                .iter()
                .filter_map(|r| schema.key_of(r).map(|k| (key_bits(k), r)))
                .collect();
            for (&bits, &j) in &last_by_key {
                targets.anchors[j] = match finals.get(&bits) {
                    Some(row) => Anchor::Present {
                        values: (*row).clone(),
                    },
                    None => Anchor::Absent,
                };
            }
            let mut orphans: Vec<f64> = final_state
                .iter()
                .filter_map(|r| schema.key_of(r))
                .filter(|k| !last_by_key.contains_key(&key_bits(*k)))
                .collect();
            orphans.sort_by(f64::total_cmp);
            targets.orphans = orphans;
        }

        for (index, complaint) in complaints.iter().enumerate() {
            let Some(key) = complaint.key(schema) else {
                continue;
            };
            let Some(&j) = last_by_key.get(&key_bits(key)) else {
                targets.unmatched.push((index, key));
                continue;
            };
            let absent = complaint.asserts_absent();
            targets.complaints[j] = Some(ComplaintTarget {
                complaint: index,
                key,
                absent,
            });
            targets.anchors[j] = match &complaint.correct {
                None => Anchor::Absent,
                Some(row) => Anchor::Present { values: row.clone() },
            };
        }
        targets
    }

    pub fn complaint_tuples(&self) -> impl Iterator<Item = (usize, &ComplaintTarget)> {
        self.complaints
            .iter()
            .enumerate()
            .filter_map(|(j, c)| c.as_ref().map(|c| (j, c)))
    }
}
