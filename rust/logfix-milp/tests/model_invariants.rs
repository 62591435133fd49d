//! Structural invariants of assembled models.
//!
//! Each scenario here is consistent by construction: its final state is
//! the concrete replay of its log. The witness derived from the logged
//! constants must then satisfy every constraint, which checks the
//! encoding against the reference semantics statement by statement.

use logfix_core::{parse_log, Complaint, Database, Row, Scenario, Schema};
use logfix_milp::model::Violation;
use logfix_milp::*;

fn row(values: &[(&str, f64)]) -> Row {
    values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn consistent(initial: Vec<Row>, log: &[&str]) -> Scenario {
    let attributes = vec!["id".to_string(), "A".to_string(), "B".to_string()];
    let schema = Schema::new("T", "id", attributes.clone()).unwrap();
    let final_state = Database::replay(&schema, &initial, &parse_log(log))
        .unwrap()
        .into_rows();
    Scenario {
        table: "T".into(),
        key: "id".into(),
        attributes,
        initial,
        final_state,
        log: log.iter().map(|s| s.to_string()).collect(),
        complaints: Vec::new(),
    }
}

fn rows() -> Vec<Row> {
    vec![
        row(&[("id", 1.0), ("A", 5.0), ("B", 10.0)]),
        row(&[("id", 2.0), ("A", -4.0), ("B", 7.0)]),
        row(&[("id", 3.0), ("A", 12.0), ("B", 12.0)]),
    ]
}

fn build(s: &Scenario) -> Problem {
    Problem::build(s, &EncodingConfig::default(), &ObjectiveConfig::default()).unwrap()
}

fn assert_witness_feasible(log: &[&str]) {
    let s = consistent(rows(), log);
    let p = build(&s);
    let w = p.witness(&Assignment::new()).unwrap();
    let v = p.model.violations(&w);
    assert!(v.is_empty(), "{:?}: {:?}", log, &v[..v.len().min(5)]);
}

// ── Agreement with concrete replay ──────────────────────────────────

#[test]
fn every_comparison_operator_matches_replay() {
    assert_witness_feasible(&["UPDATE T SET B=B+1 WHERE A<5"]);
    assert_witness_feasible(&["UPDATE T SET B=B+1 WHERE A<=5"]);
    assert_witness_feasible(&["UPDATE T SET B=B+1 WHERE A>5"]);
    assert_witness_feasible(&["UPDATE T SET B=B+1 WHERE A>=5"]);
    assert_witness_feasible(&["UPDATE T SET B=B+1 WHERE A=5"]);
}

#[test]
fn conjunctions_and_attribute_comparisons_match_replay() {
    assert_witness_feasible(&["UPDATE T SET A=0 WHERE A>0 AND B<=12 AND B>7"]);
    assert_witness_feasible(&["DELETE FROM T WHERE A<=B"]);
    assert_witness_feasible(&["UPDATE T SET B=A WHERE A=B"]);
}

#[test]
fn scaling_and_negative_values_match_replay() {
    assert_witness_feasible(&["UPDATE T SET B=A*3", "UPDATE T SET A=B/4 WHERE B<0"]);
    assert_witness_feasible(&["UPDATE T SET A=-20-A", "UPDATE T SET B=A--3"]);
}

#[test]
fn scaled_intermediate_values_stay_in_domain() {
    let log = ["UPDATE T SET A=A*20", "UPDATE T SET A=A/20"];
    let s = consistent(vec![row(&[("id", 1.0), ("A", 50.0), ("B", 0.0)])], &log);
    let p = build(&s);
    assert!(p.params.domain >= 1000.0, "domain {}", p.params.domain);
    let w = p.witness(&Assignment::new()).unwrap();
    let v = p.model.violations(&w);
    assert!(v.is_empty(), "{:?}", &v[..v.len().min(5)]);
}

#[test]
fn inserts_deletes_and_reinserts_match_replay() {
    assert_witness_feasible(&[
        "INSERT INTO T (id, A) VALUES (4, 100)",
        "DELETE FROM T WHERE A>=12",
        "INSERT INTO T VALUES (3, 1, 2)",
        "UPDATE T SET B=B+A WHERE B<=2",
    ]);
}

#[test]
fn unknown_statements_pass_tuples_through() {
    let s = consistent(rows(), &["SELECT * FROM T", "UPDATE T SET A=A+1"]);
    let p = build(&s);
    let w = p.witness(&Assignment::new()).unwrap();
    assert!(p.model.is_feasible(&w));
    for j in 0..3 {
        assert_eq!(w.get(&VarKey::Select { stmt: 0, tuple: j }), Some(0.0));
        let a_in = w.get(&VarKey::In {
            stmt: 0,
            tuple: j,
            attr: "A".into(),
        });
        let a_out = w.get(&VarKey::Out {
            stmt: 0,
            tuple: j,
            attr: "A".into(),
        });
        assert_eq!(a_in, a_out);
    }
}

// ── Invariants ──────────────────────────────────────────────────────

#[test]
fn chain_continuity_is_enforced() {
    let s = consistent(rows(), &["UPDATE T SET A=A+1", "UPDATE T SET B=A"]);
    let p = build(&s);
    let mut w = p.witness(&Assignment::new()).unwrap();
    let key = VarKey::In {
        stmt: 1,
        tuple: 0,
        attr: "A".into(),
    };
    let bumped = w.get(&key).unwrap() + 1.0;
    w.insert(key, bumped);
    let v = p.model.violations(&w);
    assert!(v.iter().any(|v| matches!(
        v,
        Violation::Constraint { label, .. } if label == "def_in_q1_t0_A"
    )));
}

#[test]
fn deleted_tuples_cannot_be_selected() {
    let s = consistent(rows(), &["DELETE FROM T WHERE A<=5", "UPDATE T SET B=0"]);
    let p = build(&s);
    let mut w = p.witness(&Assignment::new()).unwrap();
    assert_eq!(w.get(&VarKey::Presence { pos: 1, tuple: 0 }), Some(0.0));
    assert_eq!(w.get(&VarKey::Select { stmt: 1, tuple: 0 }), Some(0.0));
    w.insert(VarKey::Select { stmt: 1, tuple: 0 }, 1.0);
    assert!(!p.model.is_feasible(&w));
}

#[test]
fn absent_tuples_carry_the_ghost_value() {
    let s = consistent(rows(), &["DELETE FROM T WHERE A<=5", "UPDATE T SET B=0"]);
    let p = build(&s);
    let w = p.witness(&Assignment::new()).unwrap();
    let ghost = p.params.ghost;
    for attr in ["id", "A", "B"] {
        let k = VarKey::In {
            stmt: 1,
            tuple: 1,
            attr: attr.into(),
        };
        assert_eq!(w.get(&k), Some(ghost));
    }
}

#[test]
fn consistent_log_is_left_untouched() {
    let s = consistent(rows(), &["UPDATE T SET B=B+1 WHERE A>=5", "DELETE FROM T WHERE B<=7"]);
    let d = diagnose(&s, &DiagnoseOptions::default(), &LocalSearchSolver::default()).unwrap();
    assert!(d.repaired.is_unchanged());
    assert_eq!(d.repaired.lines(), s.log.iter().map(String::as_str).collect::<Vec<_>>());
    assert!(d.errors.is_empty());
}

#[test]
fn variable_names_are_unique_and_stable() {
    let s = consistent(rows(), &["UPDATE T SET B=B+1 WHERE A>=5 AND B<20"]);
    let a = build(&s);
    let b = build(&s);
    let names: Vec<String> = a.model.variables().iter().map(|v| v.key.to_string()).collect();
    let mut unique = names.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), names.len());
    assert_eq!(solver::fingerprint(&a.model), solver::fingerprint(&b.model));
}

// ── Failure modes ───────────────────────────────────────────────────

#[test]
fn product_of_attributes_is_rejected() {
    let s = consistent(rows(), &["UPDATE T SET B=A*B"]);
    let err = Problem::build(&s, &EncodingConfig::default(), &ObjectiveConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        DiagnoseError::Model(ModelError::NonLinear { stmt: 0, .. })
    ));
}

#[test]
fn undersized_big_m_is_a_config_error() {
    let s = consistent(rows(), &["UPDATE T SET B=B+1"]);
    let encoding = EncodingConfig {
        big_m: Some(10.0),
        ..EncodingConfig::default()
    };
    let err = Problem::build(&s, &encoding, &ObjectiveConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        DiagnoseError::Config(ConfigError::BigMTooSmall { .. })
    ));
}

#[test]
fn value_inside_strictness_gap_is_a_config_error() {
    let initial = vec![row(&[("id", 1.0), ("A", 4.9995), ("B", 0.0)])];
    let s = consistent(initial, &["UPDATE T SET B=1 WHERE A<5"]);
    let err = Problem::build(&s, &EncodingConfig::default(), &ObjectiveConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        DiagnoseError::Config(ConfigError::Epsilon(_))
    ));
    let finer = EncodingConfig {
        epsilon: 1e-4,
        ..EncodingConfig::default()
    };
    let p = Problem::build(&s, &finer, &ObjectiveConfig::default()).unwrap();
    let w = p.witness(&Assignment::new()).unwrap();
    assert!(p.model.violations(&w).is_empty());
}

#[test]
fn empty_log_is_rejected() {
    let s = consistent(rows(), &[]);
    assert!(matches!(
        Problem::build(&s, &EncodingConfig::default(), &ObjectiveConfig::default()),
        Err(DiagnoseError::EmptyLog)
    ));
}

#[test]
fn non_numeric_constant_passes_statement_through() {
    // The first statement is a no-op, so the final state is the replay of the second alone.
    let mut s = consistent(rows(), &["UPDATE T SET A=A+0"]);
    s.log.insert(0, "UPDATE T SET B=A+1 WHERE A>=0x10".to_string());
    let p = build(&s);
    assert_eq!(
        p.warnings,
        vec![Warning::NonNumericLiteral {
            index: 0,
            text: "0x10".into()
        }]
    );
    assert!(p.log[0].is_unknown());
    assert_eq!(p.sets.literals_of(0).count(), 0);
    let w = p.witness(&Assignment::new()).unwrap();
    assert!(p.model.violations(&w).is_empty());

    let d = diagnose(&s, &DiagnoseOptions::default(), &LocalSearchSolver::default()).unwrap();
    assert_eq!(d.repaired.lines(), s.log.iter().map(String::as_str).collect::<Vec<_>>());
    assert!(!d
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::ReplayFailed { .. })));
}

#[test]
fn complaint_about_unknown_key_is_ignored_with_warning() {
    let mut s = consistent(rows(), &["UPDATE T SET B=B+1"]);
    s.complaints.push(Complaint::new(
        None,
        Some(row(&[("id", 99.0), ("A", 1.0), ("B", 1.0)])),
    ));
    let p = build(&s);
    assert_eq!(
        p.warnings,
        vec![Warning::UnmatchedComplaint { index: 0, key: 99.0 }]
    );
}

#[test]
fn wrong_insert_value_is_repaired() {
    let mut s = consistent(rows(), &["INSERT INTO T VALUES (7, 30, 40)"]);
    s.complaints.push(Complaint::new(
        Some(row(&[("id", 7.0), ("A", 30.0), ("B", 40.0)])),
        Some(row(&[("id", 7.0), ("A", 30.0), ("B", 45.0)])),
    ));
    let d = diagnose(&s, &DiagnoseOptions::default(), &LocalSearchSolver::default()).unwrap();
    assert_eq!(d.repaired.lines(), vec!["INSERT INTO T VALUES (7, 30, 45)"]);
    assert!(d.resolved());
}

#[test]
fn wrong_set_constant_is_repaired() {
    let mut s = consistent(rows(), &["UPDATE T SET B=A+3 WHERE A>=5"]);
    s.complaints.push(Complaint::new(
        None,
        Some(row(&[("id", 1.0), ("A", 5.0), ("B", 9.0)])),
    ));
    s.complaints.push(Complaint::new(
        None,
        Some(row(&[("id", 3.0), ("A", 12.0), ("B", 16.0)])),
    ));
    let d = diagnose(&s, &DiagnoseOptions::default(), &LocalSearchSolver::default()).unwrap();
    assert_eq!(d.repaired.lines(), vec!["UPDATE T SET B=A+4 WHERE A>=5"]);
}

#[test]
fn deletion_complaint_moves_delete_threshold() {
    let initial = vec![
        row(&[("id", 1.0), ("A", 10.0), ("B", 0.0)]),
        row(&[("id", 2.0), ("A", 30.0), ("B", 0.0)]),
    ];
    let mut s = consistent(initial, &["DELETE FROM T WHERE A<=5"]);
    s.complaints.push(Complaint::new(
        Some(row(&[("id", 1.0), ("A", 10.0), ("B", 0.0)])),
        None,
    ));
    let d = diagnose(&s, &DiagnoseOptions::default(), &LocalSearchSolver::default()).unwrap();
    // Every error indicator stays at zero here; the moved literal carries the repair.
    assert_eq!(d.repaired.lines(), vec!["DELETE FROM T WHERE A<=10"]);
    assert!(d.repaired.statements[0].flagged);
    assert!(d.resolved());
}
