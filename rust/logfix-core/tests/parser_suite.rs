//! Query-log parser suite.
//!
//! Covers every statement form of the log grammar, literal span tracking,
//! and the fallback to `Statement::Unknown` for lines outside the grammar.

use logfix_core::{
    parse_log, parse_statement, ArithOp, CmpOp, Expression, LiteralSite, Operand, Statement,
};

// ── UPDATE ─────────────────────────────────────────────────────────

#[test]
fn update_with_where() {
    let stmt = parse_statement("UPDATE Taxes SET B=A+1000 WHERE A>=85700");
    let Statement::Update {
        table,
        assignments,
        conditions,
    } = stmt
    else {
        panic!("expected UPDATE");
    };
    assert_eq!(table, "Taxes");
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].column, "B");
    match &assignments[0].expr {
        Expression::Binary { left, op, right } => {
            assert_eq!(left.as_attribute(), Some("A"));
            assert_eq!(*op, ArithOp::Add);
            assert_eq!(right.as_literal().and_then(|l| l.value), Some(1000.0));
        }
        other => panic!("unexpected expression {:?}", other),
    }
    assert_eq!(conditions.len(), 1);
    assert_eq!(conditions[0].attribute, "A");
    assert_eq!(conditions[0].op, CmpOp::Ge);
}

#[test]
fn update_without_where() {
    let stmt = parse_statement("UPDATE Taxes SET D=A-B");
    assert_eq!(stmt.kind(), "UPDATE");
    assert!(stmt.conditions().is_empty());
}

#[test]
fn update_multiple_assignments_and_conditions() {
    let stmt = parse_statement("update T set B = A * 2, D = 7 where A > 10 and B <= 300;");
    let Statement::Update {
        assignments,
        conditions,
        ..
    } = &stmt
    else {
        panic!("expected UPDATE");
    };
    assert_eq!(assignments.len(), 2);
    assert!(matches!(
        assignments[1].expr,
        Expression::Operand {
            operand: Operand::Literal(_)
        }
    ));
    assert_eq!(conditions.len(), 2);
    assert_eq!(conditions[0].op, CmpOp::Gt);
    assert_eq!(conditions[1].op, CmpOp::Le);
}

#[test]
fn negative_literal_after_minus() {
    let stmt = parse_statement("UPDATE T SET B=A--5");
    let lits = stmt.literals();
    assert_eq!(lits.len(), 1);
    assert_eq!(lits[0].1.value, Some(-5.0));
}

#[test]
fn literal_on_the_left() {
    let stmt = parse_statement("UPDATE T SET B=100-A");
    let lits = stmt.literals();
    assert_eq!(lits.len(), 1);
    assert_eq!(
        lits[0].0,
        LiteralSite::Set {
            column: "B".into()
        }
    );
}

#[test]
fn condition_against_attribute_has_no_literal() {
    let stmt = parse_statement("DELETE FROM T WHERE A<=B");
    assert!(!stmt.is_unknown());
    assert!(stmt.literals().is_empty());
}

#[test]
fn duplicate_set_column_is_unknown() {
    assert!(parse_statement("UPDATE T SET B=1, B=2").is_unknown());
}

// ── INSERT ─────────────────────────────────────────────────────────

#[test]
fn insert_without_columns() {
    let line = "INSERT INTO Taxes VALUES (5, 85800, 21450, 64350)";
    let stmt = parse_statement(line);
    let Statement::Insert {
        columns, values, ..
    } = &stmt
    else {
        panic!("expected INSERT");
    };
    assert!(columns.is_none());
    let texts: Vec<_> = values.iter().map(|v| v.span.slice(line)).collect();
    assert_eq!(texts, vec!["5", "85800", "21450", "64350"]);
}

#[test]
fn insert_with_columns() {
    let stmt = parse_statement("INSERT INTO T (id, A) VALUES (3, 4.5)");
    let Statement::Insert {
        columns, values, ..
    } = &stmt
    else {
        panic!("expected INSERT");
    };
    assert_eq!(columns.as_deref(), Some(&["id".to_string(), "A".to_string()][..]));
    assert_eq!(values[1].value, Some(4.5));
}

#[test]
fn insert_column_count_mismatch_is_unknown() {
    assert!(parse_statement("INSERT INTO T (id, A) VALUES (3)").is_unknown());
}

#[test]
fn insert_non_numeric_value_is_kept_but_not_numeric() {
    let stmt = parse_statement("INSERT INTO T VALUES (1, 'x')");
    let lits = stmt.literals();
    assert_eq!(lits.len(), 2);
    assert!(!lits[1].1.is_numeric());
}

// ── DELETE ─────────────────────────────────────────────────────────

#[test]
fn delete_with_where() {
    let line = "DELETE FROM Taxes WHERE A<=20000";
    let stmt = parse_statement(line);
    assert_eq!(stmt.kind(), "DELETE");
    let lits = stmt.literals();
    assert_eq!(lits[0].0, LiteralSite::Where { index: 0 });
    assert_eq!(lits[0].1.span.slice(line), "20000");
}

#[test]
fn delete_everything() {
    let stmt = parse_statement("DELETE FROM Taxes");
    assert_eq!(stmt.kind(), "DELETE");
    assert!(stmt.conditions().is_empty());
}

// ── Unknown / positional indexing ──────────────────────────────────

#[test]
fn unknown_lines_are_preserved_in_position() {
    let log = [
        "UPDATE T SET A=A+1",
        "SELECT * FROM T",
        "UPDATE T SET A=A*B WHERE A<>3",
        "DELETE FROM T WHERE A<=1",
    ];
    let parsed = parse_log(&log);
    assert_eq!(parsed.len(), 4);
    assert_eq!(parsed[0].kind(), "UPDATE");
    assert_eq!(
        parsed[1],
        Statement::Unknown {
            raw: "SELECT * FROM T".into()
        }
    );
    assert!(parsed[2].is_unknown());
    assert_eq!(parsed[3].kind(), "DELETE");
}

#[test]
fn spans_account_for_leading_whitespace() {
    let line = "   UPDATE T SET B=A+7 WHERE A >= 12  ";
    let stmt = parse_statement(line);
    let lits = stmt.literals();
    assert_eq!(lits[0].1.span.slice(line), "7");
    assert_eq!(lits[1].1.span.slice(line), "12");
}

#[test]
fn display_renders_canonical_text() {
    let stmt = parse_statement("update Taxes set B = A + 1000 where A >= 85700");
    assert_eq!(stmt.to_string(), "UPDATE Taxes SET B=A+1000 WHERE A>=85700");
}
