//! Query-log parser.
//!
//! Turns each log line into a [`Statement`]. The grammar is the small
//! UPDATE/INSERT/DELETE vocabulary the diagnosis engine understands:
//!
//! ```text
//! UPDATE <table> SET <col>=<expr>[, ...] [WHERE <cond> [AND <cond>]...]
//! INSERT INTO <table> [(<cols>)] VALUES (<literals>)
//! DELETE FROM <table> [WHERE <cond> [AND <cond>]...]
//! ```
//!
//! Keywords are case-insensitive and a trailing `;` is accepted. Parsing
//! never fails: a line that does not fit the grammar (or that contains a
//! SET expression or condition outside it) becomes [`Statement::Unknown`]
//! with the raw text preserved. All literal spans are byte offsets into
//! the original line, untrimmed.

use crate::statement::{
    ArithOp, Assignment, CmpOp, Condition, Expression, Literal, Operand, Span, Statement,
};
use regex::Regex;
use std::sync::OnceLock;

const IDENT: &str = r"[A-Za-z_][A-Za-z0-9_]*";
const TOKEN: &str = r"-?[A-Za-z0-9_.]+";

fn update_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?is)^\s*UPDATE\s+({IDENT})\s+SET\s+(.*?)(?:\s+WHERE\s+(.*?))?\s*;?\s*$"
        ))
        .expect("static regex")
    })
}

fn insert_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?is)^\s*INSERT\s+INTO\s+({IDENT})(?:\s*\((.*?)\))?\s+VALUES\s*\((.*?)\)\s*;?\s*$"
        ))
        .expect("static regex")
    })
}

fn delete_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?is)^\s*DELETE\s+FROM\s+({IDENT})(?:\s+WHERE\s+(.*?))?\s*;?\s*$"
        ))
        .expect("static regex")
    })
}

fn assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"^({IDENT})\s*=\s*(.+)$")).expect("static regex"))
}

fn binary_expr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^({TOKEN})\s*([+\-*/])\s*({TOKEN})$")).expect("static regex")
    })
}

fn operand_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"^({TOKEN})$")).expect("static regex"))
}

fn condition_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^({IDENT})\s*(<=|>=|=|<|>)\s*({TOKEN})$")).expect("static regex")
    })
}

fn and_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s+AND\s+").expect("static regex"))
}

// ── Public API ──────────────────────────────────────────────────────

/// Parse every line of a query log, preserving positional indexing.
pub fn parse_log<S: AsRef<str>>(lines: &[S]) -> Vec<Statement> {
    lines.iter().map(|l| parse_statement(l.as_ref())).collect()
}

/// Parse one log line.
pub fn parse_statement(text: &str) -> Statement {
    let parsed = if let Some(caps) = update_re().captures(text) {
        parse_update(&caps)
    } else if let Some(caps) = insert_re().captures(text) {
        parse_insert(&caps)
    } else if let Some(caps) = delete_re().captures(text) {
        parse_delete(&caps)
    } else {
        None
    };
    parsed.unwrap_or_else(|| Statement::Unknown {
        raw: text.to_string(),
    })
}

// ── Statement forms ─────────────────────────────────────────────────

fn parse_update(caps: &regex::Captures<'_>) -> Option<Statement> {
    let table = caps.get(1)?.as_str().to_string();
    let set = caps.get(2)?;
    let mut assignments: Vec<Assignment> = Vec::new();
    for (piece, base) in split_with_offsets(set.as_str(), set.start(), ',') {
        let assignment = parse_assignment(piece, base)?;
        if assignments.iter().any(|a| a.column == assignment.column) {
            return None;
        }
        assignments.push(assignment);
    }
    let conditions = match caps.get(3) {
        Some(m) => parse_where(m.as_str(), m.start())?,
        None => Vec::new(),
    };
    Some(Statement::Update {
        table,
        assignments,
        conditions,
    })
}

fn parse_insert(caps: &regex::Captures<'_>) -> Option<Statement> {
    let table = caps.get(1)?.as_str().to_string();
    let columns = match caps.get(2) {
        Some(m) => {
            let mut cols = Vec::new();
            for (piece, _) in split_with_offsets(m.as_str(), m.start(), ',') {
                if !crate::table::is_identifier(piece) {
                    return None;
                }
                cols.push(piece.to_string());
            }
            Some(cols)
        }
        None => None,
    };
    let vals = caps.get(3)?;
    let mut values = Vec::new();
    for (piece, base) in split_with_offsets(vals.as_str(), vals.start(), ',') {
        if piece.is_empty() {
            return None;
        }
        values.push(Literal::new(piece, Span::new(base, base + piece.len())));
    }
    if let Some(cols) = &columns {
        if cols.len() != values.len() {
            return None;
        }
    }
    Some(Statement::Insert {
        table,
        columns,
        values,
    })
}

fn parse_delete(caps: &regex::Captures<'_>) -> Option<Statement> {
    let table = caps.get(1)?.as_str().to_string();
    let conditions = match caps.get(2) {
        Some(m) => parse_where(m.as_str(), m.start())?,
        None => Vec::new(),
    };
    Some(Statement::Delete { table, conditions })
}

// ── Clauses ─────────────────────────────────────────────────────────

fn parse_assignment(piece: &str, base: usize) -> Option<Assignment> {
    let caps = assignment_re().captures(piece)?;
    let column = caps.get(1)?.as_str().to_string();
    let rhs = caps.get(2)?;
    let expr = parse_expression(rhs.as_str().trim_end(), base + rhs.start())?;
    Some(Assignment { column, expr })
}

fn parse_expression(text: &str, base: usize) -> Option<Expression> {
    if let Some(caps) = binary_expr_re().captures(text) {
        let left = operand(caps.get(1)?, base);
        let op = ArithOp::from_symbol(caps.get(2)?.as_str())?;
        let right = operand(caps.get(3)?, base);
        // A linear SET expression references at least one attribute.
        if left.as_attribute().is_none() && right.as_attribute().is_none() {
            return None;
        }
        return Some(Expression::Binary { left, op, right });
    }
    let caps = operand_re().captures(text)?;
    Some(Expression::Operand {
        operand: operand(caps.get(1)?, base),
    })
}

fn parse_where(text: &str, base: usize) -> Option<Vec<Condition>> {
    let mut conditions = Vec::new();
    let mut cursor = 0;
    let mut pieces = Vec::new();
    for sep in and_re().find_iter(text) {
        pieces.push((&text[cursor..sep.start()], cursor));
        cursor = sep.end();
    }
    pieces.push((&text[cursor..], cursor));

    for (raw, local) in pieces {
        let (piece, trimmed_offset) = trim_with_offset(raw);
        let caps = condition_re().captures(piece)?;
        let at = base + local + trimmed_offset;
        let attribute = caps.get(1)?.as_str().to_string();
        let op = CmpOp::from_symbol(caps.get(2)?.as_str())?;
        let value = operand(caps.get(3)?, at);
        conditions.push(Condition {
            attribute,
            op,
            value,
        });
    }
    Some(conditions)
}

fn operand(m: regex::Match<'_>, base: usize) -> Operand {
    let text = m.as_str();
    let span = Span::new(m.start(), m.end()).offset(base);
    let starts_like_name = text
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if starts_like_name {
        Operand::Attribute {
            name: text.to_string(),
            span,
        }
    } else {
        Operand::Literal(Literal::new(text, span))
    }
}

/// Split `text` on `sep`, returning trimmed pieces with their absolute
/// byte offsets (`base` is the offset of `text` in the full line).
fn split_with_offsets(text: &str, base: usize, sep: char) -> Vec<(&str, usize)> {
    let mut out = Vec::new();
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        if ch == sep {
            let (piece, off) = trim_with_offset(&text[start..idx]);
            out.push((piece, base + start + off));
            start = idx + ch.len_utf8();
        }
    }
    let (piece, off) = trim_with_offset(&text[start..]);
    out.push((piece, base + start + off));
    out
}

fn trim_with_offset(s: &str) -> (&str, usize) {
    let leading = s.len() - s.trim_start().len();
    (s.trim(), leading)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_tracks_offsets() {
        let parts = split_with_offsets(" a , bb,c ", 10, ',');
        assert_eq!(parts, vec![("a", 11), ("bb", 14), ("c", 18)]);
    }

    #[test]
    fn literal_spans_point_into_original_text() {
        let line = "UPDATE Taxes SET B=A+1000 WHERE A>=85700";
        let stmt = parse_statement(line);
        let lits = stmt.literals();
        assert_eq!(lits.len(), 2);
        assert_eq!(lits[0].1.span.slice(line), "1000");
        assert_eq!(lits[1].1.span.slice(line), "85700");
    }

    #[test]
    fn attribute_to_attribute_binary_has_no_literal() {
        let stmt = parse_statement("UPDATE Taxes SET D=A-B");
        assert!(stmt.literals().is_empty());
        assert!(!stmt.is_unknown());
    }

    #[test]
    fn literal_only_binary_is_rejected() {
        assert!(parse_statement("UPDATE T SET B=1+2").is_unknown());
    }
}
