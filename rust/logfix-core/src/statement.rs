//! Parsed representation of query-log statements.
//!
//! Every statement keeps enough positional information (byte spans of its
//! literals) to be rewritten in place once a repair has been computed, so
//! the repaired log stays textually close to what the user wrote.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::EnumIter;

// ── Spans and literals ──────────────────────────────────────────────

/// Byte range of a token inside the original statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Shift a span that was computed relative to a substring.
    pub fn offset(self, base: usize) -> Self {
        Self {
            start: self.start + base,
            end: self.end + base,
        }
    }

    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// A literal token as written in the log.
///
/// `value` is `None` when the token is not a number (a quoted string, a
/// malformed number). Such literals are never correctable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    pub text: String,
    pub value: Option<f64>,
    pub span: Span,
}

impl Literal {
    pub fn new(text: &str, span: Span) -> Self {
        Self {
            text: text.to_string(),
            value: parse_number(text),
            span,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.value.is_some()
    }

    /// True when the literal was written as a whole number (`85700`, `-3`).
    pub fn is_integral(&self) -> bool {
        match self.value {
            Some(v) => v.fract() == 0.0 && !self.text.contains(['.', 'e', 'E']),
            None => false,
        }
    }
}

/// Parse a numeric token, rejecting `inf`/`NaN` spellings.
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// ── Operators ───────────────────────────────────────────────────────

/// Arithmetic operators allowed in a SET expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn from_symbol(sym: &str) -> Option<Self> {
        match sym {
            "+" => Some(ArithOp::Add),
            "-" => Some(ArithOp::Sub),
            "*" => Some(ArithOp::Mul),
            "/" => Some(ArithOp::Div),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }

    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            ArithOp::Add => lhs + rhs,
            ArithOp::Sub => lhs - rhs,
            ArithOp::Mul => lhs * rhs,
            ArithOp::Div => lhs / rhs,
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Comparison operators allowed in a WHERE condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
pub enum CmpOp {
    Le,
    Ge,
    Eq,
    Lt,
    Gt,
}

impl CmpOp {
    pub fn from_symbol(sym: &str) -> Option<Self> {
        match sym {
            "<=" => Some(CmpOp::Le),
            ">=" => Some(CmpOp::Ge),
            "=" => Some(CmpOp::Eq),
            "<" => Some(CmpOp::Lt),
            ">" => Some(CmpOp::Gt),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Le => "<=",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "=",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
        }
    }

    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Le => lhs <= rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Eq => lhs == rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Gt => lhs > rhs,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ── Expressions ─────────────────────────────────────────────────────

/// One side of a SET expression or the right-hand side of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Operand {
    Attribute { name: String, span: Span },
    Literal(Literal),
}

impl Operand {
    pub fn as_attribute(&self) -> Option<&str> {
        match self {
            Operand::Attribute { name, .. } => Some(name),
            Operand::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Operand::Literal(lit) => Some(lit),
            Operand::Attribute { .. } => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Attribute { name, .. } => f.write_str(name),
            Operand::Literal(lit) => f.write_str(&lit.text),
        }
    }
}

/// Right-hand side of `SET column = ...`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "lowercase")]
pub enum Expression {
    /// `B = A` or `B = 5`
    Operand { operand: Operand },
    /// `B = A + 1000`
    Binary {
        left: Operand,
        op: ArithOp,
        right: Operand,
    },
}

impl Expression {
    /// The literal operand of this expression, if any. A linear SET
    /// expression carries at most one.
    pub fn literal(&self) -> Option<&Literal> {
        match self {
            Expression::Operand { operand } => operand.as_literal(),
            Expression::Binary { left, right, .. } => {
                left.as_literal().or_else(|| right.as_literal())
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Operand { operand } => write!(f, "{}", operand),
            Expression::Binary { left, op, right } => write!(f, "{}{}{}", left, op, right),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub expr: Expression,
}

/// A single conjunct of a WHERE clause: `attribute <op> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub attribute: String,
    pub op: CmpOp,
    pub value: Operand,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.attribute, self.op, self.value)
    }
}

// ── Statements ──────────────────────────────────────────────────────

/// A parsed log statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Statement {
    Update {
        table: String,
        assignments: Vec<Assignment>,
        conditions: Vec<Condition>,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        values: Vec<Literal>,
    },
    Delete {
        table: String,
        conditions: Vec<Condition>,
    },
    /// A line the parser could not understand, kept verbatim.
    Unknown { raw: String },
}

/// Where a literal sits inside its statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "site", rename_all = "lowercase")]
pub enum LiteralSite {
    /// Right-hand side of `SET column = ...`.
    Set { column: String },
    /// Value of the `index`-th WHERE condition.
    Where { index: usize },
    /// The `index`-th value of an INSERT.
    Insert { index: usize },
}

impl Statement {
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Update { .. } => "UPDATE",
            Statement::Insert { .. } => "INSERT",
            Statement::Delete { .. } => "DELETE",
            Statement::Unknown { .. } => "UNKNOWN",
        }
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            Statement::Update { table, .. }
            | Statement::Insert { table, .. }
            | Statement::Delete { table, .. } => Some(table),
            Statement::Unknown { .. } => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Statement::Unknown { .. })
    }

    /// WHERE conjuncts; empty for INSERT and for unconditional statements.
    pub fn conditions(&self) -> &[Condition] {
        match self {
            Statement::Update { conditions, .. } | Statement::Delete { conditions, .. } => {
                conditions
            }
            Statement::Insert { .. } | Statement::Unknown { .. } => &[],
        }
    }

    /// Every literal in the statement together with its site, in textual
    /// order of kind (SET, then WHERE, then INSERT values).
    pub fn literals(&self) -> Vec<(LiteralSite, &Literal)> {
        let mut out = Vec::new();
        match self {
            Statement::Update {
                assignments,
                conditions,
                ..
            } => {
                for a in assignments {
                    if let Some(lit) = a.expr.literal() {
                        out.push((
                            LiteralSite::Set {
                                column: a.column.clone(),
                            },
                            lit,
                        ));
                    }
                }
                push_condition_literals(conditions, &mut out);
            }
            Statement::Delete { conditions, .. } => push_condition_literals(conditions, &mut out),
            Statement::Insert { values, .. } => {
                for (index, lit) in values.iter().enumerate() {
                    out.push((LiteralSite::Insert { index }, lit));
                }
            }
            Statement::Unknown { .. } => {}
        }
        out
    }

    /// Look up the literal at `site`.
    pub fn literal_at(&self, site: &LiteralSite) -> Option<&Literal> {
        self.literals()
            .into_iter()
            .find(|(s, _)| s == site)
            .map(|(_, lit)| lit)
    }
}

fn push_condition_literals<'a>(
    conditions: &'a [Condition],
    out: &mut Vec<(LiteralSite, &'a Literal)>,
) {
    for (index, c) in conditions.iter().enumerate() {
        if let Some(lit) = c.value.as_literal() {
            out.push((LiteralSite::Where { index }, lit));
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Update {
                table,
                assignments,
                conditions,
            } => {
                let sets: Vec<_> = assignments
                    .iter()
                    .map(|a| format!("{}={}", a.column, a.expr))
                    .collect();
                write!(f, "UPDATE {} SET {}", table, sets.join(", "))?;
                write_where(f, conditions)
            }
            Statement::Insert {
                table,
                columns,
                values,
            } => {
                write!(f, "INSERT INTO {}", table)?;
                if let Some(cols) = columns {
                    write!(f, " ({})", cols.join(", "))?;
                }
                let vals: Vec<_> = values.iter().map(|v| v.text.as_str()).collect();
                write!(f, " VALUES ({})", vals.join(", "))
            }
            Statement::Delete { table, conditions } => {
                write!(f, "DELETE FROM {}", table)?;
                write_where(f, conditions)
            }
            Statement::Unknown { raw } => f.write_str(raw),
        }
    }
}

fn write_where(f: &mut fmt::Formatter<'_>, conditions: &[Condition]) -> fmt::Result {
    if conditions.is_empty() {
        return Ok(());
    }
    let parts: Vec<_> = conditions.iter().map(|c| c.to_string()).collect();
    write!(f, " WHERE {}", parts.join(" AND "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn literal_integrality_follows_spelling() {
        let span = Span::new(0, 0);
        assert!(Literal::new("85700", span).is_integral());
        assert!(Literal::new("-3", span).is_integral());
        assert!(!Literal::new("1.0", span).is_integral());
        assert!(!Literal::new("1e3", span).is_integral());
        assert!(!Literal::new("'abc'", span).is_numeric());
    }

    #[test]
    fn parse_number_rejects_non_finite() {
        assert_eq!(parse_number("12.5"), Some(12.5));
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn operator_symbols_round_trip() {
        for op in ArithOp::iter() {
            assert_eq!(ArithOp::from_symbol(op.symbol()), Some(op));
        }
        for op in CmpOp::iter() {
            assert_eq!(CmpOp::from_symbol(op.symbol()), Some(op));
        }
    }

    #[test]
    fn cmp_holds_matches_operator() {
        assert!(CmpOp::Ge.holds(85700.0, 85700.0));
        assert!(!CmpOp::Gt.holds(85700.0, 85700.0));
        assert!(CmpOp::Eq.holds(3.0, 3.0));
        assert!(CmpOp::Lt.holds(1.0, 2.0));
    }
}
