//! Turn a solved assignment back into a query log.
//!
//! Each literal whose solved value differs from the logged one is
//! rewritten in place, using the byte span recorded by the parser, so
//! spacing and casing survive. A statement counts as flagged when one of
//! its error indicators is set or one of its literals moved: a deletion
//! complaint fixed by a WHERE threshold leaves every indicator at zero, and
//! the moved literal is the only trace of the repair.

use crate::linear::Assignment;
use crate::variables::VariableSets;
use logfix_core::{LiteralSite, Span};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiteralChange {
    pub site: LiteralSite,
    pub before: String,
    pub after: String,
    pub old_value: f64,
    pub new_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairedStatement {
    pub index: usize,
    pub original: String,
    pub repaired: String,
    /// Some error indicator of this statement is set, or a literal moved.
    pub flagged: bool,
    pub changes: Vec<LiteralChange>,
}

impl RepairedStatement {
    pub fn is_changed(&self) -> bool {
        !self.changes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepairedLog {
    pub statements: Vec<RepairedStatement>,
}

impl RepairedLog {
    pub fn lines(&self) -> Vec<&str> {
        self.statements.iter().map(|s| s.repaired.as_str()).collect()
    }

    pub fn changed(&self) -> impl Iterator<Item = &RepairedStatement> {
        self.statements.iter().filter(|s| s.is_changed())
    }

    pub fn is_unchanged(&self) -> bool {
        self.changed().next().is_none()
    }
}

/// Rebuild the log from `assignment`.
pub fn extract_repair(lines: &[String], sets: &VariableSets, assignment: &Assignment) -> RepairedLog {
    let statements = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let mut changes = Vec::new();
            let mut edits: Vec<(Span, String)> = Vec::new();
            for lit in sets.literals_of(i) {
                let Some(solved) = assignment.get(&lit.key) else {
                    continue;
                };
                let solved = if lit.integral { solved.round() } else { solved };
                if !differs(solved, lit.original) {
                    continue;
                }
                let text = format_value(solved);
                edits.push((lit.span, text.clone()));
                changes.push(LiteralChange {
                    site: lit.site.clone(),
                    before: lit.text.clone(),
                    after: text,
                    old_value: lit.original,
                    new_value: solved,
                });
            }
            let flagged =
                !changes.is_empty() || (0..sets.tuples).any(|j| assignment.is_set(&sets.error(i, j)));
            RepairedStatement {
                index: i,
                original: line.clone(),
                repaired: splice(line, edits),
                flagged,
                changes,
            }
        })
        .collect();
    RepairedLog { statements }
}

fn differs(a: f64, b: f64) -> bool {
    (a - b).abs() > 1e-9 * a.abs().max(b.abs()).max(1.0)
}

/// Integral values print without a fraction; others are rounded to nine
/// decimals with trailing zeros dropped.
pub fn format_value(v: f64) -> String {
    let rounded = (v * 1e9).round() / 1e9;
    if rounded.fract() == 0.0 && rounded.abs() < 9.0e15 {
        return format!("{}", rounded as i64);
    }
    let s = format!("{:.9}", rounded);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn splice(line: &str, mut edits: Vec<(Span, String)>) -> String {
    edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));
    let mut out = line.to_string();
    for (span, text) in edits {
        if span.end <= out.len() && out.is_char_boundary(span.start) && out.is_char_boundary(span.end) {
            out.replace_range(span.start..span.end, &text);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_format_compactly() {
        assert_eq!(format_value(86501.0), "86501");
        assert_eq!(format_value(-3.0), "-3");
        assert_eq!(format_value(2.5), "2.5");
        assert_eq!(format_value(0.1 + 0.2), "0.3");
        assert_eq!(format_value(1.0000000000004), "1");
    }

    #[test]
    fn splice_replaces_from_the_right() {
        let line = "UPDATE T SET B=A+10 WHERE A>=5";
        let edits = vec![(Span::new(17, 19), "7".to_string()), (Span::new(29, 30), "123".to_string())];
        assert_eq!(splice(line, edits), "UPDATE T SET B=A+7 WHERE A>=123");
    }
}
