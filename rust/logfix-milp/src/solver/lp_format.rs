//! CPLEX LP export.
//!
//! Output is deterministic: variables appear in declaration order,
//! constraints in emission order, and linear terms in key order. The
//! [`fingerprint`] of a model is the SHA-256 of this text.

use crate::linear::{Domain, LinExpr, Sense};
use crate::model::Model;
use sha2::{Digest, Sha256};
use std::fmt::Write;

const TERMS_PER_LINE: usize = 6;

pub fn write_lp(model: &Model) -> String {
    let mut out = String::new();
    let stats = model.stats();
    let _ = writeln!(
        out,
        "\\ logfix model: {} binaries, {} integers, {} continuous, {} constraints",
        stats.binaries, stats.integers, stats.continuous, stats.constraints
    );

    let filler = model
        .variables()
        .first()
        .map(|v| v.key.to_string())
        .unwrap_or_else(|| "x".to_string());

    out.push_str("Minimize\n obj:");
    match model.objective() {
        Some(obj) if !obj.is_constant() => write_terms(&mut out, obj),
        _ => {
            let _ = write!(out, " 0 {}", filler);
        }
    }
    out.push('\n');

    out.push_str("Subject To\n");
    for (i, c) in model.constraints().iter().enumerate() {
        let _ = write!(out, " c{}:", i);
        if c.expr.is_constant() {
            let _ = write!(out, " 0 {}", filler);
        } else {
            write_terms(&mut out, &c.expr);
        }
        let sense = match c.sense {
            Sense::Le => "<=",
            Sense::Ge => ">=",
            Sense::Eq => "=",
        };
        let _ = writeln!(out, " {} {}", sense, number(c.rhs));
    }

    out.push_str("Bounds\n");
    for v in model.variables() {
        if v.domain == Domain::Binary {
            continue;
        }
        let name = v.key.to_string();
        let _ = match (v.lower, v.upper) {
            (None, None) => writeln!(out, " {} free", name),
            (Some(lo), None) => writeln!(out, " {} >= {}", name, number(lo)),
            (None, Some(hi)) => writeln!(out, " -inf <= {} <= {}", name, number(hi)),
            (Some(lo), Some(hi)) => writeln!(out, " {} <= {} <= {}", number(lo), name, number(hi)),
        };
    }

    write_section(&mut out, "Generals", model, Domain::Integer);
    write_section(&mut out, "Binaries", model, Domain::Binary);
    out.push_str("End\n");
    out
}

/// SHA-256 of the LP text, hex encoded.
pub fn fingerprint(model: &Model) -> String {
    hex::encode(Sha256::digest(write_lp(model).as_bytes()))
}

fn write_terms(out: &mut String, expr: &LinExpr) {
    for (n, (key, coef)) in expr.terms().enumerate() {
        if n > 0 && n % TERMS_PER_LINE == 0 {
            out.push_str("\n   ");
        }
        let sign = if coef < 0.0 { '-' } else { '+' };
        let _ = write!(out, " {} {} {}", sign, number(coef.abs()), key);
    }
}

fn write_section(out: &mut String, title: &str, model: &Model, domain: Domain) {
    let names: Vec<String> = model
        .variables()
        .iter()
        .filter(|v| v.domain == domain)
        .map(|v| v.key.to_string())
        .collect();
    if names.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}", title);
    for chunk in names.chunks(TERMS_PER_LINE) {
        let _ = writeln!(out, " {}", chunk.join(" "));
    }
}

/// Plain decimal notation; LP readers disagree on exponents.
fn number(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    if v.fract() == 0.0 && v.abs() < 1e15 {
        return format!("{}", v as i64);
    }
    let s = format!("{:.12}", v);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gadgets;
    use crate::linear::{LinExpr, VarKey, Variable};

    fn tiny() -> Model {
        let mut model = Model::new();
        let (b, v) = (VarKey::named("b"), VarKey::named("v"));
        model
            .declare(Variable::continuous(v.clone()).bounded(-5.0, 5.0))
            .unwrap();
        model
            .absorb(gadgets::less_or_equal(b.clone(), &v.into(), &LinExpr::constant(2.0), 100.0))
            .unwrap();
        model.set_objective(LinExpr::var(b));
        model
    }

    #[test]
    fn sections_in_order() {
        let lp = write_lp(&tiny());
        let order: Vec<usize> = ["Minimize", "Subject To", "Bounds", "Binaries", "End"]
            .iter()
            .map(|s| lp.find(s).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
        assert!(lp.contains(" c0: + 100 b + 1 v <= 102"));
        assert!(lp.contains(" -5 <= v <= 5"));
        assert!(!lp.contains("Generals"));
    }

    #[test]
    fn numbers_avoid_exponents() {
        assert_eq!(number(5460000.0), "5460000");
        assert_eq!(number(0.001), "0.001");
        assert_eq!(number(-2.5), "-2.5");
        assert_eq!(number(1e-13), "0");
    }

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(fingerprint(&tiny()), fingerprint(&tiny()));
        assert_eq!(fingerprint(&tiny()).len(), 64);
    }
}
