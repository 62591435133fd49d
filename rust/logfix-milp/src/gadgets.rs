//! Big-M constraint gadgets.
//!
//! Each gadget is a pure function: given the key of its output variable
//! and linear operands, it returns the output (and any helper) variables
//! together with the constraints that encode it. Nothing here touches a
//! [`crate::Model`]; callers merge the returned [`Encoding`] with
//! [`crate::Model::absorb`].
//!
//! All gadgets are exact only while operand magnitudes stay within the
//! big-M bound they are given. Comparison gadgets are one-directional:
//! `less_or_equal` forces its output to 0 when the comparison fails but
//! does not force it to 1 when the comparison holds. Pair it with
//! [`strictly_greater_unless`] (as [`less_or_equal_iff`] does) when both
//! directions are needed.

use crate::linear::{Constraint, Definition, LinExpr, Role, VarKey, Variable};

/// Variables and constraints produced by one gadget.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoding {
    pub output: VarKey,
    pub vars: Vec<Variable>,
    pub constraints: Vec<Constraint>,
}

impl Encoding {
    fn new(output: VarKey) -> Self {
        Self {
            output,
            vars: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Append the variables and constraints of a sub-encoding.
    pub fn merge(&mut self, other: Encoding) {
        self.vars.extend(other.vars);
        self.constraints.extend(other.constraints);
    }

    pub fn output_expr(&self) -> LinExpr {
        LinExpr::var(self.output.clone())
    }
}

// ── Products ────────────────────────────────────────────────────────

/// `a = b * u` for a binary `b` and `0 <= u <= M`.
///
/// ```text
/// a <= u
/// a <= b * M
/// a >= u - (1 - b) * M
/// ```
pub fn indicator_product(out: VarKey, b: &LinExpr, u: &LinExpr, big_m: f64) -> Encoding {
    let mut enc = Encoding::new(out.clone());
    let a = LinExpr::var(out.clone());
    enc.vars.push(
        Variable::continuous(out.clone())
            .bounded(0.0, big_m)
            .defined(Definition::Product {
                indicator: b.clone(),
                value: u.clone(),
            }),
    );
    enc.constraints
        .push(Constraint::le(format!("mul_ub_{}", out), a.clone(), u.clone()));
    enc.constraints
        .push(Constraint::le(format!("mul_ind_{}", out), a.clone(), b.clone() * big_m));
    enc.constraints.push(Constraint::ge(
        format!("mul_lb_{}", out),
        a,
        u.clone() - (LinExpr::constant(1.0) - b.clone()) * big_m,
    ));
    enc
}

/// `a = b * u` for a binary `b` and `|u| <= M`.
///
/// ```text
/// a <= u + (1 - b) * M
/// a >= u - (1 - b) * M
/// -b * M <= a <= b * M
/// ```
pub fn signed_indicator_product(out: VarKey, b: &LinExpr, u: &LinExpr, big_m: f64) -> Encoding {
    let mut enc = Encoding::new(out.clone());
    let a = LinExpr::var(out.clone());
    let slack = (LinExpr::constant(1.0) - b.clone()) * big_m;
    enc.vars.push(
        Variable::continuous(out.clone())
            .bounded(-big_m, big_m)
            .defined(Definition::Product {
                indicator: b.clone(),
                value: u.clone(),
            }),
    );
    enc.constraints.push(Constraint::le(
        format!("smul_ub_{}", out),
        a.clone(),
        u.clone() + slack.clone(),
    ));
    enc.constraints.push(Constraint::ge(
        format!("smul_lb_{}", out),
        a.clone(),
        u.clone() - slack,
    ));
    enc.constraints.push(Constraint::le(
        format!("smul_on_{}", out),
        a.clone(),
        b.clone() * big_m,
    ));
    enc.constraints.push(Constraint::ge(
        format!("smul_off_{}", out),
        a,
        b.clone() * -big_m,
    ));
    enc
}

// ── Comparisons ─────────────────────────────────────────────────────

/// Binary `b` with `b = 1 => v1 <= v2`.
///
/// One constraint: `v1 - v2 <= M * (1 - b)`. Nothing forces `b = 1` when
/// `v1 <= v2` holds.
pub fn less_or_equal(out: VarKey, v1: &LinExpr, v2: &LinExpr, big_m: f64) -> Encoding {
    let mut enc = Encoding::new(out.clone());
    let diff = v1.clone() - v2.clone();
    enc.vars
        .push(Variable::binary(out.clone()).defined(Definition::Holds(diff.clone())));
    enc.constraints.push(Constraint::le(
        format!("le_{}", out),
        diff,
        LinExpr::not(out.clone()) * big_m,
    ));
    enc
}

/// `b = 0 => v1 - v2 >= eps`, i.e. `v1 - v2 >= eps - M * b`.
pub fn strictly_greater_unless(b: &VarKey, v1: &LinExpr, v2: &LinExpr, big_m: f64, eps: f64) -> Constraint {
    Constraint::ge(
        format!("gt_{}", b),
        v1.clone() - v2.clone(),
        LinExpr::constant(eps) - LinExpr::term(b.clone(), big_m),
    )
}

/// `b = 1 <=> v1 <= v2`, up to a strictness gap of `eps`.
pub fn less_or_equal_iff(out: VarKey, v1: &LinExpr, v2: &LinExpr, big_m: f64, eps: f64) -> Encoding {
    let mut enc = less_or_equal(out.clone(), v1, v2, big_m);
    enc.constraints
        .push(strictly_greater_unless(&out, v1, v2, big_m, eps));
    enc
}

/// `b = b1 AND b2` for binary operands.
///
/// ```text
/// b <= b1
/// b <= b2
/// b >= b1 + b2 - 1
/// ```
pub fn and(out: VarKey, b1: &LinExpr, b2: &LinExpr) -> Encoding {
    let mut enc = Encoding::new(out.clone());
    let b = LinExpr::var(out.clone());
    enc.vars.push(
        Variable::binary(out.clone()).defined(Definition::All(vec![b1.clone(), b2.clone()])),
    );
    enc.constraints
        .push(Constraint::le(format!("and_l_{}", out), b.clone(), b1.clone()));
    enc.constraints
        .push(Constraint::le(format!("and_r_{}", out), b.clone(), b2.clone()));
    enc.constraints.push(Constraint::ge(
        format!("and_both_{}", out),
        b,
        b1.clone() + b2.clone() - 1.0,
    ));
    enc
}

/// `b = 1 => v1 = v2`, built from two [`less_or_equal`] legs joined by
/// [`and`]. Shares the one-directional caveat of its legs.
pub fn equal(out: VarKey, v1: &LinExpr, v2: &LinExpr, big_m: f64) -> Encoding {
    let fwd = less_or_equal(out.aux(Role::Forward), v1, v2, big_m);
    let bwd = less_or_equal(out.aux(Role::Backward), v2, v1, big_m);
    let mut enc = and(out, &fwd.output_expr(), &bwd.output_expr());
    enc.merge(fwd);
    enc.merge(bwd);
    enc
}

// ── Arithmetic and presence ─────────────────────────────────────────

/// `w = u + v`.
pub fn sum(out: VarKey, u: &LinExpr, v: &LinExpr) -> Encoding {
    let mut enc = Encoding::new(out.clone());
    let total = u.clone() + v.clone();
    enc.vars
        .push(Variable::continuous(out.clone()).defined(Definition::Expr(total.clone())));
    enc.constraints.push(Constraint::eq(
        format!("sum_{}", out),
        LinExpr::var(out),
        total,
    ));
    enc
}

/// `d >= |v - target|`, tight when `d` is minimized.
pub fn absolute_deviation(out: VarKey, v: &LinExpr, target: f64) -> Encoding {
    let mut enc = Encoding::new(out.clone());
    let diff = v.clone() - target;
    let d = LinExpr::var(out.clone());
    enc.vars.push(
        Variable::continuous(out.clone())
            .at_least(0.0)
            .defined(Definition::Magnitude(diff.clone())),
    );
    enc.constraints
        .push(Constraint::ge(format!("dev_hi_{}", out), d.clone(), diff.clone()));
    enc.constraints
        .push(Constraint::ge(format!("dev_lo_{}", out), d, -diff));
    enc
}

/// Tie a tuple value to its presence bit.
///
/// `p = 0 => y = ghost` and `p = 1 => -domain <= y <= domain`. Requires
/// `ghost > domain` and `big_m >= ghost + domain`.
pub fn ghost_link(p: &VarKey, y: &LinExpr, ghost: f64, domain: f64, big_m: f64) -> Vec<Constraint> {
    let on = LinExpr::var(p.clone()) * big_m;
    let off = LinExpr::not(p.clone()) * big_m;
    let name = y.keys().next().map(|k| k.to_string()).unwrap_or_default();
    vec![
        Constraint::le(format!("ghost_ub_{}", name), y.clone(), on.clone() + ghost),
        Constraint::ge(format!("ghost_lb_{}", name), y.clone(), -on + ghost),
        Constraint::le(format!("live_ub_{}", name), y.clone(), off.clone() + domain),
        Constraint::ge(format!("live_lb_{}", name), y.clone(), -off - domain),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::Assignment;
    use crate::model::Model;

    const M: f64 = 1000.0;

    fn model_of(enc: Encoding) -> Model {
        let mut model = Model::new();
        model.absorb(enc).unwrap();
        model
    }

    #[test]
    fn indicator_product_is_exact() {
        let (b, u, a) = (VarKey::named("b"), VarKey::named("u"), VarKey::named("a"));
        let mut model = Model::new();
        model.declare(Variable::binary(b.clone())).unwrap();
        model
            .declare(Variable::continuous(u.clone()).bounded(0.0, M))
            .unwrap();
        model
            .absorb(indicator_product(a.clone(), &b.clone().into(), &u.clone().into(), M))
            .unwrap();
        for (bv, uv) in [(0.0, 0.0), (0.0, 400.0), (1.0, 0.0), (1.0, 400.0), (1.0, M)] {
            let seed = Assignment::new().with(b.clone(), bv).with(u.clone(), uv);
            let full = model.complete(&seed).unwrap();
            assert_eq!(full.get(&a), Some(bv * uv));
            assert!(model.violations(&full).is_empty(), "b={} u={}", bv, uv);
            let wrong = full.clone().with(a.clone(), bv * uv + 1.0);
            assert!(!model.violations(&wrong).is_empty());
        }
    }

    #[test]
    fn signed_product_handles_negative_values() {
        let (b, u, a) = (VarKey::named("b"), VarKey::named("u"), VarKey::named("a"));
        let model = model_of(signed_indicator_product(
            a.clone(),
            &b.clone().into(),
            &u.clone().into(),
            M,
        ));
        for (bv, uv) in [(1.0, -300.0), (0.0, -300.0), (1.0, 250.0)] {
            let full = Assignment::new()
                .with(b.clone(), bv)
                .with(u.clone(), uv)
                .with(a.clone(), bv * uv);
            assert!(model.violations(&full).is_empty());
            let wrong = full.with(a.clone(), bv * uv - 5.0);
            assert!(!model.violations(&wrong).is_empty());
        }
    }

    #[test]
    fn less_or_equal_iff_decides_both_ways() {
        let (b, v) = (VarKey::named("b"), VarKey::named("v"));
        let model = model_of(less_or_equal_iff(
            b.clone(),
            &v.clone().into(),
            &LinExpr::constant(10.0),
            M,
            0.001,
        ));
        for (vv, holds) in [(3.0, 1.0), (10.0, 1.0), (10.5, 0.0)] {
            let ok = Assignment::new().with(v.clone(), vv).with(b.clone(), holds);
            assert!(model.violations(&ok).is_empty(), "v={}", vv);
            let flipped = ok.with(b.clone(), 1.0 - holds);
            assert!(!model.violations(&flipped).is_empty(), "v={}", vv);
        }
    }

    #[test]
    fn less_or_equal_alone_is_one_directional() {
        let (b, v) = (VarKey::named("b"), VarKey::named("v"));
        let model = model_of(less_or_equal(
            b.clone(),
            &v.clone().into(),
            &LinExpr::constant(10.0),
            M,
        ));
        let holds_but_zero = Assignment::new().with(v.clone(), 3.0).with(b.clone(), 0.0);
        assert!(model.violations(&holds_but_zero).is_empty());
        let fails_but_one = Assignment::new().with(v, 11.0).with(b, 1.0);
        assert!(!model.violations(&fails_but_one).is_empty());
    }

    #[test]
    fn and_truth_table() {
        let (b, b1, b2) = (VarKey::named("b"), VarKey::named("b1"), VarKey::named("b2"));
        let model = model_of(and(b.clone(), &b1.clone().into(), &b2.clone().into()));
        for (x, y) in [(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)] {
            let seed = Assignment::new().with(b1.clone(), x).with(b2.clone(), y);
            let full = model.complete(&seed).unwrap();
            assert_eq!(full.get(&b), Some(x * y));
            assert!(model.violations(&full).is_empty());
            assert!(!model.violations(&full.with(b.clone(), 1.0 - x * y)).is_empty());
        }
    }

    #[test]
    fn equal_of_identical_operands_derives_one() {
        let (b, v) = (VarKey::named("b"), VarKey::named("v"));
        let model = model_of(equal(b.clone(), &v.clone().into(), &v.clone().into(), M));
        let full = model
            .complete(&Assignment::new().with(v.clone(), 42.0))
            .unwrap();
        assert_eq!(full.get(&b), Some(1.0));
        assert!(model.violations(&full).is_empty());
    }

    #[test]
    fn ghost_link_separates_present_and_absent_values() {
        let (p, y) = (VarKey::named("p"), VarKey::named("y"));
        let mut model = Model::new();
        model.declare(Variable::binary(p.clone())).unwrap();
        model.declare(Variable::continuous(y.clone())).unwrap();
        for c in ghost_link(&p, &y.clone().into(), 200.0, 100.0, M) {
            model.constrain(c);
        }
        let ok = |pv: f64, yv: f64| {
            model
                .violations(&Assignment::new().with(p.clone(), pv).with(y.clone(), yv))
                .is_empty()
        };
        assert!(ok(0.0, 200.0));
        assert!(!ok(0.0, 100.0));
        assert!(ok(1.0, -100.0));
        assert!(!ok(1.0, 200.0));
    }

    #[test]
    fn deviation_is_tight_at_its_definition() {
        let (d, c) = (VarKey::named("d"), VarKey::named("c"));
        let model = model_of(absolute_deviation(d.clone(), &c.clone().into(), 50.0));
        let full = model
            .complete(&Assignment::new().with(c.clone(), 42.0))
            .unwrap();
        assert_eq!(full.get(&d), Some(8.0));
        assert!(model.violations(&full).is_empty());
        assert!(!model.violations(&full.with(d, 7.0)).is_empty());
    }
}
