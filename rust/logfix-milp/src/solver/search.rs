//! Local search over literal corrections.
//!
//! A restricted backend for when no MILP binary is installed. It never
//! branches on the model itself. Instead it proposes new values for a few
//! correctable literals at a time, derives the rest of the assignment
//! with [`Problem::witness`] and keeps the best candidate that satisfies
//! every constraint.
//!
//! Candidate values come from the data:
//! - WHERE constants move to just below, at, or just above a value the
//!   compared attribute takes on a live tuple.
//! - SET constants take the value that makes a tuple's SET result match
//!   its anchored final value.
//! - INSERT constants take the anchored final value of the inserted tuple.
//!
//! Sizes are tried in increasing order and the search stops at the first
//! size that yields a feasible repair.

use super::{MilpSolver, Solution, SolveError, SolveStatus};
use crate::linear::{Assignment, Definition, SlotKey, VarKey};
use crate::problem::Problem;
use crate::targets::Anchor;
use crate::variables::LiteralVar;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// `[solver.search]` section of `logfix.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Most literals changed at once.
    pub max_changes: usize,
    /// Candidate assignments checked before giving up.
    pub max_evaluations: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_changes: 1,
            max_evaluations: 20_000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalSearchSolver {
    config: SearchConfig,
}

impl LocalSearchSolver {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }
}

struct Best {
    objective: f64,
    values: Assignment,
}

impl MilpSolver for LocalSearchSolver {
    fn name(&self) -> &str {
        "local-search"
    }

    fn solve(&self, problem: &Problem) -> Result<Solution, SolveError> {
        let baseline = problem.witness(&Assignment::new())?;
        if problem.model.is_feasible(&baseline) {
            info!("logged constants already satisfy the model");
            return Ok(Solution {
                status: SolveStatus::Feasible,
                objective: problem.model.objective_value(&baseline),
                values: baseline,
            });
        }

        let pool: Vec<(&LiteralVar, Vec<f64>)> = problem
            .sets
            .correctable()
            .map(|lit| (lit, candidates(problem, lit, &baseline)))
            .filter(|(_, values)| !values.is_empty())
            .collect();
        debug!(literals = pool.len(), "candidate pool built");

        let mut evaluated = 0usize;
        for size in 1..=self.config.max_changes.min(pool.len()) {
            let mut best: Option<Best> = None;
            for combo in combinations(pool.len(), size) {
                let lists: Vec<&[f64]> = combo.iter().map(|&i| pool[i].1.as_slice()).collect();
                let mut odometer = vec![0usize; size];
                loop {
                    if evaluated >= self.config.max_evaluations {
                        return finish(best, evaluated);
                    }
                    evaluated += 1;
                    let overrides: Assignment = combo
                        .iter()
                        .zip(&odometer)
                        .zip(&lists)
                        .map(|((&i, &c), list)| (pool[i].0.key.clone(), list[c]))
                        .collect();
                    let values = problem.witness(&overrides)?;
                    if problem.model.is_feasible(&values) {
                        let objective = problem.model.objective_value(&values).unwrap_or(0.0);
                        if best.as_ref().map_or(true, |b| objective < b.objective - 1e-9) {
                            best = Some(Best { objective, values });
                        }
                    }
                    if !advance(&mut odometer, &lists) {
                        break;
                    }
                }
            }
            if best.is_some() {
                return finish(best, evaluated);
            }
        }
        Err(SolveError::Exhausted { evaluated })
    }
}

fn finish(best: Option<Best>, evaluated: usize) -> Result<Solution, SolveError> {
    match best {
        Some(b) => {
            info!(evaluated, objective = b.objective, "local search found a repair");
            Ok(Solution {
                status: SolveStatus::Feasible,
                objective: Some(b.objective),
                values: b.values,
            })
        }
        None => Err(SolveError::Exhausted { evaluated }),
    }
}

/// Step a mixed-radix counter; false once it wraps.
fn advance(odometer: &mut [usize], lists: &[&[f64]]) -> bool {
    for (digit, list) in odometer.iter_mut().zip(lists).rev() {
        *digit += 1;
        if *digit < list.len() {
            return true;
        }
        *digit = 0;
    }
    false
}

/// All `k`-subsets of `0..n`, lexicographic.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if k == 0 || k > n {
        return out;
    }
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        out.push(idx.clone());
        let mut i = k;
        while i > 0 && idx[i - 1] == n - k + i - 1 {
            i -= 1;
        }
        if i == 0 {
            return out;
        }
        idx[i - 1] += 1;
        for j in i..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

/// Values worth trying for `lit`, nearest to its logged value first.
fn candidates(problem: &Problem, lit: &LiteralVar, baseline: &Assignment) -> Vec<f64> {
    let sets = &problem.sets;
    let mut raw = Vec::new();
    match &lit.slot {
        SlotKey::Where {
            stmt, attribute, ..
        } => {
            let step = if lit.integral {
                1.0
            } else {
                problem.params.epsilon
            };
            for j in 0..sets.tuples {
                if !baseline.is_set(&sets.presence(*stmt, j)) {
                    continue;
                }
                if let Some(v) = baseline.get(&sets.input(*stmt, j, attribute)) {
                    raw.extend([v - step, v, v + step]);
                }
            }
        }
        SlotKey::Set { stmt, column } => {
            for (j, anchor) in problem.targets.anchors.iter().enumerate() {
                let Anchor::Present { values } = anchor else {
                    continue;
                };
                let Some(target) = values.get(column) else {
                    continue;
                };
                let applied = VarKey::Applied {
                    stmt: *stmt,
                    tuple: j,
                    attr: column.clone(),
                };
                let Some(Definition::Product { value, .. }) =
                    problem.model.get(&applied).and_then(|v| v.definition.as_ref())
                else {
                    continue;
                };
                let k = value.coefficient(&lit.key);
                if k == 0.0 {
                    continue;
                }
                if let Some(current) = value.eval(baseline) {
                    raw.push(lit.original + (target - current) / k);
                }
            }
        }
        SlotKey::Insert { stmt, column } => {
            if let Some(j) = problem.relation.inserted_by(*stmt) {
                if let Some(Anchor::Present { values }) = problem.targets.anchors.get(j) {
                    raw.extend(values.get(column).copied());
                }
            }
        }
    }

    let bound = problem.params.domain;
    let mut out: Vec<f64> = raw
        .into_iter()
        .filter(|v| v.is_finite() && v.abs() <= bound && *v != lit.original)
        .filter(|v| !lit.integral || v.fract() == 0.0)
        .collect();
    out.sort_by(|a, b| {
        (a - lit.original)
            .abs()
            .total_cmp(&(b - lit.original).abs())
            .then(a.total_cmp(b))
    });
    out.dedup();
    out
}
