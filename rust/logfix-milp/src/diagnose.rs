//! End-to-end diagnosis: scenario in, repaired log and report out.

use crate::config::{ConfigError, EncodingConfig};
use crate::linear::Assignment;
use crate::model::ModelError;
use crate::objective::ObjectiveConfig;
use crate::problem::Problem;
use crate::repair::{extract_repair, RepairedLog};
use crate::solver::{MilpSolver, SolveError, SolveStatus};
use logfix_core::{parse_log, Database, Scenario, ScenarioError, Statement};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Failures that stop a diagnosis. Each stage keeps its own variant so
/// callers can tell bad input from a bad encoding from an unsolvable model.
#[derive(Debug, Error)]
pub enum DiagnoseError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot encode log: {0}")]
    Model(#[from] ModelError),
    #[error(transparent)]
    Solve(#[from] SolveError),
    #[error("the query log is empty")]
    EmptyLog,
}

/// Non-fatal findings, reported alongside the repair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Warning {
    UnparsedStatement { index: usize, text: String },
    NonNumericLiteral { index: usize, text: String },
    UnmatchedComplaint { index: usize, key: f64 },
    OrphanFinalRow { key: f64 },
    UnresolvedComplaint { index: usize, key: f64 },
    ReplayFailed { message: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnparsedStatement { index, text } => {
                write!(f, "statement #{} not understood, left as is: {}", index, text)
            }
            Warning::NonNumericLiteral { index, text } => {
                write!(f, "statement #{} has non-numeric constant '{}', left as is", index, text)
            }
            Warning::UnmatchedComplaint { index, key } => {
                write!(f, "complaint #{} names key {} which no tuple carries", index, key)
            }
            Warning::OrphanFinalRow { key } => {
                write!(f, "final-state row {} is not produced by the log", key)
            }
            Warning::UnresolvedComplaint { index, key } => {
                write!(f, "complaint #{} (key {}) still fails after replaying the repair", index, key)
            }
            Warning::ReplayFailed { message } => write!(f, "could not replay the repaired log: {}", message),
        }
    }
}

/// Encoding and objective settings for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnoseOptions {
    pub encoding: EncodingConfig,
    pub objective: ObjectiveConfig,
}

/// A `(statement, tuple)` pair whose error indicator is set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorFlag {
    pub stmt: usize,
    pub tuple: usize,
    pub key: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComplaintCheck {
    pub complaint: usize,
    pub key: f64,
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    pub solver: String,
    pub status: SolveStatus,
    pub objective: Option<f64>,
    pub repaired: RepairedLog,
    pub errors: Vec<ErrorFlag>,
    pub complaints: Vec<ComplaintCheck>,
    pub warnings: Vec<Warning>,
    /// SHA-256 of the LP form of the model that was solved.
    pub fingerprint: String,
}

impl Diagnosis {
    pub fn resolved(&self) -> bool {
        self.complaints.iter().all(|c| c.resolved)
    }
}

pub fn diagnose(
    scenario: &Scenario,
    options: &DiagnoseOptions,
    solver: &dyn MilpSolver,
) -> Result<Diagnosis, DiagnoseError> {
    let problem = Problem::build(scenario, &options.encoding, &options.objective)?;
    info!(solver = solver.name(), "solving");
    let solution = solver.solve(&problem)?;
    Ok(report(scenario, &problem, solver.name(), solution.status, solution.objective, &solution.values))
}

/// Assemble the report for an assignment of `problem`.
pub fn report(
    scenario: &Scenario,
    problem: &Problem,
    solver: &str,
    status: SolveStatus,
    objective: Option<f64>,
    values: &Assignment,
) -> Diagnosis {
    let sets = &problem.sets;
    let repaired = extract_repair(&scenario.log, sets, values);
    for stmt in repaired.changed() {
        info!(stmt = stmt.index, before = %stmt.original, after = %stmt.repaired, "repaired statement");
    }

    let mut errors = Vec::new();
    for i in 0..sets.statements {
        for j in 0..sets.tuples {
            if values.is_set(&sets.error(i, j)) {
                errors.push(ErrorFlag {
                    stmt: i,
                    tuple: j,
                    key: problem.relation.tuple(j).and_then(|t| t.key),
                });
            }
        }
    }

    let mut warnings = problem.warnings.clone();
    let complaints = verify(scenario, problem, &repaired, &mut warnings);

    Diagnosis {
        solver: solver.to_string(),
        status,
        objective,
        repaired,
        errors,
        complaints,
        warnings,
        fingerprint: crate::solver::fingerprint(&problem.model),
    }
}

/// Replay the repaired log from the initial state and check every matched
/// complaint against the result.
fn verify(
    scenario: &Scenario,
    problem: &Problem,
    repaired: &RepairedLog,
    warnings: &mut Vec<Warning>,
) -> Vec<ComplaintCheck> {
    let schema = problem.relation.schema();
    // Statements the model carried through as no-ops replay as no-ops too.
    let log: Vec<Statement> = parse_log(&repaired.lines())
        .into_iter()
        .zip(&problem.log)
        .map(|(stmt, modelled)| if modelled.is_unknown() { modelled.clone() } else { stmt })
        .collect();
    let db = match Database::replay(schema, &scenario.initial, &log) {
        Ok(db) => db,
        Err(e) => {
            warn!(error = %e, "repaired log does not replay");
            warnings.push(Warning::ReplayFailed {
                message: e.to_string(),
            });
            return Vec::new();
        }
    };

    problem
        .targets
        .complaint_tuples()
        .map(|(_, target)| {
            let complaint = &scenario.complaints[target.complaint];
            let row = db.find(target.key);
            let resolved = match (&complaint.correct, row) {
                (None, found) => found.is_none(),
                (Some(_), None) => false,
                (Some(correct), Some(row)) => correct
                    .iter()
                    .all(|(a, v)| row.get(a).is_some_and(|x| (x - v).abs() <= 1e-6 * v.abs().max(1.0))),
            };
            if !resolved {
                warn!(complaint = target.complaint, key = target.key, "complaint unresolved by repair");
                warnings.push(Warning::UnresolvedComplaint {
                    index: target.complaint,
                    key: target.key,
                });
            }
            ComplaintCheck {
                complaint: target.complaint,
                key: target.key,
                resolved,
            }
        })
        .collect()
}
