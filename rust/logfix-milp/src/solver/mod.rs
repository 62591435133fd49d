//! MILP solver boundary.
//!
//! The encoder never solves anything itself. A [`MilpSolver`] receives the
//! assembled [`Problem`] and returns values for its variables. Three
//! backends ship with the crate:
//!
//! - [`CommandSolver`] writes the model in CPLEX LP format, runs an
//!   external solver binary and reads its solution file back.
//! - [`LocalSearchSolver`] tries small sets of literal corrections and
//!   checks each candidate against the model. It needs no external binary
//!   and finds the single-constant repairs most logs need.
//! - [`AssignmentSolver`] replays a stored assignment and checks it.

pub mod command;
pub mod lp_format;
pub mod search;

pub use command::{parse_solution, CommandConfig, CommandSolver};
pub use lp_format::{fingerprint, write_lp};
pub use search::{LocalSearchSolver, SearchConfig};

use crate::linear::Assignment;
use crate::model::ModelError;
use crate::problem::Problem;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("model is infeasible: no repair of the log's constants explains the complaints")]
    Infeasible,
    #[error("model is unbounded")]
    Unbounded,
    #[error("solver timed out after {0:?}")]
    Timeout(Duration),
    #[error("search gave up after {evaluated} candidates without a feasible repair")]
    Exhausted { evaluated: usize },
    #[error("supplied assignment violates the model: {0}")]
    Rejected(String),
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("solver backend failed: {0}")]
    Backend(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    /// Proven optimal by the backend.
    Optimal,
    /// Feasible, optimality not proven.
    Feasible,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub status: SolveStatus,
    pub objective: Option<f64>,
    pub values: Assignment,
}

/// A MILP backend.
pub trait MilpSolver {
    fn name(&self) -> &str;
    fn solve(&self, problem: &Problem) -> Result<Solution, SolveError>;
}

/// Which backend `logfix.toml` selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Search,
    Command,
}

/// `[solver]` section of `logfix.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub backend: Backend,
    pub search: SearchConfig,
    pub command: CommandConfig,
}

impl SolverConfig {
    pub fn build(&self) -> Box<dyn MilpSolver> {
        match self.backend {
            Backend::Search => Box::new(LocalSearchSolver::new(self.search.clone())),
            Backend::Command => Box::new(CommandSolver::new(self.command.clone())),
        }
    }
}

// ── AssignmentSolver ────────────────────────────────────────────────

/// Hands back a fixed assignment after checking it against the model.
///
/// Missing defined variables are derived first, so a file listing only
/// the literal constants is enough.
#[derive(Debug, Clone)]
pub struct AssignmentSolver {
    assignment: Assignment,
}

impl AssignmentSolver {
    pub fn new(assignment: Assignment) -> Self {
        Self { assignment }
    }
}

impl MilpSolver for AssignmentSolver {
    fn name(&self) -> &str {
        "assignment"
    }

    fn solve(&self, problem: &Problem) -> Result<Solution, SolveError> {
        let values = problem.witness(&self.assignment)?;
        let violations = problem.model.violations(&values);
        if let Some(first) = violations.first() {
            return Err(SolveError::Rejected(format!(
                "{} ({} violation(s) in total)",
                first,
                violations.len()
            )));
        }
        Ok(Solution {
            status: SolveStatus::Feasible,
            objective: problem.model.objective_value(&values),
            values,
        })
    }
}
