//! logfix MILP engine
//!
//! Encodes a query log, its initial state and a set of complaints as a
//! mixed-integer linear program whose solutions are corrections of the
//! log's numeric constants, then maps a solution back to a repaired log.
//!
//! The pipeline, in order:
//!
//! 1. [`provenance`] lists every tuple that ever exists.
//! 2. [`targets`] anchors each tuple's end state.
//! 3. [`variables`] declares the decision variables.
//! 4. [`assembler`] emits per-statement constraints using [`gadgets`].
//! 5. [`objective`] installs the chosen objective.
//! 6. A [`solver::MilpSolver`] solves the [`problem::Problem`].
//! 7. [`repair`] splices solved constants back into the log text.

pub mod assembler;
pub mod config;
pub mod diagnose;
pub mod gadgets;
pub mod linear;
pub mod model;
pub mod objective;
pub mod problem;
pub mod provenance;
pub mod repair;
pub mod solver;
pub mod targets;
pub mod variables;

pub use config::{ConfigError, EncodingConfig, EncodingParams, Magnitudes};
pub use diagnose::{diagnose, DiagnoseError, DiagnoseOptions, Diagnosis, Warning};
pub use gadgets::Encoding;
pub use linear::{Assignment, Constraint, Definition, Domain, LinExpr, Role, Sense, SlotKey, VarKey, Variable};
pub use model::{Model, ModelError, Violation};
pub use objective::{ObjectiveConfig, ObjectivePolicy};
pub use problem::Problem;
pub use repair::{extract_repair, RepairedLog};
pub use solver::{
    AssignmentSolver, CommandSolver, LocalSearchSolver, MilpSolver, Solution, SolveError, SolveStatus,
    SolverConfig,
};
