//! logfix core data model
//!
//! Tables, query-log statements, complaints and scenario files shared by
//! the MILP engine and the command-line front end, plus the log parser and
//! a concrete replay engine used to check repairs.

pub mod complaint;
pub mod parser;
pub mod replay;
pub mod scenario;
pub mod statement;
pub mod table;

pub use complaint::Complaint;
pub use parser::{parse_log, parse_statement};
pub use replay::{Database, ReplayError};
pub use scenario::{Scenario, ScenarioError};
pub use statement::{
    ArithOp, Assignment, CmpOp, Condition, Expression, Literal, LiteralSite, Operand, Span,
    Statement,
};
pub use table::{is_identifier, key_bits, Row, Schema, SchemaError};
