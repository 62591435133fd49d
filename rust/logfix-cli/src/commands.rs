//! Implementations of the `logfix` subcommands.
//!
//! Each command prints its result to stdout and returns a [`CliError`] on
//! failure; `main` turns that into a red `error:` line and an exit code.

use crate::config::{self, ConfigFileError, LogfixConfig};
use logfix_core::{parse_log, Database, LiteralSite, ReplayError, Row, Scenario, ScenarioError, Schema};
use logfix_milp::diagnose::report;
use logfix_milp::solver::{parse_solution, write_lp};
use logfix_milp::{diagnose, DiagnoseError, Diagnosis, Problem, SolveError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

// ANSI color helpers
pub fn green(s: &str) -> String {
    format!("\x1b[32m{}\x1b[0m", s)
}
pub fn red(s: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", s)
}
pub fn yellow(s: &str) -> String {
    format!("\x1b[33m{}\x1b[0m", s)
}
pub fn bold(s: &str) -> String {
    format!("\x1b[1m{}\x1b[0m", s)
}
pub fn gray(s: &str) -> String {
    format!("\x1b[90m{}\x1b[0m", s)
}
pub fn status_label(label: &str) -> String {
    format!("\x1b[1;32m{:>12}\x1b[0m", label)
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Config(#[from] ConfigFileError),
    #[error(transparent)]
    Diagnose(#[from] DiagnoseError),
    #[error("replay failed: {0}")]
    Replay(#[from] ReplayError),
    #[error("cannot serialize output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} already exists, not overwriting")]
    Exists(PathBuf),
    #[error("{count} row(s) differ from the final state")]
    StateMismatch { count: usize },
    #[error("solution violates {count} constraint(s)")]
    Violations { count: usize },
}

impl CliError {
    /// 2 when the model has no solution, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Diagnose(DiagnoseError::Solve(
                SolveError::Infeasible | SolveError::Unbounded | SolveError::Exhausted { .. },
            )) => 2,
            _ => 1,
        }
    }
}

fn read_to_string(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, contents: &str) -> Result<(), CliError> {
    std::fs::write(path, contents).map_err(|source| CliError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Log lines from a scenario file (`.json`) or a plain text file with one
/// statement per line. Blank lines and `--` comments are skipped.
pub fn read_log(path: &Path) -> Result<Vec<String>, CliError> {
    if path.extension().is_some_and(|e| e == "json") {
        return Ok(Scenario::load(path)?.log);
    }
    Ok(log_lines(&read_to_string(path)?))
}

pub fn log_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("--"))
        .map(str::to_string)
        .collect()
}

pub fn describe_site(site: &LiteralSite) -> String {
    match site {
        LiteralSite::Set { column } => format!("SET {}", column),
        LiteralSite::Where { index } => format!("WHERE #{}", index),
        LiteralSite::Insert { index } => format!("VALUES #{}", index),
    }
}

fn format_row(schema: &Schema, row: &Row) -> String {
    schema
        .attributes
        .iter()
        .map(|a| match row.get(a) {
            Some(v) => format!("{}={}", a, logfix_milp::repair::format_value(*v)),
            None => format!("{}=?", a),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── parse ───────────────────────────────────────────────────────────

pub fn cmd_parse(file: &Path, json: bool) -> Result<(), CliError> {
    let lines = read_log(file)?;
    let statements = parse_log(&lines);
    if json {
        println!("{}", serde_json::to_string_pretty(&statements)?);
        return Ok(());
    }
    for (i, stmt) in statements.iter().enumerate() {
        if stmt.is_unknown() {
            println!("{:>4} {} {}", i, yellow("UNKNOWN"), gray(&lines[i]));
            continue;
        }
        println!("{:>4} {:<7} {}", i, bold(stmt.kind()), stmt);
        for (site, lit) in stmt.literals() {
            println!("       {} {}", gray(&describe_site(&site)), lit.text);
        }
    }
    Ok(())
}

// ── replay ──────────────────────────────────────────────────────────

/// Replay a scenario's log (or `log`, if given) from its initial state.
/// With `check`, every final-state row must be reproduced.
pub fn cmd_replay(scenario: &Path, log: Option<&Path>, check: bool, json: bool) -> Result<(), CliError> {
    let scenario = Scenario::load(scenario)?;
    let schema = scenario.validate()?;
    let lines = match log {
        Some(p) => read_log(p)?,
        None => scenario.log.clone(),
    };
    let db = Database::replay(&schema, &scenario.initial, &parse_log(&lines))?;

    if json {
        println!("{}", serde_json::to_string_pretty(db.rows())?);
    } else {
        for row in db.rows() {
            println!("{}", format_row(&schema, row));
        }
    }

    if !check {
        return Ok(());
    }
    let mut count = 0;
    for expected in &scenario.final_state {
        let Some(key) = schema.key_of(expected) else {
            continue;
        };
        if db.find(key) != Some(expected) {
            count += 1;
            eprintln!("{} expected {}", red("mismatch:"), format_row(&schema, expected));
        }
    }
    if db.rows().len() != scenario.final_state.len() {
        count = count.max(1);
        eprintln!(
            "{} {} row(s) after replay, {} in the final state",
            red("mismatch:"),
            db.rows().len(),
            scenario.final_state.len()
        );
    }
    if count > 0 {
        return Err(CliError::StateMismatch { count });
    }
    println!("{} final state reproduced", green("✓"));
    Ok(())
}

// ── export ──────────────────────────────────────────────────────────

pub fn cmd_export(scenario: &Path, cfg: &LogfixConfig, output: Option<&Path>) -> Result<(), CliError> {
    let scenario = Scenario::load(scenario)?;
    let problem = Problem::build(&scenario, &cfg.encoding, &cfg.objective)?;
    let lp = write_lp(&problem.model);
    info!(fingerprint = %logfix_milp::solver::fingerprint(&problem.model), "model exported");
    match output {
        Some(path) => {
            write(path, &lp)?;
            println!("{} LP model to {}", status_label("Wrote"), path.display());
        }
        None => print!("{}", lp),
    }
    Ok(())
}

// ── diagnose ────────────────────────────────────────────────────────

pub fn cmd_diagnose(
    scenario: &Path,
    cfg: &LogfixConfig,
    json: bool,
    output: Option<&Path>,
) -> Result<Diagnosis, CliError> {
    let scenario = Scenario::load(scenario)?;
    let solver = cfg.solver.build();
    eprintln!("{} with {}", status_label("Diagnosing"), solver.name());
    let diagnosis = diagnose(&scenario, &cfg.options(), solver.as_ref())?;

    if let Some(path) = output {
        write(path, &serde_json::to_string_pretty(&diagnosis)?)?;
        eprintln!("{} report to {}", status_label("Wrote"), path.display());
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&diagnosis)?);
    } else {
        print_diagnosis(&diagnosis);
    }
    Ok(diagnosis)
}

pub fn print_diagnosis(d: &Diagnosis) {
    for stmt in &d.repaired.statements {
        if stmt.is_changed() {
            println!("{} {}", red("-"), stmt.original);
            println!("{} {}", green("+"), stmt.repaired);
            for c in &stmt.changes {
                println!("    {} {} -> {}", gray(&describe_site(&c.site)), c.before, c.after);
            }
        } else {
            println!("  {}", stmt.repaired);
        }
    }
    for w in &d.warnings {
        eprintln!("{} {}", yellow("warning:"), w);
    }
    let objective = d
        .objective
        .map(logfix_milp::repair::format_value)
        .unwrap_or_else(|| "-".to_string());
    let verdict = if d.resolved() {
        green("all complaints resolved")
    } else {
        red("some complaints remain")
    };
    eprintln!(
        "{} {:?}, objective {}, {} statement(s) changed, {}",
        gray("result:"),
        d.status,
        objective,
        d.repaired.changed().count(),
        verdict
    );
}

// ── check ───────────────────────────────────────────────────────────

/// Check a solver's solution file against the model built for `scenario`.
pub fn cmd_check(scenario: &Path, solution: &Path, cfg: &LogfixConfig) -> Result<(), CliError> {
    let scenario = Scenario::load(scenario)?;
    let problem = Problem::build(&scenario, &cfg.encoding, &cfg.objective)?;
    let text = read_to_string(solution)?;
    let parsed = parse_solution(&text, &problem.model).map_err(DiagnoseError::from)?;
    let values = problem
        .witness(&parsed.values)
        .map_err(DiagnoseError::from)?;

    let violations = problem.model.violations(&values);
    if !violations.is_empty() {
        for v in &violations {
            eprintln!("{} {}", red("violated:"), v);
        }
        return Err(CliError::Violations {
            count: violations.len(),
        });
    }
    println!("{} solution satisfies all {} constraints", green("✓"), problem.model.constraints().len());
    let objective = problem.model.objective_value(&values);
    let d = report(&scenario, &problem, "file", parsed.status, objective, &values);
    print_diagnosis(&d);
    Ok(())
}

// ── init ────────────────────────────────────────────────────────────

pub fn cmd_init(dir: &Path) -> Result<PathBuf, CliError> {
    let path = dir.join(config::FILE_NAME);
    if path.exists() {
        return Err(CliError::Exists(path));
    }
    write(&path, LogfixConfig::default_template())?;
    println!("{} {}", status_label("Created"), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_lines_skip_blanks_and_comments() {
        let text = "-- header\nUPDATE T SET A=1\n\n  DELETE FROM T  \n";
        assert_eq!(log_lines(text), vec!["UPDATE T SET A=1", "DELETE FROM T"]);
    }

    #[test]
    fn unsolvable_models_exit_with_two() {
        let err = CliError::Diagnose(DiagnoseError::Solve(SolveError::Infeasible));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(CliError::Violations { count: 3 }.exit_code(), 1);
    }

    #[test]
    fn sites_read_like_clauses() {
        assert_eq!(describe_site(&LiteralSite::Set { column: "B".into() }), "SET B");
        assert_eq!(describe_site(&LiteralSite::Where { index: 0 }), "WHERE #0");
    }
}
