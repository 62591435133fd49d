//! External MILP solver driven through the command line.
//!
//! The model is written to `<work_dir>/logfix-<uuid>.lp` and the configured
//! command is run with `{model}` and `{solution}` substituted in its
//! arguments. Works with any solver that reads CPLEX LP and writes a
//! textual solution listing `name value` pairs (CBC, HiGHS, GLPK, SCIP).

use super::lp_format::write_lp;
use super::{MilpSolver, Solution, SolveError, SolveStatus};
use crate::linear::Assignment;
use crate::model::Model;
use crate::problem::Problem;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// `[solver.command]` section of `logfix.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub work_dir: Option<PathBuf>,
    pub keep_files: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: "cbc".to_string(),
            args: vec![
                "{model}".to_string(),
                "solve".to_string(),
                "solu".to_string(),
                "{solution}".to_string(),
            ],
            timeout_secs: Some(300),
            work_dir: None,
            keep_files: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandSolver {
    config: CommandConfig,
}

impl CommandSolver {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    fn work_dir(&self) -> PathBuf {
        self.config
            .work_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    fn run(&self, model_path: &Path, solution_path: &Path, log_path: &Path) -> Result<(), SolveError> {
        let args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|a| {
                a.replace("{model}", &model_path.display().to_string())
                    .replace("{solution}", &solution_path.display().to_string())
            })
            .collect();
        let log_file = fs::File::create(log_path).map_err(|source| io(log_path, source))?;
        let err_file = log_file.try_clone().map_err(|source| io(log_path, source))?;

        debug!(program = %self.config.program, ?args, "spawning solver");
        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(err_file))
            .spawn()
            .map_err(|e| SolveError::Backend(format!("cannot start '{}': {}", self.config.program, e)))?;

        let timeout = self.config.timeout_secs.map(Duration::from_secs);
        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => return Err(SolveError::Backend(e.to_string())),
            }
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!(?limit, "solver killed after timeout");
                    return Err(SolveError::Timeout(limit));
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            let log = fs::read_to_string(log_path).unwrap_or_default();
            if let Some(err) = status_error(&log) {
                return Err(err);
            }
            return Err(SolveError::Backend(format!(
                "'{}' exited with {}: {}",
                self.config.program,
                status,
                tail(&log, 5)
            )));
        }
        Ok(())
    }
}

impl MilpSolver for CommandSolver {
    fn name(&self) -> &str {
        &self.config.program
    }

    fn solve(&self, problem: &Problem) -> Result<Solution, SolveError> {
        let dir = self.work_dir();
        fs::create_dir_all(&dir).map_err(|source| io(&dir, source))?;
        let stem = format!("logfix-{}", Uuid::new_v4());
        let model_path = dir.join(format!("{}.lp", stem));
        let solution_path = dir.join(format!("{}.sol", stem));
        let log_path = dir.join(format!("{}.log", stem));

        fs::write(&model_path, write_lp(&problem.model)).map_err(|source| io(&model_path, source))?;
        info!(path = %model_path.display(), "wrote LP model");

        let result = self.run(&model_path, &solution_path, &log_path).and_then(|()| {
            match fs::read_to_string(&solution_path) {
                Ok(text) => parse_solution(&text, &problem.model),
                Err(source) => {
                    let log = fs::read_to_string(&log_path).unwrap_or_default();
                    Err(status_error(&log).unwrap_or_else(|| io(&solution_path, source)))
                }
            }
        });

        if !self.config.keep_files {
            for p in [&model_path, &solution_path, &log_path] {
                let _ = fs::remove_file(p);
            }
        }
        result
    }
}

/// Read a solver's solution listing.
///
/// Scans every line for a known variable name followed by a number; the
/// first occurrence wins, so dual sections printed after the primal one
/// are ignored. Variables the file omits are zero, which is how CBC
/// reports them.
pub fn parse_solution(text: &str, model: &Model) -> Result<Solution, SolveError> {
    if let Some(err) = status_error(text) {
        return Err(err);
    }

    let mut values = Assignment::new();
    let mut objective = None;
    for line in text.lines() {
        let lower = line.to_ascii_lowercase();
        if objective.is_none() && lower.contains("objective") {
            objective = line
                .split(|c: char| c.is_whitespace() || c == ':' || c == '=')
                .filter_map(|t| t.parse::<f64>().ok())
                .last();
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        for (i, tok) in tokens.iter().enumerate() {
            let Some(key) = model.lookup(tok) else {
                continue;
            };
            if values.contains(key) {
                break;
            }
            if let Some(v) = tokens.get(i + 1).and_then(|t| t.parse::<f64>().ok()) {
                values.insert(key.clone(), v);
            }
            break;
        }
    }
    if values.is_empty() {
        return Err(SolveError::Backend(
            "solution file lists no model variables".to_string(),
        ));
    }
    for v in model.variables() {
        if !values.contains(&v.key) {
            values.insert(v.key.clone(), 0.0);
        }
    }

    let proven = text.to_ascii_lowercase().contains("optimal");
    Ok(Solution {
        status: if proven {
            SolveStatus::Optimal
        } else {
            SolveStatus::Feasible
        },
        objective,
        values,
    })
}

fn status_error(text: &str) -> Option<SolveError> {
    let lower = text.to_ascii_lowercase();
    if lower.contains("infeasible") {
        Some(SolveError::Infeasible)
    } else if lower.contains("unbounded") {
        Some(SolveError::Unbounded)
    } else {
        None
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join(" | ")
}

fn io(path: &Path, source: std::io::Error) -> SolveError {
    SolveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::{VarKey, Variable};

    fn model() -> Model {
        let mut m = Model::new();
        for name in ["x_q0_t0", "in_q0_t0_A", "const_where_q0_A_0"] {
            m.declare(Variable::continuous(VarKey::named(name))).unwrap();
        }
        m
    }

    #[test]
    fn reads_cbc_listing() {
        let text = "Optimal - objective value 801.00000000\n\
                    \x20     1 in_q0_t0_A              9500                       0\n\
                    \x20     2 const_where_q0_A_0      86501                      0\n";
        let sol = parse_solution(text, &model()).unwrap();
        assert_eq!(sol.status, SolveStatus::Optimal);
        assert_eq!(sol.objective, Some(801.0));
        assert_eq!(sol.values.get(&VarKey::named("const_where_q0_A_0")), Some(86501.0));
        assert_eq!(sol.values.get(&VarKey::named("x_q0_t0")), Some(0.0));
    }

    #[test]
    fn reads_highs_listing_and_skips_duals() {
        let text = "Model status\nOptimal\n\n# Primal solution values\nFeasible\n\
                    Objective 12\n# Columns 2\nx_q0_t0 1\nin_q0_t0_A 9500\n\
                    # Dual solution values\n# Columns 2\nx_q0_t0 0.5\nin_q0_t0_A 0\n";
        let sol = parse_solution(text, &model()).unwrap();
        assert_eq!(sol.values.get(&VarKey::named("x_q0_t0")), Some(1.0));
        assert_eq!(sol.values.get(&VarKey::named("in_q0_t0_A")), Some(9500.0));
        assert_eq!(sol.objective, Some(12.0));
    }

    #[test]
    fn infeasible_is_terminal() {
        let err = parse_solution("Infeasible - objective value 0\n", &model()).unwrap_err();
        assert!(matches!(err, SolveError::Infeasible));
    }

    #[test]
    fn empty_listing_is_an_error() {
        assert!(matches!(
            parse_solution("nothing here\n", &model()),
            Err(SolveError::Backend(_))
        ));
    }
}
