//! Configuration file parsing for `logfix.toml`.
//!
//! Searches the current directory then its ancestors. Without a file every
//! section takes its defaults.

use logfix_milp::{DiagnoseOptions, EncodingConfig, ObjectiveConfig, SolverConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const FILE_NAME: &str = "logfix.toml";

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid toml in '{path}': {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogfixConfig {
    pub encoding: EncodingConfig,
    pub objective: ObjectiveConfig,
    pub solver: SolverConfig,
}

impl LogfixConfig {
    /// Load `path` if given, otherwise the nearest `logfix.toml` above the
    /// current directory. Returns the defaults when there is none.
    pub fn load(path: Option<&Path>) -> Result<(Option<PathBuf>, Self), ConfigFileError> {
        let found = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::current_dir().ok().and_then(|dir| Self::find_from(&dir)),
        };
        match found {
            Some(p) => {
                let cfg = Self::load_from(&p)?;
                Ok((Some(p), cfg))
            }
            None => Ok((None, Self::default())),
        }
    }

    /// The first `logfix.toml` in `start` or one of its ancestors.
    pub fn find_from(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(FILE_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigFileError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn options(&self) -> DiagnoseOptions {
        DiagnoseOptions {
            encoding: self.encoding.clone(),
            objective: self.objective.clone(),
        }
    }

    /// Contents written by `logfix init`.
    pub fn default_template() -> &'static str {
        r#"# logfix configuration

[encoding]
# Domain bound = largest |value| in the input times this factor, times the
# scaling factors of the UPDATEs in the log.
safety_factor = 10.0
# domain = 1.0e6
# ghost = 2.0e6
# big_m = 6.0e6
# Gap that makes `<` and `>` strict. A value closer than this to a WHERE
# constant matches neither side of the comparison, so it must stay below
# the smallest such distance in the data.
epsilon = 0.001
integral_literals = true
# Tuples nobody complained about must end as in the final state.
anchor_unreported = true

[objective]
# feasibility | minimize-errors | minimize-deviation | combined
policy = "minimize-deviation"
error_weight = 1.0
deviation_weight = 1.0

[solver]
# search: built-in local search over the logged constants
# command: write an LP file and run an external MILP solver
backend = "search"

[solver.search]
max_changes = 1
max_evaluations = 20000

[solver.command]
program = "cbc"
args = ["{model}", "solve", "solu", "{solution}"]
timeout_secs = 300
# work_dir = "/tmp"
keep_files = false
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_from_walks_up_to_ancestors() {
        let root = std::env::temp_dir().join(format!("logfix-config-{}", std::process::id()));
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(FILE_NAME), "[objective]\npolicy = \"feasibility\"\n").unwrap();

        let found = LogfixConfig::find_from(&nested).unwrap();
        assert_eq!(found, root.join(FILE_NAME));
        let cfg = LogfixConfig::load_from(&found).unwrap();
        assert_eq!(cfg.objective.policy, logfix_milp::ObjectivePolicy::Feasibility);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = LogfixConfig::load_from(Path::new("/nonexistent/logfix.toml")).unwrap_err();
        assert!(matches!(err, ConfigFileError::Io { .. }));
    }
}
