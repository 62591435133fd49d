//! logfix CLI: diagnose and repair corrupted query logs.

use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use logfix_cli::commands::{self, red, CliError};
use logfix_cli::config::LogfixConfig;
use logfix_milp::solver::Backend;
use logfix_milp::ObjectivePolicy;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "logfix", version, about = "Diagnose and repair corrupted query logs")]
struct Cli {
    /// Path to logfix.toml (default: search the current directory and its ancestors)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Search,
    Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Feasibility,
    MinimizeErrors,
    MinimizeDeviation,
    Combined,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a query log and list its statements and constants
    Parse {
        /// Scenario JSON or a text file with one statement per line
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Replay a log from a scenario's initial state
    Replay {
        /// Scenario JSON
        scenario: PathBuf,
        /// Replay this log instead of the scenario's own
        #[arg(long)]
        log: Option<PathBuf>,
        /// Fail unless the result equals the scenario's final state
        #[arg(long)]
        check: bool,
        #[arg(long)]
        json: bool,
    },
    /// Write the MILP model of a scenario in LP format
    Export {
        scenario: PathBuf,
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Find the smallest correction of the log that satisfies the complaints
    Diagnose {
        scenario: PathBuf,
        /// Override `[solver] backend`
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
        /// Override `[objective] policy`
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
        /// Also write the JSON report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check an external solver's solution file against the model
    Check {
        scenario: PathBuf,
        solution: PathBuf,
    },
    /// Create a logfix.toml in the current directory
    Init,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("logfix_cli=info,logfix_milp=info,logfix_core=info")),
        1 => EnvFilter::new("logfix_cli=debug,logfix_milp=debug,logfix_core=debug"),
        _ => EnvFilter::new("logfix_cli=trace,logfix_milp=trace,logfix_core=trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<LogfixConfig, CliError> {
    let (found, cfg) = LogfixConfig::load(path)?;
    match found {
        Some(p) => debug!(path = %p.display(), "loaded config"),
        None => debug!("no logfix.toml found, using defaults"),
    }
    Ok(cfg)
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Parse { file, json } => commands::cmd_parse(&file, json),
        Commands::Replay {
            scenario,
            log,
            check,
            json,
        } => commands::cmd_replay(&scenario, log.as_deref(), check, json),
        Commands::Export { scenario, output } => {
            let cfg = load_config(cli.config.as_deref())?;
            commands::cmd_export(&scenario, &cfg, output.as_deref())
        }
        Commands::Diagnose {
            scenario,
            backend,
            policy,
            json,
            output,
        } => {
            let mut cfg = load_config(cli.config.as_deref())?;
            if let Some(b) = backend {
                cfg.solver.backend = match b {
                    BackendArg::Search => Backend::Search,
                    BackendArg::Command => Backend::Command,
                };
            }
            if let Some(p) = policy {
                cfg.objective.policy = match p {
                    PolicyArg::Feasibility => ObjectivePolicy::Feasibility,
                    PolicyArg::MinimizeErrors => ObjectivePolicy::MinimizeErrors,
                    PolicyArg::MinimizeDeviation => ObjectivePolicy::MinimizeDeviation,
                    PolicyArg::Combined => ObjectivePolicy::Combined,
                };
            }
            commands::cmd_diagnose(&scenario, &cfg, json, output.as_deref()).map(|_| ())
        }
        Commands::Check { scenario, solution } => {
            let cfg = load_config(cli.config.as_deref())?;
            commands::cmd_check(&scenario, &solution, &cfg)
        }
        Commands::Init => {
            let dir = std::env::current_dir().map_err(|source| CliError::Read {
                path: PathBuf::from("."),
                source,
            })?;
            commands::cmd_init(&dir).map(|_| ())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("{} {}", red("error:"), e);
        std::process::exit(e.exit_code());
    }
}
