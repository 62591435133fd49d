use logfix_cli::commands::{cmd_diagnose, cmd_init, read_log, CliError};
use logfix_cli::config::{LogfixConfig, FILE_NAME};
use logfix_milp::solver::Backend;
use logfix_milp::ObjectivePolicy;
use std::path::PathBuf;

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("logfix-cli-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn taxes() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/taxes.json")
}

#[test]
fn parse_full_config() {
    let cfg: LogfixConfig = toml::from_str(
        r#"
[encoding]
safety_factor = 4.0
big_m = 1.0e7
epsilon = 0.5
integral_literals = false

[objective]
policy = "combined"
error_weight = 100.0

[solver]
backend = "command"

[solver.command]
program = "highs"
args = ["--model_file", "{model}", "--solution_file", "{solution}"]
timeout_secs = 60
"#,
    )
    .expect("should parse");
    assert_eq!(cfg.encoding.safety_factor, 4.0);
    assert_eq!(cfg.encoding.big_m, Some(1.0e7));
    assert!(!cfg.encoding.integral_literals);
    assert!(cfg.encoding.anchor_unreported);
    assert_eq!(cfg.objective.policy, ObjectivePolicy::Combined);
    assert_eq!(cfg.objective.error_weight, 100.0);
    assert_eq!(cfg.objective.deviation_weight, 1.0);
    assert_eq!(cfg.solver.backend, Backend::Command);
    assert_eq!(cfg.solver.command.program, "highs");
    assert_eq!(cfg.solver.command.timeout_secs, Some(60));
    assert!(!cfg.solver.command.keep_files);
}

#[test]
fn empty_string_returns_default() {
    let cfg: LogfixConfig = toml::from_str("").expect("empty toml is valid");
    assert_eq!(cfg, LogfixConfig::default());
    assert_eq!(cfg.solver.backend, Backend::Search);
    assert_eq!(cfg.objective.policy, ObjectivePolicy::MinimizeDeviation);
}

#[test]
fn unknown_keys_are_rejected() {
    assert!(toml::from_str::<LogfixConfig>("[encoding]\nbigm = 5.0\n").is_err());
    assert!(toml::from_str::<LogfixConfig>("[objective]\npolicy = \"cheapest\"\n").is_err());
}

#[test]
fn invalid_toml_returns_error() {
    assert!(toml::from_str::<LogfixConfig>("[broken").is_err());
}

#[test]
fn default_template_matches_defaults() {
    let cfg: LogfixConfig = toml::from_str(LogfixConfig::default_template()).expect("template must parse");
    assert_eq!(cfg, LogfixConfig::default());
}

#[test]
fn init_refuses_to_overwrite() {
    let dir = scratch("init");
    let _ = std::fs::remove_file(dir.join(FILE_NAME));
    let path = cmd_init(&dir).unwrap();
    assert!(LogfixConfig::load_from(&path).is_ok());
    assert!(matches!(cmd_init(&dir), Err(CliError::Exists(_))));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn explicit_config_path_is_loaded() {
    let dir = scratch("explicit");
    let path = dir.join("custom.toml");
    std::fs::write(&path, "[solver.search]\nmax_changes = 2\n").unwrap();
    let (found, cfg) = LogfixConfig::load(Some(&path)).unwrap();
    assert_eq!(found.as_deref(), Some(path.as_path()));
    assert_eq!(cfg.solver.search.max_changes, 2);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn logs_are_read_from_scenarios_and_text() {
    assert_eq!(read_log(&taxes()).unwrap().len(), 4);
    let dir = scratch("log");
    let path = dir.join("log.sql");
    std::fs::write(&path, "-- two statements\nUPDATE T SET A=1\nDELETE FROM T\n").unwrap();
    assert_eq!(read_log(&path).unwrap().len(), 2);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn diagnose_command_repairs_taxes() {
    let d = cmd_diagnose(&taxes(), &LogfixConfig::default(), true, None).unwrap();
    assert_eq!(d.repaired.lines()[0], "UPDATE Taxes SET B=A+1000 WHERE A>=86501");
    assert!(d.resolved());
}
