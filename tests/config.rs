use std::fs;
use std::time::Duration;

use benchrun::config::{parse_duration, Config};
use benchrun::scoring::BenchmarkKind;

#[test]
fn config_defaults_when_missing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = Config::load_from_dir(dir.path())?;

    assert_eq!(config.run.name, "baseline");
    assert_eq!(config.run.jobs, 1);
    assert_eq!(config.run.producer_label(), "claude-code-baseline");
    assert_eq!(config.agent.timeout()?, Duration::from_secs(30 * 60));
    assert!(config.agent.program.is_empty());
    assert!(config.harvest.runs.is_empty());
    Ok(())
}

#[test]
fn config_overrides_from_toml() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let toml = r#"
benchmark = "swe_qa"
runs_dir = "out"

[run]
name = "tuned"
producer_prefix = ""
jobs = 4

[agent]
program = "agent-wrapper"
args = ["--model", "opus"]
timeout = "2h"

[harvest]
archive_dir = "/srv/sessions"
runs = ["tuned"]
"#;
    fs::write(dir.path().join("benchrun.toml"), toml)?;

    let config = Config::load_from_dir(dir.path())?;
    assert_eq!(config.benchmark, BenchmarkKind::SweQa);
    assert_eq!(config.runs_dir, std::path::PathBuf::from("out"));
    assert_eq!(config.run.jobs, 4);
    assert_eq!(config.run.producer_label(), "tuned");
    assert_eq!(config.agent.args, vec!["--model", "opus"]);
    assert_eq!(config.agent.timeout()?, Duration::from_secs(7200));
    assert_eq!(config.harvest.archive_dir()?, std::path::PathBuf::from("/srv/sessions"));
    Ok(())
}

#[test]
fn invalid_file_is_an_error_not_a_fallback() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("benchrun.toml"), "[run]\njobs = 0\n")?;
    assert!(Config::load_from_dir(dir.path()).is_err());

    fs::write(dir.path().join("benchrun.toml"), "[run]\nname = \"unmapped\"\n")?;
    assert!(Config::load_from_dir(dir.path()).is_err());

    fs::write(dir.path().join("benchrun.toml"), "run = [\n")?;
    assert!(Config::load_from_dir(dir.path()).is_err());
    Ok(())
}

#[test]
fn save_then_load_keeps_values() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("benchrun.toml");
    let mut config = Config::default();
    config.run.name = "nightly".to_string();
    config.agent.program = "agent".to_string();
    config.save(&path)?;

    let loaded = Config::load(&path)?;
    assert_eq!(loaded.run.name, "nightly");
    assert_eq!(loaded.agent.program, "agent");
    Ok(())
}

#[test]
fn durations_parse_with_units() {
    assert_eq!(parse_duration("90s").ok(), Some(Duration::from_secs(90)));
    assert_eq!(parse_duration("15").ok(), Some(Duration::from_secs(15 * 60)));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("soon").is_err());
}

#[test]
fn oversized_durations_are_rejected() {
    let max = u64::MAX.to_string();
    assert_eq!(parse_duration(&format!("{max}s")).ok(), Some(Duration::from_secs(u64::MAX)));
    assert!(parse_duration(&format!("{max}m")).is_err());
    assert!(parse_duration("999999999999999999h").is_err());
    assert!(parse_duration("300000000000000d").is_err());
}
