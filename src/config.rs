//! Configuration loading and management
//!
//! Handles parsing of `benchrun.toml` configuration files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scoring::BenchmarkKind;

/// Default configuration file name
pub const CONFIG_FILE: &str = "benchrun.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Benchmark kind, selects scoring and the prediction excerpt
    #[serde(default)]
    pub benchmark: BenchmarkKind,

    /// Directory holding one subdirectory per run
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub harvest: HarvestConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            benchmark: BenchmarkKind::default(),
            runs_dir: default_runs_dir(),
            run: RunConfig::default(),
            agent: AgentConfig::default(),
            harvest: HarvestConfig::default(),
        }
    }
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from("runs")
}

/// Run-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run name; results land in `<runs_dir>/<name>/`
    #[serde(default = "default_run_name")]
    pub name: String,

    /// Prefix of the producer label written into predictions
    #[serde(default = "default_producer_prefix")]
    pub producer_prefix: String,

    /// Number of tasks executed concurrently
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Scratch directory for checkouts and prompts (default: a fresh temp dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,

    /// Base URL for `repository` contexts without an explicit url
    #[serde(default = "default_clone_base_url")]
    pub clone_base_url: String,
}

fn default_run_name() -> String {
    "baseline".to_string()
}

fn default_producer_prefix() -> String {
    "claude-code".to_string()
}

fn default_jobs() -> usize {
    1
}

fn default_clone_base_url() -> String {
    "https://github.com".to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: default_run_name(),
            producer_prefix: default_producer_prefix(),
            jobs: default_jobs(),
            workdir: None,
            clone_base_url: default_clone_base_url(),
        }
    }
}

impl RunConfig {
    /// Label identifying who produced the predictions
    pub fn producer_label(&self) -> String {
        if self.producer_prefix.trim().is_empty() {
            self.name.clone()
        } else {
            format!("{}-{}", self.producer_prefix, self.name)
        }
    }
}

/// Agent invocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Program to execute
    #[serde(default)]
    pub program: String,

    /// Arguments placed before `<work_dir> <prompt_file> <output_file>`
    #[serde(default)]
    pub args: Vec<String>,

    /// Maximum wall time per task (e.g., "30m", "2h")
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

fn default_timeout() -> String {
    "30m".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            timeout: default_timeout(),
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(&self.timeout)
    }
}

/// Transcript harvest configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Root of the external session archive (default: `~/.claude/projects`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_dir: Option<PathBuf>,

    /// Runs to harvest; empty means every run with a `results/` directory
    #[serde(default)]
    pub runs: Vec<String>,
}

impl HarvestConfig {
    /// Resolve the archive root, falling back to the home directory default
    pub fn archive_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.archive_dir {
            return Ok(expand_home(dir));
        }
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".claude").join("projects"))
            .ok_or_else(|| {
                Error::Precondition("cannot determine home directory for archive_dir".to_string())
            })
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match directories::BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

impl Config {
    /// Load configuration from a `benchrun.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `benchrun.toml` from a directory, or return defaults when absent
    ///
    /// A present but invalid file is an error, not a silent fallback.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let name = self.run.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidConfig("run.name cannot be empty".to_string()));
        }
        let reserved = name == crate::storage::UNMAPPED_DIR;
        if reserved || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(Error::InvalidConfig(format!(
                "run.name '{name}' must be a plain directory name"
            )));
        }
        if self.run.jobs == 0 || self.run.jobs > 64 {
            return Err(Error::InvalidConfig(
                "run.jobs must be between 1 and 64".to_string(),
            ));
        }
        parse_duration(&self.agent.timeout)
            .map_err(|err| Error::InvalidConfig(format!("agent.timeout: {err}")))?;
        Ok(())
    }
}

/// Parse a duration string like "90s", "30m", "2h"
///
/// A bare number is taken as minutes.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Err(Error::InvalidArgument("Duration cannot be empty".to_string()));
    }

    let (num_str, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => (&s[..pos], s[pos..].trim()),
        None => (s, "m"),
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("Invalid duration number: {num_str}")))?;

    let multiplier: u64 = match unit.to_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => 1,
        "m" | "min" | "minute" | "minutes" => 60,
        "h" | "hr" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86_400,
        _ => {
            return Err(Error::InvalidArgument(format!(
                "Invalid duration unit '{unit}'. Expected: s, m, h, d"
            )));
        }
    };
    let secs = num
        .checked_mul(multiplier)
        .ok_or_else(|| Error::InvalidArgument(format!("Duration too large: {s}")))?;

    if secs == 0 {
        return Err(Error::InvalidArgument("Duration must be positive".to_string()));
    }

    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert_eq!(cfg.benchmark, BenchmarkKind::SweBench);
        assert_eq!(cfg.runs_dir, PathBuf::from("runs"));
        assert_eq!(cfg.run.name, "baseline");
        assert_eq!(cfg.run.producer_label(), "claude-code-baseline");
        assert_eq!(cfg.run.jobs, 1);
        assert!(cfg.run.workdir.is_none());
        assert_eq!(cfg.agent.timeout().unwrap(), Duration::from_secs(1800));
        assert!(cfg.harvest.runs.is_empty());
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        let content = r#"
benchmark = "repo_qa"
runs_dir = "out"

[run]
name = "comprehend"
producer_prefix = "agent"
jobs = 4
workdir = "/scratch"

[agent]
program = "bash"
args = ["scripts/run_one.sh", "configs/comprehend.json"]
timeout = "2h"

[harvest]
archive_dir = "/archive"
runs = ["baseline", "comprehend"]
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert_eq!(cfg.benchmark, BenchmarkKind::RepoQa);
        assert_eq!(cfg.runs_dir, PathBuf::from("out"));
        assert_eq!(cfg.run.producer_label(), "agent-comprehend");
        assert_eq!(cfg.run.jobs, 4);
        assert_eq!(cfg.run.workdir, Some(PathBuf::from("/scratch")));
        assert_eq!(cfg.agent.program, "bash");
        assert_eq!(cfg.agent.args.len(), 2);
        assert_eq!(cfg.agent.timeout().unwrap(), Duration::from_secs(7200));
        assert_eq!(cfg.harvest.archive_dir().unwrap(), PathBuf::from("/archive"));
        assert_eq!(cfg.harvest.runs, vec!["baseline", "comprehend"]);
    }

    #[test]
    fn invalid_run_name_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[run]\nname = \"../escape\"").expect("write config");

        let err = Config::load(&path).expect_err("invalid config");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn invalid_jobs_and_timeout_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);

        fs::write(&path, "[run]\njobs = 0").expect("write config");
        assert!(matches!(Config::load(&path), Err(Error::InvalidConfig(_))));

        fs::write(&path, "[agent]\ntimeout = \"soon\"").expect("write config");
        assert!(matches!(Config::load(&path), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn load_from_dir_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::load_from_dir(dir.path()).expect("defaults");
        assert_eq!(cfg.run.name, "baseline");
    }

    #[test]
    fn load_from_dir_surfaces_invalid_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(CONFIG_FILE), "runs_dir = [").expect("write config");
        assert!(Config::load_from_dir(dir.path()).is_err());
    }

    #[test]
    fn save_writes_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.toml");
        Config::default().save(&path).expect("save config");

        let written = fs::read_to_string(&path).expect("read config");
        assert!(written.contains("benchmark = \"swebench\""));
        assert!(written.contains("name = \"baseline\""));
        let reloaded = Config::load(&path).expect("reload");
        assert_eq!(reloaded.run.name, "baseline");
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("15").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("1 h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(172_800));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("5y").is_err());
    }
}
