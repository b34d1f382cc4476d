//! Command-line interface for benchrun
//!
//! This module defines the CLI structure using clap derive macros.
//! Each subcommand lives in its own submodule.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::{Config, CONFIG_FILE};
use crate::error::Result;
use crate::events::{EventDestination, EventSink};
use crate::output::OutputOptions;
use crate::storage::RunLayout;

mod harvest;
mod init;
mod rebuild;
mod run;
mod status;

/// benchrun - resumable benchmark runner
///
/// Runs benchmark tasks against an external agent, keeps one write-once
/// result per task, rebuilds predictions and summary from disk, and
/// harvests agent transcripts.
#[derive(Parser, Debug)]
#[command(name = "benchrun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to benchrun.toml (defaults to ./benchrun.toml when present)
    #[arg(long, global = true, env = "BENCHRUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding one subdirectory per run
    #[arg(long, global = true, env = "BENCHRUN_RUNS_DIR")]
    pub runs_dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit JSONL events to a file, or `-` for stdout
    #[arg(long, global = true)]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default benchrun.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run tasks, skipping those that already have a result
    Run {
        /// Task file (JSON array or JSON Lines)
        #[arg(long)]
        tasks: PathBuf,

        /// Run name (overrides run.name)
        #[arg(long)]
        run: Option<String>,

        /// Benchmark kind: swebench, swe_qa, repo_qa, generic
        #[arg(long)]
        benchmark: Option<String>,

        /// Only run these task ids
        #[arg(long = "only")]
        only: Vec<String>,

        /// Only run task ids matching these glob patterns
        #[arg(long = "filter")]
        filter: Vec<String>,

        /// Only run tasks for these repositories (owner/name)
        #[arg(long = "repo")]
        repos: Vec<String>,

        /// Number of tasks run concurrently
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Per-task agent timeout (e.g., "30m", "2h")
        #[arg(long)]
        timeout: Option<String>,

        /// Scratch directory for checkouts, prompts and agent output
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Agent command, replacing [agent] program and args
        #[arg(last = true)]
        agent: Vec<String>,
    },

    /// Rebuild predictions.jsonl and summary.json from stored results
    Rebuild {
        /// Run name (overrides run.name)
        #[arg(long)]
        run: Option<String>,
    },

    /// Show the summary computed from stored results without writing
    Status {
        /// Run name (overrides run.name)
        #[arg(long)]
        run: Option<String>,

        /// Task file, to count tasks still pending
        #[arg(long)]
        tasks: Option<PathBuf>,
    },

    /// Copy agent transcripts from the session archive into runs
    Harvest {
        /// Root of the session archive (overrides harvest.archive_dir)
        #[arg(long)]
        archive_dir: Option<PathBuf>,

        /// Runs to harvest (default: harvest.runs, else every run)
        #[arg(long = "run")]
        runs: Vec<String>,
    },
}

/// Resolved global state shared by subcommands
pub(crate) struct Context {
    pub config: Config,
    pub runs_dir: PathBuf,
    pub output: OutputOptions,
    pub events: Option<EventDestination>,
}

impl Context {
    fn load(cli: &Cli, json: bool) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let (config, config_path) = match &cli.config {
            Some(path) => (Config::load(path)?, path.clone()),
            None => (Config::load_from_dir(&cwd)?, cwd.join(CONFIG_FILE)),
        };

        let base = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.clone());
        let runs_dir = match &cli.runs_dir {
            Some(dir) => cwd.join(dir),
            None => base.join(&config.runs_dir),
        };

        Ok(Self {
            config,
            runs_dir,
            output: OutputOptions {
                json,
                quiet: cli.quiet,
            },
            events: EventDestination::parse(cli.events.as_deref()),
        })
    }

    /// Layout for `run`, defaulting to the configured run name
    pub fn layout(&self, run: Option<&str>) -> RunLayout {
        RunLayout::new(&self.runs_dir, run.unwrap_or(&self.config.run.name))
    }

    pub fn open_events(&self) -> Result<Option<EventSink>> {
        self.events.as_ref().map(EventDestination::open).transpose()
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let events_to_stdout = matches!(
            EventDestination::parse(self.events.as_deref()),
            Some(EventDestination::Stdout)
        );
        let json = self.json && !events_to_stdout;

        if let Commands::Init { force } = self.command {
            let target = match self.config {
                Some(path) => path,
                None => std::env::current_dir()?.join(CONFIG_FILE),
            };
            return init::run(
                &target,
                force,
                OutputOptions {
                    json,
                    quiet: self.quiet,
                },
            );
        }

        let ctx = Context::load(&self, json)?;
        match self.command {
            Commands::Init { .. } => Ok(()),
            Commands::Run {
                tasks,
                run,
                benchmark,
                only,
                filter,
                repos,
                jobs,
                timeout,
                workdir,
                agent,
            } => run::run(
                &ctx,
                run::RunOptions {
                    tasks,
                    run,
                    benchmark,
                    only,
                    filter,
                    repos,
                    jobs,
                    timeout,
                    workdir,
                    agent,
                },
            ),
            Commands::Rebuild { run } => rebuild::run(&ctx, run.as_deref()),
            Commands::Status { run, tasks } => status::run(&ctx, run.as_deref(), tasks.as_deref()),
            Commands::Harvest { archive_dir, runs } => harvest::run(&ctx, archive_dir, runs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_trailing_agent() {
        let cli = Cli::try_parse_from([
            "benchrun", "--json", "run", "--tasks", "tasks.jsonl", "--only", "a", "--only", "b",
            "-j", "4", "--", "my-agent", "--model", "opus",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run {
                only, jobs, agent, ..
            } => {
                assert_eq!(only, vec!["a", "b"]);
                assert_eq!(jobs, Some(4));
                assert_eq!(agent, vec!["my-agent", "--model", "opus"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn harvest_accepts_repeated_runs() {
        let cli = Cli::try_parse_from([
            "benchrun", "harvest", "--run", "baseline", "--run", "tuned", "--archive-dir", "/a",
        ])
        .unwrap();
        match cli.command {
            Commands::Harvest { archive_dir, runs } => {
                assert_eq!(archive_dir, Some(PathBuf::from("/a")));
                assert_eq!(runs, vec!["baseline", "tuned"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
