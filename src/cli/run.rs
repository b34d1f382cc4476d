//! benchrun run command implementation
//!
//! Runs the selected tasks and rebuilds the run's artifacts from disk.

use std::path::PathBuf;

use serde::Serialize;

use super::Context;
use crate::agent::CommandAgent;
use crate::aggregate::{Aggregator, Summary};
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput};
use crate::runner::{RunReport, TaskOutcome, TaskRunner};
use crate::scoring::BenchmarkKind;
use crate::source::{load_tasks, TaskSelection};
use crate::workspace::ContextPreparer;

/// Shown per category before the list is truncated
const MAX_LISTED: usize = 10;

/// Options for the run command
pub struct RunOptions {
    pub tasks: PathBuf,
    pub run: Option<String>,
    pub benchmark: Option<String>,
    pub only: Vec<String>,
    pub filter: Vec<String>,
    pub repos: Vec<String>,
    pub jobs: Option<usize>,
    pub timeout: Option<String>,
    pub workdir: Option<PathBuf>,
    pub agent: Vec<String>,
}

#[derive(Serialize)]
struct RunCommandReport {
    run: String,
    producer_label: String,
    workdir: PathBuf,
    selected: usize,
    report: RunReport,
    predictions_file: PathBuf,
    summary: Summary,
}

pub(crate) fn run(ctx: &Context, options: RunOptions) -> Result<()> {
    let mut config = ctx.config.clone();
    if let Some(name) = options.run {
        config.run.name = name;
    }
    if let Some(raw) = &options.benchmark {
        config.benchmark = raw.parse::<BenchmarkKind>()?;
    }
    if let Some(jobs) = options.jobs {
        config.run.jobs = jobs;
    }
    if let Some(timeout) = options.timeout {
        config.agent.timeout = timeout;
    }
    if let Some((program, args)) = options.agent.split_first() {
        config.agent.program = program.clone();
        config.agent.args = args.to_vec();
    }
    config.validate()?;

    if config.agent.program.trim().is_empty() {
        return Err(Error::Precondition(
            "agent program not configured".to_string(),
        ));
    }
    let agent = CommandAgent::new(
        config.agent.program.clone(),
        config.agent.args.clone(),
        config.agent.timeout()?,
    );
    agent.check()?;

    let selection = TaskSelection {
        ids: options.only,
        patterns: options.filter,
        repos: options.repos,
    };
    let tasks = selection.apply(load_tasks(&options.tasks)?)?;

    let layout = ctx.layout(Some(&config.run.name));
    layout.init()?;

    let workdir = match options.workdir.or_else(|| config.run.workdir.clone()) {
        Some(dir) => dir,
        None => std::env::temp_dir().join(format!("benchrun_{}", uuid::Uuid::new_v4().simple())),
    };
    std::fs::create_dir_all(&workdir)?;
    let workdir = workdir.canonicalize()?;

    let mut runner = TaskRunner::new(
        layout.name(),
        layout.store(),
        &workdir,
        Box::new(ContextPreparer::new(config.run.clone_base_url.clone())),
        Box::new(agent),
    )
    .with_evaluator(config.benchmark.evaluator())
    .with_jobs(config.run.jobs);
    if let Some(sink) = ctx.open_events()? {
        runner = runner.with_events(sink);
    }

    let report = runner.run(&tasks)?;

    let producer_label = config.run.producer_label();
    let rebuilt = Aggregator::new(layout.name(), &producer_label, config.benchmark).rebuild(&layout)?;

    let mut human = HumanOutput::new(format!("benchrun run: {}", layout.name()));
    human.push_summary("tasks", tasks.len());
    human.push_summary("completed", report.completed);
    human.push_summary("errored", report.errored);
    human.push_summary("skipped", report.skipped);
    if report.busy > 0 {
        human.push_summary("busy", report.busy);
    }
    human.push_summary(
        "store",
        format!(
            "{} total, {} completed, {} errors",
            rebuilt.summary.total_tasks, rebuilt.summary.completed, rebuilt.summary.errors
        ),
    );
    human.push_summary("workdir", workdir.display());
    human.push_summary("predictions", rebuilt.predictions_file.display());

    let problems: Vec<_> = report
        .tasks
        .iter()
        .filter(|t| matches!(t.outcome, TaskOutcome::Errored | TaskOutcome::Failed))
        .collect();
    for task in problems.iter().take(MAX_LISTED) {
        human.push_warning(format!(
            "{}: {}",
            task.task_id,
            task.error.as_deref().unwrap_or("errored")
        ));
    }
    if problems.len() > MAX_LISTED {
        human.push_warning(format!("... and {} more", problems.len() - MAX_LISTED));
    }
    for diagnostic in &rebuilt.diagnostics {
        human.push_warning(format!("unreadable result {diagnostic}"));
    }
    if report.busy > 0 {
        human.push_next_step("re-run once the other process finishes to pick up busy tasks");
    }
    human.push_next_step(format!("benchrun harvest --run {}", layout.name()));

    let data = RunCommandReport {
        run: layout.name().to_string(),
        producer_label,
        workdir,
        selected: tasks.len(),
        report,
        predictions_file: rebuilt.predictions_file,
        summary: rebuilt.summary,
    };
    emit_success(ctx.output, "run", &data, Some(&human))
}
