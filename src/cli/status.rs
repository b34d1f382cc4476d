//! benchrun status command implementation
//!
//! Reads the store and reports the summary it would rebuild, without
//! writing anything.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;

use super::Context;
use crate::aggregate::{Aggregator, Summary};
use crate::config::RunConfig;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::source::load_tasks;

#[derive(Serialize)]
struct StatusReport {
    run: String,
    results_dir: std::path::PathBuf,
    summary: Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending: Option<usize>,
    diagnostics: Vec<String>,
}

pub(crate) fn run(ctx: &Context, run: Option<&str>, tasks: Option<&Path>) -> Result<()> {
    let layout = ctx.layout(run);
    let store = layout.store();
    let scan = store.get_all()?;

    let run_config = RunConfig {
        name: layout.name().to_string(),
        ..ctx.config.run.clone()
    };
    let summary = Aggregator::new(layout.name(), run_config.producer_label(), ctx.config.benchmark)
        .summary_from(&scan);

    let pending = match tasks {
        Some(path) => {
            let done: HashSet<String> = store.ids()?.into_iter().collect();
            Some(
                load_tasks(path)?
                    .iter()
                    .filter(|task| !done.contains(&task.id))
                    .count(),
            )
        }
        None => None,
    };

    let mut human = HumanOutput::new(format!("benchrun status: {}", layout.name()));
    human.push_summary("total", summary.total_tasks);
    human.push_summary("completed", summary.completed);
    human.push_summary("errors", summary.errors);
    if let Some(pending) = pending {
        human.push_summary("pending", pending);
    }
    human.push_summary("avg wall time", format!("{:.1}s", summary.avg_wall_time));
    for (metric, value) in &summary.metrics {
        human.push_summary(metric.as_str(), format!("{value:.3}"));
    }
    for diagnostic in &scan.diagnostics {
        human.push_warning(format!("unreadable result {diagnostic}"));
    }
    if !layout.results_dir().is_dir() {
        human.push_warning(format!("no results yet at {}", layout.results_dir().display()));
    }

    let report = StatusReport {
        run: layout.name().to_string(),
        results_dir: layout.results_dir(),
        summary,
        pending,
        diagnostics: scan.diagnostics,
    };
    emit_success(ctx.output, "status", &report, Some(&human))
}
