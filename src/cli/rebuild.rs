//! benchrun rebuild command implementation

use super::Context;
use crate::aggregate::Aggregator;
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput};

pub(crate) fn run(ctx: &Context, run: Option<&str>) -> Result<()> {
    let layout = ctx.layout(run);
    if !layout.results_dir().is_dir() {
        return Err(Error::DirectoryNotFound(layout.results_dir()));
    }

    let run_config = RunConfig {
        name: layout.name().to_string(),
        ..ctx.config.run.clone()
    };
    let report = Aggregator::new(layout.name(), run_config.producer_label(), ctx.config.benchmark)
        .rebuild(&layout)?;

    let mut human = HumanOutput::new(format!("benchrun rebuild: {}", layout.name()));
    human.push_summary("predictions", report.predictions);
    human.push_summary("completed", report.summary.completed);
    human.push_summary("errors", report.summary.errors);
    human.push_summary("summary", report.summary_file.display());
    for diagnostic in &report.diagnostics {
        human.push_warning(format!("unreadable result {diagnostic}"));
    }

    emit_success(ctx.output, "rebuild", &report, Some(&human))
}
