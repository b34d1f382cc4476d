//! benchrun harvest command implementation

use std::path::PathBuf;

use super::Context;
use crate::error::Result;
use crate::events::{Event, EventKind};
use crate::harvest::TranscriptHarvester;
use crate::output::{emit_success, HumanOutput};

const MAX_LISTED: usize = 10;

pub(crate) fn run(ctx: &Context, archive_dir: Option<PathBuf>, runs: Vec<String>) -> Result<()> {
    let archive_dir = match archive_dir {
        Some(dir) => dir,
        None => ctx.config.harvest.archive_dir()?,
    };
    let runs = if runs.is_empty() {
        ctx.config.harvest.runs.clone()
    } else {
        runs
    };

    let stats = TranscriptHarvester::new(&ctx.runs_dir, &archive_dir, runs).harvest()?;

    if let Some(mut sink) = ctx.open_events()? {
        sink.emit(&Event::new(EventKind::HarvestFinished, None).with_data(&stats)?)?;
    }

    let mut human = HumanOutput::new("benchrun harvest");
    human.push_summary("runs", stats.runs.join(", "));
    human.push_summary("archive", archive_dir.display());
    human.push_summary("copied", stats.copied);
    human.push_summary("already present", stats.already_present);
    human.push_summary("missing", stats.missing);
    human.push_summary("subdirs copied", stats.subdirs_copied);
    human.push_summary("unmapped", stats.unmapped.len());
    human.push_summary(
        "transcripts size",
        format!("{:.1} MB", stats.transcript_bytes as f64 / (1024.0 * 1024.0)),
    );
    for error in stats.errors.iter().take(MAX_LISTED) {
        human.push_warning(error.clone());
    }
    if stats.errors.len() > MAX_LISTED {
        human.push_warning(format!("... and {} more", stats.errors.len() - MAX_LISTED));
    }

    emit_success(ctx.output, "harvest", &stats, Some(&human))
}
