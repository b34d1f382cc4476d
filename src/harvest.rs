//! Transcript harvesting
//!
//! Matches persisted results to an external transcript archive and copies
//! the transcripts next to the results, renamed by task id. The archive is
//! keyed by a lossy encoding of the agent's working directory, so matching
//! is best effort and every failure is a diagnostic, never fatal.
//!
//! ```text
//! <archive_root>/<archive_dir_name(repo_dir)>/<session_id>.jsonl
//! <archive_root>/<archive_dir_name(repo_dir)>/<session_id>/...
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::model::TaskResult;
use crate::storage::{RunLayout, UNMAPPED_DIR};

/// Extension of transcript files in the archive and in the run.
pub const TRANSCRIPT_EXT: &str = "jsonl";

/// Archive directory name for a working directory.
///
/// Every `/` and every `_` becomes `-`, so distinct paths can collide.
pub fn archive_dir_name(repo_dir: &str) -> String {
    repo_dir.replace(['/', '_'], "-")
}

/// An archive transcript no persisted result refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmappedTranscript {
    pub archive_dir: String,
    pub session_id: String,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Outcome of one harvest pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestStats {
    pub runs: Vec<String>,
    pub copied: usize,
    pub already_present: usize,
    pub missing: usize,
    pub subdirs_copied: usize,
    pub unmapped: Vec<UnmappedTranscript>,
    pub errors: Vec<String>,
    /// Total size of harvested and unmapped transcript files on disk
    pub transcript_bytes: u64,
}

/// Copies archive transcripts into run directories.
#[derive(Debug, Clone)]
pub struct TranscriptHarvester {
    runs_dir: PathBuf,
    archive_root: PathBuf,
    runs: Vec<String>,
}

impl TranscriptHarvester {
    /// `runs` names the runs to harvest; empty means every run found.
    pub fn new(
        runs_dir: impl Into<PathBuf>,
        archive_root: impl Into<PathBuf>,
        runs: Vec<String>,
    ) -> Self {
        Self {
            runs_dir: runs_dir.into(),
            archive_root: archive_root.into(),
            runs,
        }
    }

    pub fn harvest(&self) -> Result<HarvestStats> {
        if !self.archive_root.is_dir() {
            return Err(Error::Precondition(format!(
                "transcript archive not found: {}",
                self.archive_root.display()
            )));
        }
        if !self.runs_dir.is_dir() {
            return Err(Error::DirectoryNotFound(self.runs_dir.clone()));
        }

        let mut stats = HarvestStats {
            runs: self.run_names()?,
            ..HarvestStats::default()
        };
        let mut claimed: BTreeSet<String> = BTreeSet::new();
        let mut archive_dirs: BTreeSet<String> = BTreeSet::new();

        for run in stats.runs.clone() {
            let layout = RunLayout::new(&self.runs_dir, &run);
            if !layout.results_dir().is_dir() {
                stats
                    .errors
                    .push(format!("{run}: results directory not found"));
                continue;
            }

            let scan = match layout.store().get_all() {
                Ok(scan) => scan,
                Err(err) => {
                    stats.errors.push(format!("{run}: cannot read results: {err}"));
                    continue;
                }
            };
            stats.errors.extend(
                scan.diagnostics
                    .iter()
                    .map(|d| format!("{run}: unreadable result {d}")),
            );

            for record in &scan.records {
                if !record.session_id.is_empty() {
                    claimed.insert(record.session_id.clone());
                }
                if let Some(repo_dir) = &record.repo_dir {
                    archive_dirs.insert(archive_dir_name(&repo_dir.to_string_lossy()));
                }
            }

            for record in &scan.records {
                self.harvest_record(&layout, record, &mut stats);
            }
        }

        self.collect_unmapped(&archive_dirs, &claimed, &mut stats);
        stats.transcript_bytes = self.transcript_bytes(&stats.runs);

        for error in &stats.errors {
            debug!(diagnostic = %error, "harvest diagnostic");
        }
        info!(
            copied = stats.copied,
            already_present = stats.already_present,
            missing = stats.missing,
            unmapped = stats.unmapped.len(),
            errors = stats.errors.len(),
            "harvest finished"
        );
        Ok(stats)
    }

    fn run_names(&self) -> Result<Vec<String>> {
        if !self.runs.is_empty() {
            return Ok(self.runs.clone());
        }

        let mut names: Vec<String> = fs::read_dir(&self.runs_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().join("results").is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| name != UNMAPPED_DIR && !name.starts_with('.'))
            .collect();
        names.sort();
        Ok(names)
    }

    fn harvest_record(&self, layout: &RunLayout, record: &TaskResult, stats: &mut HarvestStats) {
        let label = format!("{}/{}", layout.name(), record.task_id);

        if record.session_id.is_empty() {
            stats.errors.push(format!("{label}: no session_id"));
            return;
        }
        let Some(repo_dir) = &record.repo_dir else {
            stats.errors.push(format!("{label}: no repo_dir"));
            return;
        };

        let dir_name = archive_dir_name(&repo_dir.to_string_lossy());
        let archive_dir = self.archive_root.join(&dir_name);
        let transcripts = layout.transcripts_dir();
        let destination = transcripts.join(transcript_file(&record.task_id));

        // A copy made earlier stays valid after the archive is pruned.
        if destination.exists() {
            stats.already_present += 1;
        } else {
            if !archive_dir.is_dir() {
                stats.missing += 1;
                stats
                    .errors
                    .push(format!("{label}: archive directory not found: {dir_name}"));
                return;
            }

            let source = archive_dir.join(transcript_file(&record.session_id));
            if !source.is_file() {
                stats.missing += 1;
                stats.errors.push(format!(
                    "{label}: transcript not found: {}",
                    source.display()
                ));
                return;
            }

            if let Err(err) = copy_file_atomic(&source, &destination) {
                warn!(task_id = %record.task_id, error = %err, "transcript copy failed");
                stats
                    .errors
                    .push(format!("{label}: copy failed: {err}"));
                return;
            }
            debug!(task_id = %record.task_id, session_id = %record.session_id, "transcript copied");
            stats.copied += 1;
        }

        let aux_source = archive_dir.join(&record.session_id);
        let aux_destination = transcripts.join(&record.task_id);
        if aux_source.is_dir() && !aux_destination.exists() {
            match copy_dir_atomic(&aux_source, &aux_destination) {
                Ok(()) => stats.subdirs_copied += 1,
                Err(err) => stats
                    .errors
                    .push(format!("{label}: aux directory copy failed: {err}")),
            }
        }
    }

    fn collect_unmapped(
        &self,
        archive_dirs: &BTreeSet<String>,
        claimed: &BTreeSet<String>,
        stats: &mut HarvestStats,
    ) {
        let unmapped_dir = self.runs_dir.join(UNMAPPED_DIR);

        for dir_name in archive_dirs {
            let archive_dir = self.archive_root.join(dir_name);
            if !archive_dir.is_dir() {
                continue;
            }

            let entries = match fs::read_dir(&archive_dir) {
                Ok(entries) => entries,
                Err(err) => {
                    stats
                        .errors
                        .push(format!("unmapped: cannot read {dir_name}: {err}"));
                    continue;
                }
            };
            let mut sessions: Vec<(String, PathBuf)> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.is_file())
                .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(TRANSCRIPT_EXT))
                .filter_map(|path| {
                    let stem = path.file_stem()?.to_str()?.to_string();
                    Some((stem, path))
                })
                .filter(|(session, _)| !claimed.contains(session))
                .collect();
            sessions.sort();

            for (session_id, source) in sessions {
                let destination = unmapped_dir.join(format!("{dir_name}_{session_id}.{TRANSCRIPT_EXT}"));
                if !destination.exists() {
                    if let Err(err) = copy_file_atomic(&source, &destination) {
                        warn!(session_id = %session_id, error = %err, "unmapped copy failed");
                        stats.errors.push(format!(
                            "unmapped: {dir_name}/{session_id}: copy failed: {err}"
                        ));
                    }
                }
                stats.unmapped.push(UnmappedTranscript {
                    archive_dir: dir_name.clone(),
                    session_id,
                    source,
                    destination,
                });
            }
        }
    }

    /// Size of everything harvested so far; unreadable entries count as zero.
    fn transcript_bytes(&self, runs: &[String]) -> u64 {
        let mut roots: Vec<PathBuf> = runs
            .iter()
            .map(|run| RunLayout::new(&self.runs_dir, run).transcripts_dir())
            .collect();
        roots.push(self.runs_dir.join(UNMAPPED_DIR));

        roots
            .iter()
            .filter(|root| root.is_dir())
            .flat_map(|root| WalkDir::new(root).into_iter().filter_map(|entry| entry.ok()))
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|metadata| metadata.len())
            .sum()
    }
}

fn transcript_file(stem: &str) -> String {
    format!("{stem}.{TRANSCRIPT_EXT}")
}

/// Copy into a temp file beside `dst`, then move it into place.
fn copy_file_atomic(src: &Path, dst: &Path) -> Result<()> {
    let parent = dst
        .parent()
        .ok_or_else(|| Error::OperationFailed(format!("no parent for {}", dst.display())))?;
    fs::create_dir_all(parent)?;

    let mut reader = fs::File::open(src)?;
    let mut staged = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(parent)?;
    io::copy(&mut reader, staged.as_file_mut())?;
    staged.as_file().sync_all()?;
    staged
        .persist(dst)
        .map_err(|err| Error::Io(err.error))?;
    Ok(())
}

/// Copy a directory tree into a staging directory, then rename it into place.
fn copy_dir_atomic(src: &Path, dst: &Path) -> Result<()> {
    let parent = dst
        .parent()
        .ok_or_else(|| Error::OperationFailed(format!("no parent for {}", dst.display())))?;
    fs::create_dir_all(parent)?;

    let staging = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempdir_in(parent)?;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|err| Error::OperationFailed(err.to_string()))?;
        let target = staging.path().join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)?;
        } else {
            warn!(path = %entry.path().display(), "skipping non-regular file");
        }
    }

    fs::rename(staging.path(), dst)?;
    Ok(())
}
