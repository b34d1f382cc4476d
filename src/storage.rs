//! Storage layer for benchrun
//!
//! The filesystem is the database: a task is done when its record file
//! exists, and a record becomes visible only once it is complete.
//!
//! # Directory Structure
//!
//! ```text
//! <runs_dir>/
//!   <run>/
//!     results/<task_id>.json      # write-once result records
//!     .locks/<task_id>.lock       # per-task claim locks
//!     predictions.jsonl           # rebuilt from results/
//!     summary.json                # rebuilt from results/
//!     transcripts/                # harvested session transcripts
//!   unmapped/                     # archive transcripts no task claimed
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::lock::{self, FileLock};
use crate::model::TaskResult;

/// File name of the rebuilt predictions artifact
pub const PREDICTIONS_FILE: &str = "predictions.jsonl";

/// File name of the rebuilt summary artifact
pub const SUMMARY_FILE: &str = "summary.json";

/// Name of the directory holding unmapped transcripts, next to the runs
pub const UNMAPPED_DIR: &str = "unmapped";

/// Paths for one named run under a runs directory
#[derive(Debug, Clone)]
pub struct RunLayout {
    runs_dir: PathBuf,
    name: String,
}

impl RunLayout {
    pub fn new(runs_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            runs_dir: runs_dir.into(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Path to this run's root directory
    pub fn root(&self) -> PathBuf {
        self.runs_dir.join(&self.name)
    }

    /// Path to the result records directory
    pub fn results_dir(&self) -> PathBuf {
        self.root().join("results")
    }

    /// Path to the per-task claim locks
    pub fn locks_dir(&self) -> PathBuf {
        self.root().join(".locks")
    }

    pub fn predictions_file(&self) -> PathBuf {
        self.root().join(PREDICTIONS_FILE)
    }

    pub fn summary_file(&self) -> PathBuf {
        self.root().join(SUMMARY_FILE)
    }

    /// Path to the harvested transcripts directory
    pub fn transcripts_dir(&self) -> PathBuf {
        self.root().join("transcripts")
    }

    /// Shared unmapped area, one level above the runs
    pub fn unmapped_dir(&self) -> PathBuf {
        self.runs_dir.join(UNMAPPED_DIR)
    }

    /// Open the result store for this run
    pub fn store(&self) -> ResultStore {
        ResultStore::new(self.results_dir()).with_locks_dir(self.locks_dir())
    }

    /// Create the run directories
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(self.results_dir())?;
        fs::create_dir_all(self.locks_dir())?;
        Ok(())
    }
}

/// Every readable record in a store plus diagnostics for the rest
#[derive(Debug, Clone, Default)]
pub struct StoreScan {
    /// Records sorted by task id
    pub records: Vec<TaskResult>,
    /// One message per file that could not be read or parsed
    pub diagnostics: Vec<String>,
}

/// File-per-task persistence of `TaskResult` records
///
/// Records are write-once: `put` never replaces an existing file, and any
/// number of processes may write into the same directory.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
    locks_dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let locks_dir = dir.join(".locks");
        Self { dir, locks_dir }
    }

    pub fn with_locks_dir(mut self, locks_dir: impl Into<PathBuf>) -> Self {
        self.locks_dir = locks_dir.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for a task id
    pub fn record_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{task_id}.json"))
    }

    /// Whether a record exists for this task id
    pub fn exists(&self, task_id: &str) -> bool {
        self.record_path(task_id).is_file()
    }

    /// Persist a record; fails with `RecordExists` if one is already there
    pub fn put(&self, record: &TaskResult) -> Result<PathBuf> {
        validate_task_id(&record.task_id)?;

        let path = self.record_path(&record.task_id);
        let json = serde_json::to_vec_pretty(record)?;
        if lock::create_new_atomic(&path, &json)? {
            debug!(task_id = %record.task_id, path = %path.display(), "result persisted");
            Ok(path)
        } else {
            Err(Error::RecordExists(record.task_id.clone()))
        }
    }

    /// Read one record, `None` when absent
    pub fn get(&self, task_id: &str) -> Result<Option<TaskResult>> {
        let path = self.record_path(task_id);
        if !path.is_file() {
            return Ok(None);
        }
        read_record(task_id, &path).map(Some)
    }

    /// Enumerate every record currently persisted, regardless of writer
    pub fn get_all(&self) -> Result<StoreScan> {
        let mut scan = StoreScan::default();
        if !self.dir.is_dir() {
            return Ok(scan);
        }

        let mut entries: Vec<(String, PathBuf)> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                let name = path.file_name()?.to_str()?.to_string();
                record_key(&name).map(|key| (key.to_string(), path))
            })
            .collect();
        entries.sort();

        for (key, path) in entries {
            match read_record(&key, &path) {
                Ok(record) => scan.records.push(record),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable result");
                    scan.diagnostics.push(format!("{key}: {err}"));
                }
            }
        }

        scan.records.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(scan)
    }

    /// Ids of every persisted record, sorted
    pub fn ids(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                record_key(&name).map(str::to_string)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Try to claim a task for execution by this process
    ///
    /// Returns `None` when another live process holds the claim.
    pub fn try_claim(&self, task_id: &str) -> Result<Option<FileLock>> {
        validate_task_id(task_id)?;
        FileLock::try_acquire(self.locks_dir.join(format!("{task_id}.lock")))
    }
}

/// Map a file name in a results directory to its record key
fn record_key(name: &str) -> Option<&str> {
    if name.starts_with('.') || lock::is_temp_name(name) || name == SUMMARY_FILE {
        return None;
    }
    name.strip_suffix(".json").filter(|stem| !stem.is_empty())
}

fn read_record(key: &str, path: &Path) -> Result<TaskResult> {
    let content = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;
    TaskResult::from_value(key, value)
}

/// Reject ids that cannot be used as a single file name
pub fn validate_task_id(id: &str) -> Result<()> {
    let reason = if id.trim().is_empty() {
        Some("id cannot be empty")
    } else if id.starts_with('.') {
        Some("id cannot start with '.'")
    } else if id.contains(['/', '\\', '\0']) {
        Some("id cannot contain path separators")
    } else if Some(id) == SUMMARY_FILE.strip_suffix(".json") {
        // results/summary.json is skipped as a legacy artifact
        Some("id is reserved")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidTaskId {
            id: id.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
