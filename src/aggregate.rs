//! Predictions and summary, rebuilt from the full result store.
//!
//! Both artifacts are pure functions of the records on disk: the in-memory
//! report of whichever run happens to be executing is never consulted.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;
use crate::lock::{self, DEFAULT_LOCK_TIMEOUT_MS};
use crate::model::{TaskResult, TaskStatus};
use crate::scoring::BenchmarkKind;
use crate::storage::{ResultStore, RunLayout, StoreScan};

/// One line of `predictions.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub task_id: String,
    pub producer_label: String,
    /// Excerpt of the benchmark's prediction field, empty for errored records
    pub payload: String,
    pub status: TaskStatus,
    #[serde(flatten)]
    pub harness: Option<HarnessFields>,
}

/// Aliases consumed by the SWE-bench evaluation harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessFields {
    pub instance_id: String,
    pub model_name_or_path: String,
    pub model_patch: String,
}

/// Contents of `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub config: String,
    pub producer_label: String,
    pub benchmark: BenchmarkKind,
    pub total_tasks: usize,
    pub completed: usize,
    pub errors: usize,
    pub total_wall_time: f64,
    pub avg_wall_time: f64,
    /// Mean of each numeric or boolean evaluation field over completed records
    pub metrics: BTreeMap<String, f64>,
    pub unreadable: usize,
    pub generated_at: DateTime<Utc>,
}

impl Summary {
    /// Same content apart from `generated_at`.
    pub fn same_content(&self, other: &Summary) -> bool {
        Summary {
            generated_at: other.generated_at,
            ..self.clone()
        } == *other
    }
}

/// Result of writing both artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub predictions: usize,
    pub predictions_file: PathBuf,
    pub summary_file: PathBuf,
    pub summary: Summary,
    pub diagnostics: Vec<String>,
}

/// Builds the derived artifacts of one run.
#[derive(Debug, Clone)]
pub struct Aggregator {
    run_name: String,
    producer_label: String,
    kind: BenchmarkKind,
}

impl Aggregator {
    pub fn new(
        run_name: impl Into<String>,
        producer_label: impl Into<String>,
        kind: BenchmarkKind,
    ) -> Self {
        Self {
            run_name: run_name.into(),
            producer_label: producer_label.into(),
            kind,
        }
    }

    pub fn rebuild_predictions(&self, store: &ResultStore) -> Result<Vec<Prediction>> {
        Ok(self.predictions_from(&store.get_all()?.records))
    }

    pub fn rebuild_summary(&self, store: &ResultStore) -> Result<Summary> {
        Ok(self.summary_from(&store.get_all()?))
    }

    /// Predictions for `records`, sorted by task id.
    pub fn predictions_from(&self, records: &[TaskResult]) -> Vec<Prediction> {
        let field = self.kind.prediction_field();
        let mut predictions: Vec<Prediction> = records
            .iter()
            .map(|record| {
                let payload = record
                    .payload
                    .as_ref()
                    .map(|p| p.excerpt(field))
                    .unwrap_or_default();
                let harness = (self.kind == BenchmarkKind::SweBench).then(|| HarnessFields {
                    instance_id: record.task_id.clone(),
                    model_name_or_path: self.producer_label.clone(),
                    model_patch: payload.clone(),
                });
                Prediction {
                    task_id: record.task_id.clone(),
                    producer_label: self.producer_label.clone(),
                    payload,
                    status: record.status,
                    harness,
                }
            })
            .collect();
        predictions.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        predictions
    }

    pub fn summary_from(&self, scan: &StoreScan) -> Summary {
        let completed: Vec<&TaskResult> =
            scan.records.iter().filter(|r| r.is_completed()).collect();
        let errors = scan.records.len() - completed.len();

        let mut sorted = completed.clone();
        sorted.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        let total_wall_time: f64 = sorted.iter().map(|r| r.wall_time()).sum();
        let avg_wall_time = if sorted.is_empty() {
            0.0
        } else {
            total_wall_time / sorted.len() as f64
        };

        Summary {
            config: self.run_name.clone(),
            producer_label: self.producer_label.clone(),
            benchmark: self.kind,
            total_tasks: scan.records.len(),
            completed: completed.len(),
            errors,
            total_wall_time: round2(total_wall_time),
            avg_wall_time: round2(avg_wall_time),
            metrics: mean_metrics(&sorted),
            unreadable: scan.diagnostics.len(),
            generated_at: Utc::now(),
        }
    }

    /// Rewrite `predictions.jsonl` and `summary.json` from disk.
    pub fn rebuild(&self, layout: &RunLayout) -> Result<RebuildReport> {
        let scan = layout.store().get_all()?;
        for diagnostic in &scan.diagnostics {
            warn!(run = %layout.name(), diagnostic = %diagnostic, "excluded from aggregates");
        }

        let predictions = self.predictions_from(&scan.records);
        let summary = self.summary_from(&scan);

        let mut lines = String::new();
        for prediction in &predictions {
            lines.push_str(&serde_json::to_string(prediction)?);
            lines.push('\n');
        }
        std::fs::create_dir_all(layout.root())?;
        lock::write_atomic_locked(
            layout.predictions_file(),
            lines.as_bytes(),
            DEFAULT_LOCK_TIMEOUT_MS,
        )?;
        let mut summary_json = serde_json::to_vec_pretty(&summary)?;
        summary_json.push(b'\n');
        lock::write_atomic_locked(layout.summary_file(), &summary_json, DEFAULT_LOCK_TIMEOUT_MS)?;

        info!(
            run = %layout.name(),
            predictions = predictions.len(),
            completed = summary.completed,
            errors = summary.errors,
            "artifacts rebuilt"
        );

        Ok(RebuildReport {
            predictions: predictions.len(),
            predictions_file: layout.predictions_file(),
            summary_file: layout.summary_file(),
            summary,
            diagnostics: scan.diagnostics,
        })
    }
}

fn mean_metrics(completed: &[&TaskResult]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for record in completed {
        let Some(payload) = &record.payload else {
            continue;
        };
        for (key, value) in &payload.evaluation {
            let number = match value {
                Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
                Value::Number(n) => n.as_f64(),
                _ => None,
            };
            if let Some(number) = number {
                let entry = sums.entry(key.clone()).or_insert((0.0, 0));
                entry.0 += number;
                entry.1 += 1;
            }
        }
    }
    sums.into_iter()
        .map(|(key, (sum, count))| (key, round3(sum / count as f64)))
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
