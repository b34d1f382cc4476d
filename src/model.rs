//! Task and result records
//!
//! A `TaskDescriptor` is the immutable input unit; a `TaskResult` is the
//! write-once output unit persisted per task id. Records dropped into a
//! results directory by other tools are normalized on read (see
//! [`TaskResult::from_value`]).

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::storage::validate_task_id;

/// One unit of benchmark work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDescriptor {
    pub id: String,
    #[serde(default)]
    pub context: TaskContext,
    pub prompt: String,
    /// Reference data consumed only by evaluators (expected answer, etc.).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub reference: Map<String, Value>,
}

impl TaskDescriptor {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context: TaskContext::None,
            prompt: prompt.into(),
            reference: Map::new(),
        }
    }

    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_reference(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.reference.insert(key.into(), value.into());
        self
    }

    /// Reference value as a string, empty when absent.
    pub fn reference_str(&self, key: &str) -> &str {
        self.reference
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or("")
    }
}

/// What is needed to materialize a task's working directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskContext {
    /// A git repository checked out at a commit.
    Repository {
        repo: String,
        base_commit: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// Pre-materialized files, keyed by relative path.
    Files { files: BTreeMap<String, String> },
    /// An existing directory used as-is.
    Directory { path: PathBuf },
    /// An empty scratch directory.
    #[default]
    None,
}

impl TaskContext {
    pub fn repo_name(&self) -> Option<&str> {
        match self {
            TaskContext::Repository { repo, .. } => Some(repo.as_str()),
            _ => None,
        }
    }
}

/// Final state of a persisted task. Pending is never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Errored,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Completed => "completed",
            TaskStatus::Errored => "errored",
        }
    }
}

/// Result fields produced by the agent plus evaluation sub-fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_time_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_diff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_text: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub evaluation: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Payload {
    /// Look up a payload field by name, typed fields first.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "wall_time_seconds" => self.wall_time_seconds.map(Value::from),
            "git_diff" => self.git_diff.clone().map(Value::from),
            "result_text" => self.result_text.clone().map(Value::from),
            "evaluation" if !self.evaluation.is_empty() => {
                Some(Value::Object(self.evaluation.clone()))
            }
            _ => self.extra.get(name).cloned(),
        }
    }

    /// Text excerpt of a field, empty when absent.
    pub fn excerpt(&self, name: &str) -> String {
        match self.field(name) {
            Some(Value::String(text)) => text,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn from_map(map: Map<String, Value>) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

/// Top-level keys that belong to the record itself, not the payload.
const RECORD_KEYS: &[&str] = &[
    "task_id",
    "instance_id",
    "status",
    "session_id",
    "repo_dir",
    "payload",
    "error",
    "finished_at",
];

/// Persisted outcome of one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskResult {
    pub fn completed(task_id: impl Into<String>, payload: Payload) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Completed,
            session_id: String::new(),
            repo_dir: None,
            payload: Some(payload),
            error: None,
            finished_at: Some(Utc::now()),
        }
    }

    pub fn errored(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Errored,
            session_id: String::new(),
            repo_dir: None,
            payload: None,
            error: Some(error.into()),
            finished_at: Some(Utc::now()),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_repo_dir(mut self, repo_dir: impl Into<PathBuf>) -> Self {
        self.repo_dir = Some(repo_dir.into());
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Wall time of a completed record, zero otherwise.
    pub fn wall_time(&self) -> f64 {
        match (&self.status, &self.payload) {
            (TaskStatus::Completed, Some(payload)) => payload.wall_time_seconds.unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Build a record from arbitrary JSON found under `key` in a store.
    ///
    /// Accepts both native records and the flat legacy layout (payload
    /// fields at top level, `instance_id` instead of `task_id`, no status).
    pub fn from_value(key: &str, value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(Error::OperationFailed(format!(
                "{key}: result is not a JSON object"
            )));
        };

        let task_id = take_string(&mut map, "task_id")
            .or_else(|| take_string(&mut map, "instance_id"))
            .unwrap_or_else(|| key.to_string());
        // The id names files under the run; one from outside must not escape it.
        validate_task_id(&task_id)
            .map_err(|err| Error::OperationFailed(format!("{key}: {err}")))?;

        let error = take_string(&mut map, "error").filter(|e| !e.is_empty());
        let status = match map.remove("status") {
            Some(raw) => serde_json::from_value(raw).map_err(|err| {
                Error::OperationFailed(format!("{key}: invalid status: {err}"))
            })?,
            None if error.is_some() => TaskStatus::Errored,
            None => TaskStatus::Completed,
        };

        let session_id = take_string(&mut map, "session_id").unwrap_or_default();
        let repo_dir = take_string(&mut map, "repo_dir")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);
        let finished_at = match map.remove("finished_at") {
            Some(raw) => serde_json::from_value(raw).ok(),
            None => None,
        };

        let nested = match map.remove("payload") {
            Some(Value::Object(inner)) => Some(inner),
            Some(Value::Null) | None => None,
            Some(_) => {
                return Err(Error::OperationFailed(format!(
                    "{key}: payload is not a JSON object"
                )))
            }
        };

        // Whatever is left at top level is legacy flat payload.
        map.retain(|k, _| !RECORD_KEYS.contains(&k.as_str()));
        let payload_fields = match nested {
            Some(mut inner) => {
                for (k, v) in map {
                    inner.entry(k).or_insert(v);
                }
                inner
            }
            None => map,
        };

        let (payload, error) = match status {
            TaskStatus::Completed => (Some(Payload::from_map(payload_fields)?), None),
            TaskStatus::Errored => (
                None,
                Some(error.unwrap_or_else(|| "unknown error".to_string())),
            ),
        };

        Ok(Self {
            task_id,
            status,
            session_id,
            repo_dir,
            payload,
            error,
            finished_at,
        })
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(value)) => Some(value),
        _ => None,
    }
}
