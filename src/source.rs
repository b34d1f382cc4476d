//! Task source: loading and selecting `TaskDescriptor`s
//!
//! Dataset download lives outside benchrun; it consumes a prepared task
//! file, either a JSON array or JSON Lines.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::TaskDescriptor;
use crate::storage::validate_task_id;

/// Load descriptors from a JSON array or JSONL file
///
/// Ids are validated and must be unique within the file.
pub fn load_tasks(path: &Path) -> Result<Vec<TaskDescriptor>> {
    if !path.is_file() {
        return Err(Error::Precondition(format!(
            "task file not found: {}",
            path.display()
        )));
    }

    let content = fs::read_to_string(path)?;
    let tasks = parse_tasks(&content)?;
    validate_tasks(&tasks)?;
    Ok(tasks)
}

/// Parse descriptors from JSON array or JSONL text
pub fn parse_tasks(content: &str) -> Result<Vec<TaskDescriptor>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    let mut tasks = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let task: TaskDescriptor = serde_json::from_str(line).map_err(|err| {
            Error::InvalidArgument(format!("task file line {}: {err}", idx + 1))
        })?;
        tasks.push(task);
    }
    Ok(tasks)
}

fn validate_tasks(tasks: &[TaskDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for task in tasks {
        validate_task_id(&task.id)?;
        if !seen.insert(task.id.as_str()) {
            return Err(Error::DuplicateTask(task.id.clone()));
        }
    }
    Ok(())
}

/// Which tasks of a task file to run
#[derive(Debug, Clone, Default)]
pub struct TaskSelection {
    /// Exact task ids
    pub ids: Vec<String>,
    /// Glob patterns matched against task ids
    pub patterns: Vec<String>,
    /// Repository names (`owner/name`) for repository contexts
    pub repos: Vec<String>,
}

impl TaskSelection {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.patterns.is_empty() && self.repos.is_empty()
    }

    /// Keep the tasks matching any criterion; everything when empty
    pub fn apply(&self, tasks: Vec<TaskDescriptor>) -> Result<Vec<TaskDescriptor>> {
        if self.is_empty() {
            return Ok(tasks);
        }

        let patterns = self
            .patterns
            .iter()
            .map(|raw| {
                glob::Pattern::new(raw).map_err(|err| {
                    Error::InvalidArgument(format!("invalid filter '{raw}': {err}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(tasks
            .into_iter()
            .filter(|task| {
                self.ids.iter().any(|id| id == &task.id)
                    || patterns.iter().any(|p| p.matches(&task.id))
                    || task
                        .context
                        .repo_name()
                        .map(|repo| self.repos.iter().any(|r| r == repo))
                        .unwrap_or(false)
            })
            .collect())
    }
}
