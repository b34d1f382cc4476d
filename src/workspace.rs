//! Working-directory preparation for tasks.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::git;
use crate::model::{TaskContext, TaskDescriptor};

/// Default host used to build clone URLs for `owner/name` repositories.
pub const DEFAULT_CLONE_BASE_URL: &str = "https://github.com";

/// Materializes a task's context as a directory the agent can work in.
pub trait WorkspacePreparer: Send + Sync {
    /// Prepare the working directory for `task` under `base`.
    ///
    /// Returns an absolute path.
    fn prepare(&self, task: &TaskDescriptor, base: &Path) -> Result<PathBuf>;
}

/// Prepares every [`TaskContext`] kind.
#[derive(Debug, Clone)]
pub struct ContextPreparer {
    clone_base_url: String,
}

impl Default for ContextPreparer {
    fn default() -> Self {
        Self::new(DEFAULT_CLONE_BASE_URL)
    }
}

impl ContextPreparer {
    pub fn new(clone_base_url: impl Into<String>) -> Self {
        Self {
            clone_base_url: clone_base_url.into(),
        }
    }

    /// Clone URL for a repository context
    pub fn clone_url(&self, repo: &str, url: Option<&str>) -> String {
        match url {
            Some(url) => url.to_string(),
            None => format!("{}/{repo}.git", self.clone_base_url.trim_end_matches('/')),
        }
    }
}

impl WorkspacePreparer for ContextPreparer {
    fn prepare(&self, task: &TaskDescriptor, base: &Path) -> Result<PathBuf> {
        let base = absolute(base)?;

        match &task.context {
            TaskContext::Repository {
                repo,
                base_commit,
                url,
            } => {
                let dest = base.join(git::checkout_dir_name(repo));
                let url = self.clone_url(repo, url.as_deref());
                git::checkout_at_commit(&url, &dest, base_commit)
            }
            TaskContext::Files { files } => {
                let dir = base.join(&task.id);
                fs::create_dir_all(&dir)?;
                for (relative, content) in files {
                    let target = dir.join(checked_relative(relative)?);
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&target, content)?;
                }
                debug!(task_id = %task.id, count = files.len(), "materialized files");
                Ok(dir)
            }
            TaskContext::Directory { path } => {
                if !path.is_dir() {
                    return Err(Error::DirectoryNotFound(path.clone()));
                }
                absolute(path)
            }
            TaskContext::None => {
                let dir = base.join(&task.id);
                fs::create_dir_all(&dir)?;
                Ok(dir)
            }
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Reject paths that would land outside the task directory.
fn checked_relative(raw: &str) -> Result<&Path> {
    let path = Path::new(raw);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if raw.is_empty() || escapes {
        return Err(Error::InvalidArgument(format!(
            "file path escapes the task directory: {raw}"
        )));
    }
    Ok(path)
}
