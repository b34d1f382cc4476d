#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use benchrun::agent::{AgentExit, AgentInvoker, AgentRequest};
use benchrun::harvest::archive_dir_name;
use benchrun::model::TaskDescriptor;
use benchrun::runner::TaskRunner;
use benchrun::storage::RunLayout;
use benchrun::workspace::ContextPreparer;
use git2::{IndexAddOption, Oid, Repository, Signature};
use serde_json::{json, Value};
use tempfile::TempDir;

/// Temp area with a runs dir, a scratch workdir and a transcript archive.
pub struct TestRun {
    dir: TempDir,
}

impl TestRun {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        fs::create_dir_all(dir.path().join("runs")).expect("runs dir");
        fs::create_dir_all(dir.path().join("archive")).expect("archive dir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.dir.path().join("runs")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.dir.path().join("archive")
    }

    pub fn workdir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn layout(&self, name: &str) -> RunLayout {
        RunLayout::new(self.runs_dir(), name)
    }

    /// Runner for `name` backed by `agent`, sequential unless `jobs > 1`.
    pub fn runner(&self, name: &str, agent: ScriptedAgent, jobs: usize) -> TaskRunner {
        let layout = self.layout(name);
        layout.init().expect("init run");
        TaskRunner::new(
            name,
            layout.store(),
            self.workdir(),
            Box::new(ContextPreparer::default()),
            Box::new(agent),
        )
        .with_jobs(jobs)
    }

    pub fn write_tasks(&self, tasks: &[TaskDescriptor]) -> PathBuf {
        let path = self.dir.path().join("tasks.jsonl");
        let lines: Vec<String> = tasks
            .iter()
            .map(|t| serde_json::to_string(t).expect("serialize task"))
            .collect();
        fs::write(&path, lines.join("\n") + "\n").expect("write tasks");
        path
    }

    /// Put a transcript for `session` under the archive dir for `repo_dir`.
    pub fn archive_session(&self, repo_dir: &str, session: &str) -> PathBuf {
        let dir = self.archive_dir().join(archive_dir_name(repo_dir));
        fs::create_dir_all(&dir).expect("archive session dir");
        let path = dir.join(format!("{session}.jsonl"));
        fs::write(&path, format!("{{\"sessionId\":\"{session}\"}}\n")).expect("write transcript");
        path
    }
}

pub fn tasks(ids: &[&str]) -> Vec<TaskDescriptor> {
    ids.iter()
        .map(|id| TaskDescriptor::new(*id, format!("Solve {id}")))
        .collect()
}

/// What the scripted agent does for a task.
#[derive(Debug, Clone)]
pub enum Script {
    /// Write this JSON to the output file
    Output(Value),
    /// Exit non-zero without output
    Silent,
}

/// In-process agent with per-task scripts and an invocation counter.
#[derive(Clone, Default)]
pub struct ScriptedAgent {
    scripts: HashMap<String, Script>,
    calls: Arc<AtomicUsize>,
    per_task: Arc<Mutex<HashMap<String, usize>>>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, task_id: &str, script: Script) -> Self {
        self.scripts.insert(task_id.to_string(), script);
        self
    }

    pub fn silent(self, task_id: &str) -> Self {
        self.script(task_id, Script::Silent)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, task_id: &str) -> usize {
        self.per_task
            .lock()
            .map(|counts| counts.get(task_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl AgentInvoker for ScriptedAgent {
    fn invoke(&self, request: &AgentRequest) -> benchrun::Result<AgentExit> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut counts) = self.per_task.lock() {
            *counts.entry(request.task_id.clone()).or_default() += 1;
        }

        let script = self.scripts.get(&request.task_id).cloned().unwrap_or_else(|| {
            Script::Output(json!({
                "session_id": format!("sess-{}", request.task_id),
                "wall_time_seconds": 2.0,
                "result_text": format!("done {}", request.task_id),
            }))
        });

        match script {
            Script::Output(value) => {
                fs::write(&request.output_file, value.to_string())?;
                Ok(AgentExit::Exited(Some(0)))
            }
            Script::Silent => Ok(AgentExit::Exited(Some(1))),
        }
    }
}

pub struct TestRepo {
    dir: TempDir,
    repo: Repository,
}

impl TestRepo {
    pub fn init() -> Result<Self, git2::Error> {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let repo = Repository::init(dir.path())?;
        let mut cfg = repo.config()?;
        cfg.set_str("user.name", "bench-test")?;
        cfg.set_str("user.email", "bench-test@example.com")?;
        Ok(Self { dir, repo })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn url(&self) -> String {
        self.dir.path().to_string_lossy().to_string()
    }

    pub fn commit_file(
        &self,
        rel_path: &str,
        contents: &str,
        message: &str,
    ) -> Result<Oid, Box<dyn std::error::Error>> {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;

        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree = self.repo.find_tree(index.write_tree()?)?;
        let sig = Signature::now("bench-test", "bench-test@example.com")?;

        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.target())
            .and_then(|oid| self.repo.find_commit(oid).ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        Ok(self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?)
    }
}
