//! Resumable batch execution of tasks.
//!
//! Per task: skip when a record exists, claim, prepare the working
//! directory, invoke the agent, score, persist exactly one record. No task
//! outcome ever aborts the batch.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::agent::{self, AgentInvoker, AgentOutcome, AgentRequest};
use crate::error::{Error, Result};
use crate::events::{Event, EventKind, EventSink};
use crate::git;
use crate::model::{TaskContext, TaskDescriptor, TaskResult};
use crate::scoring::{Evaluator, NoScoring};
use crate::storage::ResultStore;
use crate::workspace::WorkspacePreparer;

pub const PROMPT_FILE: &str = "prompt.txt";
pub const OUTPUT_FILE: &str = "output.json";
pub const AGENT_LOG_FILE: &str = "agent.log";
/// Directory under the workdir holding per-task prompts, outputs and logs
pub const SCRATCH_DIR: &str = ".benchrun";

/// What happened to one task in this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// A `completed` record was persisted
    Completed,
    /// An `errored` record was persisted
    Errored,
    /// A record already existed (or another writer won)
    Skipped,
    /// Another process holds the claim
    Busy,
    /// Nothing could be persisted; the task stays pending
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: String,
    pub outcome: TaskOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskReport {
    fn new(task_id: &str, outcome: TaskOutcome) -> Self {
        Self {
            task_id: task_id.to_string(),
            outcome,
            error: None,
        }
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Counts for one runner invocation, in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub total: usize,
    pub completed: usize,
    pub errored: usize,
    pub skipped: usize,
    pub busy: usize,
    pub failed: usize,
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    fn from_tasks(tasks: Vec<TaskReport>) -> Self {
        let count = |outcome: TaskOutcome| tasks.iter().filter(|t| t.outcome == outcome).count();
        Self {
            total: tasks.len(),
            completed: count(TaskOutcome::Completed),
            errored: count(TaskOutcome::Errored),
            skipped: count(TaskOutcome::Skipped),
            busy: count(TaskOutcome::Busy),
            failed: count(TaskOutcome::Failed),
            tasks,
        }
    }
}

/// Runs tasks against an agent, accumulating results in a [`ResultStore`].
pub struct TaskRunner {
    run_name: String,
    store: ResultStore,
    workdir: PathBuf,
    preparer: Box<dyn WorkspacePreparer>,
    agent: Box<dyn AgentInvoker>,
    evaluator: Box<dyn Evaluator>,
    jobs: usize,
    events: Option<Mutex<EventSink>>,
}

impl TaskRunner {
    pub fn new(
        run_name: impl Into<String>,
        store: ResultStore,
        workdir: impl Into<PathBuf>,
        preparer: Box<dyn WorkspacePreparer>,
        agent: Box<dyn AgentInvoker>,
    ) -> Self {
        Self {
            run_name: run_name.into(),
            store,
            workdir: workdir.into(),
            preparer,
            agent,
            evaluator: Box::new(NoScoring),
            jobs: 1,
            events: None,
        }
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.events = Some(Mutex::new(sink));
        self
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Scratch directory holding a task's prompt, output and agent log
    ///
    /// Never inside the directory the agent works in. Task ids cannot start
    /// with `.`, so no prepared directory collides with it.
    pub fn scratch_dir(&self, task_id: &str) -> PathBuf {
        self.workdir.join(SCRATCH_DIR).join(task_id)
    }

    /// Run every task once; existing records are never re-run.
    pub fn run(&self, tasks: &[TaskDescriptor]) -> Result<RunReport> {
        fs::create_dir_all(self.store.dir())?;
        fs::create_dir_all(&self.workdir)?;

        let workers = self.jobs.min(tasks.len()).max(1);
        info!(
            run = %self.run_name,
            tasks = tasks.len(),
            workers,
            workdir = %self.workdir.display(),
            "run started"
        );
        self.emit(
            EventKind::RunStarted,
            json!({"tasks": tasks.len(), "jobs": workers}),
        );

        let reports: Vec<TaskReport> = if workers == 1 {
            tasks.iter().map(|task| self.run_task(task)).collect()
        } else {
            self.run_parallel(tasks, workers)
        };

        let report = RunReport::from_tasks(reports);
        info!(
            run = %self.run_name,
            completed = report.completed,
            errored = report.errored,
            skipped = report.skipped,
            busy = report.busy,
            "run finished"
        );
        self.emit(
            EventKind::RunFinished,
            json!({
                "total": report.total,
                "completed": report.completed,
                "errored": report.errored,
                "skipped": report.skipped,
                "busy": report.busy,
                "failed": report.failed,
            }),
        );
        Ok(report)
    }

    fn run_parallel(&self, tasks: &[TaskDescriptor], workers: usize) -> Vec<TaskReport> {
        let next = AtomicUsize::new(0);
        let results: Mutex<Vec<(usize, TaskReport)>> = Mutex::new(Vec::with_capacity(tasks.len()));

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let idx = next.fetch_add(1, Ordering::SeqCst);
                    let Some(task) = tasks.get(idx) else {
                        break;
                    };
                    let report = self.run_task(task);
                    if let Ok(mut results) = results.lock() {
                        results.push((idx, report));
                    }
                });
            }
        });

        let mut results = results.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, report)| report).collect()
    }

    fn run_task(&self, task: &TaskDescriptor) -> TaskReport {
        let report = match self.try_run_task(task) {
            Ok(report) => report,
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "task could not be recorded");
                TaskReport::new(&task.id, TaskOutcome::Failed).with_error(err.to_string())
            }
        };

        let kind = match report.outcome {
            TaskOutcome::Completed => EventKind::TaskCompleted,
            TaskOutcome::Errored | TaskOutcome::Failed => EventKind::TaskErrored,
            TaskOutcome::Skipped => EventKind::TaskSkipped,
            TaskOutcome::Busy => EventKind::TaskBusy,
        };
        self.emit(kind, &report);
        report
    }

    fn try_run_task(&self, task: &TaskDescriptor) -> Result<TaskReport> {
        if self.store.exists(&task.id) {
            debug!(task_id = %task.id, "result exists, skipping");
            return Ok(TaskReport::new(&task.id, TaskOutcome::Skipped));
        }

        let Some(_claim) = self.store.try_claim(&task.id)? else {
            info!(task_id = %task.id, "claimed by another process");
            return Ok(TaskReport::new(&task.id, TaskOutcome::Busy));
        };

        // Another process may have finished it before we got the claim.
        if self.store.exists(&task.id) {
            return Ok(TaskReport::new(&task.id, TaskOutcome::Skipped));
        }

        info!(task_id = %task.id, "running task");
        let record = self.execute(task)?;
        let outcome = if record.is_completed() {
            TaskOutcome::Completed
        } else {
            TaskOutcome::Errored
        };
        let error = record.error.clone();

        match self.store.put(&record) {
            Ok(_) => {}
            Err(Error::RecordExists(_)) => {
                warn!(task_id = %task.id, "result written by another writer, keeping it");
                return Ok(TaskReport::new(&task.id, TaskOutcome::Skipped));
            }
            Err(err) => return Err(err),
        }

        let report = TaskReport::new(&task.id, outcome);
        Ok(match error {
            Some(error) => report.with_error(error),
            None => report,
        })
    }

    /// Produce the record for one task; only scratch I/O failures are `Err`.
    fn execute(&self, task: &TaskDescriptor) -> Result<TaskResult> {
        let scratch = self.scratch_dir(&task.id);
        fs::create_dir_all(&scratch)?;

        let base = if self.jobs > 1 {
            scratch.join("work")
        } else {
            self.workdir.clone()
        };

        let work_dir = match self.preparer.prepare(task, &base) {
            Ok(dir) => dir,
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "workspace preparation failed");
                return Ok(TaskResult::errored(
                    &task.id,
                    format!("workspace preparation failed: {err}"),
                ));
            }
        };

        let request = AgentRequest {
            task_id: task.id.clone(),
            work_dir: work_dir.clone(),
            prompt_file: scratch.join(PROMPT_FILE),
            output_file: scratch.join(OUTPUT_FILE),
            log_file: scratch.join(AGENT_LOG_FILE),
        };
        fs::write(&request.prompt_file, &task.prompt)?;
        // Leftovers from an interrupted attempt must not be read as fresh output.
        if request.output_file.exists() {
            fs::remove_file(&request.output_file)?;
        }

        let started = Instant::now();
        let outcome = match self.agent.invoke(&request) {
            Ok(exit) => agent::read_outcome(&request.output_file, exit, self.agent.timeout()),
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "agent invocation failed");
                AgentOutcome::Errored {
                    session_id: String::new(),
                    error: err.to_string(),
                }
            }
        };
        let elapsed = started.elapsed().as_secs_f64();

        let record = match outcome {
            AgentOutcome::Completed {
                session_id,
                mut payload,
            } => {
                if payload.wall_time_seconds.is_none() {
                    payload.wall_time_seconds = Some(round_secs(elapsed));
                }
                if payload.git_diff.is_none() {
                    payload.git_diff = capture_diff(task, &work_dir);
                }
                let evaluation = self.evaluator.evaluate(task, &payload);
                payload.evaluation.extend(evaluation);
                TaskResult::completed(&task.id, payload).with_session(session_id)
            }
            AgentOutcome::Errored { session_id, error } => {
                warn!(task_id = %task.id, error = %error, "task errored");
                TaskResult::errored(&task.id, error).with_session(session_id)
            }
        };

        Ok(record.with_repo_dir(work_dir))
    }

    fn emit<T: Serialize>(&self, kind: EventKind, data: T) {
        let Some(events) = &self.events else {
            return;
        };
        let result = Event::new(kind, Some(&self.run_name))
            .with_data(data)
            .and_then(|event| match events.lock() {
                Ok(mut sink) => sink.emit(&event),
                Err(_) => Ok(()),
            });
        if let Err(err) = result {
            warn!(error = %err, "failed to emit event");
        }
    }
}

fn capture_diff(task: &TaskDescriptor, work_dir: &Path) -> Option<String> {
    if !matches!(task.context, TaskContext::Repository { .. }) {
        return None;
    }
    match git::working_tree_diff(work_dir) {
        Ok(diff) => Some(diff),
        Err(err) => {
            warn!(task_id = %task.id, error = %err, "could not capture git diff");
            None
        }
    }
}

fn round_secs(secs: f64) -> f64 {
    (secs * 10.0).round() / 10.0
}
