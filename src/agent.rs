//! External agent invocation
//!
//! The agent is a black box: it gets a working directory, a prompt file and
//! an output path, and may or may not leave a JSON object at the output
//! path. Everything short of a missing program is folded into an
//! [`AgentOutcome`] by the runner.

use std::env;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::Payload;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Paths for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub task_id: String,
    pub work_dir: PathBuf,
    pub prompt_file: PathBuf,
    pub output_file: PathBuf,
    /// Destination for the agent's stdout and stderr
    pub log_file: PathBuf,
}

/// How the agent process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentExit {
    /// Exited by itself; `None` when killed by a signal
    Exited(Option<i32>),
    TimedOut,
}

impl AgentExit {
    pub fn describe(&self, timeout: Option<Duration>) -> String {
        match (self, timeout) {
            (AgentExit::TimedOut, Some(limit)) => {
                format!("agent timed out after {}s", limit.as_secs())
            }
            (AgentExit::TimedOut, None) => "agent timed out".to_string(),
            (AgentExit::Exited(Some(code)), _) => format!("agent exited with status {code}"),
            (AgentExit::Exited(None), _) => "agent terminated by signal".to_string(),
        }
    }
}

/// Something that can attempt a task.
pub trait AgentInvoker: Send + Sync {
    /// Run the agent to completion (or timeout).
    ///
    /// `Err` is reserved for failures to start the agent at all.
    fn invoke(&self, request: &AgentRequest) -> Result<AgentExit>;

    /// Limit applied to each invocation, if any
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// Agent run as a subprocess:
/// `program args... <work_dir> <prompt_file> <output_file>`.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAgent {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Verify the program can be started; run before any task.
    pub fn check(&self) -> Result<PathBuf> {
        resolve_program(&self.program).ok_or_else(|| {
            Error::Precondition(format!("agent program not found: {}", self.program))
        })
    }
}

impl AgentInvoker for CommandAgent {
    fn invoke(&self, request: &AgentRequest) -> Result<AgentExit> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&request.log_file)?;
        let log_err = log.try_clone()?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&request.work_dir)
            .arg(&request.prompt_file)
            .arg(&request.output_file)
            .current_dir(&request.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|err| Error::AgentFailed(format!("failed to start {}: {err}", self.program)))?;

        debug!(task_id = %request.task_id, pid = child.id(), "agent started");

        let started = Instant::now();
        let status: ExitStatus = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                warn!(
                    task_id = %request.task_id,
                    timeout_secs = self.timeout.as_secs(),
                    "agent timed out, killing"
                );
                let _ = child.kill();
                child.wait()?;
                return Ok(AgentExit::TimedOut);
            }
            thread::sleep(POLL_INTERVAL);
        };

        Ok(AgentExit::Exited(status.code()))
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }
}

fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|full| full.is_file())
}

/// What the agent left behind, interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    Completed { session_id: String, payload: Payload },
    Errored { session_id: String, error: String },
}

impl AgentOutcome {
    pub fn session_id(&self) -> &str {
        match self {
            AgentOutcome::Completed { session_id, .. } | AgentOutcome::Errored { session_id, .. } => {
                session_id
            }
        }
    }
}

/// Interpret the agent's output file.
///
/// A missing file is an error mentioning `exit`; anything but a JSON object
/// is malformed output.
pub fn read_outcome(output_file: &Path, exit: AgentExit, timeout: Option<Duration>) -> AgentOutcome {
    let content = match fs::read_to_string(output_file) {
        Ok(content) => content,
        Err(_) => {
            let error = match exit {
                AgentExit::Exited(Some(0)) => "No output produced".to_string(),
                other => format!("No output produced ({})", other.describe(timeout)),
            };
            return AgentOutcome::Errored {
                session_id: String::new(),
                error,
            };
        }
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => outcome_from_object(map),
        Ok(_) => AgentOutcome::Errored {
            session_id: String::new(),
            error: "Malformed output: expected a JSON object".to_string(),
        },
        Err(err) => AgentOutcome::Errored {
            session_id: String::new(),
            error: format!("Malformed output: {err}"),
        },
    }
}

fn outcome_from_object(mut map: Map<String, Value>) -> AgentOutcome {
    let session_id = match map.remove("session_id") {
        Some(Value::String(id)) => id,
        _ => String::new(),
    };
    let is_error = matches!(map.remove("is_error"), Some(Value::Bool(true)));
    let error = match map.remove("error") {
        Some(Value::String(message)) if !message.is_empty() => Some(message),
        _ => None,
    };

    if is_error || error.is_some() {
        return AgentOutcome::Errored {
            session_id,
            error: error.unwrap_or_else(|| "agent reported an error".to_string()),
        };
    }

    match serde_json::from_value::<Payload>(Value::Object(map)) {
        Ok(payload) => AgentOutcome::Completed {
            session_id,
            payload,
        },
        Err(err) => AgentOutcome::Errored {
            session_id,
            error: format!("Malformed output: {err}"),
        },
    }
}
