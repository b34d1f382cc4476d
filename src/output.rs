//! Human and JSON output for CLI commands.
//!
//! JSON output is a single envelope per command:
//! `{schema_version, command, status, data | error, warnings, next_steps}`.

use serde::Serialize;

use crate::error::{exit_codes, Error, Result};

pub const SCHEMA_VERSION: &str = "benchrun.v1";

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Text rendering of a command result.
#[derive(Debug, Clone)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            summary: Vec::new(),
            details: Vec::new(),
            warnings: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl ToString) {
        self.summary.push((key.into(), value.to_string()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }

    pub fn render(&self) -> String {
        let mut lines = vec![self.header.clone()];

        if !self.summary.is_empty() {
            lines.push(String::new());
            let width = self.summary.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
            for (key, value) in &self.summary {
                lines.push(format!("  {key:<width$}  {value}"));
            }
        }
        section(&mut lines, "Details", &self.details);
        section(&mut lines, "Warnings", &self.warnings);
        section(&mut lines, "Next steps", &self.next_steps);

        lines.join("\n")
    }
}

fn section(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push(format!("{title}:"));
    lines.extend(items.iter().map(|item| format!("  - {item}")));
}

#[derive(Serialize)]
struct SuccessEnvelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    status: &'static str,
    data: &'a T,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    warnings: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    next_steps: &'a [String],
}

/// Print a command result as JSON envelope or human text.
pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        let envelope = SuccessEnvelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            data,
            warnings: human.map(|h| h.warnings.as_slice()).unwrap_or_default(),
            next_steps: human.map(|h| h.next_steps.as_slice()).unwrap_or_default(),
        };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(());
    }

    if let (false, Some(human)) = (options.quiet, human) {
        println!("{}", human.render());
    }
    Ok(())
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    schema_version: &'static str,
    command: &'a str,
    status: &'static str,
    error: ErrorBody,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    next_steps: Vec<String>,
}

/// Report a fatal command error on stdout (JSON) or stderr (human).
pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let next_steps = error_next_steps(err);

    if json {
        let envelope = ErrorEnvelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            error: ErrorBody {
                message: err.to_string(),
                code: err.exit_code(),
                kind: error_kind(err),
                details: err.details(),
            },
            next_steps,
        };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(());
    }

    eprintln!("error: {err}");
    if let Some(hint) = next_steps.first() {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

/// First positional argument, used to label errors raised before parsing.
pub fn infer_command_name_from_args() -> String {
    command_name(std::env::args().skip(1))
}

fn command_name(mut args: impl Iterator<Item = String>) -> String {
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--" => break,
            "--config" | "--runs-dir" | "--events" => {
                args.next();
            }
            flag if flag.starts_with('-') => {}
            command => return command.to_string(),
        }
    }
    "benchrun".to_string()
}

fn error_kind(err: &Error) -> &'static str {
    match err.exit_code() {
        exit_codes::USER_ERROR => "user_error",
        exit_codes::CONFLICT => "conflict",
        _ => "operation_failed",
    }
}

fn error_next_steps(err: &Error) -> Vec<String> {
    match err {
        Error::InvalidConfig(_) => vec!["fix benchrun.toml or run `benchrun init`".to_string()],
        Error::Precondition(message) if message.starts_with("agent program") => {
            vec!["set [agent].program or pass the agent after `--`".to_string()]
        }
        Error::Precondition(message) if message.starts_with("transcript archive") => {
            vec!["pass --archive-dir or set [harvest].archive_dir".to_string()]
        }
        Error::RecordExists(id) => vec![format!("delete results/{id}.json to re-run it")],
        _ => Vec::new(),
    }
}
