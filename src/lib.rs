//! benchrun - resumable benchmark runner
//!
//! Runs independent benchmark tasks against an external agent process and
//! keeps exactly one write-once result per task on disk, so interrupted or
//! concurrent runs can always be resumed.
//!
//! # Core Concepts
//!
//! - **Result store**: one JSON record per task id; existence means done
//! - **Runner**: skip, claim, prepare, invoke, score, persist; failures are data
//! - **Aggregates**: predictions and summary rebuilt from the whole store
//! - **Harvest**: transcripts matched by session id and an encoded work dir
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `benchrun.toml`
//! - `error`: Error types and exit codes
//! - `model`: Task descriptors and result records
//! - `source`: Task file loading and selection
//! - `storage`: Run directory layout and the result store
//! - `lock`: File locking and atomic writes
//! - `workspace`: Working-directory preparation
//! - `git`: Checkout and diff capture using libgit2
//! - `agent`: External agent invocation
//! - `scoring`: Per-benchmark evaluators
//! - `runner`: The batch loop
//! - `aggregate`: Predictions and summary
//! - `harvest`: Transcript reconciliation
//! - `events`: JSONL event stream
//! - `output`: Human and JSON command output

pub mod agent;
pub mod aggregate;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod git;
pub mod harvest;
pub mod lock;
pub mod model;
pub mod output;
pub mod runner;
pub mod scoring;
pub mod source;
pub mod storage;
pub mod workspace;

pub use error::{Error, Result};
