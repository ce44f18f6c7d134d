//! Typed error taxonomy for the pipeline components.
//!
//! Each component owns one enum. Orchestration code and the CLI wrap these in
//! `anyhow` with context; component boundaries stay typed so callers can decide
//! between halting and degrading.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::types::SubtaskId;
use crate::io::process::Escalation;

/// Failures of the chat-completions transport.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model call timed out")]
    Timeout,
    #[error("could not connect to model endpoint: {0}")]
    Connect(String),
    #[error("model endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("model transport error: {0}")]
    Transport(String),
    #[error("model returned empty content")]
    EmptyContent,
}

/// Failures of task decomposition. All of them abort before any execution begins.
#[derive(Debug, Error)]
pub enum DecomposeError {
    #[error("planning model call failed: {0}")]
    Network(#[from] LlmError),
    #[error("render decomposition prompt: {0}")]
    Prompt(String),
    #[error("unparsable decomposition: {0}")]
    Parse(String),
    #[error("decomposition failed schema check: {0}")]
    Schema(String),
    #[error("persist decomposition: {0}")]
    Persist(String),
}

/// Failures inside the answer validator.
///
/// These never cross the validator boundary; they are folded into a failure verdict.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("judge model call failed: {0}")]
    Network(#[from] LlmError),
    #[error("render judge prompt: {0}")]
    Prompt(String),
    #[error("unparsable judge response: {0}")]
    Parse(String),
    #[error("judge response failed schema check: {0}")]
    Schema(String),
}

/// Failures of a single backend dispatch. All of them are fatal to the pipeline.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),
    #[error("backend '{backend}' cannot accept sub-task id {id}: {reason}")]
    InvalidId {
        backend: String,
        id: String,
        reason: String,
    },
    #[error("failed to launch backend '{backend}': {message}")]
    Spawn { backend: String, message: String },
    #[error("backend '{backend}' timed out after {timeout:?} ({escalation:?}, exit code {exit_code})")]
    Timeout {
        backend: String,
        timeout: Duration,
        escalation: Escalation,
        exit_code: i32,
        output: String,
    },
    #[error("backend '{backend}' exited with code {code}")]
    NonZeroExit {
        backend: String,
        code: i32,
        output: String,
    },
    #[error("answer artifact missing at {}", .0.display())]
    MissingArtifact(PathBuf),
    #[error("answer artifact {} is invalid: {reason}", path.display())]
    InvalidArtifact { path: PathBuf, reason: String },
}

/// Failures of the execution loop itself.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("load decomposition: {0}")]
    Load(String),
    #[error("no sub-task with id {id} (expected ids 1..={total})")]
    IdGap { id: SubtaskId, total: usize },
    #[error("sub-task {subtask_id} dispatch failed: {source}")]
    Dispatch {
        subtask_id: SubtaskId,
        #[source]
        source: DispatchError,
    },
    #[error("{} was already executed (found {})", dir.display(), existing.join(", "))]
    AlreadyExecuted { dir: PathBuf, existing: Vec<String> },
    #[error("write checkpoint {name}: {message}")]
    Checkpoint { name: String, message: String },
    #[error("settled sub-task history changed: {0}")]
    Frozen(String),
}
