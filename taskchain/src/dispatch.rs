//! Backend dispatch: one sub-task → one supervised external executor run.
//!
//! The [`Dispatcher`] trait decouples the coordinator from process spawning.
//! Tests use scripted dispatchers that write answer artifacts directly.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, instrument, warn};

use crate::core::transcript::{last_action, parse_transcript};
use crate::core::types::SubtaskId;
use crate::error::DispatchError;
use crate::io::config::{BackendContract, DispatchSettings, IdType, PipelineConfig};
use crate::io::process::{CancelToken, Ending, Supervision, run_supervised};

/// Sub-task id as handed to a dispatcher, before per-backend coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtaskIdArg {
    Int(i64),
    Text(String),
}

impl From<SubtaskId> for SubtaskIdArg {
    fn from(id: SubtaskId) -> Self {
        Self::Int(i64::from(id))
    }
}

impl fmt::Display for SubtaskIdArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Parameters for one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchRequest<'a> {
    pub backend: &'a str,
    pub log_dir: &'a Path,
    pub instruction: &'a str,
    pub subtask_id: SubtaskIdArg,
}

/// Abstraction over backend execution.
pub trait Dispatcher {
    /// Run the backend to completion. On success the backend has exited with
    /// code 0; its answer artifact is read separately by the caller.
    fn dispatch(&self, request: &DispatchRequest<'_>) -> Result<i32, DispatchError>;
}

/// Coerce an id to what a contract expects.
pub fn coerce_subtask_id(
    backend: &str,
    id: &SubtaskIdArg,
    id_type: IdType,
) -> Result<String, DispatchError> {
    let invalid = |reason: &str| DispatchError::InvalidId {
        backend: backend.to_string(),
        id: id.to_string(),
        reason: reason.to_string(),
    };
    match (id_type, id) {
        (IdType::Int, SubtaskIdArg::Int(n)) => Ok(n.to_string()),
        (IdType::Int, SubtaskIdArg::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(|n| n.to_string())
            .map_err(|_| invalid("expected an integer")),
        (IdType::String, SubtaskIdArg::Int(n)) => Ok(n.to_string()),
        (IdType::String, SubtaskIdArg::Text(s)) if s.trim().is_empty() => {
            Err(invalid("expected a non-empty string"))
        }
        (IdType::String, SubtaskIdArg::Text(s)) => Ok(s.clone()),
    }
}

/// Substitute `{instruction}`, `{log_dir}` and `{subtask_id}` in each argument.
pub fn render_args(
    template: &[String],
    instruction: &str,
    log_dir: &Path,
    id: &str,
) -> Vec<String> {
    let log_dir = log_dir.to_string_lossy();
    template
        .iter()
        .map(|arg| {
            arg.replace("{log_dir}", &log_dir)
                .replace("{subtask_id}", id)
                .replace("{instruction}", instruction)
        })
        .collect()
}

/// Dispatcher that spawns configured external executors.
pub struct BackendDispatcher {
    backends: BTreeMap<String, BackendContract>,
    settings: DispatchSettings,
    cancel: CancelToken,
}

impl BackendDispatcher {
    pub fn new(backends: BTreeMap<String, BackendContract>, settings: DispatchSettings) -> Self {
        Self {
            backends,
            settings,
            cancel: CancelToken::new(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.backends.clone(), config.dispatch.clone())
    }

    /// Token that stops the in-flight backend through the normal escalation.
    ///
    /// A cancel stops one dispatch: the running one, or the next one if
    /// nothing is running. That dispatch clears it again.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn write_backend_log(&self, path: &Path, output: &str, notice: &str) {
        let result = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::write(path, format!("{output}{notice}")));
        if let Err(err) = result {
            warn!(path = %path.display(), err = %err, "write backend log");
        }
    }
}

impl Dispatcher for BackendDispatcher {
    #[instrument(skip_all, fields(backend = request.backend, subtask_id = %request.subtask_id))]
    fn dispatch(&self, request: &DispatchRequest<'_>) -> Result<i32, DispatchError> {
        let backend = request.backend;
        let contract = self
            .backends
            .get(backend)
            .ok_or_else(|| DispatchError::UnknownBackend(backend.to_string()))?;
        let id = coerce_subtask_id(backend, &request.subtask_id, contract.id_type)?;
        let log_dir: PathBuf =
            std::path::absolute(request.log_dir).map_err(|err| DispatchError::Spawn {
                backend: backend.to_string(),
                message: format!("resolve log dir {}: {err}", request.log_dir.display()),
            })?;

        let mut cmd = Command::new(&contract.program);
        cmd.args(render_args(&contract.args, request.instruction, &log_dir, &id));
        if let Some(workdir) = &contract.workdir {
            cmd.current_dir(workdir);
        }

        let supervision = Supervision {
            timeout: contract.timeout(),
            grace_period: self.settings.grace_period(),
            output_limit_bytes: self.settings.output_limit_bytes,
            channel_capacity: self.settings.channel_capacity,
            cancel: self.cancel.clone(),
        };
        info!(
            program = %contract.program,
            timeout_secs = contract.timeout_secs,
            "dispatching backend"
        );
        let run = run_supervised(cmd, &supervision).map_err(|err| DispatchError::Spawn {
            backend: backend.to_string(),
            message: format!("{err:#}"),
        })?;

        if run.ending == Ending::Cancelled {
            self.cancel.take();
        }

        let output = run.output_lossy();
        let log_path = backend_log_path(&log_dir, &request.subtask_id);
        self.write_backend_log(&log_path, &output, &run.truncated_notice(backend));

        match last_action(&parse_transcript(&output)) {
            Some(action) => debug!(action, "backend last action"),
            None => debug!("backend output has no tagged action"),
        }

        match run.ending {
            Ending::TimedOut | Ending::Cancelled => {
                warn!(
                    ending = ?run.ending,
                    escalation = ?run.escalation,
                    exit_code = run.exit_code,
                    "backend stopped before finishing"
                );
                Err(DispatchError::Timeout {
                    backend: backend.to_string(),
                    timeout: contract.timeout(),
                    escalation: run.escalation,
                    exit_code: run.exit_code,
                    output,
                })
            }
            Ending::Exited if run.exit_code != 0 => {
                warn!(exit_code = run.exit_code, "backend failed");
                Err(DispatchError::NonZeroExit {
                    backend: backend.to_string(),
                    code: run.exit_code,
                    output,
                })
            }
            Ending::Exited => {
                debug!("backend completed");
                Ok(run.exit_code)
            }
        }
    }
}

/// Captured output of the backend run for sub-task `id`.
pub fn backend_log_path(log_dir: &Path, id: &impl fmt::Display) -> PathBuf {
    log_dir.join(id.to_string()).join("backend.log")
}
