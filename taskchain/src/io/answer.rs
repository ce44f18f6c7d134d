//! Backend answer artifacts (`<log_dir>/<id>/task_answer.json`).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::SubtaskId;
use crate::error::DispatchError;
use crate::io::schema::{TASK_ANSWER_SCHEMA, validate_schema};

/// Answer file written by an external executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAnswer {
    pub answer: String,
}

/// Per-sub-task directory the backend writes into.
pub fn subtask_dir(log_dir: &Path, id: SubtaskId) -> PathBuf {
    log_dir.join(id.to_string())
}

pub fn answer_path(log_dir: &Path, id: SubtaskId) -> PathBuf {
    subtask_dir(log_dir, id).join("task_answer.json")
}

/// Read the answer a backend produced for sub-task `id`.
pub fn read_answer(log_dir: &Path, id: SubtaskId) -> Result<String, DispatchError> {
    let path = answer_path(log_dir, id);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(DispatchError::MissingArtifact(path));
        }
        Err(err) => {
            return Err(DispatchError::InvalidArtifact {
                path,
                reason: err.to_string(),
            });
        }
    };
    let invalid = |reason: String| DispatchError::InvalidArtifact {
        path: path.clone(),
        reason,
    };
    let value: Value = serde_json::from_str(&contents).map_err(|err| invalid(err.to_string()))?;
    validate_schema(TASK_ANSWER_SCHEMA, "task answer", &value)
        .map_err(|err| invalid(format!("{err:#}")))?;
    let artifact: TaskAnswer =
        serde_json::from_value(value).map_err(|err| invalid(err.to_string()))?;
    Ok(artifact.answer)
}

/// Write an answer artifact the way a backend would.
pub fn write_answer(log_dir: &Path, id: SubtaskId, answer: &str) -> anyhow::Result<PathBuf> {
    let dir = subtask_dir(log_dir, id);
    fs::create_dir_all(&dir).with_context(|| format!("create directory {}", dir.display()))?;
    let path = dir.join("task_answer.json");
    let mut buf = serde_json::to_string_pretty(&TaskAnswer {
        answer: answer.to_string(),
    })?;
    buf.push('\n');
    fs::write(&path, buf).with_context(|| format!("write answer {}", path.display()))?;
    Ok(path)
}
