//! Task decomposer: planning model → normalized, persisted [`TaskSpec`].

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info, instrument, warn};

use crate::core::extract::extract_json_object;
use crate::core::normalize::normalize_decomposition;
use crate::core::settle::ORIGINAL_CHECKPOINT;
use crate::core::types::CatalogEntry;
use crate::error::DecomposeError;
use crate::io::checkpoint::write_checkpoint;
use crate::io::llm::{ChatMessage, ChatModel};
use crate::io::prompt::PromptEngine;
use crate::io::schema::{TASK_SPLIT_SCHEMA, validate_schema};

const MAX_DIR_ATTEMPTS: u32 = 100;

/// Splits an instruction into backend-tagged sub-tasks.
pub struct TaskDecomposer<M> {
    model: M,
    log_root: PathBuf,
}

impl<M: ChatModel> TaskDecomposer<M> {
    pub fn new(model: M, log_root: impl Into<PathBuf>) -> Self {
        Self {
            model,
            log_root: log_root.into(),
        }
    }

    /// Decompose `instruction` and persist `Task_Split_Original.json`.
    ///
    /// Returns the fresh decomposition directory. Nothing is written unless
    /// extraction, normalization and the schema check all succeed.
    #[instrument(skip_all, fields(task_id = %task_id, model = self.model.model_name()))]
    pub fn decompose(
        &self,
        instruction: &str,
        task_id: &str,
        catalog: &[CatalogEntry],
    ) -> Result<PathBuf, DecomposeError> {
        let system = PromptEngine::new()
            .and_then(|prompts| prompts.render_decomposer(catalog))
            .map_err(|err| DecomposeError::Prompt(format!("{err:#}")))?;
        let messages = [
            ChatMessage::system(system),
            ChatMessage::user(format!("Task: {instruction}")),
        ];

        info!(catalog = catalog.len(), "requesting decomposition");
        let content = self.model.complete(&messages)?;
        debug!(content_len = content.len(), "decomposition received");

        let raw =
            extract_json_object(&content).map_err(|err| DecomposeError::Parse(err.to_string()))?;
        let normalized = normalize_decomposition(&raw, instruction, task_id, catalog)
            .map_err(|err| DecomposeError::Schema(err.to_string()))?;

        for position in &normalized.skipped_positions {
            warn!(position, "dropping non-object sub-task entry");
        }
        for unknown in &normalized.unknown_backends {
            warn!(
                subtask_id = unknown.subtask_id,
                backend = %unknown.backend,
                "backend not in catalog, marking as not selected"
            );
        }
        for mismatch in &normalized.device_mismatches {
            warn!(
                subtask_id = mismatch.subtask_id,
                backend = %mismatch.backend,
                declared = %mismatch.declared,
                expected = %mismatch.expected,
                "device does not match catalog; keeping declared device"
            );
        }

        let spec = normalized.spec;
        let value =
            serde_json::to_value(&spec).map_err(|err| DecomposeError::Schema(err.to_string()))?;
        validate_schema(TASK_SPLIT_SCHEMA, "task split", &value)
            .map_err(|err| DecomposeError::Schema(format!("{err:#}")))?;

        let dir = self.create_run_dir(task_id)?;
        if let Err(err) = write_checkpoint(&dir, ORIGINAL_CHECKPOINT, &spec) {
            let _ = fs::remove_dir_all(&dir);
            return Err(DecomposeError::Persist(format!("{err:#}")));
        }

        info!(
            dir = %dir.display(),
            subtasks = spec.subtask_count,
            "decomposition persisted"
        );
        Ok(dir)
    }

    /// Create `<log_root>/<model>/<task_id>/<timestamp>`, suffixing on collision.
    fn create_run_dir(&self, task_id: &str) -> Result<PathBuf, DecomposeError> {
        let parent = runs_parent(&self.log_root, self.model.model_name(), task_id);
        fs::create_dir_all(&parent).map_err(|err| {
            DecomposeError::Persist(format!("create directory {}: {err}", parent.display()))
        })?;

        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        for attempt in 1..=MAX_DIR_ATTEMPTS {
            let name = if attempt == 1 {
                stamp.clone()
            } else {
                format!("{stamp}_{attempt}")
            };
            let candidate = parent.join(name);
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(DecomposeError::Persist(format!(
                        "create directory {}: {err}",
                        candidate.display()
                    )));
                }
            }
        }
        Err(DecomposeError::Persist(format!(
            "no free run directory under {}",
            parent.display()
        )))
    }
}

/// Keep alphanumerics, `-` and `_`; replace everything else with `_`.
pub fn safe_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Directory that holds every decomposition run for one (model, task) pair.
pub fn runs_parent(log_root: &Path, model: &str, task_id: &str) -> PathBuf {
    log_root
        .join(safe_component(model))
        .join(safe_component(task_id))
}
