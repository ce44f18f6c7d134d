//! Normalize raw planning-model output into a [`TaskSpec`].
//!
//! The model's object is loosely shaped: ids may be missing or stringly typed,
//! fields may be absent, and backend names may not exist. Normalization fills
//! defaults, reconciles backends against the catalog, and enforces the id
//! invariant before anything is persisted.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::invariants::validate_subtask_ids;
use crate::core::types::{
    AtomicSubtask, CatalogEntry, NOT_SELECTED, SubtaskId, SubtaskStatus, TaskSpec, UNKNOWN_DEVICE,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("decomposition has no `atomic_tasks` array")]
    MissingSubtasks,
    #[error("decomposition contains no sub-tasks")]
    Empty,
    #[error("sub-task at position {position} has invalid id {value}")]
    InvalidId { position: usize, value: String },
    #[error("sub-task ids are not contiguous: {0}")]
    Ids(String),
}

/// A backend the catalog knows, declared with a device the catalog disagrees with.
///
/// Reported, never corrected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMismatch {
    pub subtask_id: SubtaskId,
    pub backend: String,
    pub declared: String,
    pub expected: String,
}

/// A sub-task whose backend was replaced by [`NOT_SELECTED`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBackend {
    pub subtask_id: SubtaskId,
    pub backend: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub spec: TaskSpec,
    pub device_mismatches: Vec<DeviceMismatch>,
    pub unknown_backends: Vec<UnknownBackend>,
    /// Positions of non-object entries that were dropped.
    pub skipped_positions: Vec<usize>,
}

/// Normalize the model's decomposition object.
///
/// `task_id` always comes from the caller; `Task` falls back to `instruction`.
/// Every sub-task starts with an empty answer and `pending` status.
pub fn normalize_decomposition(
    raw: &Map<String, Value>,
    instruction: &str,
    task_id: &str,
    catalog: &[CatalogEntry],
) -> Result<Normalized, NormalizeError> {
    let items = raw
        .get("atomic_tasks")
        .and_then(Value::as_array)
        .ok_or(NormalizeError::MissingSubtasks)?;

    let mut subtasks = Vec::with_capacity(items.len());
    let mut device_mismatches = Vec::new();
    let mut unknown_backends = Vec::new();
    let mut skipped_positions = Vec::new();

    for (position, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            skipped_positions.push(position);
            continue;
        };

        let id = normalize_id(obj.get("atomic_tasks_ID"), position)?;
        let description = string_field(obj, "atomic_tasks_description").unwrap_or_default();
        let mut backend = non_blank_field(obj, "atomic_tasks_agent")
            .unwrap_or_else(|| NOT_SELECTED.to_string());
        let mut device = non_blank_field(obj, "atomic_tasks_device")
            .unwrap_or_else(|| UNKNOWN_DEVICE.to_string());

        match catalog.iter().find(|entry| entry.name == backend) {
            Some(entry) => {
                if entry.device != device {
                    device_mismatches.push(DeviceMismatch {
                        subtask_id: id,
                        backend: backend.clone(),
                        declared: device.clone(),
                        expected: entry.device.clone(),
                    });
                }
            }
            None => {
                if backend != NOT_SELECTED {
                    unknown_backends.push(UnknownBackend {
                        subtask_id: id,
                        backend: backend.clone(),
                    });
                }
                backend = NOT_SELECTED.to_string();
                device = UNKNOWN_DEVICE.to_string();
            }
        }

        subtasks.push(AtomicSubtask {
            id,
            description,
            answer: String::new(),
            status: SubtaskStatus::Pending,
            backend,
            device,
        });
    }

    if subtasks.is_empty() {
        return Err(NormalizeError::Empty);
    }

    let errors = validate_subtask_ids(&subtasks);
    if !errors.is_empty() {
        return Err(NormalizeError::Ids(errors.join("; ")));
    }
    subtasks.sort_by_key(|s| s.id);

    let task = string_field(raw, "Task")
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| instruction.to_string());

    Ok(Normalized {
        spec: TaskSpec {
            task,
            task_id: task_id.to_string(),
            subtask_count: subtasks.len(),
            subtasks,
            final_answer: String::new(),
        },
        device_mismatches,
        unknown_backends,
        skipped_positions,
    })
}

fn normalize_id(value: Option<&Value>, position: usize) -> Result<SubtaskId, NormalizeError> {
    let invalid = |value: &Value| NormalizeError::InvalidId {
        position,
        value: value.to_string(),
    };
    match value {
        None | Some(Value::Null) => {
            SubtaskId::try_from(position + 1).map_err(|_| NormalizeError::InvalidId {
                position,
                value: "null".to_string(),
            })
        }
        Some(v @ Value::Number(n)) => n
            .as_u64()
            .and_then(|n| SubtaskId::try_from(n).ok())
            .ok_or_else(|| invalid(v)),
        Some(v @ Value::String(s)) => s.trim().parse::<SubtaskId>().map_err(|_| invalid(v)),
        Some(v) => Err(invalid(v)),
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Like [`string_field`], but blank strings count as missing.
fn non_blank_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    string_field(obj, key).filter(|s| !s.trim().is_empty())
}
