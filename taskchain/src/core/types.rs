//! Wire types for decomposition artifacts, checkpoints and verdicts.
//!
//! Field names follow the on-disk JSON (`Task`, `atomic_tasks_ID`, ...) so
//! checkpoints stay readable by the external backends and tooling.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Sub-task identifier. Contiguous from 1 within one [`TaskSpec`].
pub type SubtaskId = u32;

/// Backend name assigned when the planning model picks nothing usable.
pub const NOT_SELECTED: &str = "Not Selected";
/// Device tag paired with [`NOT_SELECTED`].
pub const UNKNOWN_DEVICE: &str = "Unknown";

/// A decomposed task: the unit every checkpoint snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(rename = "Task")]
    pub task: String,
    #[serde(rename = "Task_ID", deserialize_with = "string_or_number")]
    pub task_id: String,
    #[serde(rename = "atomic_tasks_numbers", default)]
    pub subtask_count: usize,
    #[serde(rename = "atomic_tasks")]
    pub subtasks: Vec<AtomicSubtask>,
    #[serde(default)]
    pub final_answer: String,
}

impl TaskSpec {
    pub fn subtask(&self, id: SubtaskId) -> Option<&AtomicSubtask> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    pub fn subtask_mut(&mut self, id: SubtaskId) -> Option<&mut AtomicSubtask> {
        self.subtasks.iter_mut().find(|s| s.id == id)
    }
}

/// One indivisible unit of work bound to a single backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicSubtask {
    #[serde(rename = "atomic_tasks_ID")]
    pub id: SubtaskId,
    #[serde(rename = "atomic_tasks_description")]
    pub description: String,
    #[serde(rename = "atomic_tasks_answer", default)]
    pub answer: String,
    #[serde(rename = "atomic_tasks_status", default)]
    pub status: SubtaskStatus,
    #[serde(rename = "atomic_tasks_agent")]
    pub backend: String,
    #[serde(rename = "atomic_tasks_device")]
    pub device: String,
}

impl AtomicSubtask {
    pub fn is_settled(&self) -> bool {
        matches!(self.status, SubtaskStatus::Validated { .. })
    }
}

/// Lifecycle status of a sub-task.
///
/// On disk a pending sub-task carries the string `"pending"`; a settled one
/// carries `{"status": true|false|null, "description": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StatusRepr", into = "StatusRepr")]
pub enum SubtaskStatus {
    #[default]
    Pending,
    Validated { outcome: Outcome, rationale: String },
}

impl SubtaskStatus {
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::Pending => None,
            Self::Validated { outcome, .. } => Some(*outcome),
        }
    }
}

/// How a sub-task settled after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Judge confirmed the answer.
    Pass,
    /// No ground truth; progress continues but nothing was checked.
    Skip,
    /// Judge rejected the answer, or the backend never produced one.
    Fail,
}

impl Outcome {
    /// `pass` and `skip` both let the pipeline move forward.
    pub fn advances(self) -> bool {
        matches!(self, Self::Pass | Self::Skip)
    }

    fn status_flag(self) -> Option<bool> {
        match self {
            Self::Pass => Some(true),
            Self::Fail => Some(false),
            Self::Skip => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pass => "pass",
            Self::Skip => "skip",
            Self::Fail => "fail",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StatusRepr {
    Label(String),
    Record {
        status: Option<bool>,
        description: String,
    },
}

impl TryFrom<StatusRepr> for SubtaskStatus {
    type Error = String;

    fn try_from(repr: StatusRepr) -> Result<Self, Self::Error> {
        match repr {
            StatusRepr::Label(label) if label == "pending" => Ok(Self::Pending),
            StatusRepr::Label(label) => Err(format!("unknown sub-task status '{label}'")),
            StatusRepr::Record {
                status,
                description,
            } => {
                let outcome = match status {
                    Some(true) => Outcome::Pass,
                    Some(false) => Outcome::Fail,
                    None => Outcome::Skip,
                };
                Ok(Self::Validated {
                    outcome,
                    rationale: description,
                })
            }
        }
    }
}

impl From<SubtaskStatus> for StatusRepr {
    fn from(status: SubtaskStatus) -> Self {
        match status {
            SubtaskStatus::Pending => Self::Label("pending".to_string()),
            SubtaskStatus::Validated { outcome, rationale } => Self::Record {
                status: outcome.status_flag(),
                description: rationale,
            },
        }
    }
}

/// Structured judgment returned by the answer validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: bool,
    pub description: String,
}

impl Verdict {
    /// Canonical failure verdict carrying a diagnostic.
    pub fn failure(description: impl Into<String>) -> Self {
        Self {
            status: false,
            description: description.into(),
        }
    }
}

/// One backend/device pair the planning model may choose from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "agent_name")]
    pub name: String,
    #[serde(rename = "operating_device")]
    pub device: String,
}

/// Accept an identifier written either as a JSON string or a JSON number.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    })
}
