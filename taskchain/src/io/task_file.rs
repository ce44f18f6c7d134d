//! Input task files carrying the instruction and per-sub-task ground truth.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::types::{SubtaskId, string_or_number};

/// A benchmark task as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFile {
    #[serde(rename = "Task")]
    pub task: String,
    #[serde(rename = "Task_ID", deserialize_with = "string_or_number")]
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atomic_tasks_number: Option<u32>,
    #[serde(default)]
    pub atomic_tasks_answer: Vec<GroundTruthEntry>,
    #[serde(default)]
    pub final_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthEntry {
    #[serde(rename = "atomic_tasks_ID", deserialize_with = "subtask_id_lenient")]
    pub id: SubtaskId,
    #[serde(default, deserialize_with = "answer_text")]
    pub answer: String,
}

impl TaskFile {
    /// Ground truth keyed by sub-task id. Blank answers count as absent.
    pub fn ground_truth(&self) -> BTreeMap<SubtaskId, String> {
        self.atomic_tasks_answer
            .iter()
            .filter(|entry| !entry.answer.trim().is_empty())
            .map(|entry| (entry.id, entry.answer.clone()))
            .collect()
    }
}

pub fn load_task_file(path: &Path) -> Result<TaskFile> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read task {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse task {}", path.display()))
}

fn subtask_id_lenient<'de, D>(deserializer: D) -> Result<SubtaskId, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = string_or_number(deserializer)?;
    raw.trim()
        .parse()
        .map_err(|_| serde::de::Error::custom(format!("invalid atomic_tasks_ID '{raw}'")))
}

/// Ground truth may be a string, a number or a boolean; `null` means none.
fn answer_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "answer must be a string or number, got {other}"
        ))),
    }
}
