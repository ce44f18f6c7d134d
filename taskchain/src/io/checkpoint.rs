//! Write-once checkpoint store for [`TaskSpec`] snapshots.
//!
//! Checkpoints are the audit trail of a run. Each is written to a temp file and
//! then hard-linked into place, so an existing checkpoint is never replaced and a
//! reader never observes a partial file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::debug;

use crate::core::settle::ORIGINAL_CHECKPOINT;
use crate::core::types::TaskSpec;
use crate::io::schema::{TASK_SPLIT_SCHEMA, validate_schema};

/// Write `spec` to `dir/name`, failing if that checkpoint already exists.
pub fn write_checkpoint(dir: &Path, name: &str, spec: &TaskSpec) -> Result<PathBuf> {
    let path = dir.join(name);
    if path.exists() {
        return Err(anyhow!("checkpoint {} already exists", path.display()));
    }
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;

    let mut buf = serde_json::to_string_pretty(spec).context("serialize checkpoint")?;
    buf.push('\n');

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp checkpoint {}", tmp_path.display()))?;
    let linked = fs::hard_link(&tmp_path, &path);
    let _ = fs::remove_file(&tmp_path);
    match linked {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            return Err(anyhow!("checkpoint {} already exists", path.display()));
        }
        Err(err) => {
            return Err(err).with_context(|| format!("publish checkpoint {}", path.display()));
        }
    }

    debug!(path = %path.display(), "checkpoint written");
    Ok(path)
}

/// Load and validate a checkpoint (schema, then typed deserialization).
pub fn load_checkpoint(path: &Path) -> Result<TaskSpec> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read checkpoint {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse checkpoint {}", path.display()))?;
    validate_schema(TASK_SPLIT_SCHEMA, "task split", &value)
        .with_context(|| format!("validate checkpoint {}", path.display()))?;
    serde_json::from_value(value)
        .with_context(|| format!("deserialize checkpoint {}", path.display()))
}

/// Names of execution checkpoints already present in `dir`, sorted.
///
/// Everything matching `Task_Split_*.json` except the decomposition itself.
pub fn existing_run_checkpoints(dir: &Path) -> Result<Vec<String>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read directory {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("Task_Split_") && name.ends_with(".json") && name != ORIGINAL_CHECKPOINT
        {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Outcome;
    use crate::test_support::{settled, subtask, task_spec};

    #[test]
    fn write_then_load_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let spec = task_spec(vec![settled(1, "a", "x", Outcome::Skip), subtask(2, "b")]);
        let path = write_checkpoint(temp.path(), "Task_Split_1_Unvalidated.json", &spec)
            .expect("write");
        assert!(fs::read_to_string(&path).expect("read").ends_with("}\n"));
        assert_eq!(load_checkpoint(&path).expect("load"), spec);
        assert!(!temp.path().join("Task_Split_1_Unvalidated.json.tmp").exists());
    }

    /// Verifies checkpoints are write-once.
    #[test]
    fn existing_checkpoint_is_never_overwritten() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = task_spec(vec![subtask(1, "a")]);
        write_checkpoint(temp.path(), "Task_Split_1.json", &first).expect("write");

        let mut second = first.clone();
        second.final_answer = "changed".to_string();
        let err = write_checkpoint(temp.path(), "Task_Split_1.json", &second).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let on_disk = load_checkpoint(&temp.path().join("Task_Split_1.json")).expect("load");
        assert_eq!(on_disk.final_answer, "");
    }

    #[test]
    fn lists_execution_checkpoints_but_not_the_original() {
        let temp = tempfile::tempdir().expect("tempdir");
        let spec = task_spec(vec![subtask(1, "a")]);
        write_checkpoint(temp.path(), ORIGINAL_CHECKPOINT, &spec).expect("original");
        assert!(existing_run_checkpoints(temp.path()).expect("list").is_empty());

        write_checkpoint(temp.path(), "Task_Split_1_Unvalidated.json", &spec).expect("write");
        write_checkpoint(temp.path(), "Task_Split_Final.json", &spec).expect("write");
        fs::write(temp.path().join("notes.json"), "{}").expect("write");
        assert_eq!(
            existing_run_checkpoints(temp.path()).expect("list"),
            vec!["Task_Split_1_Unvalidated.json", "Task_Split_Final.json"]
        );
    }

    #[test]
    fn schema_invalid_checkpoint_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("Task_Split_Original.json");
        fs::write(&path, r#"{"Task": "t", "Task_ID": "1", "atomic_tasks": []}"#).expect("write");
        let err = load_checkpoint(&path).unwrap_err();
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    #[test]
    fn missing_answer_and_status_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("Task_Split_Original.json");
        fs::write(
            &path,
            r#"{"Task": "t", "Task_ID": 3, "atomic_tasks": [
                {"atomic_tasks_ID": 1, "atomic_tasks_description": "a",
                 "atomic_tasks_agent": "pc_agent_win", "atomic_tasks_device": "windows"}
            ]}"#,
        )
        .expect("write");
        let spec = load_checkpoint(&path).expect("load");
        assert_eq!(spec.subtasks[0].answer, "");
        assert!(!spec.subtasks[0].is_settled());
    }
}
