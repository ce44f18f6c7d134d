//! Frozen-history checks between consecutive checkpoints.

use std::collections::HashMap;

use crate::core::types::{AtomicSubtask, SubtaskId, TaskSpec};

/// Validate that sub-tasks settled in `prev` are unchanged in `next`.
///
/// For each settled sub-task in `prev`, this check enforces:
/// - The sub-task still exists in `next`.
/// - Its description, answer, status and backend are identical.
///
/// Returns a list of stable error messages (sorted by sub-task id).
pub fn check_settled_subtask_immutability(prev: &TaskSpec, next: &TaskSpec) -> Vec<String> {
    let mut settled: Vec<&AtomicSubtask> = prev.subtasks.iter().filter(|s| s.is_settled()).collect();
    settled.sort_by_key(|s| s.id);

    let next_index: HashMap<SubtaskId, &AtomicSubtask> =
        next.subtasks.iter().map(|s| (s.id, s)).collect();

    let mut errors = Vec::new();
    for before in settled {
        match next_index.get(&before.id) {
            None => errors.push(format!("settled sub-task {} missing in next snapshot", before.id)),
            Some(after) => {
                if after.description != before.description {
                    errors.push(format!("settled sub-task {} description changed", before.id));
                }
                if after.answer != before.answer {
                    errors.push(format!("settled sub-task {} answer changed", before.id));
                }
                if after.status != before.status || after.backend != before.backend {
                    errors.push(format!("settled sub-task {} changed in next snapshot", before.id));
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Outcome;
    use crate::test_support::{settled, subtask, task_spec};

    #[test]
    fn identical_settled_subtasks_pass() {
        let prev = task_spec(vec![settled(1, "a", "ans", Outcome::Pass), subtask(2, "b")]);
        let next = prev.clone();
        assert!(check_settled_subtask_immutability(&prev, &next).is_empty());
    }

    #[test]
    fn changed_answer_is_reported() {
        let prev = task_spec(vec![settled(1, "a", "ans", Outcome::Pass), subtask(2, "b")]);
        let mut next = prev.clone();
        next.subtasks[0].answer = "other".to_string();
        let errors = check_settled_subtask_immutability(&prev, &next);
        assert_eq!(errors, vec!["settled sub-task 1 answer changed".to_string()]);
    }

    #[test]
    fn changed_description_is_reported() {
        let prev = task_spec(vec![settled(1, "a", "ans", Outcome::Skip)]);
        let mut next = prev.clone();
        next.subtasks[0].description = "rewritten".to_string();
        let errors = check_settled_subtask_immutability(&prev, &next);
        assert!(errors.iter().any(|e| e.contains("description changed")));
    }

    #[test]
    fn missing_settled_subtask_is_reported() {
        let prev = task_spec(vec![settled(1, "a", "ans", Outcome::Pass)]);
        let next = task_spec(vec![subtask(2, "b")]);
        let errors = check_settled_subtask_immutability(&prev, &next);
        assert!(errors.iter().any(|e| e.contains("missing")));
    }

    /// Pending sub-tasks may be rewritten freely.
    #[test]
    fn pending_subtasks_can_change() {
        let prev = task_spec(vec![settled(1, "a", "ans", Outcome::Pass), subtask(2, "b")]);
        let mut next = prev.clone();
        next.subtasks[1].description = "refined b".to_string();
        assert!(check_settled_subtask_immutability(&prev, &next).is_empty());
    }
}
