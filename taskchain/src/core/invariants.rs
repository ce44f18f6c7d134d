//! Structural invariants for sub-task id sequences.

use std::collections::BTreeSet;

use crate::core::types::{AtomicSubtask, SubtaskId};

/// Check that sub-task ids form the contiguous sequence `1..=N`.
///
/// Returns stable error messages; empty means the sequence is valid.
pub fn validate_subtask_ids(subtasks: &[AtomicSubtask]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = BTreeSet::new();
    for subtask in subtasks {
        if !seen.insert(subtask.id) {
            errors.push(format!("duplicate sub-task id {}", subtask.id));
        }
    }

    let total = SubtaskId::try_from(subtasks.len()).unwrap_or(SubtaskId::MAX);
    for id in &seen {
        if *id == 0 || *id > total {
            errors.push(format!("sub-task id {id} outside 1..={total}"));
        }
    }
    for expected in 1..=total {
        if !seen.contains(&expected) {
            errors.push(format!("missing sub-task id {expected}"));
        }
    }

    errors
}
