//! Settlement rules: verdict folding, rewrite acceptance, checkpoint naming and
//! final-answer derivation.

use crate::core::types::{Outcome, SubtaskId, TaskSpec, Verdict};

/// Decomposition artifact written by the decomposer.
pub const ORIGINAL_CHECKPOINT: &str = "Task_Split_Original.json";
/// Checkpoint written after normal completion.
pub const FINAL_CHECKPOINT: &str = "Task_Split_Final.json";
/// Rationale recorded for sub-tasks without ground truth.
pub const SKIP_RATIONALE: &str = "Validation skipped or no ground truth";
/// Final answer when no sub-task settled as `pass` or `skip`.
pub const NO_FINAL_ANSWER: &str = "Error: no sub-task settled successfully; final answer unavailable";

/// Fold an optional verdict into an outcome and rationale.
///
/// `None` means no ground truth was supplied, which settles as [`Outcome::Skip`].
pub fn settle_verdict(verdict: Option<Verdict>) -> (Outcome, String) {
    match verdict {
        None => (Outcome::Skip, SKIP_RATIONALE.to_string()),
        Some(Verdict {
            status: true,
            description,
        }) => (Outcome::Pass, description),
        Some(Verdict {
            status: false,
            description,
        }) => (Outcome::Fail, description),
    }
}

/// Checkpoint file name for a settled sub-task.
pub fn checkpoint_name(id: SubtaskId, outcome: Outcome) -> String {
    match outcome {
        Outcome::Pass => format!("Task_Split_{id}.json"),
        Outcome::Skip => format!("Task_Split_{id}_Unvalidated.json"),
        Outcome::Fail => format!("Task_Split_{id}_Failed.json"),
    }
}

/// Decide whether a proposed description replaces the original.
///
/// Returns the accepted description, or `None` when the proposal is missing,
/// blank, or identical to the original (after trimming the proposal).
pub fn accept_rewrite(original: &str, proposed: Option<&str>) -> Option<String> {
    let candidate = proposed?.trim();
    if candidate.is_empty() || candidate == original {
        return None;
    }
    Some(candidate.to_string())
}

/// Answer of the last sub-task that settled as `pass` or `skip`.
///
/// Falls back to [`NO_FINAL_ANSWER`] when nothing settled successfully.
pub fn final_answer(spec: &TaskSpec) -> String {
    let mut ordered: Vec<_> = spec.subtasks.iter().collect();
    ordered.sort_by_key(|s| s.id);
    ordered
        .into_iter()
        .rev()
        .find(|s| s.status.outcome().is_some_and(Outcome::advances))
        .map_or_else(|| NO_FINAL_ANSWER.to_string(), |s| s.answer.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{settled, subtask, task_spec};

    #[test]
    fn absent_verdict_settles_as_skip() {
        let (outcome, rationale) = settle_verdict(None);
        assert_eq!(outcome, Outcome::Skip);
        assert_eq!(rationale, SKIP_RATIONALE);
    }

    #[test]
    fn verdict_status_maps_to_pass_and_fail() {
        let (pass, _) = settle_verdict(Some(Verdict {
            status: true,
            description: "match".to_string(),
        }));
        assert_eq!(pass, Outcome::Pass);
        let (fail, why) = settle_verdict(Some(Verdict::failure("numbers differ")));
        assert_eq!(fail, Outcome::Fail);
        assert_eq!(why, "numbers differ");
    }

    #[test]
    fn checkpoint_names_follow_outcome() {
        assert_eq!(checkpoint_name(1, Outcome::Pass), "Task_Split_1.json");
        assert_eq!(checkpoint_name(2, Outcome::Skip), "Task_Split_2_Unvalidated.json");
        assert_eq!(checkpoint_name(3, Outcome::Fail), "Task_Split_3_Failed.json");
    }

    /// Verifies the rewrite idempotence law: blank or unchanged proposals are no-ops.
    #[test]
    fn rewrite_is_noop_for_blank_or_identical_proposals() {
        assert_eq!(accept_rewrite("book a table", None), None);
        assert_eq!(accept_rewrite("book a table", Some("   ")), None);
        assert_eq!(accept_rewrite("book a table", Some("book a table")), None);
        assert_eq!(accept_rewrite("book a table", Some("  book a table\n")), None);
        assert_eq!(
            accept_rewrite("book a table", Some(" book a table at Luigi's \n")),
            Some("book a table at Luigi's".to_string())
        );
    }

    #[test]
    fn final_answer_is_last_successful_answer() {
        let spec = task_spec(vec![
            settled(1, "a", "first", Outcome::Pass),
            settled(2, "b", "second", Outcome::Skip),
            settled(3, "c", "third", Outcome::Fail),
        ]);
        assert_eq!(final_answer(&spec), "second");
    }

    #[test]
    fn final_answer_is_explicit_error_when_nothing_settled() {
        let spec = task_spec(vec![
            subtask(1, "a"),
            settled(2, "b", "wrong", Outcome::Fail),
        ]);
        assert_eq!(final_answer(&spec), NO_FINAL_ANSWER);
    }
}
