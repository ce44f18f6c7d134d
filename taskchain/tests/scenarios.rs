//! End-to-end execution scenarios over a real run directory.
//!
//! Drives [`ExecutionCoordinator`] with scripted judges and rewriters and
//! checks the checkpoint trail left on disk.

use std::collections::BTreeMap;
use std::path::Path;

use taskchain::coordinator::{ExecutionCoordinator, RunStop};
use taskchain::core::immutability::check_settled_subtask_immutability;
use taskchain::core::settle::{FINAL_CHECKPOINT, NO_FINAL_ANSWER, SKIP_RATIONALE};
use taskchain::core::types::{Outcome, SubtaskStatus, TaskSpec, Verdict};
use taskchain::io::checkpoint::load_checkpoint;
use taskchain::test_support::{
    ScriptedDispatcher, ScriptedJudge, ScriptedRewriter, original_in_tempdir, subtask,
};

fn three_subtasks() -> tempfile::TempDir {
    original_in_tempdir(vec![
        subtask(1, "Look up tomorrow's weather in Hangzhou"),
        subtask(2, "Pick a park suited to the weather"),
        subtask(3, "Send the park name to Alice"),
    ])
}

fn truth(entries: &[(u32, &str)]) -> BTreeMap<u32, String> {
    entries
        .iter()
        .map(|(id, answer)| (*id, (*answer).to_string()))
        .collect()
}

fn load(dir: &Path, name: &str) -> TaskSpec {
    load_checkpoint(&dir.join(name)).unwrap_or_else(|err| panic!("load {name}: {err:#}"))
}

fn json_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".json"))
        .collect();
    names.sort();
    names
}

/// Verifies a fully passing run leaves one checkpoint per step plus the final snapshot.
#[test]
fn all_pass_completes_with_last_answer() {
    let temp = three_subtasks();
    let dispatcher = ScriptedDispatcher::answering(&[(1, "Sunny"), (2, "West Lake"), (3, "sent")]);
    let judge = ScriptedJudge::new(vec![]);
    let rewriter = ScriptedRewriter::appending(" [refined]");
    let ground_truth = truth(&[(1, "sunny"), (2, "West Lake"), (3, "sent")]);

    let outcome = ExecutionCoordinator::new(&dispatcher, &judge, &rewriter)
        .execute(temp.path(), &ground_truth, |_| {})
        .expect("execute");

    assert_eq!(
        outcome.stop,
        RunStop::Completed {
            final_answer: "sent".to_string()
        }
    );
    assert_eq!(outcome.steps_executed, 3);
    assert_eq!(judge.calls(), vec![1, 2, 3]);
    assert_eq!(
        json_files(temp.path()),
        vec![
            "Task_Split_1.json",
            "Task_Split_2.json",
            "Task_Split_3.json",
            "Task_Split_Final.json",
            "Task_Split_Original.json",
        ]
    );

    let last = load(temp.path(), FINAL_CHECKPOINT);
    assert_eq!(last.final_answer, "sent");
    assert!(
        last.subtasks
            .iter()
            .all(|s| s.status.outcome() == Some(Outcome::Pass))
    );
    assert_eq!(
        dispatcher.instructions(),
        vec![
            "Look up tomorrow's weather in Hangzhou",
            "Pick a park suited to the weather [refined]",
            "Send the park name to Alice [refined]",
        ]
    );
}

/// Verifies a rejected answer halts the chain before later sub-tasks are dispatched.
#[test]
fn failure_in_the_middle_halts() {
    let temp = three_subtasks();
    let dispatcher = ScriptedDispatcher::answering(&[(1, "Sunny"), (2, "Zoo"), (3, "sent")]);
    let judge = ScriptedJudge::new(vec![(2, Verdict::failure("Zoo is not a park"))]);
    let rewriter = ScriptedRewriter::appending(" [refined]");
    let ground_truth = truth(&[(1, "sunny"), (2, "West Lake"), (3, "sent")]);

    let outcome = ExecutionCoordinator::new(&dispatcher, &judge, &rewriter)
        .execute(temp.path(), &ground_truth, |_| {})
        .expect("execute");

    assert_eq!(
        outcome.stop,
        RunStop::ValidationFailed {
            subtask_id: 2,
            rationale: "Zoo is not a park".to_string()
        }
    );
    assert_eq!(dispatcher.backends().len(), 2);
    assert!(temp.path().join("Task_Split_2_Failed.json").exists());
    let files = json_files(temp.path());
    assert!(
        !files.iter().any(|name| name.starts_with("Task_Split_3")),
        "unexpected checkpoint after halt: {files:?}"
    );
    assert!(!temp.path().join(FINAL_CHECKPOINT).exists());

    let failed = load(temp.path(), "Task_Split_2_Failed.json");
    assert_eq!(failed.subtasks[1].answer, "Zoo");
    assert_eq!(failed.subtasks[2].status, SubtaskStatus::Pending);
    assert_eq!(failed.subtasks[2].description, "Send the park name to Alice");
}

/// Verifies sub-tasks without ground truth settle as skip and never reach the judge.
#[test]
fn missing_ground_truth_skips_every_step() {
    let temp = three_subtasks();
    let dispatcher = ScriptedDispatcher::answering(&[(1, "Sunny"), (2, "West Lake"), (3, "sent")]);
    let judge = ScriptedJudge::new(vec![]);
    let rewriter = ScriptedRewriter::replying(&[]);

    let outcome = ExecutionCoordinator::new(&dispatcher, &judge, &rewriter)
        .execute(temp.path(), &BTreeMap::new(), |_| {})
        .expect("execute");

    assert!(judge.calls().is_empty());
    assert_eq!(
        outcome.stop,
        RunStop::Completed {
            final_answer: "sent".to_string()
        }
    );
    for id in 1..=3 {
        let name = format!("Task_Split_{id}_Unvalidated.json");
        assert!(temp.path().join(&name).exists(), "missing {name}");
    }
    let last = load(temp.path(), FINAL_CHECKPOINT);
    for s in &last.subtasks {
        assert_eq!(
            s.status,
            SubtaskStatus::Validated {
                outcome: Outcome::Skip,
                rationale: SKIP_RATIONALE.to_string()
            }
        );
    }
}

/// Verifies settled sub-tasks are byte-for-byte frozen across every later checkpoint.
#[test]
fn settled_history_is_frozen_across_checkpoints() {
    let temp = three_subtasks();
    let dispatcher = ScriptedDispatcher::answering(&[(1, "Sunny"), (2, "West Lake"), (3, "sent")]);
    let judge = ScriptedJudge::new(vec![]);
    let rewriter = ScriptedRewriter::appending(" [refined]");
    let ground_truth = truth(&[(2, "West Lake")]);

    ExecutionCoordinator::new(&dispatcher, &judge, &rewriter)
        .execute(temp.path(), &ground_truth, |_| {})
        .expect("execute");

    let trail = [
        "Task_Split_Original.json",
        "Task_Split_1_Unvalidated.json",
        "Task_Split_2.json",
        "Task_Split_3_Unvalidated.json",
        FINAL_CHECKPOINT,
    ]
    .map(|name| load(temp.path(), name));
    for pair in trail.windows(2) {
        let errors = check_settled_subtask_immutability(&pair[0], &pair[1]);
        assert!(errors.is_empty(), "history changed: {errors:?}");
    }
    assert_eq!(trail[4].subtasks[0].answer, "Sunny");
}

/// Verifies the final answer falls back when the last step failed validation.
#[test]
fn failed_last_step_records_fallback_final_answer() {
    let temp = original_in_tempdir(vec![subtask(1, "Only step")]);
    let dispatcher = ScriptedDispatcher::answering(&[(1, "wrong")]);
    let judge = ScriptedJudge::new(vec![(1, Verdict::failure("mismatch"))]);
    let rewriter = ScriptedRewriter::replying(&[]);

    ExecutionCoordinator::new(&dispatcher, &judge, &rewriter)
        .execute(temp.path(), &truth(&[(1, "right")]), |_| {})
        .expect("execute");

    let failed = load(temp.path(), "Task_Split_1_Failed.json");
    assert_eq!(failed.final_answer, NO_FINAL_ANSWER);
}

#[cfg(unix)]
mod overrun {
    use super::*;
    use std::time::{Duration, Instant};

    use taskchain::dispatch::BackendDispatcher;
    use taskchain::error::{CoordinatorError, DispatchError};
    use taskchain::io::config::{BackendContract, DispatchSettings, IdType};
    use taskchain::io::process::Escalation;

    fn stubborn_backend() -> BackendDispatcher {
        let mut backends = BTreeMap::new();
        backends.insert(
            "stubborn".to_string(),
            BackendContract {
                device: "linux".to_string(),
                program: "sh".to_string(),
                args: [
                    "-c",
                    "trap '' TERM; exec sleep 30",
                    "sh",
                    "{instruction}",
                    "{log_dir}",
                    "{subtask_id}",
                ]
                .map(str::to_string)
                .to_vec(),
                workdir: None,
                timeout_secs: 1,
                id_type: IdType::Int,
            },
        );
        BackendDispatcher::new(
            backends,
            DispatchSettings {
                grace_period_ms: 300,
                ..DispatchSettings::default()
            },
        )
    }

    /// Verifies a backend ignoring SIGTERM is killed after the grace period and the run halts.
    #[test]
    fn overrunning_backend_is_killed_and_run_halts() {
        let mut first = subtask(1, "Wait forever");
        first.backend = "stubborn".to_string();
        let temp = original_in_tempdir(vec![first, subtask(2, "Never reached")]);
        let dispatcher = stubborn_backend();
        let judge = ScriptedJudge::new(vec![]);
        let rewriter = ScriptedRewriter::replying(&[]);

        let started = Instant::now();
        let err = ExecutionCoordinator::new(&dispatcher, &judge, &rewriter)
            .execute(temp.path(), &BTreeMap::new(), |_| {})
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(15));

        match err {
            CoordinatorError::Dispatch {
                subtask_id,
                source: DispatchError::Timeout { escalation, .. },
            } => {
                assert_eq!(subtask_id, 1);
                assert_eq!(escalation, Escalation::Killed);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(temp.path().join("Task_Split_1_Failed.json").exists());
        assert!(!temp.path().join("Task_Split_2_Unvalidated.json").exists());
        assert!(judge.calls().is_empty());
    }
}
