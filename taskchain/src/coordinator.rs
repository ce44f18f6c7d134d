//! Sequential execution of a decomposed task.
//!
//! Per sub-task, strictly in id order:
//! dispatch → answer → validate → rewrite next description → checkpoint →
//! advance or stop. The coordinator exclusively owns the in-memory
//! [`TaskSpec`]; every settled step is snapshotted to a write-once checkpoint.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::agents::{Judge, Rewrite};
use crate::core::immutability::check_settled_subtask_immutability;
use crate::core::settle::{
    FINAL_CHECKPOINT, ORIGINAL_CHECKPOINT, accept_rewrite, checkpoint_name, final_answer,
    settle_verdict,
};
use crate::core::types::{Outcome, SubtaskId, SubtaskStatus, TaskSpec};
use crate::dispatch::{DispatchRequest, Dispatcher};
use crate::error::{CoordinatorError, DispatchError};
use crate::io::answer::read_answer;
use crate::io::checkpoint::{existing_run_checkpoints, load_checkpoint, write_checkpoint};

/// Reason why [`ExecutionCoordinator::execute`] stopped without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStop {
    /// Every sub-task settled as `pass` or `skip`.
    Completed { final_answer: String },
    /// The judge rejected a sub-task's answer.
    ValidationFailed {
        subtask_id: SubtaskId,
        rationale: String,
    },
}

/// Summary of one execution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub task_id: String,
    pub log_dir: PathBuf,
    pub steps_executed: u32,
    pub stop: RunStop,
}

/// Report of one settled sub-task, handed to the step callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub subtask_id: SubtaskId,
    pub outcome: Outcome,
    pub checkpoint: PathBuf,
    /// Whether the next sub-task's description was replaced.
    pub rewrote_next: bool,
}

/// Drives the per-sub-task state machine over a decomposition directory.
pub struct ExecutionCoordinator<'a, D, J, R> {
    dispatcher: &'a D,
    judge: &'a J,
    rewriter: &'a R,
}

impl<'a, D: Dispatcher, J: Judge, R: Rewrite> ExecutionCoordinator<'a, D, J, R> {
    pub fn new(dispatcher: &'a D, judge: &'a J, rewriter: &'a R) -> Self {
        Self {
            dispatcher,
            judge,
            rewriter,
        }
    }

    /// Execute the decomposition in `log_dir` starting from `Task_Split_Original.json`.
    ///
    /// `ground_truth` maps sub-task ids to reference answers; ids without an entry
    /// settle as `skip`. A validation failure ends the run with
    /// [`RunStop::ValidationFailed`]; dispatch errors and id gaps are returned as
    /// errors after the failure checkpoint (if any) is written. A directory that
    /// already holds execution checkpoints is refused before anything is dispatched.
    #[instrument(skip_all, fields(log_dir = %log_dir.display()))]
    pub fn execute<F: FnMut(&StepReport)>(
        &self,
        log_dir: &Path,
        ground_truth: &BTreeMap<SubtaskId, String>,
        mut on_step: F,
    ) -> Result<RunOutcome, CoordinatorError> {
        let mut spec = load_checkpoint(&log_dir.join(ORIGINAL_CHECKPOINT))
            .map_err(|err| CoordinatorError::Load(format!("{err:#}")))?;
        let existing = existing_run_checkpoints(log_dir)
            .map_err(|err| CoordinatorError::Load(format!("{err:#}")))?;
        if !existing.is_empty() {
            return Err(CoordinatorError::AlreadyExecuted {
                dir: log_dir.to_path_buf(),
                existing,
            });
        }
        let total = spec.subtasks.len();
        let mut last_snapshot = spec.clone();
        info!(task_id = %spec.task_id, subtasks = total, "starting execution");

        let mut steps_executed = 0u32;
        let mut current: SubtaskId = 1;
        while usize::try_from(current).is_ok_and(|c| c <= total) {
            let (description, backend) = match spec.subtask(current) {
                Some(subtask) => (subtask.description.clone(), subtask.backend.clone()),
                None => return Err(CoordinatorError::IdGap { id: current, total }),
            };
            let is_last = usize::try_from(current).is_ok_and(|c| c == total);

            let answer = match self.dispatch_and_collect(log_dir, current, &backend, &description)
            {
                Ok(answer) => answer,
                Err(source) => {
                    warn!(subtask_id = current, err = %source, "dispatch failed, stopping");
                    record_settlement(
                        &mut spec,
                        current,
                        None,
                        Outcome::Fail,
                        format!("Dispatch failed: {source}"),
                        is_last,
                    );
                    let name = checkpoint_name(current, Outcome::Fail);
                    self.checkpoint(log_dir, &name, &last_snapshot, &spec)?;
                    return Err(CoordinatorError::Dispatch {
                        subtask_id: current,
                        source,
                    });
                }
            };
            steps_executed += 1;

            let verdict = ground_truth
                .get(&current)
                .map(|truth| self.judge.judge(current, &description, &answer, truth));
            let (outcome, rationale) = settle_verdict(verdict);
            info!(subtask_id = current, %outcome, "sub-task settled");

            record_settlement(
                &mut spec,
                current,
                Some(answer.clone()),
                outcome,
                rationale.clone(),
                is_last,
            );

            let rewrote_next = if outcome.advances() {
                self.propagate(&mut spec, current, &answer)
            } else {
                false
            };

            let name = checkpoint_name(current, outcome);
            let checkpoint = self.checkpoint(log_dir, &name, &last_snapshot, &spec)?;
            last_snapshot = spec.clone();
            on_step(&StepReport {
                subtask_id: current,
                outcome,
                checkpoint,
                rewrote_next,
            });

            if outcome == Outcome::Fail {
                warn!(subtask_id = current, rationale = %rationale, "validation failed, stopping");
                return Ok(RunOutcome {
                    task_id: spec.task_id,
                    log_dir: log_dir.to_path_buf(),
                    steps_executed,
                    stop: RunStop::ValidationFailed {
                        subtask_id: current,
                        rationale,
                    },
                });
            }
            current += 1;
        }

        let final_answer = spec.final_answer.clone();
        self.checkpoint(log_dir, FINAL_CHECKPOINT, &last_snapshot, &spec)?;
        info!(steps_executed, "execution completed");
        Ok(RunOutcome {
            task_id: spec.task_id,
            log_dir: log_dir.to_path_buf(),
            steps_executed,
            stop: RunStop::Completed { final_answer },
        })
    }

    fn dispatch_and_collect(
        &self,
        log_dir: &Path,
        id: SubtaskId,
        backend: &str,
        description: &str,
    ) -> Result<String, DispatchError> {
        let request = DispatchRequest {
            backend,
            log_dir,
            instruction: description,
            subtask_id: id.into(),
        };
        let exit_code = self.dispatcher.dispatch(&request)?;
        debug!(subtask_id = id, exit_code, "backend returned");
        read_answer(log_dir, id)
    }

    /// Rewrite the immediately next sub-task's description from `answer`.
    fn propagate(&self, spec: &mut TaskSpec, id: SubtaskId, answer: &str) -> bool {
        let Some(next) = spec.subtask_mut(id + 1) else {
            return false;
        };
        if next.description.trim().is_empty() {
            debug!(next_id = next.id, "next description empty, not rewriting");
            return false;
        }
        let proposal = self.rewriter.rewrite(answer, &next.description);
        match accept_rewrite(&next.description, proposal.as_deref()) {
            Some(refined) => {
                info!(next_id = next.id, "next sub-task description rewritten");
                next.description = refined;
                true
            }
            None => {
                debug!(next_id = next.id, "rewrite rejected, keeping original description");
                false
            }
        }
    }

    fn checkpoint(
        &self,
        log_dir: &Path,
        name: &str,
        previous: &TaskSpec,
        spec: &TaskSpec,
    ) -> Result<PathBuf, CoordinatorError> {
        let errors = check_settled_subtask_immutability(previous, spec);
        if !errors.is_empty() {
            return Err(CoordinatorError::Frozen(errors.join("; ")));
        }
        write_checkpoint(log_dir, name, spec).map_err(|err| CoordinatorError::Checkpoint {
            name: name.to_string(),
            message: format!("{err:#}"),
        })
    }
}

/// Record the answer and status of `id`; on the last sub-task also derive the
/// final answer.
fn record_settlement(
    spec: &mut TaskSpec,
    id: SubtaskId,
    answer: Option<String>,
    outcome: Outcome,
    rationale: String,
    is_last: bool,
) {
    if let Some(subtask) = spec.subtask_mut(id) {
        if let Some(answer) = answer {
            subtask.answer = answer;
        }
        subtask.status = SubtaskStatus::Validated { outcome, rationale };
    }
    if is_last {
        spec.final_answer = final_answer(spec);
    }
}
