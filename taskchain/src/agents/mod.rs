//! Model-backed agents and the seams the coordinator drives them through.

pub mod decomposer;
pub mod rewriter;
pub mod validator;

use crate::core::types::{SubtaskId, Verdict};
use crate::io::llm::ChatModel;

pub use decomposer::TaskDecomposer;
pub use rewriter::DescriptionRewriter;
pub use validator::AnswerValidator;

/// Judges a produced answer against ground truth. Must not fail.
pub trait Judge {
    fn judge(
        &self,
        subtask_id: SubtaskId,
        question: &str,
        answer: &str,
        ground_truth: &str,
    ) -> Verdict;
}

/// Proposes a refined description for the next sub-task.
///
/// Returns the raw proposal; acceptance is decided by the caller.
pub trait Rewrite {
    fn rewrite(&self, previous_answer: &str, description: &str) -> Option<String>;
}

impl<M: ChatModel> Judge for AnswerValidator<M> {
    fn judge(
        &self,
        subtask_id: SubtaskId,
        question: &str,
        answer: &str,
        ground_truth: &str,
    ) -> Verdict {
        self.validate(subtask_id, question, answer, ground_truth)
    }
}
