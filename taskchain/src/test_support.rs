//! Test-only builders and scripted doubles for the pipeline seams.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use crate::agents::{Judge, Rewrite};
use crate::core::settle::ORIGINAL_CHECKPOINT;
use crate::core::types::{
    AtomicSubtask, CatalogEntry, Outcome, SubtaskId, SubtaskStatus, TaskSpec, Verdict,
};
use crate::dispatch::{DispatchRequest, Dispatcher};
use crate::error::{DispatchError, LlmError};
use crate::io::answer::write_answer;
use crate::io::checkpoint::write_checkpoint;
use crate::io::llm::{ChatMessage, ChatModel};

/// Pending sub-task on the `pc_agent_win` backend.
pub fn subtask(id: SubtaskId, description: &str) -> AtomicSubtask {
    AtomicSubtask {
        id,
        description: description.to_string(),
        answer: String::new(),
        status: SubtaskStatus::Pending,
        backend: "pc_agent_win".to_string(),
        device: "windows".to_string(),
    }
}

/// Sub-task already settled with `outcome`.
pub fn settled(id: SubtaskId, description: &str, answer: &str, outcome: Outcome) -> AtomicSubtask {
    AtomicSubtask {
        answer: answer.to_string(),
        status: SubtaskStatus::Validated {
            outcome,
            rationale: format!("{outcome} by test"),
        },
        ..subtask(id, description)
    }
}

pub fn task_spec(subtasks: Vec<AtomicSubtask>) -> TaskSpec {
    TaskSpec {
        task: "test task".to_string(),
        task_id: "T-test".to_string(),
        subtask_count: subtasks.len(),
        subtasks,
        final_answer: String::new(),
    }
}

/// Catalog matching the default backend configuration.
pub fn catalog() -> Vec<CatalogEntry> {
    [
        ("mobile_agent_e", "android"),
        ("pc_agent_win", "windows"),
        ("jarvis_agent", "minecraft"),
    ]
    .into_iter()
    .map(|(name, device)| CatalogEntry {
        name: name.to_string(),
        device: device.to_string(),
    })
    .collect()
}

/// Write `Task_Split_Original.json` into `dir`.
pub fn write_original(dir: &Path, spec: &TaskSpec) {
    write_checkpoint(dir, ORIGINAL_CHECKPOINT, spec).expect("write original checkpoint");
}

/// Fresh run directory holding an original checkpoint for `subtasks`.
pub fn original_in_tempdir(subtasks: Vec<AtomicSubtask>) -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    write_original(temp.path(), &task_spec(subtasks));
    temp
}

/// Chat model that replays scripted replies and records every conversation.
pub struct ScriptedChatModel {
    name: String,
    replies: RefCell<VecDeque<Result<String, LlmError>>>,
    calls: RefCell<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChatModel {
    pub fn new(name: &str, replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            name: name.to_string(),
            replies: RefCell::new(replies.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.borrow().clone()
    }
}

impl ChatModel for ScriptedChatModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.calls.borrow_mut().push(messages.to_vec());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyContent))
    }
}

/// Dispatcher that writes scripted answer artifacts instead of spawning processes.
///
/// Sub-tasks without a scripted answer succeed without writing an artifact.
pub struct ScriptedDispatcher {
    answers: BTreeMap<SubtaskId, String>,
    failures: RefCell<BTreeMap<SubtaskId, DispatchError>>,
    requests: RefCell<Vec<(String, String, String)>>,
}

impl ScriptedDispatcher {
    pub fn answering(answers: &[(SubtaskId, &str)]) -> Self {
        Self {
            answers: answers
                .iter()
                .map(|(id, answer)| (*id, (*answer).to_string()))
                .collect(),
            failures: RefCell::new(BTreeMap::new()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn failing_on(self, id: SubtaskId, error: DispatchError) -> Self {
        self.failures.borrow_mut().insert(id, error);
        self
    }

    /// Instructions received, in dispatch order.
    pub fn instructions(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|(_, instruction, _)| instruction.clone())
            .collect()
    }

    /// Backends requested, in dispatch order.
    pub fn backends(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|(backend, _, _)| backend.clone())
            .collect()
    }
}

impl Dispatcher for ScriptedDispatcher {
    fn dispatch(&self, request: &DispatchRequest<'_>) -> Result<i32, DispatchError> {
        self.requests.borrow_mut().push((
            request.backend.to_string(),
            request.instruction.to_string(),
            request.subtask_id.to_string(),
        ));
        let id: SubtaskId = request
            .subtask_id
            .to_string()
            .parse()
            .expect("scripted dispatcher expects numeric ids");
        if let Some(error) = self.failures.borrow_mut().remove(&id) {
            return Err(error);
        }
        if let Some(answer) = self.answers.get(&id) {
            write_answer(request.log_dir, id, answer).expect("write scripted answer");
        }
        Ok(0)
    }
}

/// Judge with per-id scripted verdicts; unscripted ids pass.
pub struct ScriptedJudge {
    verdicts: BTreeMap<SubtaskId, Verdict>,
    calls: RefCell<Vec<SubtaskId>>,
}

impl ScriptedJudge {
    pub fn new(verdicts: Vec<(SubtaskId, Verdict)>) -> Self {
        Self {
            verdicts: verdicts.into_iter().collect(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<SubtaskId> {
        self.calls.borrow().clone()
    }
}

impl Judge for ScriptedJudge {
    fn judge(&self, subtask_id: SubtaskId, _: &str, _: &str, _: &str) -> Verdict {
        self.calls.borrow_mut().push(subtask_id);
        self.verdicts.get(&subtask_id).cloned().unwrap_or(Verdict {
            status: true,
            description: "scripted pass".to_string(),
        })
    }
}

enum RewriteScript {
    Append(String),
    Replies(RefCell<VecDeque<String>>),
}

/// Rewriter that either appends a suffix or replays scripted proposals.
pub struct ScriptedRewriter {
    script: RewriteScript,
    calls: RefCell<Vec<(String, String)>>,
}

impl ScriptedRewriter {
    pub fn appending(suffix: &str) -> Self {
        Self {
            script: RewriteScript::Append(suffix.to_string()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn replying(replies: &[&str]) -> Self {
        Self {
            script: RewriteScript::Replies(RefCell::new(
                replies.iter().map(|r| (*r).to_string()).collect(),
            )),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// `(previous_answer, description)` pairs received.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.borrow().clone()
    }
}

impl Rewrite for ScriptedRewriter {
    fn rewrite(&self, previous_answer: &str, description: &str) -> Option<String> {
        self.calls
            .borrow_mut()
            .push((previous_answer.to_string(), description.to_string()));
        match &self.script {
            RewriteScript::Append(suffix) => Some(format!("{description}{suffix}")),
            RewriteScript::Replies(replies) => replies.borrow_mut().pop_front(),
        }
    }
}
