//! Description rewriter: folds a settled answer into the next sub-task.

use tracing::{debug, instrument, warn};

use crate::io::llm::{ChatMessage, ChatModel};
use crate::io::prompt::PromptEngine;

use super::Rewrite;

pub struct DescriptionRewriter<M> {
    model: M,
}

impl<M: ChatModel> DescriptionRewriter<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

impl<M: ChatModel> Rewrite for DescriptionRewriter<M> {
    /// Ask the model for a refined description.
    ///
    /// Model or prompt failures are logged and yield `None`; the caller keeps
    /// the original description.
    #[instrument(skip_all)]
    fn rewrite(&self, previous_answer: &str, description: &str) -> Option<String> {
        let prompt = match PromptEngine::new()
            .and_then(|prompts| prompts.render_rewrite(previous_answer, description))
        {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "render rewrite prompt");
                return None;
            }
        };
        match self.model.complete(&[ChatMessage::user(prompt)]) {
            Ok(content) => {
                debug!(content_len = content.len(), "rewrite proposal received");
                Some(content)
            }
            Err(err) => {
                warn!(err = %err, "rewrite model call failed, keeping original description");
                None
            }
        }
    }
}
