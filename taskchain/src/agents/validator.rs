//! LLM-as-judge answer validator.
//!
//! [`AnswerValidator::validate`] never fails: transport errors, malformed
//! replies and wrongly typed fields all become a failure [`Verdict`] whose
//! description carries the diagnostic.

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::extract::extract_json_object;
use crate::core::types::{SubtaskId, Verdict};
use crate::error::ValidateError;
use crate::io::llm::{ChatMessage, ChatModel};
use crate::io::prompt::PromptEngine;
use crate::io::schema::{VERDICT_SCHEMA, validate_schema};

pub struct AnswerValidator<M> {
    model: M,
}

impl<M: ChatModel> AnswerValidator<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Judge whether `answer` is equivalent to `ground_truth` for `question`.
    #[instrument(skip_all, fields(subtask_id = subtask_id))]
    pub fn validate(
        &self,
        subtask_id: SubtaskId,
        question: &str,
        answer: &str,
        ground_truth: &str,
    ) -> Verdict {
        match self.try_validate(subtask_id, question, answer, ground_truth) {
            Ok(verdict) => {
                debug!(status = verdict.status, "verdict received");
                verdict
            }
            Err(err) => {
                warn!(err = %err, "validation degraded to failure verdict");
                Verdict::failure(format!("Validation error: {err}"))
            }
        }
    }

    fn try_validate(
        &self,
        subtask_id: SubtaskId,
        question: &str,
        answer: &str,
        ground_truth: &str,
    ) -> Result<Verdict, ValidateError> {
        let prompt = PromptEngine::new()
            .and_then(|prompts| {
                prompts.render_validator(subtask_id, question, answer, ground_truth)
            })
            .map_err(|err| ValidateError::Prompt(format!("{err:#}")))?;
        let content = self.model.complete(&[ChatMessage::user(prompt)])?;
        parse_verdict(&content)
    }
}

/// Parse a judge reply into a [`Verdict`].
pub fn parse_verdict(content: &str) -> Result<Verdict, ValidateError> {
    let object =
        extract_json_object(content).map_err(|err| ValidateError::Parse(err.to_string()))?;
    let value = Value::Object(object);
    validate_schema(VERDICT_SCHEMA, "verdict", &value)
        .map_err(|err| ValidateError::Schema(format!("{err:#}")))?;
    serde_json::from_value(value).map_err(|err| ValidateError::Schema(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::test_support::ScriptedChatModel;

    fn validator(reply: Result<String, LlmError>) -> AnswerValidator<ScriptedChatModel> {
        AnswerValidator::new(ScriptedChatModel::new("deepseek-v3", vec![reply]))
    }

    #[test]
    fn passes_through_clean_verdict() {
        let v = validator(Ok(r#"{"status": true, "description": "Same city."}"#.to_string()));
        let verdict = v.validate(1, "Which city?", "hangzhou", "Hangzhou");
        assert_eq!(
            verdict,
            Verdict {
                status: true,
                description: "Same city.".to_string()
            }
        );
    }

    #[test]
    fn extracts_verdict_from_noisy_reply() {
        let v = validator(Ok(
            "Let me think.\n```json\n{\"status\": false, \"description\": \"21 vs 12\"}\n```"
                .to_string(),
        ));
        let verdict = v.validate(2, "Temperature?", "21", "12");
        assert!(!verdict.status);
        assert_eq!(verdict.description, "21 vs 12");
    }

    #[test]
    fn prompt_contains_rubric_inputs() {
        let v = validator(Ok(r#"{"status": true, "description": "ok"}"#.to_string()));
        v.validate(3, "Which app?", "WeChat", "微信");
        let calls = v.model.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0][0].content.contains("微信"));
        assert!(calls[0][0].content.contains("WeChat"));
    }

    /// Verifies every failure mode degrades to `status=false` instead of an error.
    #[test]
    fn never_fails_across_its_boundary() {
        let replies: Vec<Result<String, LlmError>> = vec![
            Err(LlmError::Timeout),
            Err(LlmError::Connect("refused".to_string())),
            Err(LlmError::Http {
                status: 503,
                body: "overloaded".to_string(),
            }),
            Err(LlmError::EmptyContent),
            Ok("no braces at all".to_string()),
            Ok("{\"status\": tru".to_string()),
            Ok("{\"status\": \"true\", \"description\": \"x\"}".to_string()),
            Ok("{\"status\": true}".to_string()),
            Ok("{\"status\": true, \"description\": 5}".to_string()),
            Ok("[true, \"x\"]".to_string()),
        ];
        for reply in replies {
            let shown = format!("{reply:?}");
            let verdict = validator(reply).validate(1, "q", "a", "t");
            assert!(!verdict.status, "expected failure verdict for {shown}");
            assert!(
                verdict.description.starts_with("Validation error:"),
                "missing diagnostic for {shown}: {}",
                verdict.description
            );
        }
    }

    #[test]
    fn parse_verdict_rejects_wrong_types() {
        assert!(matches!(
            parse_verdict(r#"{"status": 1, "description": "x"}"#),
            Err(ValidateError::Schema(_))
        ));
        assert!(matches!(
            parse_verdict("nothing"),
            Err(ValidateError::Parse(_))
        ));
    }
}
