//! Prompt rendering for the planning, judge and rewrite models.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::types::{CatalogEntry, SubtaskId};

const DECOMPOSER_TEMPLATE: &str = include_str!("prompts/decomposer.md");
const VALIDATOR_TEMPLATE: &str = include_str!("prompts/validator.md");
const REWRITE_TEMPLATE: &str = include_str!("prompts/rewrite.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("decomposer", DECOMPOSER_TEMPLATE)
            .context("load decomposer template")?;
        env.add_template("validator", VALIDATOR_TEMPLATE)
            .context("load validator template")?;
        env.add_template("rewrite", REWRITE_TEMPLATE)
            .context("load rewrite template")?;
        Ok(Self { env })
    }

    /// System prompt for the planning model: catalog, rules and output schema.
    pub fn render_decomposer(&self, catalog: &[CatalogEntry]) -> Result<String> {
        let template = self.env.get_template("decomposer")?;
        Ok(template.render(context! { agents => catalog })?)
    }

    pub fn render_validator(
        &self,
        subtask_id: SubtaskId,
        question: &str,
        answer: &str,
        ground_truth: &str,
    ) -> Result<String> {
        let template = self.env.get_template("validator")?;
        Ok(template.render(context! {
            subtask_id => subtask_id,
            question => question.trim(),
            answer => answer.trim(),
            ground_truth => ground_truth.trim(),
        })?)
    }

    pub fn render_rewrite(&self, previous_answer: &str, description: &str) -> Result<String> {
        let template = self.env.get_template("rewrite")?;
        Ok(template.render(context! {
            previous_answer => previous_answer.trim(),
            description => description.trim(),
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposer_prompt_enumerates_catalog() {
        let engine = PromptEngine::new().expect("engine");
        let catalog = vec![CatalogEntry {
            name: "mobile_agent_e".to_string(),
            device: "android".to_string(),
        }];
        let prompt = engine.render_decomposer(&catalog).expect("render");
        assert!(prompt.contains("`mobile_agent_e` (device: `android`)"));
        assert!(prompt.contains("\"atomic_tasks_ID\": 1"));
    }

    #[test]
    fn empty_catalog_mentions_sentinel() {
        let engine = PromptEngine::new().expect("engine");
        let prompt = engine.render_decomposer(&[]).expect("render");
        assert!(prompt.contains("none registered"));
    }

    #[test]
    fn validator_prompt_carries_all_inputs() {
        let engine = PromptEngine::new().expect("engine");
        let prompt = engine
            .render_validator(2, "How warm is it?", " 21°C ", "21 degrees")
            .expect("render");
        assert!(prompt.contains("sub-task 2"));
        assert!(prompt.contains("21°C"));
        assert!(prompt.contains("21 degrees"));
        assert!(prompt.contains("\"status\""));
    }

    #[test]
    fn rewrite_prompt_carries_answer_and_description() {
        let engine = PromptEngine::new().expect("engine");
        let prompt = engine
            .render_rewrite("Luigi's", "Book a table at the restaurant found earlier")
            .expect("render");
        assert!(prompt.contains("Luigi's"));
        assert!(prompt.contains("Book a table at the restaurant found earlier"));
    }
}
