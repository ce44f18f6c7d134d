//! End-to-end wiring: build components from config, decompose, execute.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::agents::{AnswerValidator, DescriptionRewriter, Judge, Rewrite, TaskDecomposer};
use crate::coordinator::{ExecutionCoordinator, RunOutcome, StepReport};
use crate::dispatch::{BackendDispatcher, Dispatcher};
use crate::io::catalog::resolve_catalog;
use crate::io::config::PipelineConfig;
use crate::io::llm::{ChatModel, HttpChatModel};
use crate::io::task_file::TaskFile;

/// Decompose `task` with the configured planning model.
pub fn decompose_task(config: &PipelineConfig, task: &TaskFile) -> Result<PathBuf> {
    let model = HttpChatModel::new(&config.decomposer, config.proxy.as_deref())
        .context("build decomposer client")?;
    let catalog = resolve_catalog(config)?;
    decompose_with(model, config, task, &catalog)
}

fn decompose_with<M: ChatModel>(
    model: M,
    config: &PipelineConfig,
    task: &TaskFile,
    catalog: &[crate::core::types::CatalogEntry],
) -> Result<PathBuf> {
    let dir = TaskDecomposer::new(model, &config.log_root)
        .decompose(&task.task, &task.task_id, catalog)
        .with_context(|| format!("decompose task {}", task.task_id))?;
    Ok(dir)
}

/// Execute an existing decomposition with the configured backends and models.
pub fn execute_task<F: FnMut(&StepReport)>(
    config: &PipelineConfig,
    task: &TaskFile,
    log_dir: &Path,
    on_step: F,
) -> Result<RunOutcome> {
    let dispatcher = BackendDispatcher::from_config(config);
    let judge = AnswerValidator::new(
        HttpChatModel::new(&config.validator, config.proxy.as_deref())
            .context("build validator client")?,
    );
    let rewriter = DescriptionRewriter::new(
        HttpChatModel::new(&config.rewriter, config.proxy.as_deref())
            .context("build rewriter client")?,
    );
    execute_with(&dispatcher, &judge, &rewriter, task, log_dir, on_step)
}

/// Execute with explicit components.
pub fn execute_with<D: Dispatcher, J: Judge, R: Rewrite, F: FnMut(&StepReport)>(
    dispatcher: &D,
    judge: &J,
    rewriter: &R,
    task: &TaskFile,
    log_dir: &Path,
    on_step: F,
) -> Result<RunOutcome> {
    let ground_truth = task.ground_truth();
    info!(
        task_id = %task.task_id,
        ground_truth = ground_truth.len(),
        "executing decomposition"
    );
    let outcome = ExecutionCoordinator::new(dispatcher, judge, rewriter)
        .execute(log_dir, &ground_truth, on_step)
        .with_context(|| format!("execute {}", log_dir.display()))?;
    Ok(outcome)
}

/// Decompose then execute.
pub fn run_task<F: FnMut(&StepReport)>(
    config: &PipelineConfig,
    task: &TaskFile,
    on_step: F,
) -> Result<RunOutcome> {
    let log_dir = decompose_task(config, task)?;
    info!(dir = %log_dir.display(), "decomposition ready");
    execute_task(config, task, &log_dir, on_step)
}
