//! Side-effecting helpers: config, model transport, prompts, processes and
//! on-disk artifacts.

pub mod answer;
pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod llm;
pub mod process;
pub mod prompt;
pub mod schema;
pub mod task_file;
