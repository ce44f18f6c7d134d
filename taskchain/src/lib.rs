//! Multi-agent task pipeline.
//!
//! A natural-language task is split into ordered atomic sub-tasks by a
//! planning model, each sub-task is handed to an external automation
//! backend, and every produced answer is judged against ground truth before
//! the chain moves on.
//!
//! - **[`core`]**: Pure logic (normalization, settlement rules, invariants,
//!   reply extraction). No I/O.
//! - **[`io`]**: Config, model transport, prompts, schemas, checkpoints and
//!   process supervision.
//! - **[`agents`]**: Model-backed decomposer, validator and rewriter.
//!
//! [`dispatch`] and [`coordinator`] drive backends through the [`Dispatcher`],
//! [`Judge`] and [`Rewrite`] seams; [`pipeline`] wires them from config.
//!
//! [`Dispatcher`]: dispatch::Dispatcher
//! [`Judge`]: agents::Judge
//! [`Rewrite`]: agents::Rewrite

pub mod agents;
pub mod coordinator;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
