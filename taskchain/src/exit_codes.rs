//! Stable exit codes for taskchain CLI commands.

/// Command succeeded; for `run`/`execute` every sub-task settled.
pub const OK: i32 = 0;
/// Invalid config, task file, decomposition, or a dispatch failure.
pub const INVALID: i32 = 1;
/// Execution halted on a failed validation, or `judge` returned a failing verdict.
pub const HALTED: i32 = 2;
