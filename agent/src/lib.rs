//! Isolated coding-agent worker.
//!
//! One worker process runs one job: it reads the task from the job directory,
//! asks a language model for a `{files, shell}` plan, applies it inside the
//! workspace, packages the result, and records a terminal status. The
//! orchestrator talks to the worker only through the job directory.
//!
//! - **[`core`]**: Pure, deterministic logic (status machine, security rules,
//!   response parsing, directory layout). No I/O.
//! - **[`io`]**: Side-effecting operations (filesystem, processes, HTTP).
//!
//! [`pipeline`] composes both into a single job run.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
