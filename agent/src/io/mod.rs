//! I/O helpers for the worker pipeline.

pub mod archive;
pub mod commands;
pub mod config;
pub mod files;
pub mod job_dir;
pub mod job_log;
pub mod model;
pub mod process;
pub mod prompt;
