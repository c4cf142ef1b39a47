//! Deterministic, pure logic shared by the worker and the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod layout;
pub mod response;
pub mod security;
pub mod status;
