//! Stable exit codes for the `agent` binary.

/// Job completed (or the diagnostic command succeeded).
pub const OK: i32 = 0;
/// Invalid configuration or other startup failure; the job directory may be untouched.
pub const INVALID: i32 = 1;
/// The job ran and ended with `status.txt = error`.
pub const JOB_FAILED: i32 = 2;
