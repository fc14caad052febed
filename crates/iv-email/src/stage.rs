// SPDX-License-Identifier: MIT OR Apache-2.0
//! The fixed stage sequence a check run advances through. A run only ever
//! moves forward; any stage can instead terminate the run with an error,
//! but it never skips ahead or revisits an earlier stage.

/// Ordered stage names, `init` through `complete`.
pub const STAGES: &[&str] = &[
    "init",
    "config",
    "connect",
    "open_folder",
    "search",
    "fetch",
    "process",
    "complete",
];

/// What triggered a check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTrigger {
    /// Fired by the scheduler's own timer.
    Scheduled,
    /// Fired on demand by a caller.
    Manual,
}

impl CheckTrigger {
    /// The `trigger_source` value stored on the check run row.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }
}
