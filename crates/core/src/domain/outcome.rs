// Run Status & Batch Outcomes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sentinel return code for a job killed after exceeding its timeout.
///
/// Real process exit codes live in 0..=255 (signal deaths map to negative
/// signal numbers on Unix), so -1 can never collide with a genuine exit.
pub const TIMEOUT_RETURNCODE: i32 = -1;

/// Sentinel return code for a batch job whose process could not be started.
///
/// Batch processing must continue past broken files; the spawn failure is
/// logged and the job still yields exactly one outcome.
pub const SPAWN_RETURNCODE: i32 = -2;

/// Lifecycle status of one tool run
///
/// Transitions only forward, no resurrection:
/// `NotStarted -> Running -> Completed | TimedOut`,
/// `TimedOut -> Completed | Killed` (the process is still alive after a
/// timeout; escalation to kill is the caller's decision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    NotStarted,
    Running,
    Completed,
    TimedOut,
    Killed,
}

impl RunStatus {
    /// Final statuses: the underlying process is gone (or given up on)
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Killed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::NotStarted => write!(f, "NOT_STARTED"),
            RunStatus::Running => write!(f, "RUNNING"),
            RunStatus::Completed => write!(f, "COMPLETED"),
            RunStatus::TimedOut => write!(f, "TIMED_OUT"),
            RunStatus::Killed => write!(f, "KILLED"),
        }
    }
}

/// Terminal result of one batch job, emitted in completion order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub return_code: i32,
    pub path: PathBuf,
}

impl BatchOutcome {
    pub fn verdict(&self) -> RunVerdict {
        RunVerdict::from_code(self.return_code)
    }
}

/// Coarse classification of a return code (progress counters, result log)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunVerdict {
    Success,
    Failure,
    Timeout,
}

impl RunVerdict {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => RunVerdict::Success,
            TIMEOUT_RETURNCODE => RunVerdict::Timeout,
            _ => RunVerdict::Failure,
        }
    }

    /// Two-letter label used in the result log (OK / KO / TO)
    pub fn label(&self) -> &'static str {
        match self {
            RunVerdict::Success => "OK",
            RunVerdict::Failure => "KO",
            RunVerdict::Timeout => "TO",
        }
    }
}
