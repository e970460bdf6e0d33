//! Exit code logic for the bundler process.
//!
//! Single responsibility: map a run classification to the process exit outcome.

use std::process::ExitCode;

use bundler_core::RunStatus;

/// Process exit outcome of a bundling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every attachment archived.
    Success,
    /// Archive written but some attachments are missing.
    Partial,
    /// Nothing could be retrieved; no archive written.
    Failure,
}

impl ProcessExit {
    /// Numeric process exit code.
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Partial => 1,
            Self::Failure => 2,
        }
    }
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        ExitCode::from(exit.code())
    }
}

/// Exit code for errors that stop the run before it produces a classification.
pub(crate) const RUN_ERROR_EXIT_CODE: u8 = 3;

/// Determines the process exit outcome from the run classification.
pub(crate) fn determine_exit_outcome(status: RunStatus) -> ProcessExit {
    match status {
        RunStatus::AllSucceeded => ProcessExit::Success,
        RunStatus::PartialSuccess => ProcessExit::Partial,
        RunStatus::TotalFailure => ProcessExit::Failure,
    }
}
