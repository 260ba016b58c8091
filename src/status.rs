//! Success/failure convention shared by the chain evaluator and the built-ins.
//!
//! Operating-system exit codes use `0` for success. Inside the interpreter a
//! stage result is a [`Status`]; the translation between the two happens only
//! in [`Status::from_exit_code`] and [`Status::exit_code`].

use crate::command::ExitCode;

/// Exit code reported for a program that could not be located.
pub const COMMAND_NOT_FOUND: ExitCode = 127;

/// Exit code reported for a program that was found but could not be executed.
pub const CANNOT_EXECUTE: ExitCode = 126;

/// Result of running a stage, a chain or a built-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    /// Failure, carrying the nonzero exit code that caused it.
    Failure(ExitCode),
}

impl Status {
    /// Map an OS exit code onto the internal convention.
    pub fn from_exit_code(code: ExitCode) -> Self {
        if code == 0 {
            Status::Success
        } else {
            Status::Failure(code)
        }
    }

    /// Map back to an OS exit code.
    pub fn exit_code(self) -> ExitCode {
        match self {
            Status::Success => 0,
            Status::Failure(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }

    /// Generic failure used when no exit code is available.
    pub fn failure() -> Self {
        Status::Failure(1)
    }
}
