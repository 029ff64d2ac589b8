//! Error taxonomy and process exit-code mapping (spec.md §7).

use std::process::{ExitCode, Termination};

/// The top-level error kind for everything the pipeline and CLI can fail
/// with. Recoverable I/O and format failures are distinct from fatal
/// `CHECK`-style invariant violations, represented here by
/// [`AppError::Internal`] and never meant to be matched on and
/// recovered from, only logged and reported.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("format error: {0}")]
    Format(String),

    #[error("missing capability: {0} (try rebuilding with a newer `biograph build`)")]
    MissingCapability(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal invariant violation: {0}")]
    Internal(String),

    #[error("cancelled")]
    Cancelled,
}

impl AppError {
    pub fn format(msg: impl Into<String>) -> AppError {
        AppError::Format(msg.into())
    }

    pub fn missing_capability(msg: impl Into<String>) -> AppError {
        AppError::MissingCapability(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> AppError {
        AppError::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> AppError {
        AppError::Internal(msg.into())
    }
}

impl From<crate::assembly::AssemblyInvariantViolation> for AppError {
    fn from(v: crate::assembly::AssemblyInvariantViolation) -> Self {
        AppError::Internal(v.to_string())
    }
}

/// Top-level `main` result type: prints `Error: <message>` to stderr and
/// maps to the exit codes spec.md §7 names (0 success, 1 operational
/// failure including `Cancelled`, 2 CLI parse/usage error).
pub enum AppResult {
    Ok,
    Err(AppError),
    UsageError(String),
}

impl Termination for AppResult {
    fn report(self) -> ExitCode {
        match self {
            AppResult::Ok => ExitCode::SUCCESS,
            AppResult::Err(e) => {
                eprintln!("Error: {e}");
                eprintln!("(see the log file for details)");
                ExitCode::from(1)
            }
            AppResult::UsageError(msg) => {
                eprintln!("Error: {msg}");
                ExitCode::from(2)
            }
        }
    }
}

impl From<anyhow::Error> for AppResult {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<AppError>() {
            Ok(app_err) => AppResult::Err(app_err),
            Err(e) => AppResult::Err(AppError::Internal(e.to_string())),
        }
    }
}

impl From<Result<(), AppError>> for AppResult {
    fn from(r: Result<(), AppError>) -> Self {
        match r {
            Ok(()) => AppResult::Ok,
            Err(e) => AppResult::Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::AssemblyInvariantViolation;

    #[test]
    fn internal_from_invariant_violation_keeps_the_message() {
        let violation = AssemblyInvariantViolation::OffsetsOutOfOrder { left: 10, right: 3 };
        let err: AppError = violation.into();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn usage_error_maps_to_exit_code_two() {
        let result = AppResult::UsageError("missing --input".into());
        assert_eq!(format!("{:?}", result.report()), format!("{:?}", ExitCode::from(2)));
    }

    #[test]
    fn operational_error_maps_to_exit_code_one() {
        let result = AppResult::Err(AppError::Cancelled);
        assert_eq!(format!("{:?}", result.report()), format!("{:?}", ExitCode::from(1)));
    }
}
