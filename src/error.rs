use thiserror::Error;

use crate::fhe::EngineError;
use crate::ledger::{LedgerError, LedgerErrorKind};

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failures surfaced by the creation, verification and refresh pipelines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("no connected actor")]
    NotConnected,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} already in progress")]
    Busy(&'static str),
    #[error("encryption engine failure: {0}")]
    EncryptionFailure(String),
    #[error("transaction rejected by user")]
    UserRejected,
    #[error("record already verified")]
    AlreadyVerified,
    #[error("submission failed: {0}")]
    SubmissionFailure(String),
    #[error("failed to load records: {0}")]
    LoadFailure(String),
}

impl From<LedgerError> for PipelineError {
    fn from(err: LedgerError) -> Self {
        match err.classify() {
            LedgerErrorKind::UserRejected => PipelineError::UserRejected,
            LedgerErrorKind::AlreadyVerified => PipelineError::AlreadyVerified,
            LedgerErrorKind::Unavailable | LedgerErrorKind::Reverted | LedgerErrorKind::Other => {
                PipelineError::SubmissionFailure(err.message)
            }
        }
    }
}

impl From<EngineError> for PipelineError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Submission(ledger) => ledger.into(),
            other => PipelineError::EncryptionFailure(other.to_string()),
        }
    }
}

impl PipelineError {
    /// Message shown in the status notifier for this failure.
    pub fn status_message(&self, context: &str) -> String {
        match self {
            PipelineError::NotConnected => "Please connect wallet first".to_string(),
            PipelineError::UserRejected => "Transaction rejected by user".to_string(),
            PipelineError::LoadFailure(_) => "Failed to load data".to_string(),
            PipelineError::AlreadyVerified => "Data is already verified on-chain".to_string(),
            PipelineError::SubmissionFailure(detail) | PipelineError::EncryptionFailure(detail) => {
                format!("{context}: {detail}")
            }
            PipelineError::InvalidInput(detail) => format!("{context}: {detail}"),
            PipelineError::Busy(what) => format!("{context}: {what} already in progress"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_failures_map_by_classification() {
        let rejected: PipelineError = LedgerError::other("user rejected transaction").into();
        assert_eq!(rejected, PipelineError::UserRejected);

        let race: PipelineError =
            LedgerError::new(LedgerErrorKind::AlreadyVerified, "Data already verified").into();
        assert_eq!(race, PipelineError::AlreadyVerified);

        let generic: PipelineError = LedgerError::other("out of gas").into();
        assert_eq!(generic, PipelineError::SubmissionFailure("out of gas".into()));
    }

    #[test]
    fn engine_submission_failures_keep_ledger_kind() {
        let err: PipelineError = EngineError::Submission(LedgerError::other(
            "execution reverted: Data already verified",
        ))
        .into();
        assert_eq!(err, PipelineError::AlreadyVerified);

        let err: PipelineError = EngineError::Decrypt("gateway down".into()).into();
        assert!(matches!(err, PipelineError::EncryptionFailure(msg) if msg.contains("gateway down")));
    }

    #[test]
    fn status_messages() {
        assert_eq!(
            PipelineError::SubmissionFailure("boom".into()).status_message("Submission failed"),
            "Submission failed: boom"
        );
        assert_eq!(
            PipelineError::UserRejected.status_message("ignored"),
            "Transaction rejected by user"
        );
    }
}
