use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, CiphertextHandle, CreateRecord, MoleculeId, RecordData, Transaction};

pub mod memory;

/// Failure category reported by a ledger client.
///
/// Clients that can tell what went wrong should set the kind directly. Clients
/// that only surface a provider message leave it at `Other` and rely on
/// [`LedgerError::classify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerErrorKind {
    UserRejected,
    AlreadyVerified,
    Unavailable,
    Reverted,
    Other,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct LedgerError {
    pub kind: LedgerErrorKind,
    pub message: String,
}

/// Marker wallets put in the message when the signer declines.
const USER_REJECTED_MARKER: &str = "user rejected";
/// Revert reason of the verification entry point when a record is already verified.
const ALREADY_VERIFIED_MARKER: &str = "already verified";

impl LedgerError {
    pub fn new(kind: LedgerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(LedgerErrorKind::Other, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(LedgerErrorKind::Unavailable, message)
    }

    /// Effective kind of this failure.
    ///
    /// An explicit kind is trusted as-is. For `Other`, the message is searched
    /// for known markers; this is a best-effort heuristic and a provider that
    /// rewords its messages will fall through to `Other`.
    pub fn classify(&self) -> LedgerErrorKind {
        if self.kind != LedgerErrorKind::Other {
            return self.kind;
        }
        let lowered = self.message.to_ascii_lowercase();
        if lowered.contains(USER_REJECTED_MARKER) {
            LedgerErrorKind::UserRejected
        } else if lowered.contains(ALREADY_VERIFIED_MARKER) {
            LedgerErrorKind::AlreadyVerified
        } else {
            LedgerErrorKind::Other
        }
    }
}

/// Append-only record store plus the on-chain verification entry point.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn contract_address(&self) -> Result<Address, LedgerError>;

    async fn list_record_keys(&self) -> Result<Vec<MoleculeId>, LedgerError>;

    async fn get_record(&self, key: &MoleculeId) -> Result<RecordData, LedgerError>;

    async fn get_ciphertext_handle(&self, key: &MoleculeId) -> Result<CiphertextHandle, LedgerError>;

    async fn create_record(&self, submission: CreateRecord) -> Result<Transaction, LedgerError>;

    /// The only call that moves a record from encrypted to verified.
    async fn submit_verification(
        &self,
        key: &MoleculeId,
        clear_values: &[u8],
        proof: &[u8],
    ) -> Result<Transaction, LedgerError>;

    async fn await_finality(&self, tx: &Transaction) -> Result<(), LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_kind_wins_over_message() {
        let err = LedgerError::new(LedgerErrorKind::Reverted, "user rejected transaction");
        assert_eq!(err.classify(), LedgerErrorKind::Reverted);
    }

    #[test]
    fn message_markers_are_case_insensitive() {
        let rejected = LedgerError::other("MetaMask Tx Signature: User rejected transaction");
        assert_eq!(rejected.classify(), LedgerErrorKind::UserRejected);

        let race = LedgerError::other("execution reverted: Data already verified");
        assert_eq!(race.classify(), LedgerErrorKind::AlreadyVerified);

        let generic = LedgerError::other("nonce too low");
        assert_eq!(generic.classify(), LedgerErrorKind::Other);
    }
}
