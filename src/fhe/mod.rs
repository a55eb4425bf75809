//! Client-side encryption engine contract.
//!
//! The engine encrypts values for a contract/actor pair and runs the
//! interactive decrypt-and-prove protocol. That protocol has two phases: the
//! engine obtains signed clear values plus a proof, then hands both to a
//! [`ProofSubmitter`] which performs the on-chain verification step. The
//! submitter is driven by the engine, not by the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::types::{Address, CiphertextHandle, EncryptedInput};

pub mod simulated;

/// Width of one encoded clear value (a 256-bit big-endian word).
pub const CLEAR_VALUE_WORD: usize = 32;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("encryption engine is not initialized")]
    NotInitialized,
    #[error("engine initialization failed: {0}")]
    Initialization(String),
    #[error("encryption failed: {0}")]
    Encrypt(String),
    #[error("decryption failed: {0}")]
    Decrypt(String),
    #[error("proof submission failed: {0}")]
    Submission(#[source] LedgerError),
    #[error("malformed clear values: {0}")]
    Codec(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionResult {
    pub clear_values: BTreeMap<CiphertextHandle, u64>,
    pub proof: Vec<u8>,
}

/// Second phase of decrypt-and-prove: push clear values and proof on-chain.
#[async_trait]
pub trait ProofSubmitter: Send + Sync {
    async fn submit(&self, clear_values: Vec<u8>, proof: Vec<u8>) -> Result<(), LedgerError>;
}

#[async_trait]
pub trait EncryptionEngine: Send + Sync {
    /// Must complete before any encrypt or decrypt call in a session.
    async fn initialize(&self) -> Result<(), EngineError>;

    async fn encrypt(
        &self,
        contract: &Address,
        actor: &Address,
        value: u64,
    ) -> Result<EncryptedInput, EngineError>;

    async fn request_decryption_proof(
        &self,
        handles: &[CiphertextHandle],
        contract: &Address,
        submitter: &dyn ProofSubmitter,
    ) -> Result<DecryptionResult, EngineError>;
}

/// Encode clear values as consecutive 32-byte big-endian words, in handle order.
pub fn encode_clear_values(values: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * CLEAR_VALUE_WORD);
    for value in values {
        out.extend_from_slice(&[0u8; CLEAR_VALUE_WORD - 8]);
        out.extend_from_slice(&value.to_be_bytes());
    }
    out
}

pub fn decode_clear_values(bytes: &[u8]) -> Result<Vec<u64>, EngineError> {
    if bytes.len() % CLEAR_VALUE_WORD != 0 {
        return Err(EngineError::Codec(format!(
            "length {} is not a multiple of {CLEAR_VALUE_WORD}",
            bytes.len()
        )));
    }
    bytes
        .chunks_exact(CLEAR_VALUE_WORD)
        .map(|word| {
            let (high, low) = word.split_at(CLEAR_VALUE_WORD - 8);
            if high.iter().any(|b| *b != 0) {
                return Err(EngineError::Codec("value exceeds 64 bits".into()));
            }
            let mut buf = [0u8; 8];
            buf.copy_from_slice(low);
            Ok(u64::from_be_bytes(buf))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_values_use_full_words() {
        let encoded = encode_clear_values(&[7, u64::MAX]);
        assert_eq!(encoded.len(), 64);
        assert_eq!(encoded[31], 7);
        assert_eq!(decode_clear_values(&encoded).unwrap(), vec![7, u64::MAX]);
    }

    #[test]
    fn rejects_truncated_or_oversized_words() {
        assert!(matches!(decode_clear_values(&[0u8; 31]), Err(EngineError::Codec(_))));
        let mut wide = [0u8; 32];
        wide[0] = 1;
        assert!(matches!(decode_clear_values(&wide), Err(EngineError::Codec(_))));
    }
}
