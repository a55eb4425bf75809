use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::fhe::ProofSubmitter;
use crate::ledger::{LedgerClient, LedgerError};
use crate::registry::{InFlight, Registry};
use crate::status::Status;
use crate::types::{MoleculeId, SensitiveValue};

const CONTEXT: &str = "Decryption failed";

enum Outcome {
    /// The ledger already held a verified value; no protocol was run.
    Stored(u64),
    Decrypted(u64),
}

/// On-chain half of decrypt-and-prove, invoked by the engine.
struct LedgerSubmitter<'a> {
    ledger: &'a dyn LedgerClient,
    key: &'a MoleculeId,
}

#[async_trait]
impl<'a> ProofSubmitter for LedgerSubmitter<'a> {
    async fn submit(&self, clear_values: Vec<u8>, proof: Vec<u8>) -> Result<(), LedgerError> {
        let tx = self
            .ledger
            .submit_verification(self.key, &clear_values, &proof)
            .await?;
        debug!(molecule_id = %self.key, tx = %tx.hash, "verification submitted");
        self.ledger.await_finality(&tx).await
    }
}

impl Registry {
    /// Reveal and prove a record's encrypted value on the ledger.
    ///
    /// A freshly decrypted value is also kept in this session's local map.
    /// Returns the stored value straight away when the record is already
    /// verified. Returns `Ok(None)` when another actor verified it while this
    /// run was in flight; the refreshed record is then the source of truth.
    pub async fn verify_record(&self, key: &MoleculeId) -> PipelineResult<Option<u64>> {
        let actor = self.connected_actor(CONTEXT)?;
        let _guard = InFlight::acquire(&self.verifying, "verification")?;

        match self.run_verification(key).await {
            Ok(Outcome::Stored(value)) => {
                debug!(molecule_id = %key, "record already verified, skipping decryption");
                self.status.publish(Status::success("Data already verified on-chain"));
                Ok(Some(value))
            }
            Ok(Outcome::Decrypted(value)) => {
                info!(molecule_id = %key, verifier = %actor, "record verified");
                self.local.insert(key.clone(), value);
                self.status.publish(Status::pending("Verifying decryption on-chain..."));
                if self.reload_after_write().await {
                    self.status
                        .publish(Status::success("Data decrypted and verified successfully!"));
                }
                Ok(Some(value))
            }
            Err(PipelineError::AlreadyVerified) => {
                info!(molecule_id = %key, "verification race lost to another actor");
                if self.reload_after_write().await {
                    self.status.publish(Status::success("Data is already verified on-chain"));
                }
                Ok(None)
            }
            Err(err) => Err(self.fail(err, CONTEXT)),
        }
    }

    /// Show or hide this session's decrypted value for a record.
    ///
    /// Hiding never touches the ledger or the engine. Showing runs
    /// [`Registry::verify_record`] and also keeps a value that was already
    /// stored on the ledger.
    pub async fn toggle_local_decryption(&self, key: &MoleculeId) -> PipelineResult<SensitiveValue> {
        if self.clear_local_decryption(key).is_none() {
            if let Some(value) = self.verify_record(key).await? {
                self.local.insert(key.clone(), value);
            }
        }
        Ok(self.sensitive_value(key).unwrap_or(SensitiveValue::Unknown))
    }

    async fn run_verification(&self, key: &MoleculeId) -> PipelineResult<Outcome> {
        let current = self.ledger.get_record(key).await?;
        if current.is_verified {
            return Ok(Outcome::Stored(current.decrypted_value));
        }

        self.ensure_engine().await?;
        let contract = self.contract_address().await?;
        let handle = self.ledger.get_ciphertext_handle(key).await?;
        let submitter = LedgerSubmitter {
            ledger: self.ledger.as_ref(),
            key,
        };
        let result = self
            .engine
            .request_decryption_proof(std::slice::from_ref(&handle), &contract, &submitter)
            .await?;
        let value = result.clear_values.get(&handle).copied().ok_or_else(|| {
            PipelineError::EncryptionFailure(format!("no clear value returned for handle {handle}"))
        })?;
        Ok(Outcome::Decrypted(value))
    }
}
