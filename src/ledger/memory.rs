use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::clock::Clock;
use crate::fhe::decode_clear_values;
use crate::fhe::simulated::handle_for_ciphertext;
use crate::ledger::{LedgerClient, LedgerError, LedgerErrorKind};
use crate::types::{Address, CiphertextHandle, CreateRecord, MoleculeId, RecordData, Transaction};

/// In-process ledger with the same observable contract as the on-chain one.
///
/// Writes are queued by `create_record`/`submit_verification` and only become
/// visible once `await_finality` confirms the transaction. The fault switches
/// emulate an unreachable node, unreadable records, wallet rejections and a
/// concurrent verifier winning the race.
pub struct InMemoryLedger {
    contract: Address,
    clock: Arc<dyn Clock>,
    state: Mutex<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    order: Vec<MoleculeId>,
    records: HashMap<MoleculeId, StoredRecord>,
    pending: HashMap<String, PendingTx>,
    tx_counter: u64,
    verification_submissions: u64,
    faults: Faults,
}

#[derive(Clone)]
struct StoredRecord {
    data: RecordData,
    ciphertext: Vec<u8>,
}

enum PendingTx {
    Create(MoleculeId, StoredRecord),
    Verify(MoleculeId, u64),
}

#[derive(Default)]
struct Faults {
    unreachable: bool,
    broken_records: HashSet<MoleculeId>,
    next_submission: Option<LedgerError>,
    next_finality: Option<LedgerError>,
    next_listing: Option<LedgerError>,
    concurrent_verifier: Option<u64>,
    late_verifier: Option<u64>,
}

const ALREADY_VERIFIED_REVERT: &str = "execution reverted: Data already verified";

impl InMemoryLedger {
    pub fn new(contract: Address, clock: Arc<dyn Clock>) -> Self {
        Self {
            contract,
            clock,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().faults.unreachable = unreachable;
    }

    /// Make `get_record` fail for one key until healed.
    pub fn break_record(&self, key: &MoleculeId) {
        self.state.lock().faults.broken_records.insert(key.clone());
    }

    pub fn heal_record(&self, key: &MoleculeId) {
        self.state.lock().faults.broken_records.remove(key);
    }

    /// Fail the next `create_record` or `submit_verification` with `error`.
    pub fn fail_next_submission(&self, error: LedgerError) {
        self.state.lock().faults.next_submission = Some(error);
    }

    /// Fail the next `await_finality` with `error`; the transaction is dropped.
    pub fn fail_next_finality(&self, error: LedgerError) {
        self.state.lock().faults.next_finality = Some(error);
    }

    /// Fail the next `list_record_keys` with `error`.
    pub fn fail_next_listing(&self, error: LedgerError) {
        self.state.lock().faults.next_listing = Some(error);
    }

    /// Let another actor verify the target record with `value` right before
    /// the next verification submission lands.
    pub fn race_next_verification(&self, value: u64) {
        self.state.lock().faults.concurrent_verifier = Some(value);
    }

    /// Like [`InMemoryLedger::race_next_verification`], but the other actor's
    /// transaction is mined between submission and finality.
    pub fn race_next_finality(&self, value: u64) {
        self.state.lock().faults.late_verifier = Some(value);
    }

    /// Verify a record out of band, as another session would.
    pub fn mark_verified(&self, key: &MoleculeId, value: u64) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        let stored = state
            .records
            .get_mut(key)
            .ok_or_else(|| LedgerError::new(LedgerErrorKind::Reverted, format!("unknown record {key}")))?;
        if stored.data.is_verified {
            return Err(LedgerError::new(LedgerErrorKind::AlreadyVerified, ALREADY_VERIFIED_REVERT));
        }
        stored.data.is_verified = true;
        stored.data.decrypted_value = value;
        Ok(())
    }

    pub fn verification_submissions(&self) -> u64 {
        self.state.lock().verification_submissions
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().records.len()
    }

    fn check_reachable(state: &LedgerState) -> Result<(), LedgerError> {
        if state.faults.unreachable {
            return Err(LedgerError::unavailable("ledger node unreachable"));
        }
        Ok(())
    }

    fn queue(state: &mut LedgerState, key: &MoleculeId, tx: PendingTx) -> Transaction {
        state.tx_counter += 1;
        let mut hasher = blake3::Hasher::new();
        hasher.update(&state.tx_counter.to_le_bytes());
        hasher.update(key.as_str().as_bytes());
        let hash = format!("0x{}", hasher.finalize().to_hex());
        state.pending.insert(hash.clone(), tx);
        Transaction { hash }
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn contract_address(&self) -> Result<Address, LedgerError> {
        Self::check_reachable(&self.state.lock())?;
        Ok(self.contract.clone())
    }

    async fn list_record_keys(&self) -> Result<Vec<MoleculeId>, LedgerError> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        if let Some(err) = state.faults.next_listing.take() {
            return Err(err);
        }
        Ok(state.order.clone())
    }

    async fn get_record(&self, key: &MoleculeId) -> Result<RecordData, LedgerError> {
        let state = self.state.lock();
        Self::check_reachable(&state)?;
        if state.faults.broken_records.contains(key) {
            return Err(LedgerError::other(format!("could not decode record {key}")));
        }
        state
            .records
            .get(key)
            .map(|stored| stored.data.clone())
            .ok_or_else(|| LedgerError::new(LedgerErrorKind::Reverted, format!("record {key} does not exist")))
    }

    async fn get_ciphertext_handle(&self, key: &MoleculeId) -> Result<CiphertextHandle, LedgerError> {
        let state = self.state.lock();
        Self::check_reachable(&state)?;
        state
            .records
            .get(key)
            .map(|stored| handle_for_ciphertext(&stored.ciphertext))
            .ok_or_else(|| LedgerError::new(LedgerErrorKind::Reverted, format!("record {key} does not exist")))
    }

    async fn create_record(&self, submission: CreateRecord) -> Result<Transaction, LedgerError> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        if let Some(err) = state.faults.next_submission.take() {
            return Err(err);
        }
        if state.records.contains_key(&submission.key) {
            return Err(LedgerError::new(
                LedgerErrorKind::Reverted,
                format!("execution reverted: molecule {} already exists", submission.key),
            ));
        }
        if submission.encrypted.proof.is_empty() || submission.encrypted.ciphertext.is_empty() {
            return Err(LedgerError::new(
                LedgerErrorKind::Reverted,
                "execution reverted: invalid encrypted input",
            ));
        }

        let stored = StoredRecord {
            data: RecordData {
                name: submission.name,
                creator: submission.sender,
                timestamp: self.clock.now_secs(),
                public_value1: submission.public_toxicity,
                public_value2: submission.public_value2,
                description: submission.label,
                is_verified: false,
                decrypted_value: 0,
            },
            ciphertext: submission.encrypted.ciphertext,
        };
        let key = submission.key;
        let tx = Self::queue(&mut state, &key, PendingTx::Create(key.clone(), stored));
        Ok(tx)
    }

    async fn submit_verification(
        &self,
        key: &MoleculeId,
        clear_values: &[u8],
        proof: &[u8],
    ) -> Result<Transaction, LedgerError> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        if let Some(err) = state.faults.next_submission.take() {
            return Err(err);
        }
        state.verification_submissions += 1;

        if let Some(value) = state.faults.concurrent_verifier.take() {
            if let Some(stored) = state.records.get_mut(key) {
                stored.data.is_verified = true;
                stored.data.decrypted_value = value;
            }
        }

        let stored = state
            .records
            .get(key)
            .ok_or_else(|| LedgerError::new(LedgerErrorKind::Reverted, format!("record {key} does not exist")))?;
        if stored.data.is_verified {
            return Err(LedgerError::new(LedgerErrorKind::AlreadyVerified, ALREADY_VERIFIED_REVERT));
        }
        if proof.is_empty() {
            return Err(LedgerError::new(
                LedgerErrorKind::Reverted,
                "execution reverted: invalid decryption proof",
            ));
        }
        let value = decode_clear_values(clear_values)
            .ok()
            .and_then(|values| values.first().copied())
            .ok_or_else(|| {
                LedgerError::new(LedgerErrorKind::Reverted, "execution reverted: malformed clear values")
            })?;

        Ok(Self::queue(&mut state, key, PendingTx::Verify(key.clone(), value)))
    }

    async fn await_finality(&self, tx: &Transaction) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        let pending = state
            .pending
            .remove(&tx.hash)
            .ok_or_else(|| LedgerError::other(format!("unknown transaction {}", tx.hash)))?;
        if let Some(err) = state.faults.next_finality.take() {
            return Err(err);
        }

        match pending {
            PendingTx::Create(key, stored) => {
                if state.records.contains_key(&key) {
                    return Err(LedgerError::new(
                        LedgerErrorKind::Reverted,
                        format!("execution reverted: molecule {key} already exists"),
                    ));
                }
                state.order.push(key.clone());
                state.records.insert(key, stored);
            }
            PendingTx::Verify(key, value) => {
                let late = state.faults.late_verifier.take();
                let stored = state.records.get_mut(&key).ok_or_else(|| {
                    LedgerError::new(LedgerErrorKind::Reverted, format!("record {key} does not exist"))
                })?;
                if let Some(other) = late {
                    stored.data.is_verified = true;
                    stored.data.decrypted_value = other;
                }
                if stored.data.is_verified {
                    return Err(LedgerError::new(LedgerErrorKind::AlreadyVerified, ALREADY_VERIFIED_REVERT));
                }
                stored.data.is_verified = true;
                stored.data.decrypted_value = value;
            }
        }
        Ok(())
    }
}
