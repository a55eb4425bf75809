//! In-memory cache of ledger records.
//!
//! A reload always rebuilds the full catalogue from the ledger and swaps it in
//! one step, so readers never see two generations of the same key side by
//! side. Single-record read failures are skipped; a failure to list keys
//! leaves the previous catalogue in place.
//!
//! Reloads are ordered by when they start. A reload that lands after a later
//! one has already committed read an older ledger state and is discarded.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ledger::{LedgerClient, LedgerError};
use crate::types::{LedgerValue, MoleculeId, Record};

/// One immutable generation of the cache.
#[derive(Clone, Debug, Default)]
pub struct Catalogue {
    pub generation: u64,
    /// Ledger key order.
    pub records: Vec<Record>,
}

impl Catalogue {
    pub fn get(&self, key: &MoleculeId) -> Option<&Record> {
        self.records.iter().find(|r| &r.molecule_id == key)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    pub generation: u64,
    pub loaded: usize,
    pub skipped: usize,
}

#[derive(Default)]
struct Committed {
    /// Start ticket of the reload that produced `catalogue`.
    ticket: u64,
    catalogue: Arc<Catalogue>,
    report: ReloadReport,
}

#[derive(Default)]
pub struct RecordStore {
    tickets: AtomicU64,
    current: RwLock<Committed>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<Catalogue> {
        Arc::clone(&self.current.read().catalogue)
    }

    pub fn records(&self) -> Vec<Record> {
        self.snapshot().records.clone()
    }

    pub fn get(&self, key: &MoleculeId) -> Option<Record> {
        self.snapshot().get(key).cloned()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    pub fn len(&self) -> usize {
        self.snapshot().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rebuild the catalogue from the ledger.
    ///
    /// When a reload that started later has already committed, this one is
    /// dropped and the report of the committed catalogue is returned.
    pub async fn reload(&self, ledger: &dyn LedgerClient) -> Result<ReloadReport, LedgerError> {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let keys = ledger.list_record_keys().await?;

        let mut records = Vec::with_capacity(keys.len());
        let mut skipped = 0usize;
        for key in keys {
            match ledger.get_record(&key).await {
                Ok(data) => records.push(Record::from_ledger(key, data)),
                Err(err) => {
                    skipped += 1;
                    warn!(molecule_id = %key, error = %err, "skipping record that failed to load");
                }
            }
        }

        let mut current = self.current.write();
        if current.ticket > ticket {
            debug!(
                ticket,
                committed = current.ticket,
                "discarding reload superseded by a newer one"
            );
            return Ok(current.report.clone());
        }

        hold_verified(&current.catalogue, &mut records);
        let generation = current.catalogue.generation + 1;
        let report = ReloadReport {
            generation,
            loaded: records.len(),
            skipped,
        };
        *current = Committed {
            ticket,
            catalogue: Arc::new(Catalogue { generation, records }),
            report: report.clone(),
        };
        debug!(generation, loaded = report.loaded, skipped, "record store reloaded");
        Ok(report)
    }
}

/// Verified is terminal: a fetch that reports a verified record as encrypted
/// is treated as a stale read and the verified copy is kept.
fn hold_verified(previous: &Catalogue, records: &mut [Record]) {
    if previous.records.is_empty() {
        return;
    }
    let verified: HashMap<&MoleculeId, &Record> = previous
        .records
        .iter()
        .filter(|r| r.is_verified())
        .map(|r| (&r.molecule_id, r))
        .collect();
    for record in records.iter_mut() {
        if record.verification != LedgerValue::Encrypted {
            continue;
        }
        if let Some(prior) = verified.get(&record.molecule_id) {
            warn!(
                molecule_id = %record.molecule_id,
                "ledger reported a verified record as encrypted; keeping verified copy"
            );
            *record = (*prior).clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerErrorKind;
    use crate::types::{Address, CiphertextHandle, CreateRecord, RecordData, Transaction};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::time::Duration;

    /// Scripted ledger whose contents tests overwrite directly.
    #[derive(Default)]
    struct ScriptedLedger {
        rows: Mutex<Vec<(MoleculeId, RecordData)>>,
        broken: Mutex<HashSet<MoleculeId>>,
        down: Mutex<bool>,
        /// Hold back the next key listing after it was read.
        stale_listing: Mutex<Option<Duration>>,
    }

    impl ScriptedLedger {
        fn put(&self, key: &str, verified: Option<u64>) {
            let mut rows = self.rows.lock();
            rows.retain(|(k, _)| k.as_str() != key);
            rows.push((
                MoleculeId::from(key),
                RecordData {
                    name: key.to_string(),
                    creator: Address::from("0xa"),
                    timestamp: 100,
                    public_value1: 2,
                    public_value2: 0,
                    description: String::new(),
                    is_verified: verified.is_some(),
                    decrypted_value: verified.unwrap_or(0),
                },
            ));
        }
    }

    #[async_trait]
    impl LedgerClient for ScriptedLedger {
        async fn contract_address(&self) -> Result<Address, LedgerError> {
            Ok(Address::from("0xc"))
        }

        async fn list_record_keys(&self) -> Result<Vec<MoleculeId>, LedgerError> {
            if *self.down.lock() {
                return Err(LedgerError::unavailable("down"));
            }
            let keys: Vec<MoleculeId> = self.rows.lock().iter().map(|(k, _)| k.clone()).collect();
            let delay = self.stale_listing.lock().take();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(keys)
        }

        async fn get_record(&self, key: &MoleculeId) -> Result<RecordData, LedgerError> {
            if self.broken.lock().contains(key) {
                return Err(LedgerError::other("bad row"));
            }
            self.rows
                .lock()
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, d)| d.clone())
                .ok_or_else(|| LedgerError::new(LedgerErrorKind::Reverted, "missing"))
        }

        async fn get_ciphertext_handle(&self, _key: &MoleculeId) -> Result<CiphertextHandle, LedgerError> {
            Err(LedgerError::other("unsupported"))
        }

        async fn create_record(&self, _submission: CreateRecord) -> Result<Transaction, LedgerError> {
            Err(LedgerError::other("unsupported"))
        }

        async fn submit_verification(
            &self,
            _key: &MoleculeId,
            _clear_values: &[u8],
            _proof: &[u8],
        ) -> Result<Transaction, LedgerError> {
            Err(LedgerError::other("unsupported"))
        }

        async fn await_finality(&self, _tx: &Transaction) -> Result<(), LedgerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn skips_records_that_fail_to_load() {
        let ledger = ScriptedLedger::default();
        ledger.put("molecule-1", None);
        ledger.put("molecule-2", Some(4));
        ledger.put("molecule-3", None);
        ledger.broken.lock().insert(MoleculeId::from("molecule-2"));

        let store = RecordStore::new();
        let report = store.reload(&ledger).await.unwrap();
        assert_eq!(report, ReloadReport { generation: 1, loaded: 2, skipped: 1 });
        assert!(store.get(&MoleculeId::from("molecule-2")).is_none());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn failed_key_listing_preserves_cache() {
        let ledger = ScriptedLedger::default();
        ledger.put("molecule-1", None);
        let store = RecordStore::new();
        store.reload(&ledger).await.unwrap();

        *ledger.down.lock() = true;
        let err = store.reload(&ledger).await.unwrap_err();
        assert_eq!(err.kind, LedgerErrorKind::Unavailable);
        assert_eq!(store.len(), 1);
        assert_eq!(store.generation(), 1);
    }

    #[tokio::test]
    async fn reload_replaces_rather_than_merges() {
        let ledger = ScriptedLedger::default();
        ledger.put("molecule-1", None);
        ledger.put("molecule-2", None);
        let store = RecordStore::new();
        store.reload(&ledger).await.unwrap();

        ledger.rows.lock().retain(|(k, _)| k.as_str() == "molecule-2");
        store.reload(&ledger).await.unwrap();
        let keys: Vec<_> = store.records().into_iter().map(|r| r.molecule_id).collect();
        assert_eq!(keys, vec![MoleculeId::from("molecule-2")]);
    }

    #[tokio::test]
    async fn verified_never_regresses() {
        let ledger = ScriptedLedger::default();
        ledger.put("molecule-1", Some(42));
        let store = RecordStore::new();
        store.reload(&ledger).await.unwrap();

        ledger.put("molecule-1", None);
        store.reload(&ledger).await.unwrap();
        let record = store.get(&MoleculeId::from("molecule-1")).unwrap();
        assert_eq!(record.verification, LedgerValue::Verified(42));
    }

    #[tokio::test(start_paused = true)]
    async fn older_reload_cannot_overwrite_newer_one() {
        let ledger = ScriptedLedger::default();
        ledger.put("molecule-1", None);
        *ledger.stale_listing.lock() = Some(Duration::from_millis(500));
        let store = RecordStore::new();

        let (stale, fresh) = tokio::join!(store.reload(&ledger), async {
            ledger.put("molecule-2", None);
            store.reload(&ledger).await
        });

        let fresh = fresh.unwrap();
        assert_eq!(fresh, ReloadReport { generation: 1, loaded: 2, skipped: 0 });
        assert_eq!(stale.unwrap(), fresh);
        assert_eq!(store.len(), 2);
        assert_eq!(store.generation(), 1);
    }

    #[tokio::test]
    async fn empty_until_first_reload() {
        let ledger = ScriptedLedger::default();
        ledger.put("molecule-1", None);
        let store = RecordStore::new();
        assert!(store.is_empty());
        store.reload(&ledger).await.unwrap();
        assert!(!store.is_empty());
    }
}
