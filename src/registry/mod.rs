//! Session coordinator tying the record store, pipelines and notifier together.
//!
//! A [`Registry`] corresponds to one UI session: it owns the record cache, the
//! status notification, the per-session in-flight guards and the map of values
//! decrypted locally in this session. Local values are kept apart from the
//! cached records and never merged into them.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::analysis::{analyze, MoleculeAnalysis};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::fhe::EncryptionEngine;
use crate::identity::IdentityProvider;
use crate::ledger::LedgerClient;
use crate::search::{compute_stats, CatalogueStats, RecordQuery};
use crate::status::{Status, StatusNotifier};
use crate::store::{RecordStore, ReloadReport};
use crate::types::{Address, MoleculeId, Record, SensitiveValue};

mod create;
mod verify;

pub use create::RecordDraft;

pub struct Registry {
    config: Config,
    ledger: Arc<dyn LedgerClient>,
    engine: Arc<dyn EncryptionEngine>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    store: RecordStore,
    status: StatusNotifier,
    local: DashMap<MoleculeId, u64>,
    engine_ready: OnceCell<()>,
    contract: OnceCell<Address>,
    creating: AtomicBool,
    verifying: AtomicBool,
}

/// Holds a per-session in-flight flag for the lifetime of an operation.
///
/// A refused acquire leaves the status alone; it belongs to the operation
/// already running.
struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool, operation: &'static str) -> PipelineResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                debug!(operation, "refusing re-entry while in flight");
                PipelineError::Busy(operation)
            })?;
        Ok(Self { flag })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl Registry {
    pub fn new(
        config: Config,
        ledger: Arc<dyn LedgerClient>,
        engine: Arc<dyn EncryptionEngine>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let status = StatusNotifier::new(&config.status);
        Self {
            config,
            ledger,
            engine,
            identity,
            clock: Arc::new(SystemClock),
            store: RecordStore::new(),
            status,
            local: DashMap::new(),
            engine_ready: OnceCell::new(),
            contract: OnceCell::new(),
            creating: AtomicBool::new(false),
            verifying: AtomicBool::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn status(&self) -> &StatusNotifier {
        &self.status
    }

    pub fn is_creating(&self) -> bool {
        self.creating.load(Ordering::Acquire)
    }

    pub fn is_verifying(&self) -> bool {
        self.verifying.load(Ordering::Acquire)
    }

    /// Initialize the encryption engine and load the catalogue for a freshly
    /// connected actor.
    pub async fn start_session(&self) -> PipelineResult<ReloadReport> {
        if !self.identity.is_connected() {
            return Err(self.fail(PipelineError::NotConnected, "Session start failed"));
        }
        if let Err(err) = self.ensure_engine().await {
            warn!(error = %err, "encryption engine initialization failed");
            self.status.publish(Status::error(
                "Encryption engine initialization failed. Please check your wallet connection.",
            ));
            return Err(err);
        }
        self.refresh().await
    }

    /// Reload the catalogue. On failure the previous catalogue stays in place;
    /// retrying is left to the caller.
    pub async fn refresh(&self) -> PipelineResult<ReloadReport> {
        match self.store.reload(self.ledger.as_ref()).await {
            Ok(report) => {
                info!(
                    generation = report.generation,
                    loaded = report.loaded,
                    skipped = report.skipped,
                    "catalogue refreshed"
                );
                Ok(report)
            }
            Err(err) => Err(self.fail(PipelineError::LoadFailure(err.message), "Failed to load data")),
        }
    }

    pub fn records(&self) -> Vec<Record> {
        self.store.records()
    }

    pub fn record(&self, key: &MoleculeId) -> Option<Record> {
        self.store.get(key)
    }

    pub fn search(&self, query: &RecordQuery) -> Vec<Record> {
        self.store
            .snapshot()
            .records
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> CatalogueStats {
        compute_stats(&self.store.snapshot().records, self.clock.now_secs())
    }

    pub fn local_decryption(&self, key: &MoleculeId) -> Option<u64> {
        self.local.get(key).map(|v| *v)
    }

    pub fn clear_local_decryption(&self, key: &MoleculeId) -> Option<u64> {
        self.local.remove(key).map(|(_, v)| v)
    }

    /// Three-state view of a cached record's sensitive value.
    pub fn sensitive_value(&self, key: &MoleculeId) -> Option<SensitiveValue> {
        self.store
            .get(key)
            .map(|record| SensitiveValue::resolve(&record, self.local_decryption(key)))
    }

    pub fn analysis(&self, key: &MoleculeId) -> Option<MoleculeAnalysis> {
        let record = self.store.get(key)?;
        Some(analyze(&record, self.local_decryption(key), self.clock.now_secs()))
    }

    async fn ensure_engine(&self) -> PipelineResult<()> {
        self.engine_ready
            .get_or_try_init(|| async {
                self.engine.initialize().await?;
                info!("encryption engine initialized");
                Ok::<(), PipelineError>(())
            })
            .await?;
        Ok(())
    }

    async fn contract_address(&self) -> PipelineResult<Address> {
        let address = self
            .contract
            .get_or_try_init(|| async {
                match &self.config.registry.contract_address {
                    Some(address) => Ok(address.clone()),
                    None => self.ledger.contract_address().await.map_err(PipelineError::from),
                }
            })
            .await?;
        Ok(address.clone())
    }

    fn connected_actor(&self, context: &str) -> PipelineResult<Address> {
        self.identity
            .connected_actor()
            .ok_or_else(|| self.fail(PipelineError::NotConnected, context))
    }

    /// Reload after a confirmed write. A failure is surfaced as a status but
    /// does not undo the write's success.
    async fn reload_after_write(&self) -> bool {
        match self.store.reload(self.ledger.as_ref()).await {
            Ok(_) => true,
            Err(err) => {
                self.fail(PipelineError::LoadFailure(err.message), "Failed to load data");
                false
            }
        }
    }

    fn fail(&self, err: PipelineError, context: &str) -> PipelineError {
        warn!(error = %err, context, "operation failed");
        self.status.publish(Status::error(err.status_message(context)));
        err
    }
}
