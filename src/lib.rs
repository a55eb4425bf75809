//! Core of an encrypted molecule catalogue backed by an append-only ledger.
//!
//! Each record keeps its efficacy encrypted on the ledger next to a public
//! toxicity value. This crate owns the record lifecycle around that:
//! creation (encrypt, submit, await finality, reload), verification through
//! the interactive decrypt-and-prove protocol, a deterministic analysis
//! engine, search and aggregation over the cached catalogue, and a single
//! status notification with auto-dismiss.
//!
//! The ledger client, encryption engine and identity provider are consumed
//! through traits; simulated implementations live next to each trait.

pub mod analysis;
pub mod clock;
pub mod config;
pub mod error;
pub mod fhe;
pub mod identity;
pub mod ledger;
pub mod registry;
pub mod search;
pub mod status;
pub mod store;
pub mod types;

pub use crate::error::{PipelineError, PipelineResult};
pub use crate::registry::{RecordDraft, Registry};
