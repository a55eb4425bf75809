use serde::{Deserialize, Serialize};

use crate::types::Record;

/// Records younger than this count as recent (7 days).
pub const RECENT_WINDOW_SECS: i64 = 604_800;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordQuery {
    pub term: String,
    pub verified_only: bool,
}

impl RecordQuery {
    pub fn new(term: impl Into<String>, verified_only: bool) -> Self {
        Self {
            term: term.into(),
            verified_only,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        let needle = self.term.to_lowercase();
        let matches_term = record.name.to_lowercase().contains(&needle)
            || record.creator.as_str().to_lowercase().contains(&needle);
        matches_term && (!self.verified_only || record.is_verified())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogueStats {
    pub total: usize,
    pub verified: usize,
    /// Mean of `public_value1`; 0 for an empty catalogue.
    pub avg_efficacy: f64,
    pub recent: usize,
}

/// Case-insensitive substring match on name or creator, optionally restricted
/// to verified records. An empty term matches everything.
pub fn filter<'a>(records: &'a [Record], term: &str, verified_only: bool) -> Vec<&'a Record> {
    let query = RecordQuery::new(term, verified_only);
    records.iter().filter(|r| query.matches(r)).collect()
}

pub fn compute_stats(records: &[Record], now_secs: i64) -> CatalogueStats {
    let total = records.len();
    let verified = records.iter().filter(|r| r.is_verified()).count();
    let avg_efficacy = if total == 0 {
        0.0
    } else {
        records.iter().map(|r| r.public_value1 as f64).sum::<f64>() / total as f64
    };
    let recent = records
        .iter()
        .filter(|r| r.age_secs(now_secs) < RECENT_WINDOW_SECS)
        .count();
    CatalogueStats {
        total,
        verified,
        avg_efficacy,
        recent,
    }
}
