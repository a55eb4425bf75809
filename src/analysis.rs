//! Deterministic multi-factor molecule scoring.
//!
//! Scores depend only on the effective efficacy `e`, effective toxicity `t`
//! and record age. Rounding is half-up (`floor(x + 0.5)`), including for
//! negative intermediates.

use serde::{Deserialize, Serialize};

use crate::types::{LedgerValue, Record};

/// Fallback when neither a decrypted nor a public value is usable.
pub const DEFAULT_FACTOR: u64 = 5;
/// Age at which the time factor has decayed by 1.0 (30 days).
pub const DECAY_WINDOW_SECS: f64 = 2_592_000.0;
pub const TIME_FACTOR_MIN: f64 = 0.7;
pub const TIME_FACTOR_MAX: f64 = 1.3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoleculeAnalysis {
    pub efficacy_score: u32,
    pub safety_profile: u32,
    pub bioavailability: u32,
    pub synthesis_complexity: u32,
    pub patent_potential: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInputs {
    pub efficacy: f64,
    pub toxicity: f64,
    pub age_secs: i64,
}

impl AnalysisInputs {
    /// Efficacy: ledger-verified value, else the session's local decryption,
    /// else the public value, else [`DEFAULT_FACTOR`]. Toxicity: the public
    /// value, or [`DEFAULT_FACTOR`] when it is zero.
    pub fn resolve(record: &Record, local: Option<u64>, now_secs: i64) -> Self {
        let efficacy = match (record.verification, local) {
            (LedgerValue::Verified(v), _) => v,
            (LedgerValue::Encrypted, Some(v)) => v,
            (LedgerValue::Encrypted, None) => non_zero_or_default(record.public_value1),
        };
        Self {
            efficacy: efficacy as f64,
            toxicity: non_zero_or_default(record.public_value1) as f64,
            age_secs: record.age_secs(now_secs),
        }
    }
}

fn non_zero_or_default(value: u64) -> u64 {
    if value == 0 {
        DEFAULT_FACTOR
    } else {
        value
    }
}

fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

fn to_score(x: f64, max: f64) -> u32 {
    x.clamp(0.0, max) as u32
}

pub fn time_factor(age_secs: i64) -> f64 {
    (1.0 - age_secs as f64 / DECAY_WINDOW_SECS).clamp(TIME_FACTOR_MIN, TIME_FACTOR_MAX)
}

pub fn score(inputs: AnalysisInputs) -> MoleculeAnalysis {
    let e = inputs.efficacy;
    let t = inputs.toxicity;
    let headroom = 10.0 - t;

    let base_efficacy = round_half_up((e * 0.8 + headroom * 0.2) * 10.0).min(100.0);
    let efficacy_score = round_half_up(base_efficacy * time_factor(inputs.age_secs));
    let safety_profile = round_half_up(headroom * 8.0 + e * 0.5);
    let bioavailability = round_half_up(e * 0.6 + headroom * 4.0);
    let synthesis_complexity = round_half_up((100.0 - (e * 0.3 + t * 2.0)).clamp(10.0, 90.0));
    let patent_potential = round_half_up((e * 0.7 + headroom * 0.3) * 9.0).min(95.0);

    MoleculeAnalysis {
        efficacy_score: to_score(efficacy_score, 100.0),
        safety_profile: to_score(safety_profile, 100.0),
        bioavailability: to_score(bioavailability, 100.0),
        synthesis_complexity: to_score(synthesis_complexity, 90.0),
        patent_potential: to_score(patent_potential, 95.0),
    }
}

pub fn analyze(record: &Record, local: Option<u64>, now_secs: i64) -> MoleculeAnalysis {
    score(AnalysisInputs::resolve(record, local, now_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, MoleculeId};
    use pretty_assertions::assert_eq;

    const NOW: i64 = 1_700_000_000;

    fn record(public_value1: u64, verification: LedgerValue) -> Record {
        Record {
            id: 1,
            name: "aspirin".into(),
            molecule_id: MoleculeId::mint(1),
            timestamp: NOW,
            creator: Address::from("0xa"),
            public_value1,
            public_value2: 0,
            description: String::new(),
            verification,
        }
    }

    #[test]
    fn reference_triple() {
        let out = score(AnalysisInputs {
            efficacy: 7.0,
            toxicity: 3.0,
            age_secs: 0,
        });
        assert_eq!(
            out,
            MoleculeAnalysis {
                efficacy_score: 70,
                safety_profile: 60,
                bioavailability: 32,
                synthesis_complexity: 90,
                patent_potential: 63,
            }
        );
    }

    #[test]
    fn verified_value_drives_efficacy() {
        let r = record(3, LedgerValue::Verified(7));
        assert_eq!(analyze(&r, Some(1), NOW), analyze(&r, None, NOW));
        assert_eq!(analyze(&r, None, NOW).efficacy_score, 70);
    }

    #[test]
    fn local_value_used_only_before_verification() {
        let r = record(3, LedgerValue::Encrypted);
        let inputs = AnalysisInputs::resolve(&r, Some(7), NOW);
        assert_eq!(inputs.efficacy, 7.0);
        let inputs = AnalysisInputs::resolve(&r, Some(0), NOW);
        assert_eq!(inputs.efficacy, 0.0);
    }

    #[test]
    fn falls_back_to_public_then_default() {
        let r = record(3, LedgerValue::Encrypted);
        assert_eq!(AnalysisInputs::resolve(&r, None, NOW).efficacy, 3.0);

        let r = record(0, LedgerValue::Encrypted);
        let inputs = AnalysisInputs::resolve(&r, None, NOW);
        assert_eq!(inputs.efficacy, 5.0);
        assert_eq!(inputs.toxicity, 5.0);
    }

    #[test]
    fn time_factor_is_bounded() {
        assert_eq!(time_factor(0), 1.0);
        assert_eq!(time_factor(2_592_000 * 10), 0.7);
        assert_eq!(time_factor(-2_592_000 * 10), 1.3);
        assert!((time_factor(432_000) - (1.0 - 1.0 / 6.0)).abs() < 1e-12);
    }

    #[test]
    fn old_records_decay_to_floor() {
        let out = score(AnalysisInputs {
            efficacy: 7.0,
            toxicity: 3.0,
            age_secs: 60 * 86_400,
        });
        assert_eq!(out.efficacy_score, 49);
    }

    #[test]
    fn scores_stay_in_range_for_extreme_inputs() {
        let toxic = score(AnalysisInputs {
            efficacy: 0.0,
            toxicity: 40.0,
            age_secs: 0,
        });
        assert_eq!(toxic.efficacy_score, 0);
        assert_eq!(toxic.safety_profile, 0);
        assert_eq!(toxic.bioavailability, 0);
        assert_eq!(toxic.synthesis_complexity, 20);
        assert_eq!(toxic.patent_potential, 0);

        let potent = score(AnalysisInputs {
            efficacy: 1_000.0,
            toxicity: 1.0,
            age_secs: -10 * 86_400,
        });
        assert_eq!(potent.efficacy_score, 100);
        assert_eq!(potent.safety_profile, 100);
        assert_eq!(potent.bioavailability, 100);
        assert_eq!(potent.synthesis_complexity, 10);
        assert_eq!(potent.patent_potential, 95);
    }

    #[test]
    fn deterministic() {
        let r = record(4, LedgerValue::Encrypted);
        assert_eq!(analyze(&r, Some(9), NOW + 12_345), analyze(&r, Some(9), NOW + 12_345));
    }
}
