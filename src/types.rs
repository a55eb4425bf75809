use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of every key minted by the creation pipeline.
pub const MOLECULE_ID_PREFIX: &str = "molecule-";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MoleculeId(pub String);

impl MoleculeId {
    /// Mint a fresh key from a unix timestamp in milliseconds.
    pub fn mint(now_millis: i64) -> Self {
        MoleculeId(format!("{MOLECULE_ID_PREFIX}{now_millis}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric suffix after the `molecule-` prefix, if the key has one.
    pub fn numeric_suffix(&self) -> Option<u64> {
        self.0
            .strip_prefix(MOLECULE_ID_PREFIX)
            .and_then(|rest| rest.parse::<u64>().ok())
    }
}

impl fmt::Display for MoleculeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MoleculeId {
    fn from(value: &str) -> Self {
        MoleculeId(value.to_string())
    }
}

/// Account or contract address as an opaque `0x`-prefixed string.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `0x` followed by 40 hex digits.
    pub fn is_well_formed(&self) -> bool {
        match self.0.strip_prefix("0x") {
            Some(body) => body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit()),
            None => false,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Address(value.to_string())
    }
}

/// Opaque reference to a ciphertext held by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CiphertextHandle(pub String);

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ciphertext plus the input proof binding it to a contract and actor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedInput {
    pub ciphertext: Vec<u8>,
    pub proof: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
}

/// Record payload exactly as the ledger returns it.
///
/// `decrypted_value` is whatever the contract stores, including the default
/// `0` before verification; it only means something when `is_verified` holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordData {
    pub name: String,
    pub creator: Address,
    pub timestamp: i64,
    pub public_value1: u64,
    pub public_value2: u64,
    pub description: String,
    pub is_verified: bool,
    pub decrypted_value: u64,
}

/// Submission carried by a creation transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRecord {
    pub key: MoleculeId,
    pub name: String,
    pub encrypted: EncryptedInput,
    pub public_toxicity: u64,
    pub public_value2: u64,
    pub label: String,
    pub sender: Address,
}

/// What the ledger itself knows about the sensitive value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerValue {
    Encrypted,
    Verified(u64),
}

/// Observability of a record's sensitive value within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensitiveValue {
    Unknown,
    /// Decrypted in this session but not (yet) observed as verified on the ledger.
    LocallyDecrypted(u64),
    Verified(u64),
}

impl SensitiveValue {
    /// The ledger state always wins over a session-local value.
    pub fn resolve(record: &Record, local: Option<u64>) -> Self {
        match (record.verification, local) {
            (LedgerValue::Verified(v), _) => SensitiveValue::Verified(v),
            (LedgerValue::Encrypted, Some(v)) => SensitiveValue::LocallyDecrypted(v),
            (LedgerValue::Encrypted, None) => SensitiveValue::Unknown,
        }
    }

    pub fn value(self) -> Option<u64> {
        match self {
            SensitiveValue::Unknown => None,
            SensitiveValue::LocallyDecrypted(v) | SensitiveValue::Verified(v) => Some(v),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub name: String,
    pub molecule_id: MoleculeId,
    /// Creation time, seconds since epoch.
    pub timestamp: i64,
    pub creator: Address,
    /// Public toxicity.
    pub public_value1: u64,
    pub public_value2: u64,
    pub description: String,
    pub verification: LedgerValue,
}

impl Record {
    pub fn from_ledger(key: MoleculeId, data: RecordData) -> Self {
        let id = key
            .numeric_suffix()
            .unwrap_or_else(|| data.timestamp.max(0) as u64);
        let verification = if data.is_verified {
            LedgerValue::Verified(data.decrypted_value)
        } else {
            LedgerValue::Encrypted
        };
        Self {
            id,
            name: data.name,
            molecule_id: key,
            timestamp: data.timestamp,
            creator: data.creator,
            public_value1: data.public_value1,
            public_value2: data.public_value2,
            description: data.description,
            verification,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self.verification, LedgerValue::Verified(_))
    }

    pub fn verified_value(&self) -> Option<u64> {
        match self.verification {
            LedgerValue::Verified(v) => Some(v),
            LedgerValue::Encrypted => None,
        }
    }

    /// Seconds elapsed since creation at `now`; negative under clock skew.
    pub fn age_secs(&self, now: i64) -> i64 {
        now - self.timestamp
    }
}
