use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::registry::{InFlight, Registry};
use crate::status::Status;
use crate::types::{Address, CreateRecord, MoleculeId};

const CONTEXT: &str = "Submission failed";

/// Raw creation form input.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub name: String,
    pub public_toxicity: String,
    pub efficacy: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ValidDraft {
    name: String,
    public_toxicity: u64,
    efficacy: u64,
}

impl RecordDraft {
    pub fn new(
        name: impl Into<String>,
        public_toxicity: impl Into<String>,
        efficacy: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            public_toxicity: public_toxicity.into(),
            efficacy: efficacy.into(),
        }
    }

    /// Build a draft the way the creation form does: numeric fields only keep digits.
    pub fn from_form(name: &str, public_toxicity: &str, efficacy: &str) -> Self {
        Self::new(
            name,
            Self::sanitize_numeric(public_toxicity),
            Self::sanitize_numeric(efficacy),
        )
    }

    pub fn sanitize_numeric(raw: &str) -> String {
        raw.chars().filter(|c| c.is_ascii_digit()).collect()
    }

    fn validate(&self) -> PipelineResult<ValidDraft> {
        let name = self.name.trim();
        let missing: Vec<&str> = [
            ("name", name),
            ("toxicity", self.public_toxicity.trim()),
            ("efficacy", self.efficacy.trim()),
        ]
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| *field)
        .collect();
        if !missing.is_empty() {
            return Err(PipelineError::InvalidInput(format!(
                "missing {}",
                missing.join(", ")
            )));
        }
        Ok(ValidDraft {
            name: name.to_string(),
            public_toxicity: coerce_count(&self.public_toxicity),
            efficacy: coerce_count(&self.efficacy),
        })
    }
}

/// Leading decimal digits as a non-negative integer; anything else is 0.
fn coerce_count(raw: &str) -> u64 {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

impl Registry {
    /// Encrypt the efficacy, submit a new record and reload the catalogue.
    ///
    /// Returns the minted key once the creation transaction is final. Nothing
    /// is written to the store on failure.
    pub async fn create_record(&self, draft: RecordDraft) -> PipelineResult<MoleculeId> {
        let actor = self.connected_actor(CONTEXT)?;
        let valid = draft.validate().map_err(|err| self.fail(err, CONTEXT))?;
        let _guard = InFlight::acquire(&self.creating, "record creation")?;

        self.status
            .publish(Status::pending("Encrypting efficacy and submitting record..."));
        let key = self
            .submit_creation(&actor, valid)
            .await
            .map_err(|err| self.fail(err, CONTEXT))?;

        info!(molecule_id = %key, creator = %actor, "record created");
        self.status.publish(Status::success("Molecule created successfully!"));
        self.reload_after_write().await;
        Ok(key)
    }

    async fn submit_creation(&self, actor: &Address, valid: ValidDraft) -> PipelineResult<MoleculeId> {
        self.ensure_engine().await?;
        let contract = self.contract_address().await?;
        let key = MoleculeId::mint(self.clock.now_millis());

        let encrypted = self.engine.encrypt(&contract, actor, valid.efficacy).await?;
        let tx = self
            .ledger
            .create_record(CreateRecord {
                key: key.clone(),
                name: valid.name,
                encrypted,
                public_toxicity: valid.public_toxicity,
                public_value2: self.config.registry.secondary_public_value,
                label: self.config.registry.record_label.clone(),
                sender: actor.clone(),
            })
            .await?;

        self.status
            .publish(Status::pending("Waiting for transaction confirmation..."));
        self.ledger.await_finality(&tx).await?;
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_keeps_digits_only() {
        let draft = RecordDraft::from_form("Aspirin", "3.5", "-12a");
        assert_eq!(draft.public_toxicity, "35");
        assert_eq!(draft.efficacy, "12");
    }

    #[test]
    fn empty_fields_are_reported() {
        let err = RecordDraft::new(" ", "3", "").validate().unwrap_err();
        assert_eq!(err, PipelineError::InvalidInput("missing name, efficacy".into()));
    }

    #[test]
    fn coercion_follows_leading_digits() {
        assert_eq!(coerce_count("42"), 42);
        assert_eq!(coerce_count(" 7.9 "), 7);
        assert_eq!(coerce_count("abc"), 0);
        assert_eq!(coerce_count("-3"), 0);
        assert_eq!(coerce_count("99999999999999999999999"), 0);
    }

    #[test]
    fn valid_draft_is_trimmed_and_parsed() {
        let valid = RecordDraft::new(" Aspirin ", "3", "7").validate().unwrap();
        assert_eq!(
            valid,
            ValidDraft {
                name: "Aspirin".into(),
                public_toxicity: 3,
                efficacy: 7,
            }
        );
    }
}
