use async_trait::async_trait;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::fhe::{encode_clear_values, DecryptionResult, EncryptionEngine, EngineError, ProofSubmitter};
use crate::types::{Address, CiphertextHandle, EncryptedInput};

const NONCE_LEN: usize = 16;
const CIPHERTEXT_LEN: usize = NONCE_LEN + 8;

/// Handle under which a ledger stores a simulated ciphertext.
///
/// Simulated handles embed the ciphertext itself so the engine can resolve
/// them without a side channel.
pub fn handle_for_ciphertext(ciphertext: &[u8]) -> CiphertextHandle {
    CiphertextHandle(format!("0x{}", hex::encode(ciphertext)))
}

/// Stand-in for a homomorphic encryption engine.
///
/// Values are masked with a blake3 keyed stream; proofs are keyed MACs. This
/// offers no confidentiality against anyone holding the session key and only
/// exists so the pipelines can be exercised end to end. Call counters and
/// failure switches let tests observe and perturb the protocol.
pub struct SimulatedEngine {
    key: [u8; 32],
    initialized: AtomicBool,
    fail_initialize: AtomicBool,
    fail_encrypt: AtomicBool,
    fail_decrypt: AtomicBool,
    initialize_calls: AtomicU64,
    encrypt_calls: AtomicU64,
    decrypt_calls: AtomicU64,
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::with_key(rand::thread_rng().gen())
    }

    pub fn with_key(key: [u8; 32]) -> Self {
        Self {
            key,
            initialized: AtomicBool::new(false),
            fail_initialize: AtomicBool::new(false),
            fail_encrypt: AtomicBool::new(false),
            fail_decrypt: AtomicBool::new(false),
            initialize_calls: AtomicU64::new(0),
            encrypt_calls: AtomicU64::new(0),
            decrypt_calls: AtomicU64::new(0),
        }
    }

    pub fn set_fail_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_encrypt(&self, fail: bool) {
        self.fail_encrypt.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_decrypt(&self, fail: bool) {
        self.fail_decrypt.store(fail, Ordering::SeqCst);
    }

    pub fn initialize_calls(&self) -> u64 {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn encrypt_calls(&self) -> u64 {
        self.encrypt_calls.load(Ordering::SeqCst)
    }

    pub fn decrypt_calls(&self) -> u64 {
        self.decrypt_calls.load(Ordering::SeqCst)
    }

    fn ensure_ready(&self) -> Result<(), EngineError> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::NotInitialized)
        }
    }

    fn keystream(&self, nonce: &[u8]) -> [u8; 8] {
        let digest = blake3::keyed_hash(&self.key, nonce);
        let mut out = [0u8; 8];
        out.copy_from_slice(&digest.as_bytes()[..8]);
        out
    }

    fn mac(&self, domain: &[u8], parts: &[&[u8]]) -> Vec<u8> {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(domain);
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        hasher.finalize().as_bytes().to_vec()
    }

    fn decrypt_handle(&self, handle: &CiphertextHandle) -> Result<u64, EngineError> {
        let body = handle
            .0
            .strip_prefix("0x")
            .ok_or_else(|| EngineError::Decrypt(format!("unknown handle {handle}")))?;
        let ciphertext =
            hex::decode(body).map_err(|e| EngineError::Decrypt(format!("handle {handle}: {e}")))?;
        if ciphertext.len() != CIPHERTEXT_LEN {
            return Err(EngineError::Decrypt(format!(
                "handle {handle} has {} bytes, expected {CIPHERTEXT_LEN}",
                ciphertext.len()
            )));
        }
        let (nonce, masked) = ciphertext.split_at(NONCE_LEN);
        let ks = self.keystream(nonce);
        let mut plain = [0u8; 8];
        for (i, b) in plain.iter_mut().enumerate() {
            *b = masked[i] ^ ks[i];
        }
        Ok(u64::from_be_bytes(plain))
    }
}

#[async_trait]
impl EncryptionEngine for SimulatedEngine {
    async fn initialize(&self) -> Result<(), EngineError> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(EngineError::Initialization("relayer unreachable".into()));
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn encrypt(
        &self,
        contract: &Address,
        actor: &Address,
        value: u64,
    ) -> Result<EncryptedInput, EngineError> {
        self.ensure_ready()?;
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_encrypt.load(Ordering::SeqCst) {
            return Err(EngineError::Encrypt("input proof generation failed".into()));
        }

        let nonce: [u8; NONCE_LEN] = rand::thread_rng().gen();
        let ks = self.keystream(&nonce);
        let mut ciphertext = Vec::with_capacity(CIPHERTEXT_LEN);
        ciphertext.extend_from_slice(&nonce);
        for (i, b) in value.to_be_bytes().iter().enumerate() {
            ciphertext.push(b ^ ks[i]);
        }
        let proof = self.mac(
            b"input-proof",
            &[contract.as_str().as_bytes(), actor.as_str().as_bytes(), &ciphertext],
        );
        Ok(EncryptedInput { ciphertext, proof })
    }

    async fn request_decryption_proof(
        &self,
        handles: &[CiphertextHandle],
        contract: &Address,
        submitter: &dyn ProofSubmitter,
    ) -> Result<DecryptionResult, EngineError> {
        self.ensure_ready()?;
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_decrypt.load(Ordering::SeqCst) {
            return Err(EngineError::Decrypt("gateway refused decryption request".into()));
        }

        let mut ordered = Vec::with_capacity(handles.len());
        let mut clear_values = BTreeMap::new();
        for handle in handles {
            let value = self.decrypt_handle(handle)?;
            ordered.push(value);
            clear_values.insert(handle.clone(), value);
        }

        let blob = encode_clear_values(&ordered);
        let proof = self.mac(b"decryption-proof", &[contract.as_str().as_bytes(), &blob]);
        submitter
            .submit(blob, proof.clone())
            .await
            .map_err(EngineError::Submission)?;

        Ok(DecryptionResult { clear_values, proof })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Capture {
        seen: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
    }

    #[async_trait]
    impl ProofSubmitter for Capture {
        async fn submit(&self, clear_values: Vec<u8>, proof: Vec<u8>) -> Result<(), LedgerError> {
            self.seen.lock().push((clear_values, proof));
            Ok(())
        }
    }

    #[tokio::test]
    async fn encrypt_requires_initialization() {
        let engine = SimulatedEngine::with_key([1; 32]);
        let err = engine
            .encrypt(&Address::from("0xc"), &Address::from("0xa"), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotInitialized));
    }

    #[tokio::test]
    async fn decrypt_and_prove_drives_the_submitter() {
        let engine = SimulatedEngine::with_key([9; 32]);
        engine.initialize().await.unwrap();
        let contract = Address::from("0xc");
        let input = engine.encrypt(&contract, &Address::from("0xa"), 73).await.unwrap();
        let handle = handle_for_ciphertext(&input.ciphertext);

        let capture = Capture::default();
        let result = engine
            .request_decryption_proof(std::slice::from_ref(&handle), &contract, &capture)
            .await
            .unwrap();

        assert_eq!(result.clear_values[&handle], 73);
        let seen = capture.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, encode_clear_values(&[73]));
        assert_eq!(seen[0].1, result.proof);
        assert_eq!(engine.decrypt_calls(), 1);
    }
}
