use ed25519_dalek::{Signer, SigningKey};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::SigningError;
use crate::id::{LedgerKey, TransactionId};
use crate::identity::Party;
use crate::outcome::RejectionReason;
use crate::transaction::TransactionProposal;

const SIGNATURE_DOMAIN: &[u8] = b"LEDGERFLOW_Sig";

/// Bytes a party signs to approve transaction `id`
fn signing_preimage(id: &TransactionId) -> Vec<u8> {
    let mut preimage = Vec::with_capacity(SIGNATURE_DOMAIN.len() + 32);
    preimage.extend_from_slice(SIGNATURE_DOMAIN);
    preimage.extend_from_slice(id.bytes());
    preimage
}

/// An ed25519 signature over a transaction id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalSignature {
    /// Key that produced the signature
    pub by: LedgerKey,
    pub bytes: Vec<u8>,
}

impl DigitalSignature {
    /// Check the signature against `id` and the key of `party`
    pub fn verify(&self, party: &Party, id: &TransactionId) -> bool {
        if self.by != party.ledger_key {
            return false;
        }
        let Ok(verifying_key) = party.ledger_key.verifying_key() else {
            return false;
        };
        let Ok(signature) = ed25519_dalek::Signature::from_slice(&self.bytes) else {
            return false;
        };
        verifying_key
            .verify_strict(&signing_preimage(id), &signature)
            .is_ok()
    }
}

impl fmt::Display for DigitalSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.by, hex::encode(&self.bytes))
    }
}

/// Source of signing keys, looked up by their public half
pub trait KeyStore: Send + Sync {
    /// Whether a private key for `key` is held
    fn contains(&self, key: &LedgerKey) -> bool;

    /// Sign `payload` with the private key for `key`
    fn sign_bytes(&self, key: &LedgerKey, payload: &[u8]) -> Option<ed25519_dalek::Signature>;
}

/// Keys held in process memory
#[derive(Default)]
pub struct InMemoryKeyStore {
    keys: HashMap<LedgerKey, SigningKey>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key and return its public half
    pub fn insert(&mut self, signing_key: SigningKey) -> LedgerKey {
        let ledger_key = LedgerKey::from(&signing_key.verifying_key());
        self.keys.insert(ledger_key, signing_key);
        ledger_key
    }

    /// Add the key derived from a 32 byte seed
    pub fn insert_seed(&mut self, seed: [u8; 32]) -> LedgerKey {
        self.insert(SigningKey::from_bytes(&seed))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for InMemoryKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print private keys
        f.debug_struct("InMemoryKeyStore")
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl KeyStore for InMemoryKeyStore {
    fn contains(&self, key: &LedgerKey) -> bool {
        self.keys.contains_key(key)
    }

    fn sign_bytes(&self, key: &LedgerKey, payload: &[u8]) -> Option<ed25519_dalek::Signature> {
        self.keys.get(key).map(|signing_key| signing_key.sign(payload))
    }
}

/// Produce `signer`'s signature over transaction `id`
pub fn sign_transaction_id(
    id: &TransactionId,
    signer: &Party,
    keys: &dyn KeyStore,
) -> Result<DigitalSignature, SigningError> {
    let signature = keys
        .sign_bytes(&signer.ledger_key, &signing_preimage(id))
        .ok_or_else(|| SigningError::NoAvailableKey(signer.clone()))?;

    Ok(DigitalSignature {
        by: signer.ledger_key,
        bytes: signature.to_bytes().to_vec(),
    })
}

/// Sign `proposal` as `signer`.
///
/// The signature covers the transaction id, so signing the same proposal
/// with the same key twice gives identical bytes.
pub fn sign(
    proposal: TransactionProposal,
    signer: &Party,
    keys: &dyn KeyStore,
) -> Result<SignedTransaction, SigningError> {
    let mut signed = SignedTransaction::unsigned(proposal);
    let signature = signed.signature_for(signer, keys)?;
    signed.signatures.insert(signer.clone(), signature);

    debug!(
        "{} signed transaction {} ({} of {} signatures)",
        signer,
        signed.id(),
        signed.signatures.len(),
        signed.proposal.required_signatories().len()
    );

    Ok(signed)
}

/// A proposal together with the signatures collected so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    proposal: TransactionProposal,
    signatures: BTreeMap<Party, DigitalSignature>,
}

impl SignedTransaction {
    fn unsigned(proposal: TransactionProposal) -> Self {
        Self {
            proposal,
            signatures: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.proposal.id()
    }

    pub fn proposal(&self) -> &TransactionProposal {
        &self.proposal
    }

    pub fn signatures(&self) -> &BTreeMap<Party, DigitalSignature> {
        &self.signatures
    }

    fn signature_for(
        &self,
        signer: &Party,
        keys: &dyn KeyStore,
    ) -> Result<DigitalSignature, SigningError> {
        if !self.proposal.required_signatories().contains(signer) {
            return Err(SigningError::NotRequiredSignatory(signer.clone()));
        }
        if !keys.contains(&signer.ledger_key) {
            return Err(SigningError::NoAvailableKey(signer.clone()));
        }
        sign_transaction_id(&self.id(), signer, keys)
    }

    /// Attach a signature obtained elsewhere.
    ///
    /// The signature is checked before it is stored.
    pub fn add_signature(
        &mut self,
        signer: Party,
        signature: DigitalSignature,
    ) -> Result<(), SigningError> {
        if !self.proposal.required_signatories().contains(&signer) {
            return Err(SigningError::NotRequiredSignatory(signer));
        }
        if !signature.verify(&signer, &self.id()) {
            return Err(SigningError::InvalidSignature(signer));
        }
        debug!("Attached signature of {} to {}", signer, self.id());
        self.signatures.insert(signer, signature);
        Ok(())
    }

    /// Sign with another locally held key
    pub fn sign_as(&mut self, signer: &Party, keys: &dyn KeyStore) -> Result<(), SigningError> {
        let signature = self.signature_for(signer, keys)?;
        self.signatures.insert(signer.clone(), signature);
        Ok(())
    }

    /// Required signatories that have not signed yet, in order
    pub fn missing_signatories(&self) -> Vec<Party> {
        self.proposal
            .required_signatories()
            .iter()
            .filter(|party| !self.signatures.contains_key(*party))
            .cloned()
            .collect()
    }

    pub fn is_fully_signed(&self) -> bool {
        self.missing_signatories().is_empty()
    }

    /// Check that every required signatory signed the content actually
    /// carried by this transaction.
    ///
    /// Missing signatures are reported before invalid ones.
    pub fn verify_signatures(&self) -> Result<(), RejectionReason> {
        if let Some(party) = self.missing_signatories().into_iter().next() {
            return Err(RejectionReason::MissingSignature(party));
        }

        // Signatures cover the id, so the id has to match the content
        let content_id = self.proposal.recompute_id().ok();

        for party in self.proposal.required_signatories() {
            let valid = match (content_id, self.signatures.get(party)) {
                (Some(id), Some(signature)) => id == self.id() && signature.verify(party, &id),
                _ => false,
            };
            if !valid {
                return Err(RejectionReason::InvalidSignature(party.clone()));
            }
        }

        Ok(())
    }
}
