use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use crate::error::IdError;

// TransactionId uniquely identifies a transaction proposal.
// It is the 32 byte SHA-256 digest of the proposal's canonical encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId([u8; 32]);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        TransactionId([0; 32])
    }
}

impl Deref for TransactionId {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for TransactionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TransactionId(decode_32(s)?))
    }
}

impl TransactionId {
    pub fn new(bytes: [u8; 32]) -> Self {
        TransactionId(bytes)
    }

    /// Get a reference to the internal bytes
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hash a canonical encoding into a transaction id
    pub fn from_canonical_bytes(encoded: &[u8]) -> Self {
        let mut hasher = Sha256::new();

        // Domain separator
        hasher.update(b"LEDGERFLOW_Tx");
        hasher.update(encoded);

        TransactionId(hasher.finalize().into())
    }
}

/// Public half of a member's ledger signing key (ed25519, 32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey([u8; 32]);

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell keys apart in logs
        let prefix = hex::encode(&self.0[0..6]);
        write!(f, "key:{}", prefix)
    }
}

impl Deref for LedgerKey {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&ed25519_dalek::VerifyingKey> for LedgerKey {
    fn from(key: &ed25519_dalek::VerifyingKey) -> Self {
        LedgerKey(key.to_bytes())
    }
}

impl LedgerKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        LedgerKey(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Full hex encoding of the key
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a key from its full hex encoding
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        Ok(LedgerKey(decode_32(s)?))
    }

    /// Decode the key as an ed25519 verifying key.
    ///
    /// Fails when the bytes are not a valid curve point.
    pub fn verifying_key(&self) -> Result<ed25519_dalek::VerifyingKey, IdError> {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|_| IdError::InvalidKey(self.to_hex()))
    }
}

/// Pointer to output `index` of the finalized transaction `transaction_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateRef {
    pub transaction_id: TransactionId,
    pub index: u32,
}

impl StateRef {
    pub fn new(transaction_id: TransactionId, index: u32) -> Self {
        Self {
            transaction_id,
            index,
        }
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.index)
    }
}

fn decode_32(s: &str) -> Result<[u8; 32], IdError> {
    let raw = hex::decode(s).map_err(|e| IdError::InvalidHex(e.to_string()))?;
    raw.as_slice()
        .try_into()
        .map_err(|_| IdError::InvalidLength(raw.len()))
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn test_default_id() {
        let default_id = TransactionId::default();
        assert_eq!(*default_id, [0u8; 32]);
    }

    #[test]
    fn test_from_canonical_bytes() {
        let id = TransactionId::from_canonical_bytes(b"proposal-a");

        // Verify deterministic nature by hashing the same bytes again
        let id2 = TransactionId::from_canonical_bytes(b"proposal-a");
        assert_eq!(id, id2);

        // Different encodings give different ids
        let id3 = TransactionId::from_canonical_bytes(b"proposal-b");
        assert_ne!(id, id3);
        assert_ne!(id, TransactionId::default());
    }

    #[test]
    fn test_transaction_id_hex_round_trip() {
        let id = TransactionId::from_canonical_bytes(b"round-trip");
        let text = id.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(text.parse::<TransactionId>().unwrap(), id);
    }

    #[test]
    fn test_transaction_id_rejects_bad_input() {
        assert!(matches!(
            "zz".parse::<TransactionId>(),
            Err(IdError::InvalidHex(_))
        ));
        assert!(matches!(
            "abcd".parse::<TransactionId>(),
            Err(IdError::InvalidLength(2))
        ));
    }

    #[test]
    fn test_ledger_key_from_verifying_key() {
        let signing = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let key = LedgerKey::from(&signing.verifying_key());

        assert_eq!(key.verifying_key().unwrap(), signing.verifying_key());
        assert_eq!(LedgerKey::from_hex(&key.to_hex()).unwrap(), key);
        assert!(key.to_string().starts_with("key:"));
    }

    #[test]
    fn test_state_ref_display() {
        let state_ref = StateRef::new(TransactionId::new([1u8; 32]), 3);
        assert!(state_ref.to_string().ends_with(":3"));
    }
}
