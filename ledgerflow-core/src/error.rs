use thiserror::Error;

use crate::id::{StateRef, TransactionId};
use crate::identity::Party;

/// Errors parsing identifiers and keys
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("Expected 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Not a valid ed25519 public key: {0}")]
    InvalidKey(String),
}

/// A token could not be constructed from the given attributes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(i64),

    #[error("asset_id must not be empty")]
    EmptyAssetId,

    #[error("participants must not be empty")]
    NoParticipants,

    #[error("participants must include the owner {0}")]
    OwnerNotParticipant(Party),
}

impl TokenError {
    /// Name of the field that failed validation
    pub fn field(&self) -> &'static str {
        match self {
            TokenError::NonPositiveQuantity(_) => "quantity",
            TokenError::EmptyAssetId => "asset_id",
            TokenError::NoParticipants | TokenError::OwnerNotParticipant(_) => "participants",
        }
    }
}

/// A transaction proposal violates one of its structural invariants
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProposalError {
    /// The validity window is empty or reversed
    #[error("time window must end after it starts (from {from}, until {until})")]
    InvalidWindow { from: String, until: String },

    #[error("no notary set on the proposal")]
    MissingNotary,

    #[error("no time window set on the proposal")]
    MissingTimeWindow,

    #[error("proposal has no outputs")]
    NoOutputs,

    #[error("proposal has no commands")]
    NoCommands,

    /// An input is governed by a different notary than the proposal
    #[error("input {input} is governed by notary {input_notary}, proposal uses {notary}")]
    NotaryMismatch {
        input: StateRef,
        input_notary: Party,
        notary: Party,
    },

    #[error("input {0} appears more than once")]
    DuplicateInput(StateRef),

    /// Required signatories differ from the union of command signatories
    #[error("required signatories do not match the command signatories")]
    SignatoryMismatch,

    #[error("output {index} is invalid: {source}")]
    InvalidOutput { index: usize, source: TokenError },

    /// The carried id does not hash from the content
    #[error("proposal claims id {claimed}, content hashes to {actual}")]
    IdMismatch {
        claimed: TransactionId,
        actual: TransactionId,
    },

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl ProposalError {
    /// Name of the field that failed validation
    pub fn field(&self) -> &'static str {
        match self {
            ProposalError::InvalidWindow { .. } | ProposalError::MissingTimeWindow => {
                "time_window"
            }
            ProposalError::MissingNotary => "notary",
            ProposalError::NoOutputs => "outputs",
            ProposalError::NoCommands => "commands",
            ProposalError::NotaryMismatch { .. } | ProposalError::DuplicateInput(_) => "inputs",
            ProposalError::SignatoryMismatch => "required_signatories",
            ProposalError::InvalidOutput { .. } => "outputs",
            ProposalError::IdMismatch { .. } => "id",
            ProposalError::Encoding(_) => "proposal",
        }
    }
}

impl From<bincode::Error> for ProposalError {
    fn from(err: bincode::Error) -> Self {
        ProposalError::Encoding(err.to_string())
    }
}

/// The signing step could not produce a signature
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("{0} is not a required signatory of this transaction")]
    NotRequiredSignatory(Party),

    #[error("no signing key available for {0}")]
    NoAvailableKey(Party),

    #[error("signature of {0} does not verify")]
    InvalidSignature(Party),

    /// Signatures of other parties are still missing
    #[error("transaction is missing signatures from: {}", format_parties(.0))]
    Incomplete(Vec<Party>),

    #[error(transparent)]
    Proposal(#[from] ProposalError),
}

fn format_parties(parties: &[Party]) -> String {
    parties
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
