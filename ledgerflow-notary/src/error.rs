use ledgerflow_core::{Party, ProposalError};
use thiserror::Error;

/// Failures of the notary itself, as opposed to verdicts on a transaction.
///
/// A verdict (finalized or rejected) is a [`ledgerflow_core::FinalizationOutcome`];
/// a `NotaryError` means no verdict was produced.
#[derive(Error, Debug)]
pub enum NotaryError {
    /// The transaction names a different notary
    #[error("transaction is addressed to {requested}, this notary is {actual}")]
    WrongNotary { requested: Party, actual: Party },

    /// The proposal breaks a structural invariant or could not be hashed
    #[error("Malformed proposal: {0}")]
    Proposal(#[from] ProposalError),

    /// Errors from the underlying consumed-state store
    #[error("Storage error: {0}")]
    Storage(String),

    /// Anyhow error wrapper for error context
    #[error(transparent)]
    Context(#[from] anyhow::Error),
}

impl NotaryError {
    pub(crate) fn poisoned(what: &str) -> Self {
        NotaryError::Storage(format!("{} lock poisoned", what))
    }
}
