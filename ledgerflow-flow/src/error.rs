use ledgerflow_core::{
    MemberName, ProposalError, RejectionReason, SigningError, TokenError, TransactionId,
    UnreachableCause,
};
use ledgerflow_notary::NotaryError;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// A collaborator directory could not answer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("unknown member {0}")]
    UnknownMember(MemberName),

    #[error("member {0} has no ledger key")]
    NoLedgerKey(MemberName),

    #[error("no notary service available")]
    NoNotary,
}

/// The request never got a verdict from the notary
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    /// The notary answered with a failure instead of a verdict
    #[error("notary error: {0}")]
    Notary(#[from] NotaryError),

    #[error(transparent)]
    Context(#[from] anyhow::Error),
}

/// Invalid flow configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failure of an upstream collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamFailure {
    /// Identity or notary lookup failed; nothing was built or submitted
    Lookup(LookupError),

    /// Every finalization attempt ended without a verdict.
    /// The transaction may have been finalized.
    Unreachable {
        cause: UnreachableCause,
        transaction_id: TransactionId,
        attempts: u32,
    },
}

/// Everything that can stop a mint flow
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("invalid token ({}): {0}", .0.field())]
    InvalidToken(#[from] TokenError),

    #[error("invalid proposal ({}): {0}", .0.field())]
    InvalidProposal(#[from] ProposalError),

    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("transaction {transaction_id} rejected: {reason}")]
    Rejected {
        transaction_id: TransactionId,
        reason: RejectionReason,
    },

    #[error("{}", describe_upstream(.0))]
    UpstreamUnavailable(UpstreamFailure),
}

fn describe_upstream(failure: &UpstreamFailure) -> String {
    match failure {
        UpstreamFailure::Lookup(err) => format!("lookup failed: {}", err),
        UpstreamFailure::Unreachable {
            cause,
            transaction_id,
            attempts,
        } => format!(
            "notary unreachable after {} attempts ({}); outcome of transaction {} unknown",
            attempts, cause, transaction_id
        ),
    }
}

impl From<LookupError> for FlowError {
    fn from(err: LookupError) -> Self {
        FlowError::UpstreamUnavailable(UpstreamFailure::Lookup(err))
    }
}

impl FlowError {
    /// Whether the caller knows what happened on the ledger.
    ///
    /// `false` only when the notary could not be reached on any attempt: the
    /// transaction may or may not be finalized, so query its id before
    /// building a new proposal.
    pub fn outcome_known(&self) -> bool {
        !matches!(
            self,
            FlowError::UpstreamUnavailable(UpstreamFailure::Unreachable { .. })
        )
    }

    /// Id of the transaction whose fate this error describes, if one was built
    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self {
            FlowError::Rejected { transaction_id, .. } => Some(*transaction_id),
            FlowError::UpstreamUnavailable(UpstreamFailure::Unreachable {
                transaction_id, ..
            }) => Some(*transaction_id),
            _ => None,
        }
    }

    /// Stable error kind reported across the request boundary
    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::InvalidToken(_) => "InvalidTokenError",
            FlowError::InvalidProposal(ProposalError::InvalidWindow { .. }) => {
                "InvalidWindowError"
            }
            FlowError::InvalidProposal(_) => "InvalidProposalError",
            FlowError::Signing(_) => "SigningError",
            FlowError::Rejected { .. } => "Rejected",
            FlowError::UpstreamUnavailable(_) => "UpstreamUnavailable",
        }
    }
}

/// Error payload returned across the request boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// The request payload itself could not be read
    pub fn invalid_request(err: &serde_json::Error) -> Self {
        Self::new("InvalidRequest", err.to_string())
    }
}

impl From<&FlowError> for ErrorDetail {
    fn from(err: &FlowError) -> Self {
        ErrorDetail::new(err.kind(), err.to_string())
    }
}

impl From<FlowError> for ErrorDetail {
    fn from(err: FlowError) -> Self {
        ErrorDetail::from(&err)
    }
}
