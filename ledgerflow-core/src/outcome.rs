use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::{StateRef, TransactionId};
use crate::identity::Party;

/// Why a notary refused a transaction. Rejections are final: resubmitting
/// the same proposal gives the same answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// These inputs were already consumed by another finalized transaction
    DoubleSpend { conflicts: Vec<StateRef> },

    MissingSignature(Party),

    InvalidSignature(Party),

    WindowExpired,

    WindowNotYetValid,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::DoubleSpend { conflicts } => {
                let refs: Vec<String> = conflicts.iter().map(|r| r.to_string()).collect();
                write!(f, "inputs already consumed: {}", refs.join(", "))
            }
            RejectionReason::MissingSignature(party) => {
                write!(f, "missing signature from {}", party)
            }
            RejectionReason::InvalidSignature(party) => {
                write!(f, "invalid signature from {}", party)
            }
            RejectionReason::WindowExpired => write!(f, "time window has expired"),
            RejectionReason::WindowNotYetValid => write!(f, "time window is not yet valid"),
        }
    }
}

/// Why no verdict could be obtained from the notary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnreachableCause {
    Timeout,
    Network(String),
}

impl fmt::Display for UnreachableCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnreachableCause::Timeout => write!(f, "timed out waiting for the notary"),
            UnreachableCause::Network(detail) => write!(f, "network failure: {}", detail),
        }
    }
}

/// Result of submitting a signed transaction for finalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalizationOutcome {
    /// The notary committed the transaction; it is durable
    Finalized { transaction_id: TransactionId },

    /// The notary refused the transaction
    Rejected { reason: RejectionReason },

    /// No verdict was received. The transaction may or may not have been
    /// finalized, so it is safe to retry with the same signed transaction.
    Unreachable { cause: UnreachableCause },
}

impl FinalizationOutcome {
    pub fn finalized(transaction_id: TransactionId) -> Self {
        FinalizationOutcome::Finalized { transaction_id }
    }

    pub fn rejected(reason: RejectionReason) -> Self {
        FinalizationOutcome::Rejected { reason }
    }

    pub fn unreachable(cause: UnreachableCause) -> Self {
        FinalizationOutcome::Unreachable { cause }
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, FinalizationOutcome::Finalized { .. })
    }

    /// Whether resubmitting the same signed transaction can change the result
    pub fn is_retryable(&self) -> bool {
        matches!(self, FinalizationOutcome::Unreachable { .. })
    }

    /// The state a transaction is in after this outcome
    pub fn state(&self) -> FinalizationState {
        match self {
            FinalizationOutcome::Finalized { .. } => FinalizationState::Finalized,
            FinalizationOutcome::Rejected { .. } => FinalizationState::Rejected,
            FinalizationOutcome::Unreachable { .. } => FinalizationState::Unreachable,
        }
    }
}

/// Lifecycle of a transaction on its way to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinalizationState {
    /// Signed locally, not yet sent
    Built,
    /// Sent to the notary, no verdict yet
    Submitted,
    Finalized,
    Rejected,
    /// Verdict unknown; may be submitted again
    Unreachable,
}

impl Default for FinalizationState {
    fn default() -> Self {
        FinalizationState::Built
    }
}

impl FinalizationState {
    /// Finalized and Rejected never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, FinalizationState::Finalized | FinalizationState::Rejected)
    }

    pub fn can_transition_to(&self, next: FinalizationState) -> bool {
        match (self, next) {
            (FinalizationState::Built, FinalizationState::Submitted) => true,
            (FinalizationState::Submitted, FinalizationState::Finalized)
            | (FinalizationState::Submitted, FinalizationState::Rejected)
            | (FinalizationState::Submitted, FinalizationState::Unreachable) => true,
            // Retry of the identical signed transaction
            (FinalizationState::Unreachable, FinalizationState::Submitted) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FinalizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FinalizationState::Built => "built",
            FinalizationState::Submitted => "submitted",
            FinalizationState::Finalized => "finalized",
            FinalizationState::Rejected => "rejected",
            FinalizationState::Unreachable => "unreachable",
        };
        f.write_str(name)
    }
}
