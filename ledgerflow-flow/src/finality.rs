use ledgerflow_core::{
    FinalizationOutcome, FinalizationState, Party, SignedTransaction, TransactionId,
    UnreachableCause,
};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::services::LedgerSubmission;

/// Sends signed transactions to the notary under a time limit.
///
/// Every call produces exactly one [`FinalizationOutcome`]; transport
/// failures and timeouts become `Unreachable` instead of errors.
#[derive(Clone)]
pub struct Finalizer {
    submission: Arc<dyn LedgerSubmission>,
    timeout: Duration,
}

impl Finalizer {
    pub fn new(submission: Arc<dyn LedgerSubmission>, timeout: Duration) -> Self {
        Self {
            submission,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Submit `signed` and wait at most the configured timeout for a verdict.
    ///
    /// A timed out submission is abandoned, not rolled back: the notary may
    /// still have finalized it.
    pub async fn finalize(
        &self,
        signed: &SignedTransaction,
        observers: &[Party],
    ) -> FinalizationOutcome {
        let id = signed.id();
        debug!(
            "Transaction {}: {} -> {}",
            id,
            FinalizationState::Built,
            FinalizationState::Submitted
        );

        let outcome = match tokio::time::timeout(
            self.timeout,
            self.submission.submit(signed, observers),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!("Submission of {} failed: {}", id, err);
                FinalizationOutcome::unreachable(UnreachableCause::Network(err.to_string()))
            }
            Err(_) => {
                warn!(
                    "No verdict for {} within {}ms",
                    id,
                    self.timeout.as_millis()
                );
                FinalizationOutcome::unreachable(UnreachableCause::Timeout)
            }
        };

        info!(
            "Transaction {}: {} -> {}",
            id,
            FinalizationState::Submitted,
            outcome.state()
        );
        outcome
    }

    /// Ask the notary what became of `id`.
    ///
    /// `None` when the notary never ruled on it or could not be asked.
    pub async fn query_outcome(&self, id: &TransactionId) -> Option<FinalizationOutcome> {
        match tokio::time::timeout(self.timeout, self.submission.outcome(id)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!("Outcome query for {} failed: {}", id, err);
                None
            }
            Err(_) => {
                warn!("Outcome query for {} timed out", id);
                None
            }
        }
    }
}
