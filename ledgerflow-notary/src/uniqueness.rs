use ledgerflow_core::{StateRef, TransactionId};
use log::debug;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::NotaryError;

/// Result of trying to consume a set of inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniquenessResult {
    /// Every input is now consumed by the transaction
    Committed,
    /// These inputs are already consumed by another transaction; nothing was marked
    Conflict(Vec<StateRef>),
}

/// Record of which transaction consumed which state.
///
/// `commit` must be atomic over the whole input set: either every input is
/// marked consumed by `transaction_id`, or none is.
pub trait UniquenessProvider: Send + Sync {
    /// Mark `inputs` consumed by `transaction_id` unless another transaction
    /// already consumed any of them.
    ///
    /// Committing the same transaction again succeeds.
    fn commit(
        &self,
        inputs: &[StateRef],
        transaction_id: &TransactionId,
    ) -> Result<UniquenessResult, NotaryError>;

    /// The transaction that consumed `state_ref`, if any
    fn consumed_by(&self, state_ref: &StateRef) -> Result<Option<TransactionId>, NotaryError>;
}

/// Consumed-state map held in memory behind a single lock
#[derive(Debug, Default)]
pub struct InMemoryUniquenessProvider {
    consumed: Mutex<HashMap<StateRef, TransactionId>>,
}

impl InMemoryUniquenessProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of consumed states
    pub fn len(&self) -> Result<usize, NotaryError> {
        let consumed = self
            .consumed
            .lock()
            .map_err(|_| NotaryError::poisoned("consumed states"))?;
        Ok(consumed.len())
    }

    pub fn is_empty(&self) -> Result<bool, NotaryError> {
        Ok(self.len()? == 0)
    }
}

impl UniquenessProvider for InMemoryUniquenessProvider {
    fn commit(
        &self,
        inputs: &[StateRef],
        transaction_id: &TransactionId,
    ) -> Result<UniquenessResult, NotaryError> {
        let mut consumed = self
            .consumed
            .lock()
            .map_err(|_| NotaryError::poisoned("consumed states"))?;

        // Check the whole set before marking anything
        let conflicts: Vec<StateRef> = inputs
            .iter()
            .filter(|input| {
                consumed
                    .get(*input)
                    .map_or(false, |consumer| consumer != transaction_id)
            })
            .copied()
            .collect();

        if !conflicts.is_empty() {
            debug!(
                "Transaction {} conflicts on {} inputs",
                transaction_id,
                conflicts.len()
            );
            return Ok(UniquenessResult::Conflict(conflicts));
        }

        for input in inputs {
            consumed.insert(*input, *transaction_id);
        }

        Ok(UniquenessResult::Committed)
    }

    fn consumed_by(&self, state_ref: &StateRef) -> Result<Option<TransactionId>, NotaryError> {
        let consumed = self
            .consumed
            .lock()
            .map_err(|_| NotaryError::poisoned("consumed states"))?;
        Ok(consumed.get(state_ref).copied())
    }
}
