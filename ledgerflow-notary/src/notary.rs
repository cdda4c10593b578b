use ledgerflow_core::{
    Clock, FinalizationOutcome, Party, RejectionReason, SignedTransaction, StateRef,
    TransactionId,
};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::NotaryError;
use crate::uniqueness::{InMemoryUniquenessProvider, UniquenessProvider, UniquenessResult};

/// What the notary remembers about a transaction it ruled on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotarisationRecord {
    pub outcome: FinalizationOutcome,
    pub transaction: SignedTransaction,
    /// Parties the finalized transaction was distributed to
    pub observers: Vec<Party>,
}

/// Verdicts kept by the notary.
///
/// Finalized records are kept for good. Only the most recent rejection is
/// kept; an older rejected transaction reads as unseen, and resubmitting it
/// gets the same rejection again.
#[derive(Debug, Default)]
struct Records {
    finalized: HashMap<TransactionId, NotarisationRecord>,
    last_rejection: Option<NotarisationRecord>,
}

impl Records {
    fn get(&self, id: &TransactionId) -> Option<&NotarisationRecord> {
        self.finalized.get(id).or_else(|| {
            self.last_rejection
                .as_ref()
                .filter(|record| record.transaction.id() == *id)
        })
    }
}

/// Non-validating notary.
///
/// Checks signatures and the time window, then consumes the inputs through a
/// [`UniquenessProvider`]. Contract logic is not evaluated.
pub struct NotaryService<U: UniquenessProvider = InMemoryUniquenessProvider> {
    identity: Party,
    clock: Arc<dyn Clock>,
    uniqueness: U,
    records: Mutex<Records>,
}

impl NotaryService<InMemoryUniquenessProvider> {
    /// Create a notary backed by an in-memory consumed-state map
    pub fn new(identity: Party, clock: Arc<dyn Clock>) -> Self {
        Self::with_uniqueness(identity, clock, InMemoryUniquenessProvider::new())
    }
}

impl<U: UniquenessProvider> NotaryService<U> {
    pub fn with_uniqueness(identity: Party, clock: Arc<dyn Clock>, uniqueness: U) -> Self {
        Self {
            identity,
            clock,
            uniqueness,
            records: Mutex::new(Records::default()),
        }
    }

    pub fn identity(&self) -> &Party {
        &self.identity
    }

    /// Rule on a signed transaction.
    ///
    /// Returns `Err` only when no verdict could be produced; business
    /// rejections are `Ok(FinalizationOutcome::Rejected { .. })`.
    pub fn notarise(
        &self,
        signed: &SignedTransaction,
        observers: &[Party],
    ) -> Result<FinalizationOutcome, NotaryError> {
        let proposal = signed.proposal();
        let id = signed.id();

        if proposal.notary() != &self.identity {
            warn!(
                "Transaction {} addressed to {} arrived at {}",
                id,
                proposal.notary(),
                self.identity
            );
            return Err(NotaryError::WrongNotary {
                requested: proposal.notary().clone(),
                actual: self.identity.clone(),
            });
        }

        if let Err(err) = proposal.validate() {
            warn!("Transaction {} is malformed: {}", id, err);
            return Err(err.into());
        }

        if let Err(reason) = signed.verify_signatures() {
            return self.reject(signed, reason);
        }

        // A retry of an already finalized transaction gets the same answer
        if let Some(record) = self.record(&id)? {
            if record.outcome.is_finalized() {
                debug!("Transaction {} already finalized, replaying outcome", id);
                return Ok(record.outcome);
            }
        }

        if let Err(reason) = proposal.time_window().check(self.clock.now()) {
            return self.reject(signed, reason);
        }

        match self.uniqueness.commit(&proposal.input_refs(), &id)? {
            UniquenessResult::Committed => {
                let outcome = FinalizationOutcome::finalized(id);
                self.store(signed, outcome.clone(), observers)?;
                info!(
                    "Finalized transaction {} ({} inputs consumed, {} observers)",
                    id,
                    proposal.inputs().len(),
                    observers.len()
                );
                Ok(outcome)
            }
            UniquenessResult::Conflict(conflicts) => {
                self.reject(signed, RejectionReason::DoubleSpend { conflicts })
            }
        }
    }

    fn reject(
        &self,
        signed: &SignedTransaction,
        reason: RejectionReason,
    ) -> Result<FinalizationOutcome, NotaryError> {
        info!("Rejected transaction {}: {}", signed.id(), reason);
        let outcome = FinalizationOutcome::rejected(reason);
        self.store(signed, outcome.clone(), &[])?;
        Ok(outcome)
    }

    fn store(
        &self,
        signed: &SignedTransaction,
        outcome: FinalizationOutcome,
        observers: &[Party],
    ) -> Result<(), NotaryError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| NotaryError::poisoned("notarisation records"))?;

        // Never overwrite a finalized record
        if records.finalized.contains_key(&signed.id()) {
            return Ok(());
        }

        let record = NotarisationRecord {
            outcome,
            transaction: signed.clone(),
            observers: observers.to_vec(),
        };
        if record.outcome.is_finalized() {
            records.finalized.insert(signed.id(), record);
        } else {
            records.last_rejection = Some(record);
        }
        Ok(())
    }

    fn record(&self, id: &TransactionId) -> Result<Option<NotarisationRecord>, NotaryError> {
        let records = self
            .records
            .lock()
            .map_err(|_| NotaryError::poisoned("notarisation records"))?;
        Ok(records.get(id).cloned())
    }

    /// Verdict given for `id`, if the notary still holds one
    pub fn outcome(&self, id: &TransactionId) -> Result<Option<FinalizationOutcome>, NotaryError> {
        Ok(self.record(id)?.map(|r| r.outcome))
    }

    /// The finalized transaction `id` and the observers it was sent to
    pub fn finalized_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<NotarisationRecord>, NotaryError> {
        Ok(self
            .record(id)?
            .filter(|record| record.outcome.is_finalized()))
    }

    /// The transaction that consumed `state_ref`, if any
    pub fn consumed_by(&self, state_ref: &StateRef) -> Result<Option<TransactionId>, NotaryError> {
        self.uniqueness.consumed_by(state_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use ledgerflow_core::{
        build_create_proposal, build_move_proposal, sign, FixedClock, InMemoryKeyStore,
        LedgerKey, Token,
    };
    use std::thread;

    struct Fixture {
        keys: InMemoryKeyStore,
        alice: Party,
        bob: Party,
        clock: Arc<FixedClock>,
        notary: NotaryService,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 2, 16, 2, 41, 35).unwrap()
    }

    fn fixture() -> Fixture {
        let mut keys = InMemoryKeyStore::new();
        let alice = Party::new("CN=Alice, O=R3, L=London, C=GB", keys.insert_seed([1; 32]));
        let bob = Party::new("CN=Bob, O=R3, L=London, C=GB", keys.insert_seed([2; 32]));
        let notary_party = Party::new("CN=Notary, O=R3, L=London, C=GB", keys.insert_seed([9; 32]));
        let clock = Arc::new(FixedClock::new(t0() + Duration::minutes(1)));
        let notary = NotaryService::new(notary_party, clock.clone());
        Fixture {
            keys,
            alice,
            bob,
            clock,
            notary,
        }
    }

    fn mint(f: &Fixture) -> SignedTransaction {
        let token = Token::new(
            "USCA765248",
            25,
            f.alice.clone(),
            f.alice.clone(),
            vec![f.alice.clone()],
        )
        .unwrap();
        let proposal = build_create_proposal(
            f.notary.identity().clone(),
            token,
            t0(),
            t0() + Duration::days(1),
        )
        .unwrap();
        sign(proposal, &f.alice, &f.keys).unwrap()
    }

    fn move_to(f: &Fixture, minted: &SignedTransaction, new_owner: &Party) -> SignedTransaction {
        let input = minted.proposal().output_ref(0).unwrap();
        let proposal = build_move_proposal(
            f.notary.identity().clone(),
            input,
            new_owner.clone(),
            t0(),
            t0() + Duration::days(1),
        )
        .unwrap();
        sign(proposal, &f.alice, &f.keys).unwrap()
    }

    #[test]
    fn test_mint_is_finalized() {
        let f = fixture();
        let signed = mint(&f);

        let outcome = f.notary.notarise(&signed, &[]).unwrap();
        assert_eq!(outcome, FinalizationOutcome::finalized(signed.id()));
        assert_eq!(f.notary.outcome(&signed.id()).unwrap(), Some(outcome));
    }

    #[test]
    fn test_retry_of_finalized_transaction_is_idempotent() {
        let f = fixture();
        let signed = mint(&f);

        let first = f.notary.notarise(&signed, &[f.bob.clone()]).unwrap();
        // Even after the window closes the replayed verdict stands
        f.clock.advance(Duration::days(2));
        let second = f.notary.notarise(&signed, &[]).unwrap();

        assert_eq!(first, second);
        let record = f.notary.finalized_transaction(&signed.id()).unwrap().unwrap();
        assert_eq!(record.observers, vec![f.bob.clone()]);
    }

    #[test]
    fn test_wrong_notary_is_not_a_verdict() {
        let f = fixture();
        let signed = mint(&f);
        let other = NotaryService::new(
            Party::new("CN=Other, O=R3, L=Zurich, C=CH", LedgerKey::new([7; 32])),
            f.clock.clone(),
        );

        let result = other.notarise(&signed, &[]);
        assert!(matches!(result, Err(NotaryError::WrongNotary { .. })));
        assert_eq!(other.outcome(&signed.id()).unwrap(), None);
    }

    #[test]
    fn test_window_checks() {
        let f = fixture();
        let signed = mint(&f);

        f.clock.set(t0() - Duration::seconds(1));
        assert_eq!(
            f.notary.notarise(&signed, &[]).unwrap(),
            FinalizationOutcome::rejected(RejectionReason::WindowNotYetValid)
        );

        // `until` itself is outside the window
        f.clock.set(t0() + Duration::days(1));
        assert_eq!(
            f.notary.notarise(&signed, &[]).unwrap(),
            FinalizationOutcome::rejected(RejectionReason::WindowExpired)
        );
    }

    #[test]
    fn test_missing_signature_is_rejected() {
        let f = fixture();
        let token = Token::new(
            "USCA765248",
            25,
            f.alice.clone(),
            f.alice.clone(),
            vec![f.alice.clone(), f.bob.clone()],
        )
        .unwrap();
        let proposal = build_create_proposal(
            f.notary.identity().clone(),
            token,
            t0(),
            t0() + Duration::days(1),
        )
        .unwrap();
        let signed = sign(proposal, &f.alice, &f.keys).unwrap();

        assert_eq!(
            f.notary.notarise(&signed, &[]).unwrap(),
            FinalizationOutcome::rejected(RejectionReason::MissingSignature(f.bob.clone()))
        );
    }

    #[test]
    fn test_move_without_owner_signature_cannot_reach_the_notary() {
        let f = fixture();
        let minted = mint(&f);
        f.notary.notarise(&minted, &[]).unwrap();

        let mallory = Party::new("CN=Mallory, O=R3, L=Paris, C=FR", LedgerKey::new([6; 32]));
        let honest = move_to(&f, &minted, &mallory);

        let mut proposal = serde_json::to_value(honest.proposal()).unwrap();
        proposal["required_signatories"] = serde_json::json!([]);
        let forged = serde_json::json!({ "proposal": proposal, "signatures": {} });
        assert!(serde_json::from_value::<SignedTransaction>(forged).is_err());

        let input = minted.proposal().output_ref(0).unwrap().state_ref;
        assert_eq!(f.notary.consumed_by(&input).unwrap(), None);
    }

    #[test]
    fn test_only_the_last_rejection_is_kept() {
        let f = fixture();
        let first = mint(&f);
        let second = {
            let token = Token::new(
                "USCA765249",
                5,
                f.alice.clone(),
                f.alice.clone(),
                vec![f.alice.clone()],
            )
            .unwrap();
            let proposal = build_create_proposal(
                f.notary.identity().clone(),
                token,
                t0(),
                t0() + Duration::days(1),
            )
            .unwrap();
            sign(proposal, &f.alice, &f.keys).unwrap()
        };

        f.clock.set(t0() + Duration::days(2));
        let expired = FinalizationOutcome::rejected(RejectionReason::WindowExpired);
        assert_eq!(f.notary.notarise(&first, &[]).unwrap(), expired);
        assert_eq!(f.notary.outcome(&first.id()).unwrap(), Some(expired.clone()));

        assert_eq!(f.notary.notarise(&second, &[]).unwrap(), expired);
        assert_eq!(f.notary.outcome(&first.id()).unwrap(), None);
        assert_eq!(f.notary.outcome(&second.id()).unwrap(), Some(expired.clone()));

        // Resubmitting gives the same answer
        assert_eq!(f.notary.notarise(&first, &[]).unwrap(), expired);
    }

    #[test]
    fn test_second_spend_is_rejected() {
        let f = fixture();
        let minted = mint(&f);
        f.notary.notarise(&minted, &[]).unwrap();

        let to_bob = move_to(&f, &minted, &f.bob);
        let carol = Party::new("CN=Carol, O=R3, L=Paris, C=FR", LedgerKey::new([3; 32]));
        let to_carol = move_to(&f, &minted, &carol);

        assert!(f.notary.notarise(&to_bob, &[]).unwrap().is_finalized());

        let input = minted.proposal().output_ref(0).unwrap().state_ref;
        assert_eq!(
            f.notary.notarise(&to_carol, &[]).unwrap(),
            FinalizationOutcome::rejected(RejectionReason::DoubleSpend {
                conflicts: vec![input]
            })
        );
        assert_eq!(f.notary.consumed_by(&input).unwrap(), Some(to_bob.id()));
    }

    #[test]
    fn test_concurrent_spends_have_one_winner() {
        let f = Arc::new(fixture());
        let minted = mint(&f);
        f.notary.notarise(&minted, &[]).unwrap();

        let carol = Party::new("CN=Carol, O=R3, L=Paris, C=FR", LedgerKey::new([3; 32]));
        let spends = vec![move_to(&f, &minted, &f.bob), move_to(&f, &minted, &carol)];

        let handles: Vec<_> = spends
            .into_iter()
            .map(|signed| {
                let f = Arc::clone(&f);
                thread::spawn(move || f.notary.notarise(&signed, &[]).unwrap())
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let finalized = outcomes.iter().filter(|o| o.is_finalized()).count();
        let double_spends = outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    FinalizationOutcome::Rejected {
                        reason: RejectionReason::DoubleSpend { .. }
                    }
                )
            })
            .count();
        assert_eq!((finalized, double_spends), (1, 1));
    }
}
