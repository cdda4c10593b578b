use async_trait::async_trait;
use ledgerflow_core::{
    FinalizationOutcome, LedgerKey, MemberName, Party, SignedTransaction, TransactionId,
};
use ledgerflow_notary::NotaryService;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LookupError, TransportError};

/// Directory entry for a network member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub name: MemberName,
    /// Keys the member signs with; the first one is used for new states
    pub ledger_keys: Vec<LedgerKey>,
}

impl MemberInfo {
    pub fn new(name: impl Into<MemberName>, ledger_keys: Vec<LedgerKey>) -> Self {
        Self {
            name: name.into(),
            ledger_keys,
        }
    }

    /// The member as a party, using its first ledger key
    pub fn party(&self) -> Result<Party, LookupError> {
        self.ledger_keys
            .first()
            .map(|key| Party::new(self.name.clone(), *key))
            .ok_or_else(|| LookupError::NoLedgerKey(self.name.clone()))
    }
}

/// Directory entry for a notary service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotaryInfo {
    pub name: MemberName,
    pub ledger_key: LedgerKey,
}

impl NotaryInfo {
    pub fn party(&self) -> Party {
        Party::new(self.name.clone(), self.ledger_key)
    }
}

impl From<&Party> for NotaryInfo {
    fn from(party: &Party) -> Self {
        Self {
            name: party.name.clone(),
            ledger_key: party.ledger_key,
        }
    }
}

/// Membership directory of the network
pub trait MembershipLookup: Send + Sync {
    /// The member this flow runs as
    fn my_info(&self) -> MemberInfo;

    fn lookup(&self, name: &MemberName) -> Option<MemberInfo>;

    /// Like `lookup`, failing when the member is unknown
    fn resolve(&self, name: &MemberName) -> Result<MemberInfo, LookupError> {
        self.lookup(name)
            .ok_or_else(|| LookupError::UnknownMember(name.clone()))
    }
}

/// Directory of notary services, in order of preference
pub trait NotaryLookup: Send + Sync {
    fn notary_services(&self) -> Vec<NotaryInfo>;
}

/// Channel to the notary that finalizes transactions.
///
/// `Err` means no verdict arrived. The transaction may still have been
/// finalized, so callers resolve it with [`LedgerSubmission::outcome`].
#[async_trait]
pub trait LedgerSubmission: Send + Sync {
    /// Submit a signed transaction and distribute it to `observers` once finalized
    async fn submit(
        &self,
        signed: &SignedTransaction,
        observers: &[Party],
    ) -> Result<FinalizationOutcome, TransportError>;

    /// Verdict previously given for `id`, if any
    async fn outcome(
        &self,
        id: &TransactionId,
    ) -> Result<Option<FinalizationOutcome>, TransportError>;
}

/// Fixed membership list
#[derive(Debug, Clone)]
pub struct StaticMembership {
    me: MemberInfo,
    members: HashMap<MemberName, MemberInfo>,
}

impl StaticMembership {
    pub fn new(me: MemberInfo) -> Self {
        let mut members = HashMap::new();
        members.insert(me.name.clone(), me.clone());
        Self { me, members }
    }

    pub fn with_member(mut self, member: MemberInfo) -> Self {
        self.members.insert(member.name.clone(), member);
        self
    }
}

impl MembershipLookup for StaticMembership {
    fn my_info(&self) -> MemberInfo {
        self.me.clone()
    }

    fn lookup(&self, name: &MemberName) -> Option<MemberInfo> {
        self.members.get(name).cloned()
    }
}

/// Fixed notary list
#[derive(Debug, Clone, Default)]
pub struct StaticNotaryLookup {
    notaries: Vec<NotaryInfo>,
}

impl StaticNotaryLookup {
    pub fn new(notaries: Vec<NotaryInfo>) -> Self {
        Self { notaries }
    }
}

impl NotaryLookup for StaticNotaryLookup {
    fn notary_services(&self) -> Vec<NotaryInfo> {
        self.notaries.clone()
    }
}

/// In-process client for a [`NotaryService`].
///
/// Network trouble can be simulated: a partitioned client fails every call,
/// scripted failures fail the next few submissions, and a response delay
/// holds the verdict back after the notary has already ruled.
pub struct LocalNotaryClient {
    notary: Arc<NotaryService>,
    partitioned: AtomicBool,
    failures_remaining: AtomicU32,
    response_delay_ms: AtomicU64,
    submissions: AtomicUsize,
}

impl LocalNotaryClient {
    pub fn new(notary: Arc<NotaryService>) -> Self {
        Self {
            notary,
            partitioned: AtomicBool::new(false),
            failures_remaining: AtomicU32::new(0),
            response_delay_ms: AtomicU64::new(0),
            submissions: AtomicUsize::new(0),
        }
    }

    pub fn notary(&self) -> &Arc<NotaryService> {
        &self.notary
    }

    pub fn set_partitioned(&self, partitioned: bool) {
        self.partitioned.store(partitioned, Ordering::SeqCst);
    }

    /// Fail the next `count` submissions before they reach the notary
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Delay every response by `delay`; the notary rules before the delay
    pub fn set_response_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.response_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of submit calls received, failed ones included
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    fn check_link(&self) -> Result<(), TransportError> {
        if self.partitioned.load(Ordering::SeqCst) {
            return Err(TransportError::Network(format!(
                "no route to {}",
                self.notary.identity()
            )));
        }
        Ok(())
    }

    fn take_scripted_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerSubmission for LocalNotaryClient {
    async fn submit(
        &self,
        signed: &SignedTransaction,
        observers: &[Party],
    ) -> Result<FinalizationOutcome, TransportError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.check_link()?;
        if self.take_scripted_failure() {
            return Err(TransportError::Network("connection reset".to_string()));
        }

        let outcome = self.notary.notarise(signed, observers)?;

        let delay = self.response_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            debug!("Holding verdict for {} back by {}ms", signed.id(), delay);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        Ok(outcome)
    }

    async fn outcome(
        &self,
        id: &TransactionId,
    ) -> Result<Option<FinalizationOutcome>, TransportError> {
        self.check_link()?;
        Ok(self.notary.outcome(id)?)
    }
}
