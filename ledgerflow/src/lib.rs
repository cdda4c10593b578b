//! ledgerflow
//!
//! This crate re-exports all the components of ledgerflow: the token and
//! transaction model, the reference notary and the mint flow.

pub use ledgerflow_core::*;
pub use ledgerflow_flow::{
    BackoffConfig, ConfigError, ErrorDetail, FlowConfig, FlowError, Finalizer, LedgerSubmission,
    LocalNotaryClient, LookupError, MemberInfo, MembershipLookup, MintRequest, MintTokenFlow,
    NotaryInfo, NotaryLookup, StaticMembership, StaticNotaryLookup, TransportError,
    UpstreamFailure,
};
pub use ledgerflow_notary::{
    InMemoryUniquenessProvider, NotarisationRecord, NotaryError, NotaryService,
    UniquenessProvider, UniquenessResult,
};

/// Notary internals
pub mod notary {
    pub use ledgerflow_notary::*;
}

/// Flow orchestration internals
pub mod flow {
    pub use ledgerflow_flow::*;
}
