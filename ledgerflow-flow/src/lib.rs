pub mod config;
pub mod error;
pub mod finality;
pub mod orchestrator;
pub mod services;

// Re-export the main types for convenience
pub use config::{BackoffConfig, FlowConfig};
pub use error::{ConfigError, ErrorDetail, FlowError, LookupError, TransportError, UpstreamFailure};
pub use finality::Finalizer;
pub use orchestrator::{MintRequest, MintTokenFlow};
pub use services::{
    LedgerSubmission, LocalNotaryClient, MemberInfo, MembershipLookup, NotaryInfo, NotaryLookup,
    StaticMembership, StaticNotaryLookup,
};
