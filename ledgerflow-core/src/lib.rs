pub mod clock;
pub mod error;
pub mod id;
pub mod identity;
pub mod outcome;
pub mod signing;
pub mod token;
pub mod transaction;

// Re-export the main types for convenience
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{IdError, ProposalError, SigningError, TokenError};
pub use id::{LedgerKey, StateRef, TransactionId};
pub use identity::{MemberName, Party};
pub use outcome::{FinalizationOutcome, FinalizationState, RejectionReason, UnreachableCause};
pub use signing::{
    sign, sign_transaction_id, DigitalSignature, InMemoryKeyStore, KeyStore, SignedTransaction,
};
pub use token::{StateAndRef, Token};
pub use transaction::{
    build_create_proposal, build_move_proposal, Command, CommandKind, TimeWindow,
    TransactionBuilder, TransactionProposal,
};
