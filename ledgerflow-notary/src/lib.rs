pub mod error;
pub mod notary;
pub mod uniqueness;

// Re-export the main types for convenience
pub use error::NotaryError;
pub use notary::{NotarisationRecord, NotaryService};
pub use uniqueness::{InMemoryUniquenessProvider, UniquenessProvider, UniquenessResult};
