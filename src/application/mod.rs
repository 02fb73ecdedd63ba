// Application layer - use cases and orchestration over the ledger store.
// Every write that depends on a check (membership, uniqueness, existence)
// runs the check inside the same store transaction as the write.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
