//! Generation dispatch pipeline.
//!
//! Ties the pure domain logic in `kiara-core` to the provider adapters and
//! to persistence: registry lookup, validation, coercion, pricing, rate
//! limiting, credit reservation, provider dispatch and supervision, output
//! normalization, record updates, and refunds.

pub mod error;
pub mod gateway;
pub mod ledger;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod store;

pub use error::DispatchError;
pub use gateway::{GenerationGateway, GenerationResult};
pub use ledger::RateLimit;
pub use store::{GenerationStore, PgGenerationStore, StoreError};
