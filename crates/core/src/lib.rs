//! Domain logic for the generation gateway.
//!
//! Everything in this crate is pure: model registry lookups, parameter
//! coercion, node-graph template interpolation, result normalization,
//! pricing, and the provider job state machine. I/O lives in the
//! `kiara-providers`, `kiara-db`, and `kiara-pipeline` crates.

pub mod coercion;
pub mod error;
pub mod job;
pub mod normalize;
pub mod pricing;
pub mod registry;
pub mod request;
pub mod template;
pub mod types;
