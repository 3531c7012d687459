//! Crate-wide error type.
//!
//! A fatal protocol invariant violation is deliberately not a variant of
//! this enum: it marks a local programming defect, not a bus condition,
//! and is raised with `panic!` at the violation site instead of being
//! threaded through `Result`.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested operation is not valid in the service's current state
    /// (e.g. `enumerate()` while already enumerating, or with zero host
    /// services registered).
    #[error("invalid state for requested operation")]
    InvalidState,
    /// A caller-supplied value was out of range or otherwise malformed
    /// (also used for malformed inbound wire data, which is a bus
    /// condition rather than a local defect).
    #[error("invalid parameter")]
    InvalidParameter,
    /// The service registry is full, or the link layer rejected a send.
    #[error("no resources available")]
    NoResources,
    /// The underlying transport failed.
    #[error("bus error: {0}")]
    Bus(String),
}
