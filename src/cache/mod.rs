//! Keyed query cache with staleness tracking and fetch de-duplication.

/// Query keys, filters, and cached value shapes.
pub mod key;
/// Cache store and entry state machine.
pub mod store;
