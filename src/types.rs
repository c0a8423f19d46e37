//! Shared primitive identifiers and the placeholder-id namespace.

/// Server-assigned task identifier. Positive; small values in practice.
pub type TaskId = u64;
/// Owning-user identifier.
pub type OwnerId = u64;
/// Monotonic ticket matching a spawned remote round-trip to its resolution.
pub type TicketId = u64;

/// First id in the cache-local placeholder namespace.
///
/// Speculative create records carry ids at or above this base so they can
/// never collide with server-assigned ids, which are small positive
/// integers. Placeholder ids exist only between the optimistic write and
/// the commit or rollback that resolves the create.
pub const PLACEHOLDER_ID_BASE: TaskId = 1 << 62;

/// Returns true for ids in the cache-local placeholder namespace.
pub fn is_placeholder_id(id: TaskId) -> bool {
    id >= PLACEHOLDER_ID_BASE
}
