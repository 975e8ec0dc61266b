//! Type-safe identifiers.
//!
//! Newtype wrappers keep correlation ids, subscription handles and
//! connection generations from being mixed up.
//!
//! | Type | Wraps | Purpose |
//! |------|-------|---------|
//! | [`RequestId`] | `String` | Correlates a request with its response |
//! | [`SubscriptionId`] | `u64` | Handle returned by event subscription |
//! | [`Generation`] | `u64` | Counts successful hellos on a client |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// RequestId
// ============================================================================

/// Correlation id of an outbound request.
///
/// Allocated from a client-wide monotonic sequence, so an id is never
/// reused for the lifetime of the client (and therefore of any of its
/// connections). The gateway may echo any string, so parsing accepts
/// arbitrary text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Creates the id for sequence number `n` (`r{n}`).
    #[inline]
    #[must_use]
    pub fn from_sequence(n: u64) -> Self {
        Self(format!("r{n}"))
    }

    /// Wraps an id received on the wire.
    #[inline]
    #[must_use]
    pub fn from_wire(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// RequestIdAllocator
// ============================================================================

/// Monotonic [`RequestId`] source.
#[derive(Debug, Default)]
pub(crate) struct RequestIdAllocator {
    next: AtomicU64,
}

impl RequestIdAllocator {
    /// Returns the next unused id, starting at `r1`.
    pub(crate) fn allocate(&self) -> RequestId {
        RequestId::from_sequence(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Handle for an event subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[inline]
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Connection generation.
///
/// Zero means "never connected". Each successful hello advances the
/// generation by one, so `1` is the first connection and anything higher
/// is a reconnect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    /// Generation before any successful hello.
    pub const NONE: Self = Self(0);

    #[inline]
    #[must_use]
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` for the first successful connection.
    #[inline]
    #[must_use]
    pub const fn is_first(self) -> bool {
        self.0 == 1
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use rustc_hash::FxHashSet;

    #[test]
    fn test_request_id_format() {
        assert_eq!(RequestId::from_sequence(1).as_str(), "r1");
        assert_eq!(RequestId::from_sequence(42).to_string(), "r42");
    }

    #[test]
    fn test_request_id_serializes_as_string() {
        let id = RequestId::from_sequence(3);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"r3\"");

        let parsed: RequestId = serde_json::from_str("\"custom-id\"").unwrap();
        assert_eq!(parsed, RequestId::from_wire("custom-id"));
    }

    #[test]
    fn test_allocator_starts_at_one() {
        let allocator = RequestIdAllocator::default();
        assert_eq!(allocator.allocate().as_str(), "r1");
        assert_eq!(allocator.allocate().as_str(), "r2");
    }

    #[test]
    fn test_generation() {
        assert!(!Generation::NONE.is_first());
        assert!(Generation::new(1).is_first());
        assert!(Generation::new(2) > Generation::new(1));
        assert_eq!(Generation::new(5).to_string(), "gen-5");
    }

    proptest! {
        #[test]
        fn prop_allocated_ids_are_unique(count in 1usize..2000) {
            let allocator = RequestIdAllocator::default();
            let ids: FxHashSet<RequestId> = (0..count).map(|_| allocator.allocate()).collect();
            prop_assert_eq!(ids.len(), count);
        }
    }
}
