//! Unique identifiers for objects, notifiers and listener subscriptions

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a facet-bearing object
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

impl ObjectId {
    /// Generate a new unique ObjectId
    pub fn new() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier of one installed notifier
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NotifierId(u64);

static NEXT_NOTIFIER_ID: AtomicU64 = AtomicU64::new(1);

impl NotifierId {
    /// Generate a new unique NotifierId
    pub fn new() -> Self {
        NotifierId(NEXT_NOTIFIER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for NotifierId {
    fn default() -> Self {
        Self::new()
    }
}

/// Token returned by a subscription, used to unsubscribe
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

static NEXT_LISTENER_TOKEN: AtomicU64 = AtomicU64::new(1);

impl ListenerToken {
    /// Generate a new unique token
    pub fn new() -> Self {
        ListenerToken(NEXT_LISTENER_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ListenerToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_uniqueness() {
        let id1 = ObjectId::new();
        let id2 = ObjectId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn test_notifier_and_token_ids_are_independent() {
        let n = NotifierId::new();
        let t = ListenerToken::new();
        assert_ne!(n, NotifierId::new());
        assert_ne!(t, ListenerToken::new());
    }
}
