use std::fmt;

use dashmap::DashMap;

use super::backend::Subscription;

/// One live query per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    Photos,
    Comments(String),
    Albums,
    Schedules,
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKey::Photos => f.write_str("photos"),
            SubscriptionKey::Comments(photo_id) => write!(f, "comments_{}", photo_id),
            SubscriptionKey::Albums => f.write_str("albums"),
            SubscriptionKey::Schedules => f.write_str("schedules"),
        }
    }
}

/// Live subscriptions by key. Registering a key that is already present
/// cancels the previous subscription. Cancellation runs after the entry
/// has left the map, so callbacks may re-enter the registry.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: DashMap<SubscriptionKey, Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: SubscriptionKey, subscription: Subscription) {
        if let Some(previous) = self.entries.insert(key.clone(), subscription) {
            tracing::debug!("Replacing subscription '{}'", key);
            previous.cancel();
        }
    }

    pub fn cancel(&self, key: &SubscriptionKey) -> bool {
        match self.entries.remove(key) {
            Some((_, subscription)) => {
                subscription.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let keys: Vec<SubscriptionKey> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            self.cancel(&key);
        }
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
