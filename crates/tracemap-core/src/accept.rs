//! Per-query cache of RPC host resolutions
//!
//! An outgoing call recorded against a generic RPC client node only knows the
//! host it reached. Resolving that host to the application that accepted the
//! call needs a store lookup, so results are memoized for the lifetime of one
//! topology build.

use crate::application::Application;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Lookup key: a host as reached from a calling application
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RpcApplicationKey {
    pub host: String,
    pub caller: Application,
}

impl RpcApplicationKey {
    pub fn new(host: impl Into<String>, caller: Application) -> Self {
        Self {
            host: host.into(),
            caller,
        }
    }
}

/// A concrete application observed accepting calls on a host
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AcceptApplication {
    pub host: String,
    pub resolved: Application,
}

impl AcceptApplication {
    pub fn new(host: impl Into<String>, resolved: Application) -> Self {
        Self {
            host: host.into(),
            resolved,
        }
    }
}

/// Memoized host resolutions, owned by a single query
#[derive(Debug, Default)]
pub struct AcceptResolutionCache {
    entries: HashMap<RpcApplicationKey, HashSet<AcceptApplication>>,
}

impl AcceptResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached resolutions for `key`; empty on a miss. Never performs a lookup.
    pub fn get(&self, key: &RpcApplicationKey) -> HashSet<AcceptApplication> {
        match self.entries.get(key) {
            Some(hit) => {
                debug!("accept cache hit {}@{}: {} entries", key.host, key.caller, hit.len());
                hit.clone()
            }
            None => {
                debug!("accept cache miss {}@{}", key.host, key.caller);
                HashSet::new()
            }
        }
    }

    /// Whether `key` has been stored, including as a negative entry
    pub fn contains(&self, key: &RpcApplicationKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Store a lookup result, indexing each resolution under its own host too
    pub fn put(&mut self, key: RpcApplicationKey, resolutions: HashSet<AcceptApplication>) {
        if resolutions.is_empty() {
            self.entries.insert(key, resolutions);
            return;
        }
        debug!("accept cache put {}@{}: {:?}", key.host, key.caller, resolutions);

        for accept in &resolutions {
            let derived = RpcApplicationKey::new(accept.host.clone(), key.caller.clone());
            if derived == key {
                continue;
            }
            self.entries
                .entry(derived)
                .or_default()
                .insert(accept.clone());
        }
        self.entries.entry(key).or_default().extend(resolutions);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ServiceType;

    fn order() -> Application {
        Application::new("ORDER", ServiceType::TOMCAT)
    }

    fn accept(host: &str, name: &str) -> AcceptApplication {
        AcceptApplication::new(host, Application::new(name, ServiceType::TOMCAT))
    }

    #[test]
    fn test_miss_returns_empty() {
        let cache = AcceptResolutionCache::new();
        let key = RpcApplicationKey::new("10.0.0.5", order());
        assert!(cache.get(&key).is_empty());
        assert!(!cache.contains(&key));
    }

    #[test]
    fn test_negative_caching() {
        let mut cache = AcceptResolutionCache::new();
        let key = RpcApplicationKey::new("10.0.0.5", order());
        cache.put(key.clone(), HashSet::new());

        assert!(cache.get(&key).is_empty());
        assert!(cache.contains(&key));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_put_stores_full_set_under_key() {
        let mut cache = AcceptResolutionCache::new();
        let key = RpcApplicationKey::new("10.0.0.5", order());
        let set: HashSet<_> = [accept("10.0.0.5", "PAYMENT"), accept("10.0.0.5", "BILLING")]
            .into_iter()
            .collect();
        cache.put(key.clone(), set.clone());
        assert_eq!(cache.get(&key), set);
    }

    #[test]
    fn test_put_builds_reverse_index_per_host() {
        let mut cache = AcceptResolutionCache::new();
        let key = RpcApplicationKey::new("lb.internal:80", order());
        let set: HashSet<_> = [accept("10.0.0.5:8080", "PAYMENT"), accept("10.0.0.6:8080", "BILLING")]
            .into_iter()
            .collect();
        cache.put(key, set);

        let narrow = cache.get(&RpcApplicationKey::new("10.0.0.5:8080", order()));
        assert_eq!(narrow.len(), 1);
        assert!(narrow.contains(&accept("10.0.0.5:8080", "PAYMENT")));

        let other = cache.get(&RpcApplicationKey::new("10.0.0.6:8080", order()));
        assert!(other.contains(&accept("10.0.0.6:8080", "BILLING")));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_reverse_index_is_scoped_to_caller() {
        let mut cache = AcceptResolutionCache::new();
        let key = RpcApplicationKey::new("lb", order());
        cache.put(key, [accept("10.0.0.5", "PAYMENT")].into_iter().collect());

        let other_caller = Application::new("CART", ServiceType::TOMCAT);
        assert!(!cache.contains(&RpcApplicationKey::new("10.0.0.5", other_caller)));
    }

    #[test]
    fn test_derived_entries_union() {
        let mut cache = AcceptResolutionCache::new();
        cache.put(
            RpcApplicationKey::new("lb-a", order()),
            [accept("10.0.0.5", "PAYMENT")].into_iter().collect(),
        );
        cache.put(
            RpcApplicationKey::new("lb-b", order()),
            [accept("10.0.0.5", "PAYMENT-CANARY")].into_iter().collect(),
        );
        let hit = cache.get(&RpcApplicationKey::new("10.0.0.5", order()));
        assert_eq!(hit.len(), 2);
    }
}
