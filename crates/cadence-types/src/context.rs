//! Typed capability registry injected into every agent.
//!
//! A [`ContextContainer`] maps a type key to one shared context value.
//! Contexts are registered under their own concrete type with
//! [`ContextContainer::insert`], or under an explicit key (typically a
//! trait object such as `dyn Inventory + Send + Sync`) with
//! [`ContextContainer::insert_arc`]. Registering the same `Arc` under several
//! keys lets plan schemes look a context up by whichever capability they
//! care about.
//!
//! Lookups are a single hash probe on [`TypeId`]. Contexts that need to be
//! mutated during deliberation carry their own interior mutability.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One registered context value plus the name of its key type (for `Debug`).
struct Entry {
    value: Box<dyn Any + Send + Sync>,
    key_name: &'static str,
}

/// Registry of an agent's contexts, keyed by type.
#[derive(Default)]
pub struct ContextContainer {
    entries: HashMap<TypeId, Entry>,
}

impl ContextContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `context` under its own concrete type.
    ///
    /// Replaces any context previously registered under the same type.
    pub fn insert<C: Any + Send + Sync>(&mut self, context: C) {
        self.insert_arc(Arc::new(context));
    }

    /// Register a shared context under the explicit key type `K`.
    ///
    /// `K` may be unsized, so an `Arc<dyn Trait + Send + Sync>` is stored and
    /// later retrieved under the trait-object key.
    pub fn insert_arc<K: ?Sized + Any + Send + Sync>(&mut self, context: Arc<K>) {
        self.entries.insert(
            TypeId::of::<K>(),
            Entry {
                value: Box::new(context),
                key_name: type_name::<K>(),
            },
        );
    }

    /// Look up the context registered under key type `K`.
    pub fn get<K: ?Sized + Any + Send + Sync>(&self) -> Option<Arc<K>> {
        self.entries
            .get(&TypeId::of::<K>())
            .and_then(|entry| entry.value.downcast_ref::<Arc<K>>())
            .cloned()
    }

    /// Whether a context is registered under key type `K`.
    pub fn contains<K: ?Sized + Any>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<K>())
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no context has been registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move every entry of `other` into this container.
    ///
    /// Entries of `other` win on key collisions.
    pub fn merge(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }
}

impl fmt::Debug for ContextContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.entries.values().map(|e| e.key_name).collect();
        keys.sort_unstable();
        f.debug_struct("ContextContainer").field("keys", &keys).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    trait Counter: Send + Sync {
        fn bump(&self) -> u32;
    }

    #[derive(Default)]
    struct SharedCounter(Mutex<u32>);

    impl Counter for SharedCounter {
        fn bump(&self) -> u32 {
            let mut guard = self.0.lock().unwrap();
            *guard = guard.saturating_add(1);
            *guard
        }
    }

    #[test]
    fn lookup_by_concrete_type() {
        let mut contexts = ContextContainer::new();
        contexts.insert(String::from("weather: clear"));
        let found = contexts.get::<String>().unwrap();
        assert_eq!(found.as_str(), "weather: clear");
        assert!(contexts.get::<u32>().is_none());
    }

    #[test]
    fn explicit_keys_share_one_instance() {
        let counter = Arc::new(SharedCounter::default());
        let mut contexts = ContextContainer::new();
        contexts.insert_arc(Arc::clone(&counter));
        contexts.insert_arc::<dyn Counter>(counter);

        assert_eq!(contexts.get::<dyn Counter>().unwrap().bump(), 1);
        assert_eq!(contexts.get::<SharedCounter>().unwrap().bump(), 2);
        assert_eq!(contexts.len(), 2);
    }

    #[test]
    fn later_insert_replaces_earlier() {
        let mut contexts = ContextContainer::new();
        contexts.insert(1_u32);
        contexts.insert(2_u32);
        assert_eq!(*contexts.get::<u32>().unwrap(), 2);
        assert_eq!(contexts.len(), 1);
    }

    #[test]
    fn merge_moves_entries() {
        let mut base = ContextContainer::new();
        base.insert(7_u64);
        let mut extra = ContextContainer::new();
        extra.insert(String::from("x"));
        base.merge(extra);
        assert!(base.contains::<u64>());
        assert!(base.contains::<String>());
    }
}
