//! Keyed stores for the engine's mutable shared state
//!
//! The drift map, the cooldown map and the incident map are the only mutable
//! shared state in the engine. Each is reached through [`KeyedStore`], whose
//! `compare_and_set` is the primitive the tracker and the executor use for
//! atomic per-key transitions. [`InMemoryStore`] backs it with a `DashMap`;
//! a distributed cache can be swapped in behind the same trait.

use crate::error::StoreError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Narrow keyed-state interface
#[async_trait::async_trait]
pub trait KeyedStore<V>: Send + Sync + Debug
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Current value for key
    async fn get(&self, key: &str) -> Result<Option<V>, StoreError>;

    /// Unconditional write
    async fn set(&self, key: &str, value: V) -> Result<(), StoreError>;

    /// Remove key, returning the previous value
    async fn delete(&self, key: &str) -> Result<Option<V>, StoreError>;

    /// Write `new` only if the current value equals `expected`
    ///
    /// `expected = None` means "key must be absent"; `new = None` deletes.
    /// Returns whether the write happened.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&V>,
        new: Option<V>,
    ) -> Result<bool, StoreError>;

    /// Snapshot of all values
    async fn values(&self) -> Result<Vec<V>, StoreError>;
}

/// Shared store handle
pub type SharedStore<V> = Arc<dyn KeyedStore<V>>;

/// `DashMap`-backed store
#[derive(Debug)]
pub struct InMemoryStore<V> {
    inner: DashMap<String, V>,
}

impl<V> InMemoryStore<V> {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Create empty store behind a shared handle
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of keys
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<V> Default for InMemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl<V> KeyedStore<V> for InMemoryStore<V>
where
    V: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        Ok(self.inner.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: V) -> Result<(), StoreError> {
        self.inner.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<Option<V>, StoreError> {
        Ok(self.inner.remove(key).map(|(_, v)| v))
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&V>,
        new: Option<V>,
    ) -> Result<bool, StoreError> {
        // The entry guard holds the shard lock for the whole compare and write.
        match self.inner.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                if expected != Some(occupied.get()) {
                    return Ok(false);
                }
                match new {
                    Some(value) => {
                        let mut occupied = occupied;
                        occupied.insert(value);
                    }
                    None => {
                        occupied.remove();
                    }
                }
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                if expected.is_some() {
                    return Ok(false);
                }
                if let Some(value) = new {
                    vacant.insert(value);
                }
                Ok(true)
            }
        }
    }

    async fn values(&self) -> Result<Vec<V>, StoreError> {
        Ok(self.inner.iter().map(|e| e.value().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let store = InMemoryStore::<u32>::new();
        store.set("a", 1).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(1));
        assert_eq!(store.delete("a").await.unwrap(), Some(1));
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.delete("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn compare_and_set_on_absent_key() {
        let store = InMemoryStore::<u32>::new();
        assert!(!store.compare_and_set("a", Some(&1), Some(2)).await.unwrap());
        assert!(store.compare_and_set("a", None, Some(2)).await.unwrap());
        assert!(!store.compare_and_set("a", None, Some(3)).await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn compare_and_set_replaces_and_deletes() {
        let store = InMemoryStore::<u32>::new();
        store.set("a", 1).await.unwrap();
        assert!(!store.compare_and_set("a", Some(&9), Some(2)).await.unwrap());
        assert!(store.compare_and_set("a", Some(&1), Some(2)).await.unwrap());
        assert!(store.compare_and_set("a", Some(&2), None).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let store = Arc::new(InMemoryStore::<u32>::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.compare_and_set("lock", None, Some(i)).await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.len(), 1);
    }
}
