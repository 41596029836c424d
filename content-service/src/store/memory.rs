//! In-process store with TTL semantics matching the Redis store.
//!
//! Used by tests. Every operation holds the map lock for its whole duration,
//! so `delete_counting` has the same single-winner guarantee as Redis `DEL`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::{StoreError, TokenStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` without an expiry.
    pub fn insert_persistent(&self, key: &str, value: &str) {
        self.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove `key` if expired and return the live entry, if any.
    fn live_entry(entries: &mut HashMap<String, Entry>, key: &str) -> Option<Entry> {
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

impl TokenStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock();
        Ok(Self::live_entry(&mut entries, key).map(|entry| entry.value))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut entries = self.lock();
        let now = Instant::now();
        Ok(Self::live_entry(&mut entries, key)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn set_existing(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock();
        if Self::live_entry(&mut entries, key).is_none() {
            return Ok(false);
        }
        if let Some(entry) = entries.get_mut(key) {
            entry.value = value.to_string();
        }
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut entries = self.lock();
        if Self::live_entry(&mut entries, key).is_none() {
            return Ok(false);
        }
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }

    async fn delete_counting(&self, key: &str) -> Result<u64, StoreError> {
        let mut entries = self.lock();
        let existed = Self::live_entry(&mut entries, key).is_some();
        entries.remove(key);
        Ok(u64::from(existed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_counting_reports_existence_once() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.delete_counting("k").await.unwrap(), 1);
        assert_eq!(store.delete_counting("k").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(6)));

        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.delete_counting("k").await.unwrap(), 0);
        assert!(store.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_existing_keeps_ttl_and_skips_missing_keys() {
        let store = MemoryStore::new();
        store.set("k", "v1", Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;

        assert!(store.set_existing("k", "v2").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(7)));

        assert!(!store.set_existing("missing", "v").await.unwrap());
        assert!(store.keys().iter().all(|k| k != "missing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_existing_does_not_revive_expired_key() {
        let store = MemoryStore::new();
        store.set("k", "v1", Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(!store.set_existing("k", "v2").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_applies_only_to_existing_keys() {
        let store = MemoryStore::new();
        store.insert_persistent("k", "v");

        assert!(store.expire("k", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(5)));

        assert!(!store.expire("missing", Duration::from_secs(5)).await.unwrap());
        assert!(store.keys().iter().all(|k| k != "missing"));
    }

    #[tokio::test]
    async fn test_persistent_entry_has_no_ttl() {
        let store = MemoryStore::new();
        store.insert_persistent("k", "v");

        assert_eq!(store.ttl("k").await.unwrap(), None);
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_delete_counting_has_single_winner() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::from_secs(60)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.delete_counting("k").await.unwrap()
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 1);
    }
}
