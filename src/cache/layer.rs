//! Two-tier cache: an in-process map in front of a durable store.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, warn};

use super::storage::{DurableStore, StorageError};
use super::traits::{CacheEntry, CacheResult, Clock, SystemClock};

/// Freshness and capacity settings for a [`CacheStore`].
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
  /// How long an entry stays valid after it was stored
  pub ttl: Duration,
  /// Durable key count at which eviction kicks in
  pub max_items: usize,
  /// How many keys one eviction pass removes
  pub evict_count: usize,
}

impl Default for CachePolicy {
  fn default() -> Self {
    Self {
      ttl: Duration::minutes(30),
      max_items: 50,
      evict_count: 10,
    }
  }
}

/// Cache over JSON-able payloads keyed by request identity.
///
/// Reads check the fast tier first, then the durable tier (repopulating the
/// fast tier on a hit). Writes always land in the fast tier; durable failures
/// are logged and swallowed, so the cache never fails a caller.
pub struct CacheStore {
  memory: Arc<Mutex<HashMap<String, CacheEntry<Value>>>>,
  durable: Arc<dyn DurableStore>,
  clock: Arc<dyn Clock>,
  policy: CachePolicy,
}

impl CacheStore {
  pub fn new(durable: Arc<dyn DurableStore>, policy: CachePolicy) -> Self {
    Self {
      memory: Arc::new(Mutex::new(HashMap::new())),
      durable,
      clock: Arc::new(SystemClock),
      policy,
    }
  }

  /// Replace the clock used for TTL checks.
  #[cfg(test)]
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  fn memory(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<Value>>> {
    self.memory.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn is_fresh(&self, stored_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - stored_at < self.policy.ttl
  }

  /// Look up a fresh entry. Expired entries are dropped on the way.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let now = self.clock.now();

    {
      let mut memory = self.memory();
      if let Some(entry) = memory.get(key) {
        if self.is_fresh(entry.stored_at, now) {
          match serde_json::from_value(entry.data.clone()) {
            Ok(data) => return Some(data),
            Err(e) => debug!(key, "Cached entry has unexpected shape: {}", e),
          }
        }
        memory.remove(key);
      }
    }

    let raw = match self.durable.get(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(key, "Failed to read durable cache: {}", e);
        return None;
      }
    };

    let entry: CacheEntry<Value> = match serde_json::from_str(&raw) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(key, "Discarding corrupt cache entry: {}", e);
        return None;
      }
    };

    if !self.is_fresh(entry.stored_at, now) {
      debug!(key, "Durable cache entry expired");
      if let Err(e) = self.durable.remove_many(&[key.to_string()]) {
        debug!(key, "Failed to drop expired entry: {}", e);
      }
      return None;
    }

    let data = serde_json::from_value(entry.data.clone()).ok()?;
    self.memory().insert(key.to_string(), entry);
    Some(data)
  }

  /// Store `data` under `key`. Never fails.
  pub fn set<T: Serialize>(&self, key: &str, data: &T) {
    let value = match serde_json::to_value(data) {
      Ok(value) => value,
      Err(e) => {
        error!(key, "Failed to serialize cache entry: {}", e);
        return;
      }
    };
    let entry = CacheEntry {
      data: value,
      stored_at: self.clock.now(),
    };

    match serde_json::to_string(&entry) {
      Ok(raw) => self.persist(key, &raw),
      Err(e) => error!(key, "Failed to encode cache entry: {}", e),
    }

    self.memory().insert(key.to_string(), entry);
  }

  fn persist(&self, key: &str, raw: &str) {
    let result = self
      .make_room(key)
      .and_then(|_| self.durable.set(key, raw));

    match result {
      Ok(()) => {}
      Err(StorageError::Full) => {
        warn!("Cache storage is full, clearing everything to recover");
        self.clear();
        if let Err(e) = self.durable.set(key, raw) {
          debug!(key, "Retry after clearing cache storage failed: {}", e);
        }
      }
      Err(e) => error!(key, "Failed to save cache entry: {}", e),
    }
  }

  /// Evict the first keys in enumeration order once the durable tier is at capacity.
  fn make_room(&self, key: &str) -> Result<(), StorageError> {
    let keys = self.durable.list_keys()?;
    if keys.len() < self.policy.max_items || keys.iter().any(|k| k == key) {
      return Ok(());
    }

    let evicted: Vec<String> = keys.into_iter().take(self.policy.evict_count).collect();
    debug!(count = evicted.len(), "Evicting cache entries");
    self.durable.remove_many(&evicted)?;

    let mut memory = self.memory();
    for k in &evicted {
      memory.remove(k);
    }
    Ok(())
  }

  /// Drop every entry from both tiers.
  pub fn clear(&self) {
    self.memory().clear();
    if let Err(e) = self.durable.clear() {
      error!("Failed to clear cache storage: {}", e);
    }
  }

  /// Cache-first fetch: serve a fresh entry, otherwise run `fetcher` and
  /// store its result under the same key.
  pub async fn read_through<T, E, F, Fut>(&self, key: &str, fetcher: F) -> Result<CacheResult<T>, E>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    if let Some(data) = self.get(key) {
      debug!(key, "Cache hit");
      return Ok(CacheResult::from_cache(data));
    }

    debug!(key, "Cache miss");
    let data = fetcher().await?;
    self.set(key, &data);
    Ok(CacheResult::from_network(data))
  }

  #[cfg(test)]
  fn in_memory(&self, key: &str) -> bool {
    self.memory().contains_key(key)
  }
}

impl Clone for CacheStore {
  fn clone(&self) -> Self {
    Self {
      memory: Arc::clone(&self.memory),
      durable: Arc::clone(&self.durable),
      clock: Arc::clone(&self.clock),
      policy: self.policy,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::MemoryStorage;
  use crate::cache::traits::{CacheSource, ManualClock};
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Durable store whose writes always fail with a backend error.
  struct BrokenStorage;

  impl DurableStore for BrokenStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
      Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
      Err(StorageError::Backend("disk I/O error".into()))
    }

    fn list_keys(&self) -> Result<Vec<String>, StorageError> {
      Ok(Vec::new())
    }

    fn remove_many(&self, _keys: &[String]) -> Result<(), StorageError> {
      Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
      Ok(())
    }
  }

  /// Durable store that reports every write as out of space.
  #[derive(Default)]
  struct FullStorage {
    writes: AtomicUsize,
    clears: AtomicUsize,
  }

  impl DurableStore for FullStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
      Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
      self.writes.fetch_add(1, Ordering::SeqCst);
      Err(StorageError::Full)
    }

    fn list_keys(&self) -> Result<Vec<String>, StorageError> {
      Ok(Vec::new())
    }

    fn remove_many(&self, _keys: &[String]) -> Result<(), StorageError> {
      Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
      self.clears.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }
  }

  fn store_with_clock() -> (CacheStore, Arc<ManualClock>, Arc<MemoryStorage>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let durable = Arc::new(MemoryStorage::new());
    let store = CacheStore::new(durable.clone(), CachePolicy::default()).with_clock(clock.clone());
    (store, clock, durable)
  }

  #[test]
  fn test_set_then_get() {
    let (store, clock, _) = store_with_clock();
    store.set("k", &vec![1, 2, 3]);
    clock.advance(Duration::minutes(29));
    assert_eq!(store.get::<Vec<i32>>("k"), Some(vec![1, 2, 3]));
  }

  #[test]
  fn test_expired_entry_is_absent_and_dropped_from_memory() {
    let (store, clock, durable) = store_with_clock();
    store.set("k", &"value");
    assert!(store.in_memory("k"));

    clock.advance(Duration::minutes(30) + Duration::seconds(1));
    assert_eq!(store.get::<String>("k"), None);
    assert!(!store.in_memory("k"));
    assert_eq!(durable.get("k").unwrap(), None);
  }

  #[test]
  fn test_overflow_evicts_oldest_ten() {
    let (store, _, durable) = store_with_clock();
    for i in 0..50 {
      store.set(&format!("k{}", i), &i);
    }
    assert_eq!(durable.list_keys().unwrap().len(), 50);

    store.set("k50", &50);

    let keys = durable.list_keys().unwrap();
    assert_eq!(keys.len(), 41);
    assert_eq!(keys.first().map(String::as_str), Some("k10"));
    for i in 0..10 {
      assert_eq!(store.get::<i32>(&format!("k{}", i)), None);
    }
    assert_eq!(store.get::<i32>("k10"), Some(10));
    assert_eq!(store.get::<i32>("k50"), Some(50));
  }

  #[test]
  fn test_durable_failure_is_swallowed() {
    let store = CacheStore::new(Arc::new(BrokenStorage), CachePolicy::default());
    store.set("a", &"first");
    store.set("b", &"second");

    assert_eq!(store.get::<String>("a").as_deref(), Some("first"));
    assert_eq!(store.get::<String>("b").as_deref(), Some("second"));
  }

  #[test]
  fn test_full_storage_clears_and_retries_once() {
    let durable = Arc::new(MemoryStorage::with_capacity(3));
    let policy = CachePolicy {
      max_items: 100,
      ..CachePolicy::default()
    };
    let store = CacheStore::new(durable.clone(), policy);

    store.set("a", &1);
    store.set("b", &2);
    store.set("c", &3);
    store.set("d", &4);

    assert_eq!(durable.list_keys().unwrap(), vec!["d"]);
    assert_eq!(store.get::<i32>("a"), None);
    assert_eq!(store.get::<i32>("d"), Some(4));
  }

  #[test]
  fn test_failed_retry_after_clearing_is_swallowed() {
    let durable = Arc::new(FullStorage::default());
    let store = CacheStore::new(durable.clone(), CachePolicy::default());

    store.set("k", &"kept in memory");

    assert_eq!(durable.clears.load(Ordering::SeqCst), 1);
    assert_eq!(durable.writes.load(Ordering::SeqCst), 2);
    assert!(durable.list_keys().unwrap().is_empty());
    assert_eq!(store.get::<String>("k").as_deref(), Some("kept in memory"));
  }

  #[test]
  fn test_durable_tier_repopulates_memory() {
    let durable: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
    let first = CacheStore::new(durable.clone(), CachePolicy::default());
    first.set("k", &"persisted");

    let second = CacheStore::new(durable, CachePolicy::default());
    assert!(!second.in_memory("k"));
    assert_eq!(second.get::<String>("k").as_deref(), Some("persisted"));
    assert!(second.in_memory("k"));
  }

  #[tokio::test]
  async fn test_read_through_skips_fetcher_on_hit() {
    let (store, _, _) = store_with_clock();
    let calls = AtomicUsize::new(0);
    let counter = &calls;

    let fetch = move || async move {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok::<_, String>(vec!["bulbasaur".to_string()])
    };

    let first = store.read_through("list", fetch).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);

    let second = store.read_through("list", fetch).await.unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.data, vec!["bulbasaur".to_string()]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_read_through_does_not_cache_failures() {
    let (store, _, durable) = store_with_clock();
    let result: Result<CacheResult<i32>, &str> =
      store.read_through("k", || async { Err("boom") }).await;
    assert!(result.is_err());
    assert!(durable.list_keys().unwrap().is_empty());
  }
}
