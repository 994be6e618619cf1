//! Entity cache shared by conversation and message lookups

use log::{debug, warn};
use lru::LruCache;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::models::{Conversation, ConversationRow, Message, MessageId, MessageRow};

/// Number of entities kept per cache unless configured otherwise
pub const DEFAULT_CAPACITY: usize = 50;

/// Cached entities are shared so that background hydration can fill them in
/// while callers hold a reference
pub type Shared<E> = Arc<RwLock<E>>;

/// An entity that can be built from, and refreshed by, a row-source row
pub trait CachedEntity: Send + Sync + 'static {
    type Key: Copy + Eq + Hash + Debug + Send;
    type Row;

    fn row_key(row: &Self::Row) -> Self::Key;
    fn row_date(row: &Self::Row) -> i64;
    fn from_row(row: &Self::Row) -> Self;

    fn key(&self) -> Self::Key;
    fn date(&self) -> i64;
    fn apply_row(&mut self, row: &Self::Row);
}

impl CachedEntity for Conversation {
    type Key = i64;
    type Row = ConversationRow;

    fn row_key(row: &ConversationRow) -> i64 {
        row.thread_id
    }

    fn row_date(row: &ConversationRow) -> i64 {
        row.date
    }

    fn from_row(row: &ConversationRow) -> Self {
        Conversation::from_row(row)
    }

    fn key(&self) -> i64 {
        self.thread_id
    }

    fn date(&self) -> i64 {
        self.date
    }

    fn apply_row(&mut self, row: &ConversationRow) {
        Conversation::apply_row(self, row)
    }
}

impl CachedEntity for Message {
    type Key = MessageId;
    type Row = MessageRow;

    fn row_key(row: &MessageRow) -> MessageId {
        row.message_id()
    }

    fn row_date(row: &MessageRow) -> i64 {
        row.date
    }

    fn from_row(row: &MessageRow) -> Self {
        Message::from_row(row)
    }

    fn key(&self) -> MessageId {
        self.id
    }

    fn date(&self) -> i64 {
        self.date
    }

    fn apply_row(&mut self, row: &MessageRow) {
        Message::apply_row(self, row)
    }
}

/// Counters describing cache behavior since creation or the last flush
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered by a cached entity with an unchanged date
    pub hits: u64,
    /// Lookups that constructed a new entity
    pub misses: u64,
    /// Lookups that updated a cached entity in place
    pub refreshes: u64,
    /// Entities dropped to stay within capacity
    pub evictions: u64,
}

struct Inner<E: CachedEntity> {
    entries: LruCache<E::Key, Shared<E>>,
    stats: CacheStats,
}

/// Access-ordered entries that can be trimmed from the least recently used end
trait EvictionOrder<K> {
    fn len(&self) -> usize;
    fn lru_key(&self) -> Option<K>;
    fn remove(&mut self, key: &K) -> bool;
}

impl<K: Copy + Eq + Hash, V> EvictionOrder<K> for LruCache<K, V> {
    fn len(&self) -> usize {
        LruCache::len(self)
    }

    fn lru_key(&self) -> Option<K> {
        self.peek_lru().map(|(key, _)| *key)
    }

    fn remove(&mut self, key: &K) -> bool {
        self.pop(key).is_some()
    }
}

/// Drop least recently used entries until at most `capacity` remain
///
/// Stops with a warning if the order reports a candidate that cannot be
/// removed. Returns the number of entries evicted.
fn evict_overflow<K: Debug>(
    name: &str,
    entries: &mut impl EvictionOrder<K>,
    capacity: usize,
) -> u64 {
    let mut evicted = 0;
    while entries.len() > capacity {
        let Some(key) = entries.lru_key() else {
            warn!("[{}] over capacity but no eviction candidate", name);
            break;
        };
        if !entries.remove(&key) {
            warn!("[{}] eviction target {:?} already gone", name, key);
            break;
        }
        evicted += 1;
        debug!("[{}] evicted {:?}", name, key);
    }
    evicted
}

/// Bounded LRU cache of shared entities
///
/// One lock guards the whole map, and it is held for the full
/// lookup-or-insert including the refresh callback, so two callers can
/// never build separate instances for the same id.
pub struct EntityCache<E: CachedEntity> {
    name: &'static str,
    capacity: usize,
    inner: Mutex<Inner<E>>,
}

pub type ConversationCache = EntityCache<Conversation>;
pub type MessageCache = EntityCache<Message>;

impl<E: CachedEntity> EntityCache<E> {
    /// Create a cache holding at most `capacity` entities
    ///
    /// `name` only appears in log output.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                stats: CacheStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<E>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the entity for `row`, creating or refreshing it as needed
    ///
    /// `on_refresh` runs inside the critical section whenever the entity is
    /// new or its date differs from the row's; it is not called when the
    /// cached entity is already current.
    pub fn get<F>(&self, row: &E::Row, on_refresh: F) -> Shared<E>
    where
        F: FnOnce(&Shared<E>),
    {
        let key = E::row_key(row);
        let mut inner = self.lock();

        if let Some(entity) = inner.entries.get(&key).cloned() {
            let changed = {
                let mut current = entity.write().unwrap_or_else(|e| e.into_inner());
                if current.date() != E::row_date(row) {
                    current.apply_row(row);
                    true
                } else {
                    false
                }
            };

            if changed {
                inner.stats.refreshes += 1;
                debug!("[{}] refreshed {:?}", self.name, key);
                on_refresh(&entity);
            } else {
                inner.stats.hits += 1;
            }
            return entity;
        }

        let entity: Shared<E> = Arc::new(RwLock::new(E::from_row(row)));
        inner.entries.put(key, Arc::clone(&entity));
        inner.stats.misses += 1;
        debug!("[{}] cached {:?}", self.name, key);

        let evicted = evict_overflow(self.name, &mut inner.entries, self.capacity);
        inner.stats.evictions += evicted;
        on_refresh(&entity);
        entity
    }

    /// Get a cached entity without touching its LRU position
    pub fn peek(&self, key: &E::Key) -> Option<Shared<E>> {
        self.lock().entries.peek(key).cloned()
    }

    pub fn contains(&self, key: &E::Key) -> bool {
        self.lock().entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached keys from least to most recently used
    pub fn keys_lru_order(&self) -> Vec<E::Key> {
        self.lock().entries.iter().rev().map(|(key, _)| *key).collect()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Drop one entity, returning whether it was cached
    pub fn invalidate(&self, key: &E::Key) -> bool {
        self.lock().entries.pop(key).is_some()
    }

    /// Drop every entity
    ///
    /// Used after bulk mutations, since per-row invalidation is not tracked.
    pub fn flush(&self) {
        let mut inner = self.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.stats = CacheStats::default();
        debug!("[{}] flushed {} entries", self.name, dropped);
    }
}
