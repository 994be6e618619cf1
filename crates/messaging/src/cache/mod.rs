//! Bounded LRU caches for hydrated entities
//!
//! At most one entity instance exists per id while it is cached, so every
//! lookup goes through [`EntityCache::get`].

mod entity;

pub use entity::{
    CacheStats, CachedEntity, ConversationCache, DEFAULT_CAPACITY, EntityCache, MessageCache,
    Shared,
};
