//! Messaging crate - Business logic for SMS/MMS conversations
//!
//! This crate provides platform-independent messaging functionality including:
//! - Domain models (Conversation, Message, Contact)
//! - Row source trait abstractions with in-memory and SQLite backends
//! - Bounded LRU caches guaranteeing one instance per id
//! - Background hydration with contact lookup and change listeners
//! - Inbound-message notification reconciliation
//! - Query API for UI consumption
//! - Action handlers for mutations (mark read, delete, send)
//!
//! Platform services (notifications, wake locks, toasts) are reached through
//! the traits in [`notify`], so this crate has no UI dependencies.

pub mod actions;
pub mod cache;
pub mod hydrate;
pub mod messenger;
pub mod models;
pub mod notify;
pub mod query;
pub mod settings;
pub mod source;

pub use actions::{ActionError, ActionHandler};
pub use cache::{CacheStats, ConversationCache, DEFAULT_CAPACITY, EntityCache, MessageCache, Shared};
pub use hydrate::{HydrateError, HydrationEvent, HydrationListener, Hydrator, Observers, Subscription};
pub use messenger::Messenger;
pub use models::{
    Contact, Conversation, ConversationRow, Message, MessageId, MessageKind, MessageRow, MmsPart,
    NewMessage, ReadStatus, UNKNOWN_COUNT,
};
pub use notify::{
    InboundSms, LogNotifier, LogToaster, NOTIFICATION_ID, NoopWakeLock, Notification,
    NotificationAction, Notifier, PduPart, ReconcileOutcome, Reconciler, RetryPolicy, Toaster,
    WakeLock,
};
pub use query::{ConversationSummary, ThreadDetail, get_thread_detail, list_conversations};
pub use settings::{NotificationSettings, Settings};
pub use source::{
    ALL_THREADS, ContactLookup, InMemoryContacts, InMemoryRowSource, LookupError, RowSource,
    SqliteRowSource,
};
