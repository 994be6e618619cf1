//! Query API for UI consumption
//!
//! Provides high-level query functions that return snapshots of cached
//! entities formatted for display.

mod conversations;

pub use conversations::{
    ConversationSummary, ThreadDetail, UNKNOWN_SENDER, get_thread_detail, list_conversations,
};
