//! Row source and contact lookup trait definitions

use anyhow::Result;

use crate::models::{Contact, ConversationRow, MessageId, MessageRow, NewMessage};

/// Thread id accepted by [`RowSource::mark_read`] to mark every thread
pub const ALL_THREADS: i64 = -1;

/// Queryable provider of conversation and message rows
///
/// Listing methods return rows ordered by date descending (newest first).
/// Implementations give no guarantee that a row written by another caller is
/// visible to the very next query.
pub trait RowSource: Send + Sync {
    /// Get the conversation row for a thread
    fn get_conversation(&self, thread_id: i64) -> Result<Option<ConversationRow>>;

    /// List conversations, newest first
    fn list_conversations(&self, limit: usize, offset: usize) -> Result<Vec<ConversationRow>>;

    /// Get a message row; negative ids address the mms table
    fn get_message(&self, id: MessageId) -> Result<Option<MessageRow>>;

    /// List the SMS and MMS rows of a thread, newest first
    fn list_messages(&self, thread_id: i64) -> Result<Vec<MessageRow>>;

    /// Unread received SMS rows, newest first
    fn list_unread_sms(&self) -> Result<Vec<MessageRow>>;

    /// Unread received MMS rows, newest first
    fn list_unread_mms(&self) -> Result<Vec<MessageRow>>;

    /// Count messages in a thread
    fn count_messages(&self, thread_id: i64) -> Result<usize>;

    /// Text of the newest message in a thread
    fn last_body(&self, thread_id: i64) -> Result<Option<String>>;

    /// Address behind a recipient id
    fn recipient_address(&self, recipient_id: i64) -> Result<Option<String>>;

    /// Insert a message, creating its thread if needed, and return its id
    fn insert_message(&self, message: NewMessage) -> Result<MessageId>;

    /// Mark every message of a thread (or [`ALL_THREADS`]) read
    ///
    /// Returns the number of rows changed.
    fn mark_read(&self, thread_id: i64) -> Result<usize>;

    /// Delete a thread and its messages, returning the number of messages removed
    fn delete_thread(&self, thread_id: i64) -> Result<usize>;

    /// Delete every thread, returning the number of messages removed
    fn delete_all(&self) -> Result<usize>;

    /// Delete one message, returning whether it existed
    fn delete_message(&self, id: MessageId) -> Result<bool>;
}

/// Failure while resolving contact details
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Contact directory unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed contact record for {address}")]
    Malformed { address: String },
}

/// Reverse lookup of contact metadata by address
pub trait ContactLookup: Send + Sync {
    /// Resolve the contact for an address, `None` if the address is unknown
    fn lookup(&self, address: &str) -> Result<Option<Contact>, LookupError>;
}
