//! Conversation model representing a message thread

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Contact, ConversationRow, ReadStatus};

/// Message count value used until hydration has counted the thread
pub const UNKNOWN_COUNT: i64 = -1;

/// A conversation (thread) with one recipient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Thread id in the row source
    pub thread_id: i64,
    /// Epoch millis of the most recent message
    pub date: i64,
    /// Snippet of the most recent message
    pub body: Option<String>,
    pub read: ReadStatus,
    /// Number of messages, [`UNKNOWN_COUNT`] until known
    pub message_count: i64,
    /// Recipient the contact below was resolved for
    pub recipient_id: i64,
    pub contact: Option<Contact>,
    /// When hydration last completed
    pub last_hydrated: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Build a conversation from a freshly queried row
    pub fn from_row(row: &ConversationRow) -> Self {
        Self {
            thread_id: row.thread_id,
            date: row.date,
            body: row.body.clone(),
            read: row.read,
            message_count: row.message_count,
            recipient_id: row.recipient_id,
            contact: None,
            last_hydrated: None,
        }
    }

    /// Copy the mutable columns of `row` into this conversation
    ///
    /// The contact is replaced wholesale: it is dropped when the recipient
    /// changed so that the next hydration resolves the new one.
    pub fn apply_row(&mut self, row: &ConversationRow) {
        self.date = row.date;
        self.body = row.body.clone();
        self.read = row.read;
        if row.message_count != UNKNOWN_COUNT {
            self.message_count = row.message_count;
        }
        if self.recipient_id != row.recipient_id {
            self.recipient_id = row.recipient_id;
            self.contact = None;
        }
    }

    /// Whether the message count has been determined
    pub fn has_count(&self) -> bool {
        self.message_count != UNKNOWN_COUNT
    }

    pub fn is_unread(&self) -> bool {
        self.read.is_unread()
    }

    /// Name to show for this thread, if the contact is known
    pub fn display_name(&self) -> Option<&str> {
        self.contact.as_ref().map(Contact::display_name)
    }
}
