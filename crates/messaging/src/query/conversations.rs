//! Conversation query functions

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messenger::Messenger;
use crate::models::{Conversation, Message};

/// Shown when a thread's contact has not been resolved yet
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Summary information for displaying a conversation in a list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub thread_id: i64,
    /// Contact name, or the address when the contact has no name
    pub display_name: String,
    /// Preview of the newest message
    pub snippet: String,
    /// Timestamp of the most recent message
    pub date: DateTime<Utc>,
    /// Number of messages, `None` until hydration has counted them
    pub message_count: Option<usize>,
    /// Whether the thread has unread messages
    pub is_unread: bool,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            thread_id: conversation.thread_id,
            display_name: conversation
                .display_name()
                .unwrap_or(UNKNOWN_SENDER)
                .to_string(),
            snippet: conversation.body.clone().unwrap_or_default(),
            date: to_datetime(conversation.date),
            message_count: conversation
                .has_count()
                .then_some(conversation.message_count as usize),
            is_unread: conversation.is_unread(),
        }
    }
}

/// Detailed thread information including all messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadDetail {
    /// The conversation metadata
    pub conversation: Conversation,
    /// All messages in the thread, ordered chronologically
    pub messages: Vec<Message>,
}

/// List conversations with pagination
///
/// Returns conversations sorted by date descending (newest first). With
/// `sync` the summaries include hydrated counts and contact names; otherwise
/// they reflect whatever the cache held at the time of the call.
///
/// # Arguments
/// * `messenger` - The messenger owning the caches
/// * `limit` - Maximum number of conversations to return
/// * `offset` - Number of conversations to skip
/// * `sync` - Hydrate before returning
pub fn list_conversations(
    messenger: &Messenger,
    limit: usize,
    offset: usize,
    sync: bool,
) -> Result<Vec<ConversationSummary>> {
    let conversations = messenger.conversations(limit, offset, sync)?;
    Ok(conversations
        .iter()
        .map(|c| ConversationSummary::from(&*c.read().unwrap_or_else(|e| e.into_inner())))
        .collect())
}

/// Get a conversation together with its messages
///
/// # Arguments
/// * `messenger` - The messenger owning the caches
/// * `thread_id` - The thread to fetch
/// * `sync` - Hydrate before returning
pub fn get_thread_detail(
    messenger: &Messenger,
    thread_id: i64,
    sync: bool,
) -> Result<Option<ThreadDetail>> {
    let conversation = match messenger.conversation_by_id(thread_id, sync)? {
        Some(c) => c.read().unwrap_or_else(|e| e.into_inner()).clone(),
        None => return Ok(None),
    };

    let mut messages: Vec<Message> = messenger
        .messages(thread_id, sync)?
        .iter()
        .map(|m| m.read().unwrap_or_else(|e| e.into_inner()).clone())
        .collect();
    messages.reverse();

    Ok(Some(ThreadDetail {
        conversation,
        messages,
    }))
}

fn to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
