//! Notification payloads and the inbound message they react to

use serde::Serialize;

use crate::models::{MessageId, NewMessage};

/// Id of the one new-message notification; reposting replaces it
pub const NOTIFICATION_ID: i32 = 0;

/// Quick action offered on a single-message notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NotificationAction {
    MarkRead { thread_id: i64 },
    Reply { address: String },
}

/// What the new-message notification shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Notification {
    /// Exactly one unread message
    Single {
        thread_id: i64,
        message_id: MessageId,
        sender: String,
        address: String,
        snippet: String,
        date: i64,
        actions: Vec<NotificationAction>,
    },
    /// Several unread messages
    Aggregate {
        unread: usize,
        threads: usize,
        latest_date: i64,
    },
}

impl Notification {
    /// Headline text for the notification
    pub fn title(&self) -> String {
        match self {
            Self::Single { sender, .. } => sender.clone(),
            Self::Aggregate { unread, .. } => format!("{} new messages", unread),
        }
    }

    /// Body text for the notification
    pub fn text(&self) -> String {
        match self {
            Self::Single { snippet, .. } => snippet.clone(),
            Self::Aggregate { threads: 1, .. } => "in 1 conversation".to_string(),
            Self::Aggregate { threads, .. } => format!("in {} conversations", threads),
        }
    }
}

/// One decoded part of a received SMS broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduPart {
    pub originating_address: String,
    pub body: Option<String>,
    /// Service-center timestamp, epoch millis
    pub timestamp: i64,
}

/// Message carried by a received-SMS broadcast
///
/// Long messages arrive split over several parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundSms {
    pub address: String,
    pub body: Option<String>,
    pub timestamp: i64,
}

impl InboundSms {
    pub fn new(address: impl Into<String>, body: impl Into<String>, timestamp: i64) -> Self {
        Self {
            address: address.into(),
            body: Some(body.into()),
            timestamp,
        }
    }

    /// Join the parts of one broadcast
    ///
    /// Address and timestamp come from the first part. The body is `None`
    /// when no part carried text.
    pub fn from_parts(parts: &[PduPart]) -> Option<Self> {
        let first = parts.first()?;

        let texts: Vec<&str> = parts.iter().filter_map(|p| p.body.as_deref()).collect();
        let body = (!texts.is_empty()).then(|| texts.concat());

        Some(Self {
            address: first.originating_address.clone(),
            body,
            timestamp: first.timestamp,
        })
    }

    pub fn text(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Row to write when storing this message
    pub fn to_new_message(&self) -> NewMessage {
        NewMessage::inbound(
            self.address.clone(),
            self.body.clone().unwrap_or_default(),
            self.timestamp,
        )
    }
}
