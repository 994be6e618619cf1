//! Message model representing a single SMS or MMS

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Contact, MessageRow};

/// Cache key for a message
///
/// SMS ids are stored as-is; MMS ids are negated so that both tables can
/// share one cache without collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl MessageId {
    pub fn sms(id: i64) -> Self {
        Self(id)
    }

    pub fn mms(id: i64) -> Self {
        Self(-id.abs())
    }

    pub fn raw(&self) -> i64 {
        self.0
    }

    pub fn is_mms(&self) -> bool {
        self.0 < 0
    }

    /// Row id within the owning table
    pub fn row_id(&self) -> i64 {
        self.0.abs()
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_mms() {
            write!(f, "mms:{}", self.row_id())
        } else {
            write!(f, "sms:{}", self.0)
        }
    }
}

/// Read flag as stored by the telephony provider (0 = unread, 1 = read)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadStatus {
    #[default]
    Unread,
    Read,
}

impl ReadStatus {
    pub fn from_flag(flag: i64) -> Self {
        if flag == 0 { Self::Unread } else { Self::Read }
    }

    pub fn as_flag(&self) -> i64 {
        match self {
            Self::Unread => 0,
            Self::Read => 1,
        }
    }

    pub fn is_unread(&self) -> bool {
        matches!(self, Self::Unread)
    }
}

/// Message box, using the provider's numeric values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Inbox,
    Sent,
    Draft,
    Outbox,
    Failed,
    Queued,
    Other(i64),
}

impl MessageKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Inbox,
            2 => Self::Sent,
            3 => Self::Draft,
            4 => Self::Outbox,
            5 => Self::Failed,
            6 => Self::Queued,
            other => Self::Other(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::Inbox => 1,
            Self::Sent => 2,
            Self::Draft => 3,
            Self::Outbox => 4,
            Self::Failed => 5,
            Self::Queued => 6,
            Self::Other(code) => *code,
        }
    }

    /// Whether the message was written by the local user
    pub fn is_outgoing(&self) -> bool {
        matches!(self, Self::Sent | Self::Outbox | Self::Failed | Self::Queued)
    }
}

/// A single SMS or MMS within a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: i64,
    /// Epoch millis
    pub date: i64,
    pub address: String,
    pub body: Option<String>,
    pub kind: MessageKind,
    pub read: ReadStatus,
    pub subject: Option<String>,
    /// First image part of an MMS
    pub picture: Option<String>,
    /// Location to open the full MMS
    pub content_uri: Option<String>,
    /// Sender/recipient contact, filled in by hydration
    pub contact: Option<Contact>,
    /// When hydration last completed
    pub last_hydrated: Option<DateTime<Utc>>,
}

impl Message {
    /// Build a message from a freshly queried row
    pub fn from_row(row: &MessageRow) -> Self {
        let mut message = Self {
            id: row.message_id(),
            thread_id: row.thread_id,
            date: row.date,
            address: row.address.clone(),
            body: None,
            kind: row.kind,
            read: row.read,
            subject: None,
            picture: None,
            content_uri: None,
            contact: None,
            last_hydrated: None,
        };
        message.apply_row(row);
        message
    }

    /// Copy the mutable columns of `row` into this message
    ///
    /// The contact is dropped when the address changed so that hydration
    /// resolves it again.
    pub fn apply_row(&mut self, row: &MessageRow) {
        if self.address != row.address {
            self.contact = None;
            self.address = row.address.clone();
        }
        self.thread_id = row.thread_id;
        self.date = row.date;
        self.body = row.text().map(str::to_string);
        self.kind = row.kind;
        self.read = row.read;
        self.subject = row.subject.clone();
        self.picture = row.mms.as_ref().and_then(|p| p.picture.clone());
        self.content_uri = row.mms.as_ref().and_then(|p| p.content_uri.clone());
    }

    pub fn is_mms(&self) -> bool {
        self.id.is_mms()
    }

    /// Name to show for the other party of this message
    pub fn display_name(&self) -> &str {
        self.contact
            .as_ref()
            .map(Contact::display_name)
            .unwrap_or(&self.address)
    }
}
