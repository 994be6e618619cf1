//! Raw rows as returned by a row source
//!
//! Rows are the uncached shape of the telephony tables. The cache turns
//! them into [`Conversation`](super::Conversation) and
//! [`Message`](super::Message) entities.

use serde::{Deserialize, Serialize};

use super::{MessageId, MessageKind, ReadStatus};

/// One row of the conversations table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRow {
    pub thread_id: i64,
    /// Epoch millis of the most recent message
    pub date: i64,
    /// Snippet of the most recent message
    pub body: Option<String>,
    pub read: ReadStatus,
    /// Number of messages, -1 when the source does not report it
    pub message_count: i64,
    /// Recipient the thread is addressed to
    pub recipient_id: i64,
}

/// Multimedia part attached to an MMS row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MmsPart {
    /// Text part, if the MMS carried one
    pub text: Option<String>,
    /// Location of the first image part
    pub picture: Option<String>,
    /// Location to open the full MMS content
    pub content_uri: Option<String>,
}

/// One row of the sms or mms table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    /// Row id within its own table (sms and mms ids overlap)
    pub id: i64,
    pub thread_id: i64,
    pub date: i64,
    pub address: String,
    /// Text body; always `None` for MMS rows
    pub body: Option<String>,
    pub kind: MessageKind,
    pub read: ReadStatus,
    pub subject: Option<String>,
    /// Present only for MMS rows
    pub mms: Option<MmsPart>,
}

impl MessageRow {
    /// MMS rows have no body column and carry their content in parts
    pub fn is_mms(&self) -> bool {
        self.body.is_none() && self.mms.is_some()
    }

    /// Cache id for this row, negated for MMS so both tables share one id space
    pub fn message_id(&self) -> MessageId {
        if self.is_mms() {
            MessageId::mms(self.id)
        } else {
            MessageId::sms(self.id)
        }
    }

    /// Text content of the row, whichever table it came from
    pub fn text(&self) -> Option<&str> {
        self.body
            .as_deref()
            .or_else(|| self.mms.as_ref().and_then(|p| p.text.as_deref()))
    }
}

/// A message to insert into the row source
///
/// When `mms` is set the message is stored as an MMS and `body` is ignored;
/// the text travels in the part instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub address: String,
    pub body: String,
    pub kind: MessageKind,
    pub date: i64,
    pub read: ReadStatus,
    pub mms: Option<MmsPart>,
}

impl NewMessage {
    /// An unread message received from `address`
    pub fn inbound(address: impl Into<String>, body: impl Into<String>, date: i64) -> Self {
        Self {
            address: address.into(),
            body: body.into(),
            kind: MessageKind::Inbox,
            date,
            read: ReadStatus::Unread,
            mms: None,
        }
    }

    /// A message sent to `address`
    pub fn outbound(address: impl Into<String>, body: impl Into<String>, date: i64) -> Self {
        Self {
            address: address.into(),
            body: body.into(),
            kind: MessageKind::Sent,
            date,
            read: ReadStatus::Read,
            mms: None,
        }
    }

    /// Store this message as an MMS carrying `part`
    pub fn with_mms(mut self, part: MmsPart) -> Self {
        self.mms = Some(part);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(body: Option<&str>, mms: Option<MmsPart>) -> MessageRow {
        MessageRow {
            id: 7,
            thread_id: 1,
            date: 1_000,
            address: "+15550100".to_string(),
            body: body.map(str::to_string),
            kind: MessageKind::Inbox,
            read: ReadStatus::Unread,
            subject: None,
            mms,
        }
    }

    #[test]
    fn test_sms_row_keeps_positive_id() {
        let sms = row(Some("hi"), None);
        assert!(!sms.is_mms());
        assert_eq!(sms.message_id(), MessageId::sms(7));
        assert_eq!(sms.text(), Some("hi"));
    }

    #[test]
    fn test_mms_row_negates_id() {
        let part = MmsPart {
            text: Some("photo caption".to_string()),
            picture: Some("content://mms/part/3".to_string()),
            content_uri: None,
        };
        let mms = row(None, Some(part));
        assert!(mms.is_mms());
        assert_eq!(mms.message_id().raw(), -7);
        assert_eq!(mms.text(), Some("photo caption"));
    }
}
