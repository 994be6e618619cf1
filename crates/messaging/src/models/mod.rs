//! Domain models for conversations and messages

mod contact;
mod conversation;
mod message;
mod row;

pub use contact::Contact;
pub use conversation::{Conversation, UNKNOWN_COUNT};
pub use message::{Message, MessageId, MessageKind, ReadStatus};
pub use row::{ConversationRow, MessageRow, MmsPart, NewMessage};
