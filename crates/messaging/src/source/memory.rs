//! In-memory row source
//!
//! Used for tests and for embedding the messenger without a database.

use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ALL_THREADS, RowSource};
use crate::models::{
    ConversationRow, MessageId, MessageKind, MessageRow, NewMessage, ReadStatus, UNKNOWN_COUNT,
};

#[derive(Default)]
struct Tables {
    /// recipient id -> address
    recipients: HashMap<i64, String>,
    /// thread id -> recipient id
    threads: BTreeMap<i64, i64>,
    sms: BTreeMap<i64, MessageRow>,
    mms: BTreeMap<i64, MessageRow>,
    last_recipient_id: i64,
    last_thread_id: i64,
    last_sms_id: i64,
    last_mms_id: i64,
}

impl Tables {
    fn all_rows(&self) -> impl Iterator<Item = &MessageRow> {
        self.sms.values().chain(self.mms.values())
    }

    fn thread_rows(&self, thread_id: i64) -> Vec<MessageRow> {
        let mut rows: Vec<MessageRow> = self
            .all_rows()
            .filter(|r| r.thread_id == thread_id)
            .cloned()
            .collect();
        sort_newest_first(&mut rows);
        rows
    }

    fn conversation_row(&self, thread_id: i64) -> Option<ConversationRow> {
        let recipient_id = *self.threads.get(&thread_id)?;
        let rows = self.thread_rows(thread_id);
        let newest = rows.first()?;

        let has_unread = rows
            .iter()
            .any(|r| r.kind == MessageKind::Inbox && r.read.is_unread());

        Some(ConversationRow {
            thread_id,
            date: newest.date,
            body: newest.text().map(str::to_string),
            read: if has_unread {
                ReadStatus::Unread
            } else {
                ReadStatus::Read
            },
            // The list projection does not carry a count; hydration fills it in
            message_count: UNKNOWN_COUNT,
            recipient_id,
        })
    }

    fn recipient_for(&mut self, address: &str) -> i64 {
        if let Some((&id, _)) = self.recipients.iter().find(|(_, a)| a.as_str() == address) {
            return id;
        }
        self.last_recipient_id += 1;
        self.recipients
            .insert(self.last_recipient_id, address.to_string());
        self.last_recipient_id
    }

    fn thread_for(&mut self, recipient_id: i64) -> i64 {
        if let Some((&id, _)) = self.threads.iter().find(|(_, r)| **r == recipient_id) {
            return id;
        }
        self.last_thread_id += 1;
        self.threads.insert(self.last_thread_id, recipient_id);
        self.last_thread_id
    }

    /// Drop a thread once its last message is gone
    fn prune_thread(&mut self, thread_id: i64) {
        if !self.all_rows().any(|r| r.thread_id == thread_id) {
            self.threads.remove(&thread_id);
        }
    }
}

fn sort_newest_first(rows: &mut [MessageRow]) {
    rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
}

fn unread_inbox(rows: &BTreeMap<i64, MessageRow>) -> Vec<MessageRow> {
    let mut unread: Vec<MessageRow> = rows
        .values()
        .filter(|r| r.kind == MessageKind::Inbox && r.read.is_unread())
        .cloned()
        .collect();
    sort_newest_first(&mut unread);
    unread
}

/// In-memory implementation of RowSource
///
/// All tables live behind one RwLock so every query sees a consistent
/// snapshot.
#[derive(Default)]
pub struct InMemoryRowSource {
    tables: RwLock<Tables>,
}

impl InMemoryRowSource {
    /// Create a new empty source
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Thread id for an address, if a thread exists
    pub fn thread_for_address(&self, address: &str) -> Option<i64> {
        let tables = self.read();
        let (&recipient_id, _) = tables
            .recipients
            .iter()
            .find(|(_, a)| a.as_str() == address)?;
        tables
            .threads
            .iter()
            .find(|(_, r)| **r == recipient_id)
            .map(|(&id, _)| id)
    }

    /// Count threads that still have messages
    pub fn count_threads(&self) -> usize {
        self.read().threads.len()
    }
}

impl RowSource for InMemoryRowSource {
    fn get_conversation(&self, thread_id: i64) -> Result<Option<ConversationRow>> {
        Ok(self.read().conversation_row(thread_id))
    }

    fn list_conversations(&self, limit: usize, offset: usize) -> Result<Vec<ConversationRow>> {
        let tables = self.read();
        let mut rows: Vec<ConversationRow> = tables
            .threads
            .keys()
            .filter_map(|&id| tables.conversation_row(id))
            .collect();

        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.thread_id.cmp(&a.thread_id)));

        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    fn get_message(&self, id: MessageId) -> Result<Option<MessageRow>> {
        let tables = self.read();
        let table = if id.is_mms() { &tables.mms } else { &tables.sms };
        Ok(table.get(&id.row_id()).cloned())
    }

    fn list_messages(&self, thread_id: i64) -> Result<Vec<MessageRow>> {
        Ok(self.read().thread_rows(thread_id))
    }

    fn list_unread_sms(&self) -> Result<Vec<MessageRow>> {
        Ok(unread_inbox(&self.read().sms))
    }

    fn list_unread_mms(&self) -> Result<Vec<MessageRow>> {
        Ok(unread_inbox(&self.read().mms))
    }

    fn count_messages(&self, thread_id: i64) -> Result<usize> {
        Ok(self
            .read()
            .all_rows()
            .filter(|r| r.thread_id == thread_id)
            .count())
    }

    fn last_body(&self, thread_id: i64) -> Result<Option<String>> {
        Ok(self
            .read()
            .thread_rows(thread_id)
            .into_iter()
            .find_map(|r| r.text().map(str::to_string)))
    }

    fn recipient_address(&self, recipient_id: i64) -> Result<Option<String>> {
        Ok(self.read().recipients.get(&recipient_id).cloned())
    }

    fn insert_message(&self, message: NewMessage) -> Result<MessageId> {
        let mut tables = self.write();
        let recipient_id = tables.recipient_for(&message.address);
        let thread_id = tables.thread_for(recipient_id);

        let is_mms = message.mms.is_some();
        let id = if is_mms {
            tables.last_mms_id += 1;
            tables.last_mms_id
        } else {
            tables.last_sms_id += 1;
            tables.last_sms_id
        };

        let row = MessageRow {
            id,
            thread_id,
            date: message.date,
            address: message.address,
            body: if is_mms { None } else { Some(message.body) },
            kind: message.kind,
            read: message.read,
            subject: None,
            mms: message.mms,
        };

        if is_mms {
            tables.mms.insert(id, row);
            Ok(MessageId::mms(id))
        } else {
            tables.sms.insert(id, row);
            Ok(MessageId::sms(id))
        }
    }

    fn mark_read(&self, thread_id: i64) -> Result<usize> {
        let mut tables = self.write();
        let Tables { sms, mms, .. } = &mut *tables;

        let mut changed = 0;
        for row in sms.values_mut().chain(mms.values_mut()) {
            if (thread_id == ALL_THREADS || row.thread_id == thread_id) && row.read.is_unread() {
                row.read = ReadStatus::Read;
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn delete_thread(&self, thread_id: i64) -> Result<usize> {
        let mut tables = self.write();
        let before = tables.sms.len() + tables.mms.len();
        tables.sms.retain(|_, r| r.thread_id != thread_id);
        tables.mms.retain(|_, r| r.thread_id != thread_id);
        tables.threads.remove(&thread_id);
        Ok(before - (tables.sms.len() + tables.mms.len()))
    }

    fn delete_all(&self) -> Result<usize> {
        let mut tables = self.write();
        let removed = tables.sms.len() + tables.mms.len();
        tables.sms.clear();
        tables.mms.clear();
        tables.threads.clear();
        Ok(removed)
    }

    fn delete_message(&self, id: MessageId) -> Result<bool> {
        let mut tables = self.write();
        let removed = if id.is_mms() {
            tables.mms.remove(&id.row_id())
        } else {
            tables.sms.remove(&id.row_id())
        };

        match removed {
            Some(row) => {
                tables.prune_thread(row.thread_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MmsPart;

    fn seeded() -> InMemoryRowSource {
        let source = InMemoryRowSource::new();
        source
            .insert_message(NewMessage::inbound("+15550100", "first", 1_000))
            .unwrap();
        source
            .insert_message(NewMessage::outbound("+15550100", "reply", 2_000))
            .unwrap();
        source
            .insert_message(NewMessage::inbound("+15550199", "other", 3_000))
            .unwrap();
        source
    }

    #[test]
    fn test_threads_group_by_address() {
        let source = seeded();
        assert_eq!(source.count_threads(), 2);

        let thread = source.thread_for_address("+15550100").unwrap();
        assert_eq!(source.count_messages(thread).unwrap(), 2);
        assert_eq!(source.last_body(thread).unwrap().as_deref(), Some("reply"));
    }

    #[test]
    fn test_list_conversations_newest_first() {
        let source = seeded();
        let rows = source.list_conversations(10, 0).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, 3_000);
        assert_eq!(rows[1].date, 2_000);
        assert_eq!(rows[0].message_count, UNKNOWN_COUNT);

        let page = source.list_conversations(1, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].date, 2_000);
    }

    #[test]
    fn test_conversation_read_state() {
        let source = seeded();
        let thread = source.thread_for_address("+15550100").unwrap();

        let row = source.get_conversation(thread).unwrap().unwrap();
        assert!(row.read.is_unread());

        assert_eq!(source.mark_read(thread).unwrap(), 1);
        let row = source.get_conversation(thread).unwrap().unwrap();
        assert!(!row.read.is_unread());
    }

    #[test]
    fn test_unread_queries() {
        let source = seeded();
        source
            .insert_message(
                NewMessage::inbound("+15550100", "", 4_000).with_mms(MmsPart {
                    text: Some("look".to_string()),
                    ..Default::default()
                }),
            )
            .unwrap();

        let sms = source.list_unread_sms().unwrap();
        assert_eq!(sms.len(), 2);
        assert_eq!(sms[0].body.as_deref(), Some("other"));

        let mms = source.list_unread_mms().unwrap();
        assert_eq!(mms.len(), 1);
        assert!(mms[0].is_mms());
        assert_eq!(mms[0].text(), Some("look"));

        assert_eq!(source.mark_read(ALL_THREADS).unwrap(), 3);
        assert!(source.list_unread_sms().unwrap().is_empty());
        assert!(source.list_unread_mms().unwrap().is_empty());
    }

    #[test]
    fn test_sms_and_mms_ids_are_disjoint() {
        let source = InMemoryRowSource::new();
        let sms = source
            .insert_message(NewMessage::inbound("+15550100", "text", 1))
            .unwrap();
        let mms = source
            .insert_message(NewMessage::inbound("+15550100", "", 2).with_mms(MmsPart::default()))
            .unwrap();

        assert_eq!(sms.row_id(), mms.row_id());
        assert_ne!(sms, mms);
        assert!(source.get_message(sms).unwrap().unwrap().body.is_some());
        assert!(source.get_message(mms).unwrap().unwrap().is_mms());
    }

    #[test]
    fn test_delete_message_prunes_empty_thread() {
        let source = InMemoryRowSource::new();
        let id = source
            .insert_message(NewMessage::inbound("+15550100", "only", 1))
            .unwrap();
        let thread = source.thread_for_address("+15550100").unwrap();

        assert!(source.delete_message(id).unwrap());
        assert!(!source.delete_message(id).unwrap());
        assert!(source.get_conversation(thread).unwrap().is_none());
        assert_eq!(source.count_threads(), 0);
    }

    #[test]
    fn test_delete_thread_and_all() {
        let source = seeded();
        let thread = source.thread_for_address("+15550100").unwrap();

        assert_eq!(source.delete_thread(thread).unwrap(), 2);
        assert_eq!(source.count_threads(), 1);

        assert_eq!(source.delete_all().unwrap(), 1);
        assert!(source.list_conversations(10, 0).unwrap().is_empty());
    }
}
