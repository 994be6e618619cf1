//! Messenger facade owning the row source, caches and hydrator

use anyhow::Result;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{ConversationCache, MessageCache, Shared};
use crate::hydrate::{Hydrator, Observers};
use crate::models::{Conversation, ConversationRow, Message, MessageId, MessageRow};
use crate::settings::Settings;
use crate::source::{ContactLookup, RowSource};

/// Entry point for reading conversations and messages
///
/// Every entity handed out comes from one of the two caches, so callers
/// holding the same id share one instance. Entities are hydrated when first
/// cached and again whenever the row's date moves.
///
/// Synchronous hydration runs inside the cache's critical section, and so do
/// the listener callbacks it triggers. Listeners must not call back into the
/// messenger from the notifying thread.
pub struct Messenger {
    source: Arc<dyn RowSource>,
    contacts: Arc<dyn ContactLookup>,
    conversations: ConversationCache,
    messages: MessageCache,
    hydrator: Hydrator,
}

impl Messenger {
    pub fn new(
        source: Arc<dyn RowSource>,
        contacts: Arc<dyn ContactLookup>,
        settings: &Settings,
    ) -> Result<Self> {
        Self::with_observers(source, contacts, Observers::new(), settings)
    }

    /// Create a messenger whose hydration events go to `observers`
    pub fn with_observers(
        source: Arc<dyn RowSource>,
        contacts: Arc<dyn ContactLookup>,
        observers: Observers,
        settings: &Settings,
    ) -> Result<Self> {
        let hydrator = Hydrator::new(
            Arc::clone(&source),
            Arc::clone(&contacts),
            observers,
            settings.hydration_threads,
        )?;

        Ok(Self {
            source,
            contacts,
            conversations: ConversationCache::new("CONVERSATIONS", settings.cache_capacity),
            messages: MessageCache::new("MESSAGES", settings.cache_capacity),
            hydrator,
        })
    }

    pub fn source(&self) -> &Arc<dyn RowSource> {
        &self.source
    }

    pub fn contacts(&self) -> &Arc<dyn ContactLookup> {
        &self.contacts
    }

    pub fn observers(&self) -> &Observers {
        self.hydrator.observers()
    }

    pub fn conversation_cache(&self) -> &ConversationCache {
        &self.conversations
    }

    pub fn message_cache(&self) -> &MessageCache {
        &self.messages
    }

    /// Cached conversation for `row`
    pub fn conversation(&self, row: &ConversationRow, sync: bool) -> Shared<Conversation> {
        self.conversations.get(row, |entity| {
            self.hydrator.fill(entity, sync);
        })
    }

    /// Cached conversation for `thread_id`, queried from the row source
    pub fn conversation_by_id(
        &self,
        thread_id: i64,
        sync: bool,
    ) -> Result<Option<Shared<Conversation>>> {
        Ok(self
            .source
            .get_conversation(thread_id)?
            .map(|row| self.conversation(&row, sync)))
    }

    /// Cached message for `row`
    pub fn message(&self, row: &MessageRow, sync: bool) -> Shared<Message> {
        self.messages.get(row, |entity| {
            self.hydrator.fill(entity, sync);
        })
    }

    /// Cached message for `id`, queried from the row source
    pub fn message_by_id(&self, id: MessageId, sync: bool) -> Result<Option<Shared<Message>>> {
        Ok(self
            .source
            .get_message(id)?
            .map(|row| self.message(&row, sync)))
    }

    /// A page of conversations, newest first
    pub fn conversations(
        &self,
        limit: usize,
        offset: usize,
        sync: bool,
    ) -> Result<Vec<Shared<Conversation>>> {
        let rows = self.source.list_conversations(limit, offset)?;
        Ok(rows.iter().map(|row| self.conversation(row, sync)).collect())
    }

    /// Messages of a thread, newest first
    pub fn messages(&self, thread_id: i64, sync: bool) -> Result<Vec<Shared<Message>>> {
        let rows = self.source.list_messages(thread_id)?;
        Ok(rows.iter().map(|row| self.message(row, sync)).collect())
    }

    /// Drop every cached entity
    ///
    /// Entities already handed out stay valid but are no longer shared with
    /// later lookups.
    pub fn flush_caches(&self) {
        let conversations = self.conversations.len();
        let messages = self.messages.len();
        self.conversations.flush();
        self.messages.flush();
        info!(
            "Flushed caches ({} conversations, {} messages)",
            conversations, messages
        );
    }

    /// Wait for background hydration to finish
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.hydrator.wait_idle(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrate::{HydrationEvent, HydrationListener};
    use crate::models::{Contact, NewMessage};
    use crate::source::{InMemoryContacts, InMemoryRowSource};
    use std::sync::Mutex;

    struct Setup {
        messenger: Messenger,
        source: Arc<InMemoryRowSource>,
        events: Arc<Mutex<Vec<HydrationEvent>>>,
        _subscription: crate::hydrate::Subscription,
    }

    fn setup(capacity: usize) -> Setup {
        let source = Arc::new(InMemoryRowSource::new());
        source
            .insert_message(NewMessage::inbound("+15550100", "hi", 1_000))
            .unwrap();
        source
            .insert_message(NewMessage::outbound("+15550100", "hello", 2_000))
            .unwrap();
        source
            .insert_message(NewMessage::inbound("+15550199", "yo", 3_000))
            .unwrap();

        let contacts = Arc::new(InMemoryContacts::new());
        contacts.insert(Contact::named("+15550100", "Alice"));

        let settings = Settings {
            cache_capacity: capacity,
            ..Settings::default()
        };
        let messenger = Messenger::new(source.clone(), contacts, &settings).unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let listener: Arc<dyn HydrationListener> =
            Arc::new(move |event: HydrationEvent| sink.lock().unwrap().push(event));
        let subscription = messenger.observers().subscribe(listener);

        Setup {
            messenger,
            source,
            events,
            _subscription: subscription,
        }
    }

    #[test]
    fn test_conversation_hydrated_on_first_lookup() {
        let s = setup(50);
        let thread = s.source.thread_for_address("+15550100").unwrap();

        let conversation = s.messenger.conversation_by_id(thread, true).unwrap().unwrap();
        let conversation = conversation.read().unwrap();

        assert_eq!(conversation.message_count, 2);
        assert_eq!(conversation.display_name(), Some("Alice"));
        assert!(conversation.last_hydrated.is_some());
        assert_eq!(
            *s.events.lock().unwrap(),
            vec![HydrationEvent::Conversation(thread)]
        );
    }

    #[test]
    fn test_same_row_shares_instance_without_rehydrating() {
        let s = setup(50);
        let thread = s.source.thread_for_address("+15550100").unwrap();

        let first = s.messenger.conversation_by_id(thread, true).unwrap().unwrap();
        let second = s.messenger.conversation_by_id(thread, true).unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(s.events.lock().unwrap().len(), 1);
        assert_eq!(s.messenger.conversation_cache().stats().hits, 1);
    }

    #[test]
    fn test_new_message_rehydrates_in_place() {
        let s = setup(50);
        let thread = s.source.thread_for_address("+15550100").unwrap();
        let first = s.messenger.conversation_by_id(thread, true).unwrap().unwrap();

        s.source
            .insert_message(NewMessage::inbound("+15550100", "again", 4_000))
            .unwrap();
        let second = s.messenger.conversation_by_id(thread, true).unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let conversation = second.read().unwrap();
        assert_eq!(conversation.date, 4_000);
        assert_eq!(conversation.body.as_deref(), Some("again"));
        assert_eq!(conversation.message_count, 3);
        assert_eq!(s.events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_flush_forces_reconstruction() {
        let s = setup(50);
        let thread = s.source.thread_for_address("+15550100").unwrap();
        let first = s.messenger.conversation_by_id(thread, true).unwrap().unwrap();

        s.messenger.flush_caches();
        assert!(s.messenger.conversation_cache().is_empty());

        let second = s.messenger.conversation_by_id(thread, true).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(s.events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_conversation_list_respects_capacity() {
        let s = setup(1);
        let page = s.messenger.conversations(10, 0, true).unwrap();

        assert_eq!(page.len(), 2);
        assert_eq!(page[0].read().unwrap().date, 3_000);
        assert_eq!(s.messenger.conversation_cache().len(), 1);
        // the first lookup was evicted by the second
        let newest = page[0].read().unwrap().thread_id;
        let oldest = page[1].read().unwrap().thread_id;
        assert!(!s.messenger.conversation_cache().contains(&newest));
        assert!(s.messenger.conversation_cache().contains(&oldest));
    }

    #[test]
    fn test_messages_hydrated_in_background() {
        let s = setup(50);
        let thread = s.source.thread_for_address("+15550100").unwrap();

        let messages = s.messenger.messages(thread, false).unwrap();
        assert!(s.messenger.wait_idle(Duration::from_secs(5)));

        assert_eq!(messages.len(), 2);
        for message in &messages {
            let message = message.read().unwrap();
            assert_eq!(message.display_name(), "Alice");
        }
        assert_eq!(s.events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_ids() {
        let s = setup(50);
        assert!(s.messenger.conversation_by_id(999, true).unwrap().is_none());
        assert!(
            s.messenger
                .message_by_id(MessageId::mms(999), true)
                .unwrap()
                .is_none()
        );
    }
}
