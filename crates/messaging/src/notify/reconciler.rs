//! Bounded-retry reconciliation of inbound broadcasts against unread rows

use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{
    InboundSms, NOTIFICATION_ID, NoopWakeLock, Notification, NotificationAction, Notifier,
    Sleeper, ThreadSleeper, WakeGuard, WakeLock,
};
use crate::models::MessageRow;
use crate::source::{ContactLookup, RowSource};

const WAKE_TAG: &str = "messaging:reconcile";

/// Delays and attempt budget for one reconciliation episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before the first query, giving the store time to commit
    pub initial_delay: Duration,
    /// Wait between queries that did not yet see the new message
    pub retry_delay: Duration,
    /// Retries after the first query before giving up
    pub max_retries: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            retry_delay: Duration::from_millis(500),
            max_retries: 15,
        }
    }
}

impl RetryPolicy {
    /// Longest time an episode can spend waiting, saturating on overflow
    pub fn worst_case(&self) -> Duration {
        let retries = u32::try_from(self.max_retries).unwrap_or(u32::MAX);
        self.initial_delay
            .saturating_add(self.retry_delay.saturating_mul(retries))
    }
}

/// Unread received messages at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnreadSnapshot {
    pub sms: Vec<MessageRow>,
    pub mms: Vec<MessageRow>,
}

impl UnreadSnapshot {
    pub fn unread_count(&self) -> usize {
        self.sms.len() + self.mms.len()
    }

    /// Number of distinct threads with unread messages
    pub fn thread_count(&self) -> usize {
        self.rows()
            .map(|r| r.thread_id)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Newest unread message across both tables
    pub fn newest(&self) -> Option<&MessageRow> {
        self.rows()
            .max_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)))
    }

    /// Whether this snapshot already reflects a message with `expected` text
    ///
    /// Unknown text always matches; otherwise the newest unread message must
    /// carry the same text.
    pub fn matches(&self, expected: Option<&str>) -> bool {
        let Some(expected) = expected else {
            return true;
        };
        self.newest()
            .and_then(MessageRow::text)
            .is_some_and(|text| text.trim() == expected.trim())
    }

    fn rows(&self) -> impl Iterator<Item = &MessageRow> {
        self.sms.iter().chain(self.mms.iter())
    }
}

/// Result of one reconciliation episode
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// Queries repeated after the first one
    pub retries: usize,
    /// Whether the final snapshot matched the inbound message
    pub matched: bool,
    /// Whether waiting was cut short
    pub cancelled: bool,
    /// Unread count the notification was based on
    pub unread: usize,
    /// Notification posted, if any
    pub shown: Option<Notification>,
}

/// Turns inbound-message broadcasts into a single up-to-date notification
pub struct Reconciler {
    source: Arc<dyn RowSource>,
    contacts: Arc<dyn ContactLookup>,
    notifier: Arc<dyn Notifier>,
    wake_lock: Arc<dyn WakeLock>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    enabled: bool,
    current: Mutex<Option<Notification>>,
}

impl Reconciler {
    /// Create a reconciler with real delays, no wake lock and notifications on
    pub fn new(
        source: Arc<dyn RowSource>,
        contacts: Arc<dyn ContactLookup>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            source,
            contacts,
            notifier,
            wake_lock: Arc::new(NoopWakeLock),
            sleeper: Arc::new(ThreadSleeper::new()),
            policy: RetryPolicy::default(),
            enabled: true,
            current: Mutex::new(None),
        }
    }

    pub fn with_wake_lock(mut self, wake_lock: Arc<dyn WakeLock>) -> Self {
        self.wake_lock = wake_lock;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether notifications are posted; the widget is updated either way
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Notification currently posted, if any
    pub fn current(&self) -> Option<Notification> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Handle a new-message broadcast
    ///
    /// Waits for the row source to show `inbound` as the newest unread
    /// message, retrying up to the policy's budget, then notifies from the
    /// latest snapshot whether or not it matched. The wake lock is held for
    /// the whole episode.
    pub fn on_message_received(&self, inbound: Option<&InboundSms>) -> ReconcileOutcome {
        let _wake = WakeGuard::acquire(&*self.wake_lock, WAKE_TAG);
        let expected = inbound.and_then(InboundSms::text);
        debug!(
            "[NOTIFY] reconciling, waiting at most {:?}",
            self.policy.worst_case()
        );

        let mut cancelled = !self.sleeper.sleep(self.policy.initial_delay);
        let mut retries = 0;
        let mut latest: Option<UnreadSnapshot> = None;

        let matched = loop {
            match self.snapshot() {
                Ok(snapshot) => {
                    let matched = snapshot.matches(expected);
                    latest = Some(snapshot);
                    if matched {
                        break true;
                    }
                }
                Err(e) => warn!("[NOTIFY] unread query failed: {:#}", e),
            }

            if cancelled || retries >= self.policy.max_retries {
                break false;
            }

            retries += 1;
            debug!(
                "[NOTIFY] newest unread does not match yet, retry {}/{}",
                retries, self.policy.max_retries
            );
            if !self.sleeper.sleep(self.policy.retry_delay) {
                cancelled = true;
            }
        };

        if !matched {
            info!(
                "[NOTIFY] giving up after {} retries, notifying from available data",
                retries
            );
        }

        let Some(snapshot) = latest else {
            warn!("[NOTIFY] no unread snapshot available, leaving notification as is");
            return ReconcileOutcome {
                retries,
                matched,
                cancelled,
                unread: 0,
                shown: self.current(),
            };
        };

        let shown = self.notify(&snapshot);
        ReconcileOutcome {
            retries,
            matched,
            cancelled,
            unread: snapshot.unread_count(),
            shown,
        }
    }

    /// Rebuild the notification from current unread state without waiting
    ///
    /// Used after read-state changes made by the user.
    pub fn refresh(&self) -> anyhow::Result<ReconcileOutcome> {
        let snapshot = self.snapshot()?;
        let shown = self.notify(&snapshot);
        Ok(ReconcileOutcome {
            retries: 0,
            matched: true,
            cancelled: false,
            unread: snapshot.unread_count(),
            shown,
        })
    }

    /// Query unread SMS and MMS rows
    pub fn snapshot(&self) -> anyhow::Result<UnreadSnapshot> {
        Ok(UnreadSnapshot {
            sms: self.source.list_unread_sms()?,
            mms: self.source.list_unread_mms()?,
        })
    }

    fn notify(&self, snapshot: &UnreadSnapshot) -> Option<Notification> {
        self.notifier.cancel(NOTIFICATION_ID);

        let unread = snapshot.unread_count();
        let notification = match unread {
            0 => None,
            1 => snapshot.newest().map(|row| self.single(row)),
            _ => Some(Notification::Aggregate {
                unread,
                threads: snapshot.thread_count(),
                latest_date: snapshot.newest().map(|r| r.date).unwrap_or_default(),
            }),
        };

        let shown = match (&notification, self.enabled) {
            (Some(notification), true) => {
                self.notifier.show(NOTIFICATION_ID, notification);
                Some(notification.clone())
            }
            _ => None,
        };

        self.notifier.update_widget(unread);
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = shown.clone();
        shown
    }

    fn single(&self, row: &MessageRow) -> Notification {
        let sender = match self.contacts.lookup(&row.address) {
            Ok(Some(contact)) => contact.display_name().to_string(),
            Ok(None) => row.address.clone(),
            Err(e) => {
                warn!("[NOTIFY] contact lookup for {} failed: {}", row.address, e);
                row.address.clone()
            }
        };

        let snippet = row
            .text()
            .or(row.subject.as_deref())
            .unwrap_or_default()
            .to_string();

        Notification::Single {
            thread_id: row.thread_id,
            message_id: row.message_id(),
            sender,
            address: row.address.clone(),
            snippet,
            date: row.date,
            actions: vec![
                NotificationAction::MarkRead {
                    thread_id: row.thread_id,
                },
                NotificationAction::Reply {
                    address: row.address.clone(),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contact, ConversationRow, MessageId, MmsPart, NewMessage};
    use crate::notify::{CountingWakeLock, InstantSleeper, NotifierCall, RecordingNotifier};
    use crate::source::{InMemoryContacts, InMemoryRowSource};
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Row source that hides its newest message until the unread queries
    /// have run `visible_after` times
    struct LaggingSource {
        inner: InMemoryRowSource,
        hidden: Option<MessageId>,
        visible_after: usize,
        queries: AtomicUsize,
    }

    impl LaggingSource {
        fn new(inner: InMemoryRowSource, hidden: Option<MessageId>, visible_after: usize) -> Self {
            Self {
                inner,
                hidden,
                visible_after,
                queries: AtomicUsize::new(0),
            }
        }

        fn hide(&self, rows: Vec<MessageRow>, count: usize) -> Vec<MessageRow> {
            if count >= self.visible_after {
                return rows;
            }
            rows.into_iter()
                .filter(|r| Some(r.message_id()) != self.hidden)
                .collect()
        }
    }

    impl RowSource for LaggingSource {
        fn get_conversation(&self, thread_id: i64) -> Result<Option<ConversationRow>> {
            self.inner.get_conversation(thread_id)
        }
        fn list_conversations(&self, limit: usize, offset: usize) -> Result<Vec<ConversationRow>> {
            self.inner.list_conversations(limit, offset)
        }
        fn get_message(&self, id: MessageId) -> Result<Option<MessageRow>> {
            self.inner.get_message(id)
        }
        fn list_messages(&self, thread_id: i64) -> Result<Vec<MessageRow>> {
            self.inner.list_messages(thread_id)
        }
        fn list_unread_sms(&self) -> Result<Vec<MessageRow>> {
            let count = self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.hide(self.inner.list_unread_sms()?, count))
        }
        fn list_unread_mms(&self) -> Result<Vec<MessageRow>> {
            self.inner.list_unread_mms()
        }
        fn count_messages(&self, thread_id: i64) -> Result<usize> {
            self.inner.count_messages(thread_id)
        }
        fn last_body(&self, thread_id: i64) -> Result<Option<String>> {
            self.inner.last_body(thread_id)
        }
        fn recipient_address(&self, recipient_id: i64) -> Result<Option<String>> {
            self.inner.recipient_address(recipient_id)
        }
        fn insert_message(&self, message: NewMessage) -> Result<MessageId> {
            self.inner.insert_message(message)
        }
        fn mark_read(&self, thread_id: i64) -> Result<usize> {
            self.inner.mark_read(thread_id)
        }
        fn delete_thread(&self, thread_id: i64) -> Result<usize> {
            self.inner.delete_thread(thread_id)
        }
        fn delete_all(&self) -> Result<usize> {
            self.inner.delete_all()
        }
        fn delete_message(&self, id: MessageId) -> Result<bool> {
            self.inner.delete_message(id)
        }
    }

    struct Harness {
        reconciler: Reconciler,
        notifier: Arc<RecordingNotifier>,
        sleeper: Arc<InstantSleeper>,
        wake_lock: Arc<CountingWakeLock>,
    }

    fn harness(source: Arc<dyn RowSource>, sleeper: InstantSleeper) -> Harness {
        let contacts = Arc::new(InMemoryContacts::new());
        contacts.insert(Contact::named("+15550100", "Alice"));

        let notifier = Arc::new(RecordingNotifier::new());
        let sleeper = Arc::new(sleeper);
        let wake_lock = Arc::new(CountingWakeLock::new());

        let reconciler = Reconciler::new(source, contacts, notifier.clone())
            .with_sleeper(sleeper.clone())
            .with_wake_lock(wake_lock.clone());

        Harness {
            reconciler,
            notifier,
            sleeper,
            wake_lock,
        }
    }

    fn source_with(messages: &[(&str, &str, i64)]) -> InMemoryRowSource {
        let source = InMemoryRowSource::new();
        for (address, body, date) in messages {
            source
                .insert_message(NewMessage::inbound(*address, *body, *date))
                .unwrap();
        }
        source
    }

    #[test]
    fn test_match_on_first_query_sleeps_once() {
        let source = Arc::new(source_with(&[("+15550100", "see you at 6", 1_000)]));
        let h = harness(source, InstantSleeper::new());

        let inbound = InboundSms::new("+15550100", "see you at 6", 1_000);
        let outcome = h.reconciler.on_message_received(Some(&inbound));

        assert!(outcome.matched);
        assert_eq!(outcome.retries, 0);
        assert_eq!(h.sleeper.requests(), vec![Duration::from_millis(500)]);

        match outcome.shown {
            Some(Notification::Single {
                sender,
                snippet,
                actions,
                ..
            }) => {
                assert_eq!(sender, "Alice");
                assert_eq!(snippet, "see you at 6");
                assert_eq!(actions.len(), 2);
            }
            other => panic!("expected single notification, got {:?}", other),
        }
        assert!(!h.wake_lock.is_held());
    }

    #[test]
    fn test_never_matching_body_retries_fifteen_times() {
        let source = Arc::new(source_with(&[("+15550100", "older text", 1_000)]));
        let h = harness(source, InstantSleeper::new());

        let inbound = InboundSms::new("+15550100", "not committed", 2_000);
        let outcome = h.reconciler.on_message_received(Some(&inbound));

        assert!(!outcome.matched);
        assert_eq!(outcome.retries, 15);
        // initial delay plus one delay per retry
        assert_eq!(h.sleeper.count(), 16);
        assert_eq!(h.sleeper.total(), Duration::from_millis(8_000));

        // best effort: the one visible unread message is still notified
        assert_eq!(outcome.unread, 1);
        assert!(matches!(outcome.shown, Some(Notification::Single { .. })));
        assert_eq!(h.wake_lock.acquired(), 1);
        assert_eq!(h.wake_lock.released(), 1);
    }

    #[test]
    fn test_row_becomes_visible_after_lag() {
        let inner = source_with(&[("+15550199", "earlier", 1_000)]);
        let hidden = inner
            .insert_message(NewMessage::inbound("+15550100", "just arrived", 2_000))
            .unwrap();
        let source = Arc::new(LaggingSource::new(inner, Some(hidden), 3));
        let h = harness(source, InstantSleeper::new());

        let inbound = InboundSms::new("+15550100", "just arrived", 2_000);
        let outcome = h.reconciler.on_message_received(Some(&inbound));

        assert!(outcome.matched);
        assert_eq!(outcome.retries, 3);
        assert_eq!(h.sleeper.count(), 4);
        assert_eq!(outcome.unread, 2);
        assert_eq!(
            outcome.shown,
            Some(Notification::Aggregate {
                unread: 2,
                threads: 2,
                latest_date: 2_000,
            })
        );
    }

    #[test]
    fn test_unknown_text_matches_immediately() {
        let source = Arc::new(source_with(&[("+15550100", "anything", 1)]));
        let h = harness(source, InstantSleeper::new());

        let outcome = h.reconciler.on_message_received(None);
        assert!(outcome.matched);
        assert_eq!(h.sleeper.count(), 1);
    }

    #[test]
    fn test_no_unread_clears_notification() {
        let source = Arc::new(InMemoryRowSource::new());
        let h = harness(source, InstantSleeper::new());

        let outcome = h.reconciler.on_message_received(None);

        assert_eq!(outcome.unread, 0);
        assert!(outcome.shown.is_none());
        assert!(h.reconciler.current().is_none());
        assert_eq!(
            h.notifier.calls(),
            vec![
                NotifierCall::Cancel(NOTIFICATION_ID),
                NotifierCall::Widget(0)
            ]
        );
    }

    #[test]
    fn test_disabled_notifications_still_update_widget() {
        let source = Arc::new(source_with(&[("+15550100", "hi", 1)]));
        let mut h = harness(source, InstantSleeper::new());
        h.reconciler = h.reconciler.with_notifications(false);

        let outcome = h.reconciler.on_message_received(None);

        assert_eq!(outcome.unread, 1);
        assert!(outcome.shown.is_none());
        assert!(h.notifier.shown().is_empty());
        assert_eq!(h.notifier.widget_updates(), vec![1]);
    }

    #[test]
    fn test_repost_cancels_previous() {
        let source = Arc::new(source_with(&[("+15550100", "one", 1)]));
        let h = harness(source.clone(), InstantSleeper::new());
        h.reconciler.on_message_received(None);

        source
            .insert_message(NewMessage::inbound("+15550100", "two", 2))
            .unwrap();
        let inbound = InboundSms::new("+15550100", "two", 2);
        let outcome = h.reconciler.on_message_received(Some(&inbound));

        let cancels = h
            .notifier
            .calls()
            .into_iter()
            .filter(|c| matches!(c, NotifierCall::Cancel(_)))
            .count();
        assert_eq!(cancels, 2);
        assert_eq!(h.notifier.shown().len(), 2);
        assert_eq!(
            outcome.shown,
            Some(Notification::Aggregate {
                unread: 2,
                threads: 1,
                latest_date: 2,
            })
        );
    }

    #[test]
    fn test_cancelled_wait_notifies_early() {
        let source = Arc::new(source_with(&[("+15550100", "old", 1)]));
        let h = harness(source, InstantSleeper::cancelling_after(2));

        let inbound = InboundSms::new("+15550100", "never", 2);
        let outcome = h.reconciler.on_message_received(Some(&inbound));

        assert!(outcome.cancelled);
        assert!(!outcome.matched);
        assert_eq!(outcome.retries, 2);
        assert_eq!(h.sleeper.count(), 3);
        assert!(outcome.shown.is_some());
        assert!(!h.wake_lock.is_held());
    }

    #[test]
    fn test_mms_counts_toward_unread() {
        let source = source_with(&[("+15550100", "text", 1)]);
        source
            .insert_message(NewMessage::inbound("+15550100", "", 2).with_mms(MmsPart {
                text: Some("photo".to_string()),
                ..Default::default()
            }))
            .unwrap();
        let h = harness(Arc::new(source), InstantSleeper::new());

        let snapshot = h.reconciler.snapshot().unwrap();
        assert_eq!(snapshot.unread_count(), 2);
        assert!(snapshot.newest().unwrap().is_mms());
        assert!(snapshot.matches(Some("photo")));
        assert!(!snapshot.matches(Some("text")));
    }

    #[test]
    fn test_refresh_after_mark_read() {
        let source = Arc::new(source_with(&[("+15550100", "hi", 1)]));
        let h = harness(source.clone(), InstantSleeper::new());
        h.reconciler.on_message_received(None);
        assert!(h.reconciler.current().is_some());

        source.mark_read(crate::source::ALL_THREADS).unwrap();
        let outcome = h.reconciler.refresh().unwrap();

        assert_eq!(outcome.unread, 0);
        assert!(h.reconciler.current().is_none());
        // refresh never waits
        assert_eq!(h.sleeper.count(), 1);
    }

    #[test]
    fn test_worst_case_duration() {
        assert_eq!(RetryPolicy::default().worst_case(), Duration::from_millis(8_000));
    }

    #[test]
    fn test_worst_case_saturates_for_huge_budgets() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(500),
            retry_delay: Duration::MAX,
            max_retries: usize::MAX,
        };
        assert_eq!(policy.worst_case(), Duration::MAX);
    }

    #[test]
    fn test_snapshot_thread_count() {
        let row = |id: i64, thread_id: i64| MessageRow {
            id,
            thread_id,
            date: id,
            address: String::new(),
            body: Some(String::new()),
            kind: crate::models::MessageKind::Inbox,
            read: crate::models::ReadStatus::Unread,
            subject: None,
            mms: None,
        };
        let snapshot = UnreadSnapshot {
            sms: vec![row(3, 1), row(2, 1), row(1, 2)],
            mms: vec![],
        };
        assert_eq!(snapshot.thread_count(), 2);
        assert_eq!(snapshot.newest().unwrap().id, 3);
    }
}
