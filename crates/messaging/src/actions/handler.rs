//! Action handler for message operations
//!
//! Coordinates between the row source, the caches and the notification.

use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;

use crate::messenger::Messenger;
use crate::models::{MessageId, NewMessage};
use crate::notify::{InboundSms, ReconcileOutcome, Reconciler, Toaster};
use crate::source::ALL_THREADS;

/// Why an action failed
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Handler for user actions like mark-read, delete and send
///
/// Actions are performed in three steps:
/// 1. Apply the change to the row source
/// 2. Flush cached entities the change made stale
/// 3. Rebuild the new-message notification when unread state moved
///
/// Failures are logged, shown to the user through the toaster and returned.
/// Nothing is retried.
pub struct ActionHandler {
    messenger: Arc<Messenger>,
    reconciler: Arc<Reconciler>,
    toaster: Arc<dyn Toaster>,
}

impl ActionHandler {
    /// Create a new action handler
    pub fn new(
        messenger: Arc<Messenger>,
        reconciler: Arc<Reconciler>,
        toaster: Arc<dyn Toaster>,
    ) -> Self {
        Self {
            messenger,
            reconciler,
            toaster,
        }
    }

    /// Mark every message in a thread read
    ///
    /// Returns the number of messages that changed.
    pub fn mark_read(&self, thread_id: i64) -> Result<usize, ActionError> {
        let result = valid_thread(thread_id).and_then(|()| {
            info!("Marking thread {} read", thread_id);
            Ok(self.messenger.source().mark_read(thread_id)?)
        });
        let changed = self.report("mark read", result)?;
        self.after_unread_change();
        Ok(changed)
    }

    /// Mark every message in every thread read
    pub fn mark_all_read(&self) -> Result<usize, ActionError> {
        info!("Marking all threads read");
        let result = self
            .messenger
            .source()
            .mark_read(ALL_THREADS)
            .map_err(ActionError::from);
        let changed = self.report("mark all read", result)?;
        info!("Marked {} messages read", changed);
        self.after_unread_change();
        Ok(changed)
    }

    /// Delete a thread and its messages
    pub fn delete_thread(&self, thread_id: i64) -> Result<usize, ActionError> {
        let result = valid_thread(thread_id).and_then(|()| {
            info!("Deleting thread {}", thread_id);
            Ok(self.messenger.source().delete_thread(thread_id)?)
        });
        let removed = self.report("delete thread", result)?;
        info!("Deleted thread {} ({} messages)", thread_id, removed);
        self.after_unread_change();
        Ok(removed)
    }

    /// Delete every thread
    pub fn delete_all(&self) -> Result<usize, ActionError> {
        info!("Deleting all threads");
        let result = self
            .messenger
            .source()
            .delete_all()
            .map_err(ActionError::from);
        let removed = self.report("delete all", result)?;
        info!("Deleted {} messages", removed);
        self.after_unread_change();
        Ok(removed)
    }

    /// Delete one message
    ///
    /// Returns whether the message existed.
    pub fn delete_message(&self, id: MessageId) -> Result<bool, ActionError> {
        let result = if id.raw() == 0 {
            Err(ActionError::InvalidArgument(format!("message id {}", id)))
        } else {
            info!("Deleting message {}", id);
            self.messenger
                .source()
                .delete_message(id)
                .map_err(ActionError::from)
        };
        let existed = self.report("delete message", result)?;
        self.after_unread_change();
        Ok(existed)
    }

    /// Store an outgoing message to `address`
    pub fn send(&self, address: &str, body: &str) -> Result<MessageId, ActionError> {
        let address = address.trim();
        let result = if address.is_empty() {
            Err(ActionError::InvalidArgument("empty address".to_string()))
        } else if body.trim().is_empty() {
            Err(ActionError::InvalidArgument("empty message".to_string()))
        } else {
            let message = NewMessage::outbound(address, body, Utc::now().timestamp_millis());
            self.messenger
                .source()
                .insert_message(message)
                .map_err(ActionError::from)
        };
        let id = self.report("send", result)?;
        info!("Sent {} to {}", id, address);
        Ok(id)
    }

    /// Store a received message and reconcile the notification against it
    pub fn receive(&self, inbound: &InboundSms) -> Result<ReconcileOutcome, ActionError> {
        let result = if inbound.address.trim().is_empty() {
            Err(ActionError::InvalidArgument("empty address".to_string()))
        } else {
            self.messenger
                .source()
                .insert_message(inbound.to_new_message())
                .map_err(ActionError::from)
        };
        let id = self.report("receive", result)?;
        info!("Received {} from {}", id, inbound.address);
        Ok(self.reconciler.on_message_received(Some(inbound)))
    }

    /// Log and surface a failed action
    fn report<T>(&self, action: &str, result: Result<T, ActionError>) -> Result<T, ActionError> {
        if let Err(e) = &result {
            warn!("Failed to {}: {}", action, e);
            self.toaster.toast(&format!("Could not {}: {}", action, e));
        }
        result
    }

    fn after_unread_change(&self) {
        self.messenger.flush_caches();
        if let Err(e) = self.reconciler.refresh() {
            warn!("Failed to refresh notification: {:#}", e);
        }
    }
}

fn valid_thread(thread_id: i64) -> Result<(), ActionError> {
    if thread_id > 0 {
        Ok(())
    } else {
        Err(ActionError::InvalidArgument(format!(
            "thread id {}",
            thread_id
        )))
    }
}
