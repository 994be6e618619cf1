//! Inbound-message notification reconciliation
//!
//! The broadcast announcing a new message can arrive before the row is
//! visible to queries. The [`Reconciler`] polls the row source with a
//! bounded retry policy until the newest unread message matches what the
//! broadcast carried, then posts a single de-duplicated notification.

mod notification;
mod platform;
mod reconciler;
mod sleeper;

pub use notification::{InboundSms, NOTIFICATION_ID, Notification, NotificationAction, PduPart};
pub use platform::{
    CountingWakeLock, LogNotifier, LogToaster, NoopWakeLock, Notifier, NotifierCall,
    RecordingNotifier, RecordingToaster, Toaster, WakeGuard, WakeLock,
};
pub use reconciler::{ReconcileOutcome, Reconciler, RetryPolicy, UnreadSnapshot};
pub use sleeper::{InstantSleeper, Sleeper, ThreadSleeper};
