//! Boundary to the platform's notification, wake-lock and toast services

use log::{debug, info, warn};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::Notification;

/// Posts and cancels notifications and refreshes the home-screen widget
pub trait Notifier: Send + Sync {
    fn cancel(&self, id: i32);
    fn show(&self, id: i32, notification: &Notification);
    fn update_widget(&self, unread: usize);
}

/// Keeps the device awake during background work
pub trait WakeLock: Send + Sync {
    fn acquire(&self, tag: &str);
    fn release(&self, tag: &str);
}

/// Short user-visible message, used to report failed actions
pub trait Toaster: Send + Sync {
    fn toast(&self, message: &str);
}

/// Holds a wake lock until dropped, so every exit path releases it
pub struct WakeGuard<'a> {
    lock: &'a dyn WakeLock,
    tag: &'static str,
}

impl<'a> WakeGuard<'a> {
    pub fn acquire(lock: &'a dyn WakeLock, tag: &'static str) -> Self {
        lock.acquire(tag);
        Self { lock, tag }
    }
}

impl Drop for WakeGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(self.tag);
    }
}

/// Notifier that writes to the log
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn cancel(&self, id: i32) {
        debug!("[NOTIFY] cancel {}", id);
    }

    fn show(&self, id: i32, notification: &Notification) {
        info!(
            "[NOTIFY] #{} {}: {}",
            id,
            notification.title(),
            notification.text()
        );
    }

    fn update_widget(&self, unread: usize) {
        info!("[NOTIFY] widget unread={}", unread);
    }
}

/// Wake lock for hosts without power management
pub struct NoopWakeLock;

impl WakeLock for NoopWakeLock {
    fn acquire(&self, _tag: &str) {}
    fn release(&self, _tag: &str) {}
}

/// Toaster that writes to the log
pub struct LogToaster;

impl Toaster for LogToaster {
    fn toast(&self, message: &str) {
        warn!("[TOAST] {}", message);
    }
}

/// A call made on a [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierCall {
    Cancel(i32),
    Show(i32, Notification),
    Widget(usize),
}

/// Notifier that remembers every call, for tests and dry runs
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<NotifierCall>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<NotifierCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Notifications shown, in order
    pub fn shown(&self) -> Vec<Notification> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                NotifierCall::Show(_, notification) => Some(notification),
                _ => None,
            })
            .collect()
    }

    /// Unread counts pushed to the widget, in order
    pub fn widget_updates(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                NotifierCall::Widget(unread) => Some(unread),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: NotifierCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

impl Notifier for RecordingNotifier {
    fn cancel(&self, id: i32) {
        self.record(NotifierCall::Cancel(id));
    }

    fn show(&self, id: i32, notification: &Notification) {
        self.record(NotifierCall::Show(id, notification.clone()));
    }

    fn update_widget(&self, unread: usize) {
        self.record(NotifierCall::Widget(unread));
    }
}

/// Wake lock that counts acquisitions and releases
#[derive(Default)]
pub struct CountingWakeLock {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl CountingWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn is_held(&self) -> bool {
        self.acquired() > self.released()
    }
}

impl WakeLock for CountingWakeLock {
    fn acquire(&self, _tag: &str) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self, _tag: &str) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Toaster that keeps every message
#[derive(Default)]
pub struct RecordingToaster {
    messages: Mutex<Vec<String>>,
}

impl RecordingToaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Toaster for RecordingToaster {
    fn toast(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }
}
