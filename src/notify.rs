//! Transient UI signals: the realtime toast and the unread badge.
//!
//! Both signals derive from event streams but live outside the feed store,
//! each with its own lifetime. No timers are spawned: toast expiry is a
//! deadline checked against an instant the owner passes in, so teardown has
//! nothing asynchronous to cancel and tests control the clock.

use std::time::{Duration, Instant};
use tracing::debug;

use crate::events::{ChangeEvent, EventKind};
use crate::validate;

/// How long a toast stays up unless superseded first.
pub const TOAST_TTL: Duration = Duration::from_millis(3000);

/// A transient banner describing the latest feed change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toast {
    pub kind: EventKind,
    pub message: &'static str,
    /// When this toast stops showing.
    pub deadline: Instant,
}

/// Fixed message per feed-affecting event kind.
fn message_for(kind: EventKind) -> Option<&'static str> {
    match kind {
        EventKind::Insert => Some("New post added!"),
        EventKind::Update => Some("Post updated"),
        EventKind::Delete => Some("Post removed"),
        EventKind::Unknown => None,
    }
}

/// Tracks the toast and the unread badge.
#[derive(Debug, Default)]
pub struct NotificationTracker {
    toast: Option<Toast>,
    unread: bool,
}

impl NotificationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Toast ---

    /// Show the fixed message for a feed-affecting event kind, superseding
    /// any current toast. Unknown kinds show nothing.
    pub fn flash(&mut self, kind: EventKind, now: Instant) {
        if let Some(message) = message_for(kind) {
            self.toast = Some(Toast {
                kind,
                message,
                deadline: now + TOAST_TTL,
            });
        }
    }

    /// The toast visible at `now`, if its window has not elapsed.
    pub fn toast(&self, now: Instant) -> Option<&Toast> {
        self.toast.as_ref().filter(|toast| now < toast.deadline)
    }

    /// Drop an elapsed toast. The owner calls this on every pump with its
    /// current instant.
    pub fn tick(&mut self, now: Instant) {
        if let Some(toast) = &self.toast {
            if now >= toast.deadline {
                self.toast = None;
            }
        }
    }

    /// Cancel any pending toast without waiting out the window (teardown).
    pub fn clear_toast(&mut self) {
        self.toast = None;
    }

    // --- Unread Badge ---

    /// Observe one event from the notification stream. Only an INSERT
    /// carrying a well-formed record flips the badge.
    pub fn observe(&mut self, event: &ChangeEvent) {
        if event.kind != EventKind::Insert {
            return;
        }
        match event.new.as_ref() {
            Some(record) if validate::is_valid_notification(record) => {
                self.unread = true;
            }
            _ => debug!("notification event without a valid record, ignored"),
        }
    }

    pub fn has_unread(&self) -> bool {
        self.unread
    }

    /// Explicit user action: the notifications view was opened.
    pub fn mark_seen(&mut self) {
        self.unread = false;
    }
}
