//! Subscription types for the push transport.

use crate::events::{ChangeEvent, EventKind};
use crate::types::{PostId, UserId};
use serde::{Deserialize, Serialize};

/// Event streams a subscriber can attach to. One topic per backend table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Posts,
    Comments,
    Notifications,
}

/// Declarative per-event predicate, applied by the transport before
/// delivery. Mirrors a server-side row filter (`postId=eq.X`,
/// `receiverId=eq.X`).
#[derive(Clone, Debug, Default)]
pub struct StreamFilter {
    /// Restrict to these kinds (None = all kinds).
    pub kinds: Option<Vec<EventKind>>,

    /// Restrict to events whose row `postId` equals this id.
    pub post_id: Option<PostId>,

    /// Restrict to events whose row `receiverId` equals this id.
    pub receiver_id: Option<UserId>,
}

impl StreamFilter {
    /// Match every event on the topic.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match events for one post's rows.
    pub fn for_post(post_id: impl Into<PostId>) -> Self {
        Self {
            post_id: Some(post_id.into()),
            ..Default::default()
        }
    }

    /// Match events addressed to one receiving user.
    pub fn for_receiver(receiver_id: impl Into<UserId>) -> Self {
        Self {
            receiver_id: Some(receiver_id.into()),
            ..Default::default()
        }
    }

    /// Restrict to the given kinds.
    pub fn with_kinds(mut self, kinds: Vec<EventKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Whether an event passes this filter.
    ///
    /// Row fields are read from `new` with fallback to `old`, so DELETE
    /// events (which only carry `old`) still route correctly.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }

        if let Some(ref post_id) = self.post_id {
            match event.field("postId").and_then(PostId::from_value) {
                Some(ref id) if id == post_id => {}
                _ => return false,
            }
        }

        if let Some(ref receiver_id) = self.receiver_id {
            match event.field("receiverId").and_then(UserId::from_value) {
                Some(ref id) if id == receiver_id => {}
                _ => return false,
            }
        }

        true
    }
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to one open push channel.
///
/// Owned by the engine instance that opened it; must be released exactly
/// once on teardown so the remote subscription is not leaked.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<ChangeEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<ChangeEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<ChangeEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<ChangeEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Push-transport collaborator: delivers change events for a topic through
/// bounded per-subscription channels.
pub trait PushTransport: Send + Sync {
    /// Open a channel for events on `topic` that pass `filter`.
    fn subscribe(&self, topic: Topic, filter: StreamFilter)
        -> crate::error::Result<SubscriptionHandle>;

    /// Release a subscription. Safe to call with an already-released id.
    fn release(&self, id: SubscriptionId);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_filter_matches_everything() {
        let filter = StreamFilter::all();
        assert!(filter.matches(&ChangeEvent::insert(json!({"id": 1}))));
        assert!(filter.matches(&ChangeEvent::delete(json!({"id": 1}))));
    }

    #[test]
    fn test_kind_filter() {
        let filter = StreamFilter::all().with_kinds(vec![EventKind::Insert]);
        assert!(filter.matches(&ChangeEvent::insert(json!({"id": 1}))));
        assert!(!filter.matches(&ChangeEvent::delete(json!({"id": 1}))));
    }

    #[test]
    fn test_post_filter_routes_deletes_via_old() {
        let filter = StreamFilter::for_post("p1");

        let insert = ChangeEvent::insert(json!({"id": "c1", "postId": "p1"}));
        assert!(filter.matches(&insert));

        let delete = ChangeEvent::delete(json!({"id": "c1", "postId": "p1"}));
        assert!(filter.matches(&delete));

        let other = ChangeEvent::insert(json!({"id": "c2", "postId": "p2"}));
        assert!(!filter.matches(&other));

        let missing = ChangeEvent::insert(json!({"id": "c3"}));
        assert!(!filter.matches(&missing));
    }

    #[test]
    fn test_receiver_filter_matches_numeric_ids() {
        let filter = StreamFilter::for_receiver("7");
        let event = ChangeEvent::insert(json!({"id": 1, "receiverId": 7}));
        assert!(filter.matches(&event));

        let other = ChangeEvent::insert(json!({"id": 2, "receiverId": 8}));
        assert!(!filter.matches(&other));
    }
}
