//! Applies push change events to the feed store.

use serde_json::Value;
use tracing::debug;

use crate::events::{ChangeEvent, EventKind};
use crate::types::{Post, PostId, PostPatch};
use crate::validate;

use super::feed::FeedStore;

/// What applying one event did to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new post entered at the head.
    Inserted(PostId),
    /// A resident post was patched.
    Updated(PostId),
    /// A resident post was removed.
    Removed(PostId),
    /// The event was dropped or was a no-op: malformed payload, duplicate
    /// insert, orphan update/delete, or unknown kind. Never an error;
    /// push-stream noise must not interrupt the session.
    Ignored,
}

/// Apply one event. Events are applied strictly in arrival order by the
/// caller; this function never reorders or buffers. Re-applying the same
/// event is idempotent: duplicate INSERTs hit the id guard, UPDATE and
/// DELETE are naturally idempotent.
pub fn apply_event(store: &mut FeedStore, event: &ChangeEvent) -> MergeOutcome {
    match event.kind {
        EventKind::Insert => apply_insert(store, event),
        EventKind::Update => apply_update(store, event),
        EventKind::Delete => apply_delete(store, event),
        EventKind::Unknown => {
            debug!("unknown event kind, dropped");
            MergeOutcome::Ignored
        }
    }
}

fn apply_insert(store: &mut FeedStore, event: &ChangeEvent) -> MergeOutcome {
    let record = match valid_new(event) {
        Some(record) => record,
        None => return MergeOutcome::Ignored,
    };

    let post = match Post::from_record(record) {
        Ok(post) => post,
        Err(e) => {
            debug!(error = %e, "insert record failed to decode, dropped");
            return MergeOutcome::Ignored;
        }
    };

    let id = post.id.clone();
    if store.prepend(post) {
        MergeOutcome::Inserted(id)
    } else {
        MergeOutcome::Ignored
    }
}

fn apply_update(store: &mut FeedStore, event: &ChangeEvent) -> MergeOutcome {
    let record = match valid_new(event) {
        Some(record) => record,
        None => return MergeOutcome::Ignored,
    };

    let id = match record.get("id").and_then(PostId::from_value) {
        Some(id) => id,
        None => {
            debug!("update record has a non-scalar id, dropped");
            return MergeOutcome::Ignored;
        }
    };

    let patch = match PostPatch::from_record(record) {
        Ok(patch) => patch,
        Err(e) => {
            debug!(error = %e, "update record failed to decode, dropped");
            return MergeOutcome::Ignored;
        }
    };

    if store.patch(&id, &patch) {
        MergeOutcome::Updated(id)
    } else {
        debug!(id = %id, "update for absent id, no-op");
        MergeOutcome::Ignored
    }
}

fn apply_delete(store: &mut FeedStore, event: &ChangeEvent) -> MergeOutcome {
    // Only old.id identifies the target; a missing or malformed old is
    // dropped rather than guessed at.
    let id = match event
        .old
        .as_ref()
        .and_then(|old| old.get("id"))
        .and_then(PostId::from_value)
    {
        Some(id) => id,
        None => {
            debug!("delete event without usable old.id, dropped");
            return MergeOutcome::Ignored;
        }
    };

    if store.remove(&id) {
        MergeOutcome::Removed(id)
    } else {
        debug!(id = %id, "delete for absent id, no-op");
        MergeOutcome::Ignored
    }
}

fn valid_new(event: &ChangeEvent) -> Option<&Value> {
    let record = event.new.as_ref()?;
    if validate::is_valid_post(record) {
        Some(record)
    } else {
        debug!(kind = ?event.kind, "event record failed validation, dropped");
        None
    }
}
