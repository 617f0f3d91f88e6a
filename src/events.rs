//! Change events delivered by the push transport.
//!
//! Payloads stay raw (`serde_json::Value`) until they pass the shape gates
//! in [`crate::validate`]; typed decoding happens only after validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind tag on a change event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Insert,
    Update,
    Delete,
    /// Any kind string this engine does not model. Dropped by the merger.
    #[serde(other)]
    Unknown,
}

/// A single change pushed by the transport.
///
/// `new` carries the full or partial record for INSERT/UPDATE; `old` carries
/// the record or an id-bearing reference for DELETE/UPDATE. Either side may
/// be an empty object on the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "eventType")]
    pub kind: EventKind,

    #[serde(default)]
    pub new: Option<Value>,

    #[serde(default)]
    pub old: Option<Value>,
}

impl ChangeEvent {
    pub fn insert(new: Value) -> Self {
        Self {
            kind: EventKind::Insert,
            new: Some(new),
            old: None,
        }
    }

    pub fn update(new: Value) -> Self {
        Self {
            kind: EventKind::Update,
            new: Some(new),
            old: None,
        }
    }

    pub fn delete(old: Value) -> Self {
        Self {
            kind: EventKind::Delete,
            new: None,
            old: Some(old),
        }
    }

    /// Look up a non-null field on `new`, falling back to `old`.
    ///
    /// Used for routing (`postId`, `receiverId`): DELETE events only carry
    /// the field on `old`, INSERT/UPDATE on `new`.
    pub fn field(&self, name: &str) -> Option<&Value> {
        fn pick<'a>(record: Option<&'a Value>, name: &str) -> Option<&'a Value> {
            record.and_then(|r| r.get(name)).filter(|v| !v.is_null())
        }
        pick(self.new.as_ref(), name).or_else(|| pick(self.old.as_ref(), name))
    }
}
