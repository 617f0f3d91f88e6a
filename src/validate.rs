//! Shape validation for raw inbound records.
//!
//! Bulk-read rows and push-event rows share one shape contract, but the push
//! transport carries no schema guarantee. Every record passes these gates
//! before any typed decode or store mutation. Rejection is silent here;
//! callers log and drop.

use serde_json::{Map, Value};

/// A post record is accepted only if it is a structured object, carries a
/// non-null id, its `user` field (when present) is an object, and its
/// `comments` field (when present) is a sequence, not a scalar.
pub fn is_valid_post(record: &Value) -> bool {
    let obj = match record.as_object() {
        Some(obj) => obj,
        None => return false,
    };

    has_identity(obj)
        && optional_object(obj.get("user"))
        && optional_sequence(obj.get("comments"))
}

/// A comment record is accepted only if it is a structured object with a
/// non-null id and an object `user` field when present.
pub fn is_valid_comment(record: &Value) -> bool {
    let obj = match record.as_object() {
        Some(obj) => obj,
        None => return false,
    };

    has_identity(obj) && optional_object(obj.get("user"))
}

/// A notification record is accepted only if it is a structured object with
/// a non-null id.
pub fn is_valid_notification(record: &Value) -> bool {
    match record.as_object() {
        Some(obj) => has_identity(obj),
        None => false,
    }
}

fn has_identity(obj: &Map<String, Value>) -> bool {
    match obj.get("id") {
        Some(id) => !id.is_null(),
        None => false,
    }
}

/// Absent and null are fine; a present value must be an object.
fn optional_object(field: Option<&Value>) -> bool {
    match field {
        Some(value) => value.is_null() || value.is_object(),
        None => true,
    }
}

/// Absent and null are fine; a present value must be an array.
fn optional_sequence(field: Option<&Value>) -> bool {
    match field {
        Some(value) => value.is_null() || value.is_array(),
        None => true,
    }
}
