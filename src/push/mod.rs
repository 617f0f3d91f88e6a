//! Push-transport plumbing for live change events.
//!
//! The engine consumes change events through bounded per-subscription
//! channels. [`PushTransport`] is the collaborator seam; [`EventHub`] is the
//! in-process implementation an embedding application feeds from its backend
//! SDK callback (and the one tests publish into directly).
//!
//! # Example
//!
//! ```ignore
//! let hub = EventHub::new();
//!
//! // One channel per topic, with a server-style row filter.
//! let handle = hub.subscribe(Topic::Comments, StreamFilter::for_post("p1"))?;
//!
//! hub.publish(Topic::Comments, &ChangeEvent::insert(json!({
//!     "id": "c1", "postId": "p1", "userId": "u2", "text": "nice",
//! })));
//!
//! let event = handle.try_recv()?;
//! ```

mod hub;
mod types;

pub use hub::EventHub;
pub use types::{PushTransport, StreamFilter, SubscriptionHandle, SubscriptionId, Topic};
