//! # Feed Reconciliation Engine
//!
//! A client-side engine that presents one consistent, incrementally loaded
//! view of a social feed by merging three sources: paginated bulk reads,
//! pushed change events, and the user's own optimistic edits.
//!
//! ## Core Concepts
//!
//! - **Store**: Ordered, duplicate-free feed page; pagination only appends
//! - **Merger**: Routes INSERT/UPDATE/DELETE change events into the store
//! - **Mutations**: Optimistic local edits, confirmed or rolled back remotely
//! - **Threads**: Per-post comment views with echo suppression
//! - **Push**: Topic and filter scoped subscriptions over an event hub
//!
//! ## Example
//!
//! ```ignore
//! use tributary::{EngineConfig, FeedEngine, UserRef};
//!
//! let mut engine = FeedEngine::start(
//!     query,
//!     mutations,
//!     transport,
//!     UserRef::new("u1", "Ada"),
//!     EngineConfig::default(),
//! )?;
//!
//! // Drain queued change events, then render.
//! engine.pump();
//! let view = engine.snapshot();
//!
//! // Optimistic like; rolled back automatically if the backend rejects it.
//! engine.toggle_like(&view.posts[0].id)?;
//! ```

pub mod comments;
pub mod engine;
pub mod error;
pub mod events;
pub mod notify;
pub mod push;
pub mod remote;
pub mod store;
pub mod types;
pub mod validate;

// Re-exports
pub use comments::CommentThread;
pub use engine::{EngineConfig, FeedEngine, FeedSignal};
pub use error::{FeedError, Result};
pub use events::{ChangeEvent, EventKind};
pub use notify::{NotificationTracker, Toast, TOAST_TTL};
pub use push::{EventHub, PushTransport, StreamFilter, SubscriptionHandle, SubscriptionId, Topic};
pub use remote::{MutationClient, QueryClient};
pub use store::{apply_event, FeedStore, MergeOutcome};
pub use types::*;
pub use validate::{is_valid_comment, is_valid_notification, is_valid_post};
