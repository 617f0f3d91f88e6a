//! Feed state: the post store and the change-event merger that feeds it.

mod feed;
mod merger;

pub use feed::FeedStore;
pub use merger::{apply_event, MergeOutcome};
