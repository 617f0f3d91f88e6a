//! Error types for the feed engine.

use crate::types::PostId;
use thiserror::Error;

/// Main error type for engine operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Mutation failed: {0}")]
    Mutation(String),

    #[error("Subscription failed: {0}")]
    Subscription(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Post not found: {0}")]
    PostNotFound(PostId),

    #[error("Engine is closed")]
    Closed,
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Deserialization(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, FeedError>;
