//! External collaborator seams: bulk queries and confirming mutations.
//!
//! The engine owns no wire format. Implementations adapt a concrete backend,
//! deliver rows in the shape documented on [`crate::types::Post`] (camelCase
//! columns, joined `user`, `postLikes`, `comments` count, timestamps in
//! microseconds since epoch), and map backend failures into
//! [`crate::error::FeedError::Fetch`] / [`crate::error::FeedError::Mutation`]
//! with a message suitable for display.

use crate::error::Result;
use crate::types::{
    CommentId, Like, NewComment, NewNotification, NewPost, PostId, UserId, UserRef,
};
use serde_json::Value;

/// Bulk-read collaborator.
pub trait QueryClient: Send + Sync {
    /// Newest-first page of post rows, optionally scoped to one author.
    fn fetch_page(&self, limit: usize, author: Option<&UserId>) -> Result<Vec<Value>>;

    /// One post row with joined author and the full nested comment
    /// collection (each comment with its own joined author), newest comment
    /// first.
    fn fetch_one(&self, id: &PostId) -> Result<Value>;

    /// Author profile lookup.
    fn fetch_author(&self, id: &UserId) -> Result<UserRef>;
}

/// Mutation collaborator. Every call is a confirming remote round trip;
/// a failure message doubles as the transient user-facing error.
pub trait MutationClient: Send + Sync {
    fn create_like(&self, like: &Like) -> Result<()>;

    fn delete_like(&self, post_id: &PostId, user_id: &UserId) -> Result<()>;

    /// Returns the canonical row (server-assigned id and timestamp).
    fn create_comment(&self, input: &NewComment) -> Result<Value>;

    fn delete_comment(&self, id: &CommentId) -> Result<()>;

    /// Returns the canonical row.
    fn create_post(&self, input: &NewPost, author: &UserId) -> Result<Value>;

    fn delete_post(&self, id: &PostId) -> Result<()>;

    /// Notification insert (e.g. a comment alert for the post owner).
    fn create_notification(&self, input: &NewNotification) -> Result<Value>;
}
