//! Ordered, deduplicated post state.

use std::collections::HashSet;
use tracing::debug;

use crate::types::{FeedViewState, Like, Post, PostId, PostPatch, UserId};

/// Owns the ordered post list plus the observational flags the renderer
/// watches (`is_loading`, `error`, `has_more`).
///
/// Exclusively owned by one engine instance, so operations take `&mut self`
/// and no locking is involved. Every operation preserves id uniqueness;
/// only `prepend` may alter the relative order of resident posts.
#[derive(Debug)]
pub struct FeedStore {
    /// Ordered posts, newest first.
    posts: Vec<Post>,
    /// Resident ids, for O(1) duplicate guards.
    ids: HashSet<PostId>,
    is_loading: bool,
    error: Option<String>,
    has_more: bool,
}

impl FeedStore {
    pub fn new() -> Self {
        Self {
            posts: Vec::new(),
            ids: HashSet::new(),
            is_loading: false,
            error: None,
            has_more: true,
        }
    }

    // --- Bulk Merge Operations ---

    /// Replace the whole view with a freshly fetched page (initial load or
    /// refresh). Arrival order is preserved; intra-batch duplicate ids keep
    /// the first occurrence. A page shorter than requested is the sole
    /// exhaustion signal (`has_more = false`). Clears any fetch error.
    pub fn replace(&mut self, records: Vec<Post>, requested_limit: usize) {
        let accepted = records.len();

        self.posts.clear();
        self.ids.clear();
        for mut post in records {
            if !self.ids.insert(post.id.clone()) {
                debug!(id = %post.id, "duplicate id in fetched page, keeping first");
                continue;
            }
            post.dedupe_likes();
            self.posts.push(post);
        }

        self.has_more = accepted >= requested_limit;
        self.error = None;
    }

    /// Merge a pagination fetch: append records not already resident, at
    /// the tail, in arrival order. Resident posts are never reordered,
    /// patched or dropped by this path, so a page-boundary fetch cannot
    /// clobber a recently pushed insert. Skipped duplicates still count
    /// toward the exhaustion signal (the server returned them).
    pub fn extend_page(&mut self, records: Vec<Post>, requested_limit: usize) {
        let fetched = records.len();

        for mut post in records {
            if !self.ids.insert(post.id.clone()) {
                continue;
            }
            post.dedupe_likes();
            self.posts.push(post);
        }

        self.has_more = fetched >= requested_limit;
        self.error = None;
    }

    // --- Event-Driven Operations ---

    /// Insert a newly observed post at the head. A duplicate id adopts the
    /// resident entry instead. Returns whether an insertion happened.
    pub fn prepend(&mut self, mut post: Post) -> bool {
        if !self.ids.insert(post.id.clone()) {
            debug!(id = %post.id, "prepend ignored, id already present");
            return false;
        }
        post.dedupe_likes();
        self.posts.insert(0, post);
        true
    }

    /// Shallow-merge a patch onto the post at `id`. No-op when absent: the
    /// update may have raced ahead of its insert or the initial fetch.
    pub fn patch(&mut self, id: &PostId, patch: &PostPatch) -> bool {
        match self.post_mut(id) {
            Some(post) => {
                patch.apply(post);
                true
            }
            None => false,
        }
    }

    /// Remove the post at `id` if present.
    pub fn remove(&mut self, id: &PostId) -> bool {
        if !self.ids.remove(id) {
            return false;
        }
        self.posts.retain(|post| &post.id != id);
        true
    }

    // --- Like Membership ---

    /// Add to one post's like set. Returns false if the post is absent or
    /// the user already liked it.
    pub fn add_like(&mut self, id: &PostId, like: Like) -> bool {
        match self.post_mut(id) {
            Some(post) => {
                if post.liked_by(&like.user_id) {
                    return false;
                }
                post.likes.push(like);
                true
            }
            None => false,
        }
    }

    /// Remove a user's like from one post's set. Returns false if the post
    /// is absent or the membership did not exist.
    pub fn remove_like(&mut self, id: &PostId, user_id: &UserId) -> bool {
        match self.post_mut(id) {
            Some(post) => {
                let before = post.likes.len();
                post.likes.retain(|like| &like.user_id != user_id);
                post.likes.len() < before
            }
            None => false,
        }
    }

    // --- Comment Count ---

    /// Overwrite one post's comment-count summary.
    pub fn set_comment_count(&mut self, id: &PostId, count: u64) -> bool {
        match self.post_mut(id) {
            Some(post) => {
                post.comment_count = count;
                true
            }
            None => false,
        }
    }

    /// Adjust one post's comment-count summary, saturating at zero.
    pub fn bump_comment_count(&mut self, id: &PostId, delta: i64) -> bool {
        match self.post_mut(id) {
            Some(post) => {
                post.comment_count = (post.comment_count as i64 + delta).max(0) as u64;
                true
            }
            None => false,
        }
    }

    // --- Observational State ---

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    /// Record a fetch failure. Resident posts are untouched: loaded state
    /// is never cleared by an error.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    // --- Accessors ---

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn get(&self, id: &PostId) -> Option<&Post> {
        self.posts.iter().find(|post| &post.id == id)
    }

    pub fn contains(&self, id: &PostId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Clone out the renderer-facing snapshot.
    pub fn snapshot(&self) -> FeedViewState {
        FeedViewState {
            posts: self.posts.clone(),
            is_loading: self.is_loading,
            error: self.error.clone(),
            has_more: self.has_more,
        }
    }

    fn post_mut(&mut self, id: &PostId) -> Option<&mut Post> {
        self.posts.iter_mut().find(|post| &post.id == id)
    }
}

impl Default for FeedStore {
    fn default() -> Self {
        Self::new()
    }
}
