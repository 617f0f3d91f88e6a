//! Single-post comment threads.
//!
//! A [`CommentThread`] mirrors one post's detail view: the post header,
//! its comment list and a dedicated change-event subscription scoped to
//! that post. Comments the viewing user submits are not inserted locally;
//! the push INSERT echo is the single insertion path, with a seen-id set
//! guarding against duplicates either way.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{FeedError, Result};
use crate::events::{ChangeEvent, EventKind};
use crate::push::{PushTransport, StreamFilter, SubscriptionHandle, Topic};
use crate::remote::{MutationClient, QueryClient};
use crate::types::{
    Comment, CommentId, CommentPatch, NewComment, NewNotification, Post, PostId, UserRef,
};
use crate::validate;

/// One post's live detail view.
pub struct CommentThread {
    post_id: PostId,
    /// Loaded post header; `None` until the detail fetch lands, or after
    /// the post is deleted.
    post: Option<Post>,
    /// Newest first.
    comments: Vec<Comment>,
    /// Ids ever resident. Deleted ids stay in here so a late INSERT echo
    /// cannot resurrect a removed comment.
    seen: HashSet<CommentId>,
    query: Arc<dyn QueryClient>,
    mutations: Arc<dyn MutationClient>,
    transport: Arc<dyn PushTransport>,
    sub: Option<SubscriptionHandle>,
    user: UserRef,
    alive: bool,
    loading: bool,
    error: Option<String>,
}

impl CommentThread {
    /// Subscribe to the post's comment stream and load the detail row.
    ///
    /// Like the feed engine, a failed load still returns a running
    /// thread with the error surfaced; `refresh` can recover.
    pub fn start(
        query: Arc<dyn QueryClient>,
        mutations: Arc<dyn MutationClient>,
        transport: Arc<dyn PushTransport>,
        user: UserRef,
        post_id: PostId,
    ) -> Result<Self> {
        let sub = transport.subscribe(
            Topic::Comments,
            StreamFilter::for_post(post_id.clone()).with_kinds(vec![
                EventKind::Insert,
                EventKind::Update,
                EventKind::Delete,
            ]),
        )?;

        let mut thread = Self {
            post_id,
            post: None,
            comments: Vec::new(),
            seen: HashSet::new(),
            query,
            mutations,
            transport,
            sub: Some(sub),
            user,
            alive: true,
            loading: false,
            error: None,
        };

        info!(post = %thread.post_id, "comment thread started");
        let _ = thread.refresh();
        Ok(thread)
    }

    // --- Detail Fetching ---

    /// Re-fetch the post detail row and replace the thread state.
    pub fn refresh(&mut self) -> Result<()> {
        self.ensure_alive()?;
        self.loading = true;

        let result = self.query.fetch_one(&self.post_id);
        if !self.alive {
            return Err(FeedError::Closed);
        }
        self.loading = false;

        match result {
            Ok(record) => self.adopt_detail(&record),
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn adopt_detail(&mut self, record: &Value) -> Result<()> {
        if !validate::is_valid_post(record) {
            let e = FeedError::Deserialization("post detail row is malformed".to_string());
            self.error = Some(e.to_string());
            return Err(e);
        }
        let post = Post::from_record(record)?;

        // Detail rows carry the full comment rows under "comments", not
        // just the count summary. Malformed entries are dropped.
        let comments: Vec<Comment> = record
            .get("comments")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter(|row| validate::is_valid_comment(row))
                    .filter_map(|row| match Comment::from_record(row) {
                        Ok(comment) => Some(comment),
                        Err(e) => {
                            debug!(error = %e, "comment row failed to decode");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        self.seen = comments.iter().map(|c| c.id.clone()).collect();
        self.comments = comments;
        self.post = Some(post);
        self.error = None;
        Ok(())
    }

    // --- Event Pump ---

    /// Drain queued comment events in arrival order. Returns the number
    /// that changed the thread.
    pub fn pump(&mut self) -> usize {
        if !self.alive {
            return 0;
        }
        let mut applied = 0;

        if let Some(sub) = self.sub.take() {
            while let Ok(event) = sub.try_recv() {
                if self.apply_comment_event(&event) {
                    applied += 1;
                }
            }
            self.sub = Some(sub);
        }
        applied
    }

    fn apply_comment_event(&mut self, event: &ChangeEvent) -> bool {
        match event.kind {
            EventKind::Insert => self.apply_insert(event),
            EventKind::Update => self.apply_update(event),
            EventKind::Delete => self.apply_delete(event),
            EventKind::Unknown => {
                debug!("ignoring comment event of unknown kind");
                false
            }
        }
    }

    fn apply_insert(&mut self, event: &ChangeEvent) -> bool {
        let row = match event.new.as_ref().filter(|row| validate::is_valid_comment(row)) {
            Some(row) => row,
            None => {
                debug!("dropping invalid comment INSERT");
                return false;
            }
        };
        let mut comment = match Comment::from_record(row) {
            Ok(comment) => comment,
            Err(e) => {
                debug!(error = %e, "comment INSERT failed to decode");
                return false;
            }
        };

        if self.seen.contains(&comment.id) {
            debug!(id = %comment.id, "suppressing duplicate comment");
            return false;
        }

        // Pushed rows are bare. Resolve the author, short-circuiting for
        // the viewing user's own echo; a failed lookup keeps the
        // placeholder rather than dropping the comment.
        if comment.author.is_placeholder() {
            if let Some(author_id) = comment.author_id.clone() {
                if author_id == self.user.id {
                    comment.author = self.user.clone();
                } else {
                    match self.query.fetch_author(&author_id) {
                        Ok(author) => comment.author = author,
                        Err(e) => {
                            warn!(author = %author_id, error = %e, "author lookup failed");
                        }
                    }
                }
            }
        }

        self.seen.insert(comment.id.clone());
        self.comments.insert(0, comment);
        if let Some(post) = &mut self.post {
            post.comment_count += 1;
        }
        true
    }

    fn apply_update(&mut self, event: &ChangeEvent) -> bool {
        let row = match event.new.as_ref().filter(|row| validate::is_valid_comment(row)) {
            Some(row) => row,
            None => {
                debug!("dropping invalid comment UPDATE");
                return false;
            }
        };
        let id = match row.get("id").and_then(CommentId::from_value) {
            Some(id) => id,
            None => return false,
        };
        let patch = match CommentPatch::from_record(row) {
            Ok(patch) => patch,
            Err(e) => {
                debug!(error = %e, "comment UPDATE failed to decode");
                return false;
            }
        };

        match self.comments.iter_mut().find(|c| c.id == id) {
            Some(comment) => {
                patch.apply(comment);
                true
            }
            None => false,
        }
    }

    fn apply_delete(&mut self, event: &ChangeEvent) -> bool {
        let id = match event
            .old
            .as_ref()
            .and_then(|row| row.get("id"))
            .and_then(CommentId::from_value)
        {
            Some(id) => id,
            None => {
                debug!("dropping comment DELETE without id");
                return false;
            }
        };
        self.remove_comment(&id)
    }

    fn remove_comment(&mut self, id: &CommentId) -> bool {
        let before = self.comments.len();
        self.comments.retain(|c| &c.id != id);
        let removed = self.comments.len() < before;
        if removed {
            if let Some(post) = &mut self.post {
                post.comment_count = post.comment_count.saturating_sub(1);
            }
        }
        removed
    }

    // --- Mutations ---

    /// Submit a comment as the viewing user.
    ///
    /// Blank text is rejected locally with `Ok(None)`. On success the
    /// canonical id is returned but nothing is inserted here: the push
    /// echo carries the comment in. If the post belongs to someone else,
    /// a notification to its owner is attempted best-effort.
    pub fn submit(&mut self, text: impl Into<String>) -> Result<Option<CommentId>> {
        self.ensure_alive()?;
        let text = text.into();
        if text.trim().is_empty() {
            return Ok(None);
        }

        let input = NewComment::new(self.post_id.clone(), self.user.id.clone(), text);
        let row = self.mutations.create_comment(&input)?;
        self.ensure_alive()?;

        let id = match row.get("id").and_then(CommentId::from_value) {
            Some(id) => id,
            None => {
                return Err(FeedError::Deserialization(
                    "created comment row has no id".to_string(),
                ))
            }
        };

        if let Some(owner) = self.post.as_ref().and_then(|p| p.owner_id.clone()) {
            if owner != self.user.id {
                let notification = NewNotification {
                    sender_id: self.user.id.clone(),
                    receiver_id: owner,
                    title: "commented on your post".to_string(),
                    data: json!({"postId": self.post_id.0, "commentId": id.0}),
                };
                if let Err(e) = self.mutations.create_notification(&notification) {
                    warn!(error = %e, "owner notification failed");
                }
            }
        }

        Ok(Some(id))
    }

    /// Remove a comment after remote confirmation. The push DELETE echo
    /// then finds nothing to remove.
    pub fn delete_comment(&mut self, id: &CommentId) -> Result<()> {
        self.ensure_alive()?;
        self.mutations.delete_comment(id)?;
        if self.alive {
            self.remove_comment(id);
        }
        Ok(())
    }

    /// Remove the whole post after remote confirmation. The thread keeps
    /// its subscription until `close`; the caller decides when to leave.
    pub fn delete_post(&mut self) -> Result<()> {
        self.ensure_alive()?;
        self.mutations.delete_post(&self.post_id)?;
        if self.alive {
            self.post = None;
            self.comments.clear();
        }
        Ok(())
    }

    // --- Accessors ---

    pub fn post_id(&self) -> &PostId {
        &self.post_id
    }

    pub fn post(&self) -> Option<&Post> {
        self.post.as_ref()
    }

    /// Comments, newest first.
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    // --- Teardown ---

    /// Release the subscription exactly once. Idempotent; also invoked
    /// from `Drop`.
    pub fn close(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;

        if let Some(sub) = self.sub.take() {
            self.transport.release(sub.id);
        }
        info!(post = %self.post_id, "comment thread closed");
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.alive {
            Ok(())
        } else {
            Err(FeedError::Closed)
        }
    }
}

impl Drop for CommentThread {
    fn drop(&mut self) {
        self.close();
    }
}
