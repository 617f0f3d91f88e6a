//! The feed engine facade.
//!
//! Owns the feed store, the notification tracker and the push
//! subscriptions, and funnels every mutation path through one place: bulk
//! fetches (`refresh`/`load_more`), queued change events (`pump`) and the
//! optimistic entry points (`toggle_like`, `submit_post`, `delete_post`).
//! Single-writer by construction: all entry points take `&mut self`.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{FeedError, Result};
use crate::events::{ChangeEvent, EventKind};
use crate::notify::{NotificationTracker, Toast};
use crate::push::{PushTransport, StreamFilter, SubscriptionHandle, Topic};
use crate::remote::{MutationClient, QueryClient};
use crate::store::{apply_event, FeedStore, MergeOutcome};
use crate::types::{FeedViewState, Like, NewPost, Post, PostId, UserId, UserRef};
use crate::validate;

/// Default posts per page.
const DEFAULT_PAGE_SIZE: usize = 10;

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Posts requested per page. Default: 10
    pub page_size: usize,

    /// Restrict the feed to one author (profile view). Default: none.
    pub author: Option<UserId>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            author: None,
        }
    }
}

/// Advisory side-channel to the renderer, outside store state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedSignal {
    /// A fresh remote post landed at the head; bring it into view. The
    /// renderer may defer briefly to let layout settle.
    ScrollToTop,
}

/// One user's live feed view.
pub struct FeedEngine {
    store: FeedStore,
    notify: NotificationTracker,
    query: Arc<dyn QueryClient>,
    mutations: Arc<dyn MutationClient>,
    transport: Arc<dyn PushTransport>,
    /// The viewing user; likes and notifications are scoped to them.
    user: UserRef,
    config: EngineConfig,
    /// Committed pagination window. Grows only after a successful fetch.
    limit: usize,
    posts_sub: Option<SubscriptionHandle>,
    comments_sub: Option<SubscriptionHandle>,
    notif_sub: Option<SubscriptionHandle>,
    /// Pending renderer advisory, consumed by `take_signal`.
    signal: Option<FeedSignal>,
    /// Checked before every store mutation; cleared by `close`.
    alive: bool,
}

impl FeedEngine {
    /// Open the post, comment and notification subscriptions and perform
    /// the initial bulk fetch.
    ///
    /// A failed initial fetch still returns a running engine: the failure
    /// is surfaced through the store's error field, and a later `refresh`
    /// or `load_more` can recover.
    pub fn start(
        query: Arc<dyn QueryClient>,
        mutations: Arc<dyn MutationClient>,
        transport: Arc<dyn PushTransport>,
        user: UserRef,
        config: EngineConfig,
    ) -> Result<Self> {
        let posts_sub = transport.subscribe(Topic::Posts, StreamFilter::all())?;
        let comments_sub = match transport.subscribe(
            Topic::Comments,
            StreamFilter::all().with_kinds(vec![EventKind::Insert, EventKind::Delete]),
        ) {
            Ok(sub) => sub,
            Err(e) => {
                transport.release(posts_sub.id);
                return Err(e);
            }
        };
        let notif_sub = match transport.subscribe(
            Topic::Notifications,
            StreamFilter::for_receiver(user.id.clone()).with_kinds(vec![EventKind::Insert]),
        ) {
            Ok(sub) => sub,
            Err(e) => {
                transport.release(posts_sub.id);
                transport.release(comments_sub.id);
                return Err(e);
            }
        };

        let mut engine = Self {
            store: FeedStore::new(),
            notify: NotificationTracker::new(),
            query,
            mutations,
            transport,
            limit: config.page_size,
            user,
            config,
            posts_sub: Some(posts_sub),
            comments_sub: Some(comments_sub),
            notif_sub: Some(notif_sub),
            signal: None,
            alive: true,
        };

        info!(user = %engine.user.id, "feed engine started");
        let _ = engine.refresh();
        Ok(engine)
    }

    // --- Bulk Fetching ---

    /// Re-run the bulk fetch for the current window and replace the view.
    ///
    /// On failure the error lands in the store (resident posts untouched)
    /// and is also returned.
    pub fn refresh(&mut self) -> Result<()> {
        self.ensure_alive()?;
        self.store.set_loading(true);

        let result = self.fetch_validated(self.limit);
        if !self.alive {
            return Err(FeedError::Closed);
        }
        self.store.set_loading(false);

        match result {
            Ok(posts) => {
                self.store.replace(posts, self.limit);
                Ok(())
            }
            Err(e) => {
                self.store.set_error(e.to_string());
                Err(e)
            }
        }
    }

    /// Grow the window by one page and append what the fetch returns.
    ///
    /// Returns false (without fetching) while a fetch is in flight or once
    /// the feed is exhausted. The grown window is committed only on
    /// success, so a failed call retries the same range. Posts already
    /// resident, including ones pushed in since the last page, are never
    /// reordered or dropped by this path.
    pub fn load_more(&mut self) -> Result<bool> {
        self.ensure_alive()?;
        if self.store.is_loading() || !self.store.has_more() {
            return Ok(false);
        }

        let requested = self.limit + self.config.page_size;
        self.store.set_loading(true);

        let result = self.fetch_validated(requested);
        if !self.alive {
            return Err(FeedError::Closed);
        }
        self.store.set_loading(false);

        match result {
            Ok(posts) => {
                self.store.extend_page(posts, requested);
                self.limit = requested;
                Ok(true)
            }
            Err(e) => {
                self.store.set_error(e.to_string());
                Err(e)
            }
        }
    }

    fn fetch_validated(&self, limit: usize) -> Result<Vec<Post>> {
        let rows = self.query.fetch_page(limit, self.config.author.as_ref())?;
        Ok(decode_post_rows(rows))
    }

    // --- Event Pump ---

    /// Drain every queued event, apply them in arrival order, then expire
    /// the toast window. Returns the number of events that changed the
    /// store.
    pub fn pump(&mut self) -> usize {
        if !self.alive {
            return 0;
        }
        let now = Instant::now();
        let mut applied = 0;

        if let Some(sub) = self.posts_sub.take() {
            while let Ok(event) = sub.try_recv() {
                if self.apply_post_event(&event, now) {
                    applied += 1;
                }
            }
            self.posts_sub = Some(sub);
        }

        if let Some(sub) = self.comments_sub.take() {
            while let Ok(event) = sub.try_recv() {
                if self.apply_comment_count(&event) {
                    applied += 1;
                }
            }
            self.comments_sub = Some(sub);
        }

        if let Some(sub) = self.notif_sub.take() {
            while let Ok(event) = sub.try_recv() {
                self.notify.observe(&event);
            }
            self.notif_sub = Some(sub);
        }

        self.notify.tick(now);
        applied
    }

    fn apply_post_event(&mut self, event: &ChangeEvent, now: Instant) -> bool {
        // The toast is keyed off the kind alone; the store mutation still
        // requires a valid payload.
        self.notify.flash(event.kind, now);

        match apply_event(&mut self.store, event) {
            MergeOutcome::Inserted(id) => {
                debug!(id = %id, "post inserted from change stream");
                self.signal = Some(FeedSignal::ScrollToTop);
                true
            }
            MergeOutcome::Updated(_) | MergeOutcome::Removed(_) => true,
            MergeOutcome::Ignored => false,
        }
    }

    /// Keep resident posts' comment-count summaries in step with the
    /// comment stream. Counts for posts not in the feed are ignored.
    fn apply_comment_count(&mut self, event: &ChangeEvent) -> bool {
        let delta = match event.kind {
            EventKind::Insert => 1,
            EventKind::Delete => -1,
            _ => return false,
        };
        match event.field("postId").and_then(PostId::from_value) {
            Some(id) => self.store.bump_comment_count(&id, delta),
            None => false,
        }
    }

    // --- Optimistic Mutations ---

    /// Toggle the current user's like on a post.
    ///
    /// Membership flips locally first; the confirming call follows. On
    /// remote failure the flip is reverted and the error returned. Rapid
    /// double-toggles are not coalesced: each issues its own remote call
    /// in flight order.
    pub fn toggle_like(&mut self, post_id: &PostId) -> Result<bool> {
        self.ensure_alive()?;
        let user_id = self.user.id.clone();
        let like = Like::new(post_id.clone(), user_id.clone());

        let liked = self
            .store
            .get(post_id)
            .ok_or_else(|| FeedError::PostNotFound(post_id.clone()))?
            .liked_by(&user_id);

        if liked {
            self.store.remove_like(post_id, &user_id);
            if let Err(e) = self.mutations.delete_like(post_id, &user_id) {
                if self.alive {
                    self.store.add_like(post_id, like);
                }
                return Err(e);
            }
            Ok(false)
        } else {
            self.store.add_like(post_id, like.clone());
            if let Err(e) = self.mutations.create_like(&like) {
                if self.alive {
                    self.store.remove_like(post_id, &user_id);
                }
                return Err(e);
            }
            Ok(true)
        }
    }

    /// Create a post remotely, then adopt the canonical row at the head.
    /// The INSERT echo from the push stream later hits the duplicate-id
    /// guard.
    pub fn submit_post(&mut self, input: NewPost) -> Result<PostId> {
        self.ensure_alive()?;
        let row = self.mutations.create_post(&input, &self.user.id)?;
        self.ensure_alive()?;

        if !validate::is_valid_post(&row) {
            return Err(FeedError::Deserialization(
                "created post row is malformed".to_string(),
            ));
        }
        let mut post = Post::from_record(&row)?;
        // Created rows come back bare; fill in what this client knows.
        if post.author.is_placeholder() {
            post.author = self.user.clone();
        }
        if post.owner_id.is_none() {
            post.owner_id = Some(self.user.id.clone());
        }

        let id = post.id.clone();
        self.store.prepend(post);
        Ok(id)
    }

    /// Remove a post after remote confirmation. The push DELETE echo then
    /// hits the idempotent remove.
    pub fn delete_post(&mut self, post_id: &PostId) -> Result<()> {
        self.ensure_alive()?;
        self.mutations.delete_post(post_id)?;
        if self.alive {
            self.store.remove(post_id);
        }
        Ok(())
    }

    // --- Snapshots & Signals ---

    /// Clone out the renderer-facing snapshot.
    pub fn snapshot(&self) -> FeedViewState {
        self.store.snapshot()
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    /// Consume the pending renderer advisory, if any.
    pub fn take_signal(&mut self) -> Option<FeedSignal> {
        self.signal.take()
    }

    /// The toast visible at `now`.
    pub fn toast(&self, now: Instant) -> Option<&Toast> {
        self.notify.toast(now)
    }

    pub fn has_unread_notifications(&self) -> bool {
        self.notify.has_unread()
    }

    /// Explicit user action: the notifications view was opened.
    pub fn mark_notifications_seen(&mut self) {
        self.notify.mark_seen();
    }

    pub fn current_user(&self) -> &UserRef {
        &self.user
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    // --- Teardown ---

    /// Release the subscriptions exactly once and cancel the pending
    /// toast window. Idempotent; also invoked from `Drop`. Every entry
    /// point fails with [`FeedError::Closed`] afterwards.
    pub fn close(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;

        if let Some(sub) = self.posts_sub.take() {
            self.transport.release(sub.id);
        }
        if let Some(sub) = self.comments_sub.take() {
            self.transport.release(sub.id);
        }
        if let Some(sub) = self.notif_sub.take() {
            self.transport.release(sub.id);
        }

        self.notify.clear_toast();
        self.signal = None;
        info!(user = %self.user.id, "feed engine closed");
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.alive {
            Ok(())
        } else {
            Err(FeedError::Closed)
        }
    }
}

impl Drop for FeedEngine {
    fn drop(&mut self) {
        self.close();
    }
}

/// Validate and decode fetched rows, dropping malformed ones.
fn decode_post_rows(rows: Vec<Value>) -> Vec<Post> {
    let fetched = rows.len();

    let posts: Vec<Post> = rows
        .iter()
        .filter(|row| validate::is_valid_post(row))
        .filter_map(|row| match Post::from_record(row) {
            Ok(post) => Some(post),
            Err(e) => {
                debug!(error = %e, "fetched row failed to decode");
                None
            }
        })
        .collect();

    if posts.len() < fetched {
        warn!(
            dropped = fetched - posts.len(),
            "dropped malformed rows from fetched page"
        );
    }
    posts
}
