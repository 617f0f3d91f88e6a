//! Integration tests for the feed engine.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tributary::{
    ChangeEvent, EngineConfig, EventHub, FeedEngine, FeedError, FeedSignal, Like, MutationClient,
    NewComment, NewNotification, NewPost, PostId, QueryClient, Result, Timestamp, Topic, UserId,
    UserRef, TOAST_TTL,
};

fn post_row(id: &str, owner: &str) -> Value {
    json!({
        "id": id,
        "userId": owner,
        "body": format!("body of {}", id),
        "created_at": 1_700_000_000_000_000i64,
        "user": {"id": owner, "name": format!("user-{}", owner)},
        "postLikes": [],
        "comments": [{"count": 0}],
    })
}

/// In-memory stand-in for the backend: serves pages from a row table and
/// publishes a change-event echo for every confirmed mutation, the way the
/// real push pipeline does.
struct FakeBackend {
    hub: Arc<EventHub>,
    rows: Mutex<Vec<Value>>,
    next_id: AtomicU64,
    fail_fetches: AtomicBool,
    fail_mutations: AtomicBool,
}

impl FakeBackend {
    fn seeded(count: usize) -> Arc<Self> {
        let rows = (0..count)
            .map(|i| post_row(&format!("p{}", i), "author"))
            .collect();
        Arc::new(Self {
            hub: Arc::new(EventHub::new()),
            rows: Mutex::new(rows),
            next_id: AtomicU64::new(1000),
            fail_fetches: AtomicBool::new(false),
            fail_mutations: AtomicBool::new(false),
        })
    }

    fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    fn confirm(&self) -> Result<()> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            Err(FeedError::Mutation("backend rejected".to_string()))
        } else {
            Ok(())
        }
    }

    /// Another client posts: the row lands in the table and the INSERT
    /// echo goes out bare, without joins.
    fn remote_post(&self, id: &str, owner: &str) {
        self.rows.lock().insert(0, post_row(id, owner));
        self.hub.publish(
            Topic::Posts,
            &ChangeEvent::insert(json!({"id": id, "userId": owner, "body": format!("body of {}", id)})),
        );
    }
}

impl QueryClient for FakeBackend {
    fn fetch_page(&self, limit: usize, author: Option<&UserId>) -> Result<Vec<Value>> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(FeedError::Fetch("backend unavailable".to_string()));
        }
        let rows = self.rows.lock();
        Ok(rows
            .iter()
            .filter(|row| author.map_or(true, |a| row["userId"] == json!(a.0)))
            .take(limit)
            .cloned()
            .collect())
    }

    fn fetch_one(&self, id: &PostId) -> Result<Value> {
        let rows = self.rows.lock();
        rows.iter()
            .find(|row| row["id"] == json!(id.0))
            .cloned()
            .ok_or_else(|| FeedError::Fetch(format!("no row for {}", id)))
    }

    fn fetch_author(&self, id: &UserId) -> Result<UserRef> {
        Ok(UserRef::new(id.clone(), format!("user-{}", id.0)))
    }
}

impl MutationClient for FakeBackend {
    fn create_like(&self, like: &Like) -> Result<()> {
        self.confirm()?;
        let mut rows = self.rows.lock();
        if let Some(row) = rows.iter_mut().find(|row| row["id"] == json!(like.post_id.0)) {
            if let Some(likes) = row["postLikes"].as_array_mut() {
                likes.push(json!({"postId": like.post_id.0, "userId": like.user_id.0}));
            }
        }
        Ok(())
    }

    fn delete_like(&self, post_id: &PostId, user_id: &UserId) -> Result<()> {
        self.confirm()?;
        let mut rows = self.rows.lock();
        if let Some(row) = rows.iter_mut().find(|row| row["id"] == json!(post_id.0)) {
            if let Some(likes) = row["postLikes"].as_array_mut() {
                likes.retain(|like| like["userId"] != json!(user_id.0));
            }
        }
        Ok(())
    }

    fn create_comment(&self, input: &NewComment) -> Result<Value> {
        self.confirm()?;
        let id = format!("c{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let row = json!({
            "id": id,
            "postId": input.post_id.0,
            "userId": input.author_id.0,
            "text": input.text,
            "created_at": Timestamp::now().0,
        });
        self.hub.publish(Topic::Comments, &ChangeEvent::insert(row.clone()));
        Ok(row)
    }

    fn delete_comment(&self, id: &tributary::CommentId) -> Result<()> {
        self.confirm()?;
        self.hub
            .publish(Topic::Comments, &ChangeEvent::delete(json!({"id": id.0})));
        Ok(())
    }

    fn create_post(&self, input: &NewPost, author: &UserId) -> Result<Value> {
        self.confirm()?;
        let id = format!("p{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let bare = json!({
            "id": id,
            "userId": author.0,
            "body": input.body,
            "created_at": Timestamp::now().0,
        });

        let mut stored = bare.clone();
        stored["user"] = json!({"id": author.0, "name": format!("user-{}", author.0)});
        stored["postLikes"] = json!([]);
        stored["comments"] = json!([{"count": 0}]);
        self.rows.lock().insert(0, stored);

        self.hub.publish(Topic::Posts, &ChangeEvent::insert(bare.clone()));
        Ok(bare)
    }

    fn delete_post(&self, id: &PostId) -> Result<()> {
        self.confirm()?;
        self.rows.lock().retain(|row| row["id"] != json!(id.0));
        self.hub
            .publish(Topic::Posts, &ChangeEvent::delete(json!({"id": id.0})));
        Ok(())
    }

    fn create_notification(&self, input: &NewNotification) -> Result<Value> {
        self.confirm()?;
        let mut row = serde_json::to_value(input).map_err(FeedError::from)?;
        row["id"] = json!(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.hub
            .publish(Topic::Notifications, &ChangeEvent::insert(row.clone()));
        Ok(row)
    }
}

fn start_engine(backend: &Arc<FakeBackend>) -> FeedEngine {
    FeedEngine::start(
        backend.clone(),
        backend.clone(),
        backend.hub.clone(),
        UserRef::new("viewer", "Viewer"),
        EngineConfig::default(),
    )
    .unwrap()
}

fn feed_ids(engine: &FeedEngine) -> Vec<String> {
    engine
        .store()
        .posts()
        .iter()
        .map(|post| post.id.0.clone())
        .collect()
}

// --- Pagination Workflows ---

#[test]
fn test_initial_page_and_incremental_pagination() {
    let backend = FakeBackend::seeded(25);
    let mut engine = start_engine(&backend);

    assert_eq!(engine.store().len(), 10);
    assert!(engine.store().has_more());

    assert!(engine.load_more().unwrap());
    assert_eq!(engine.store().len(), 20);
    assert!(engine.store().has_more());

    assert!(engine.load_more().unwrap());
    assert_eq!(engine.store().len(), 25);
    assert!(!engine.store().has_more());

    // Exhausted: no further fetch is attempted.
    assert!(!engine.load_more().unwrap());

    let expected: Vec<String> = (0..25).map(|i| format!("p{}", i)).collect();
    assert_eq!(feed_ids(&engine), expected);
}

#[test]
fn test_pushed_insert_stays_at_head_while_pages_append() {
    let backend = FakeBackend::seeded(15);
    let mut engine = start_engine(&backend);
    assert_eq!(engine.store().len(), 10);

    // Someone else posts while we are scrolled mid-feed.
    backend.remote_post("p-x", "other");
    engine.pump();
    assert_eq!(feed_ids(&engine)[0], "p-x");
    assert_eq!(engine.store().len(), 11);

    // The next page re-fetches a window that now includes the pushed
    // post; residents are skipped and new rows land at the tail.
    assert!(engine.load_more().unwrap());
    let ids = feed_ids(&engine);
    assert_eq!(ids[0], "p-x");
    assert_eq!(ids.last().unwrap(), "p14");
    assert_eq!(ids.len(), 16);
    assert_eq!(ids.iter().filter(|id| *id == "p-x").count(), 1);
    assert!(!engine.store().has_more());
}

#[test]
fn test_events_queued_during_pagination_survive() {
    let backend = FakeBackend::seeded(15);
    let mut engine = start_engine(&backend);

    // Pushed while the next page is on the wire, so the fetched rows do
    // not include it yet.
    backend.hub.publish(
        Topic::Posts,
        &ChangeEvent::insert(json!({"id": "p-y", "userId": "other", "body": "pushed"})),
    );
    assert!(engine.load_more().unwrap());
    // The event was queued across the fetch, not lost.
    engine.pump();
    assert_eq!(feed_ids(&engine)[0], "p-y");
    assert_eq!(engine.store().len(), 16);
}

// --- Change Event Reconciliation ---

#[test]
fn test_update_and_delete_events_reconcile() {
    let backend = FakeBackend::seeded(3);
    let mut engine = start_engine(&backend);

    backend.hub.publish(
        Topic::Posts,
        &ChangeEvent::update(json!({"id": "p1", "body": "edited"})),
    );
    backend
        .hub
        .publish(Topic::Posts, &ChangeEvent::delete(json!({"id": "p2"})));
    assert_eq!(engine.pump(), 2);

    assert_eq!(feed_ids(&engine), vec!["p0", "p1"]);
    let edited = engine.store().get(&"p1".into()).unwrap();
    assert_eq!(edited.body, "edited");
    // A bare update row never clobbers the joined author.
    assert_eq!(edited.author.name, "user-author");

    // Orphaned events are silent no-ops.
    backend.hub.publish(
        Topic::Posts,
        &ChangeEvent::update(json!({"id": "p99", "body": "x"})),
    );
    backend
        .hub
        .publish(Topic::Posts, &ChangeEvent::delete(json!({"id": "p99"})));
    assert_eq!(engine.pump(), 0);
    assert_eq!(engine.store().len(), 2);
}

#[test]
fn test_pushed_insert_signals_scroll_and_toast() {
    let backend = FakeBackend::seeded(2);
    let mut engine = start_engine(&backend);

    backend.remote_post("p-x", "other");
    engine.pump();

    assert_eq!(engine.take_signal(), Some(FeedSignal::ScrollToTop));
    assert!(engine.take_signal().is_none());

    let now = Instant::now();
    assert_eq!(engine.toast(now).unwrap().message, "New post added!");
    // The window closes on its own.
    assert!(engine.toast(now + TOAST_TTL).is_none());
}

// --- Optimistic Mutation Workflows ---

#[test]
fn test_submit_post_echo_is_adopted_once() {
    let backend = FakeBackend::seeded(0);
    let mut engine = start_engine(&backend);

    let id = engine.submit_post(NewPost::text("hello world")).unwrap();
    assert_eq!(engine.store().len(), 1);
    // The bare created row is filled from the local profile.
    assert_eq!(engine.store().get(&id).unwrap().author.name, "Viewer");

    // The push echo for our own insert is deduplicated.
    assert_eq!(engine.pump(), 0);
    assert_eq!(engine.store().len(), 1);

    // A refresh swaps in the canonical joined row.
    engine.refresh().unwrap();
    assert_eq!(engine.store().len(), 1);
    assert_eq!(engine.store().get(&id).unwrap().author.name, "user-viewer");
}

#[test]
fn test_delete_post_applies_after_confirmation() {
    let backend = FakeBackend::seeded(2);
    let mut engine = start_engine(&backend);

    engine.delete_post(&"p0".into()).unwrap();
    assert_eq!(feed_ids(&engine), vec!["p1"]);

    // The echo finds nothing left to remove.
    assert_eq!(engine.pump(), 0);
    assert_eq!(engine.store().len(), 1);
}

#[test]
fn test_delete_post_rejected_keeps_row() {
    let backend = FakeBackend::seeded(2);
    let mut engine = start_engine(&backend);
    backend.fail_mutations(true);

    assert!(engine.delete_post(&"p0".into()).is_err());
    assert_eq!(engine.store().len(), 2);
}

#[test]
fn test_toggle_like_confirms_and_survives_refresh() {
    let backend = FakeBackend::seeded(1);
    let mut engine = start_engine(&backend);
    let id: PostId = "p0".into();
    let viewer: UserId = "viewer".into();

    assert!(engine.toggle_like(&id).unwrap());
    assert!(engine.store().get(&id).unwrap().liked_by(&viewer));

    // The backend recorded it, so a full refetch agrees.
    engine.refresh().unwrap();
    assert!(engine.store().get(&id).unwrap().liked_by(&viewer));

    assert!(!engine.toggle_like(&id).unwrap());
    engine.refresh().unwrap();
    assert!(!engine.store().get(&id).unwrap().liked_by(&viewer));
}

#[test]
fn test_toggle_like_rolls_back_when_rejected() {
    let backend = FakeBackend::seeded(1);
    let mut engine = start_engine(&backend);
    backend.fail_mutations(true);
    let id: PostId = "p0".into();

    let err = engine.toggle_like(&id).unwrap_err();
    assert!(matches!(err, FeedError::Mutation(_)));
    assert!(!engine.store().get(&id).unwrap().liked_by(&"viewer".into()));
    assert_eq!(engine.store().get(&id).unwrap().like_count(), 0);
}

#[test]
fn test_rapid_double_toggle_nets_out() {
    let backend = FakeBackend::seeded(1);
    let mut engine = start_engine(&backend);
    let id: PostId = "p0".into();

    assert!(engine.toggle_like(&id).unwrap());
    assert!(!engine.toggle_like(&id).unwrap());

    engine.refresh().unwrap();
    assert!(!engine.store().get(&id).unwrap().liked_by(&"viewer".into()));
}

// --- Failure Recovery ---

#[test]
fn test_fetch_failure_keeps_posts_and_recovers() {
    let backend = FakeBackend::seeded(12);
    let mut engine = start_engine(&backend);
    assert_eq!(engine.store().len(), 10);

    backend.fail_fetches(true);
    assert!(engine.load_more().is_err());
    assert_eq!(engine.store().len(), 10);
    assert!(engine.store().error().unwrap().contains("backend unavailable"));
    assert!(engine.store().has_more());
    assert!(!engine.store().is_loading());

    // Same window retried once the backend is back.
    backend.fail_fetches(false);
    assert!(engine.load_more().unwrap());
    assert_eq!(engine.store().len(), 12);
    assert!(engine.store().error().is_none());
    assert!(!engine.store().has_more());
}

#[test]
fn test_initial_fetch_failure_starts_empty_with_error() {
    let backend = FakeBackend::seeded(5);
    backend.fail_fetches(true);
    let mut engine = start_engine(&backend);

    assert!(engine.store().is_empty());
    assert!(engine.store().error().is_some());

    backend.fail_fetches(false);
    engine.refresh().unwrap();
    assert_eq!(engine.store().len(), 5);
    assert!(engine.store().error().is_none());
}

#[test]
fn test_comment_activity_updates_feed_counts() {
    let backend = FakeBackend::seeded(2);
    let mut engine = start_engine(&backend);
    assert_eq!(engine.store().get(&"p0".into()).unwrap().comment_count, 0);

    // Someone comments on a resident post.
    backend
        .create_comment(&NewComment::new("p0", "someone", "nice"))
        .unwrap();
    engine.pump();
    assert_eq!(engine.store().get(&"p0".into()).unwrap().comment_count, 1);

    // And later removes it.
    backend.hub.publish(
        Topic::Comments,
        &ChangeEvent::delete(json!({"id": "c1000", "postId": "p0"})),
    );
    engine.pump();
    assert_eq!(engine.store().get(&"p0".into()).unwrap().comment_count, 0);
}

// --- Notifications ---

#[test]
fn test_notification_stream_scoped_to_receiver() {
    let backend = FakeBackend::seeded(0);
    let mut engine = start_engine(&backend);

    // Addressed elsewhere: the subscription filter drops it.
    backend
        .create_notification(&NewNotification {
            sender_id: "other".into(),
            receiver_id: "somebody-else".into(),
            title: "commented on your post".to_string(),
            data: json!({"postId": "p1"}),
        })
        .unwrap();
    engine.pump();
    assert!(!engine.has_unread_notifications());

    backend
        .create_notification(&NewNotification {
            sender_id: "other".into(),
            receiver_id: "viewer".into(),
            title: "commented on your post".to_string(),
            data: json!({"postId": "p1"}),
        })
        .unwrap();
    engine.pump();
    assert!(engine.has_unread_notifications());

    engine.mark_notifications_seen();
    assert!(!engine.has_unread_notifications());
}

// --- Teardown ---

#[test]
fn test_close_tears_down_once() {
    let backend = FakeBackend::seeded(3);
    let mut engine = start_engine(&backend);
    assert_eq!(backend.hub.subscription_count(), 3);

    engine.close();
    assert_eq!(backend.hub.subscription_count(), 0);

    engine.close();
    assert_eq!(backend.hub.subscription_count(), 0);

    assert!(matches!(engine.refresh(), Err(FeedError::Closed)));
    assert!(matches!(engine.load_more(), Err(FeedError::Closed)));
    assert!(matches!(engine.toggle_like(&"p0".into()), Err(FeedError::Closed)));
    assert!(matches!(
        engine.submit_post(NewPost::text("late")),
        Err(FeedError::Closed)
    ));
}

#[test]
fn test_drop_releases_subscriptions() {
    let backend = FakeBackend::seeded(0);
    let engine = start_engine(&backend);
    assert_eq!(backend.hub.subscription_count(), 3);

    drop(engine);
    assert_eq!(backend.hub.subscription_count(), 0);
}

#[test]
fn test_events_after_close_are_not_applied() {
    let backend = FakeBackend::seeded(1);
    let mut engine = start_engine(&backend);

    engine.close();
    backend.remote_post("p-late", "other");
    assert_eq!(engine.pump(), 0);
    assert_eq!(engine.store().len(), 1);
}
