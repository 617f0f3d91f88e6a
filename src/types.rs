//! Core types for the feed engine.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a post.
///
/// Ids are opaque: the backend may use strings or integers, both are
/// normalized to a string on decode.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PostId(#[serde(deserialize_with = "de_opaque_id")] pub String);

impl PostId {
    /// Extract an id from a raw JSON value (string or integer).
    pub fn from_value(value: &Value) -> Option<Self> {
        opaque_id(value).map(PostId)
    }
}

impl fmt::Debug for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PostId({})", self.0)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PostId {
    fn from(s: &str) -> Self {
        PostId(s.to_string())
    }
}

impl From<String> for PostId {
    fn from(s: String) -> Self {
        PostId(s)
    }
}

/// Unique identifier for a user.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UserId(#[serde(deserialize_with = "de_opaque_id")] pub String);

impl UserId {
    /// Extract an id from a raw JSON value (string or integer).
    pub fn from_value(value: &Value) -> Option<Self> {
        opaque_id(value).map(UserId)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        UserId(s)
    }
}

/// Unique identifier for a comment.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CommentId(#[serde(deserialize_with = "de_opaque_id")] pub String);

impl CommentId {
    /// Extract an id from a raw JSON value (string or integer).
    pub fn from_value(value: &Value) -> Option<Self> {
        opaque_id(value).map(CommentId)
    }
}

impl fmt::Debug for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommentId({})", self.0)
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CommentId {
    fn from(s: &str) -> Self {
        CommentId(s.to_string())
    }
}

impl From<String> for CommentId {
    fn from(s: String) -> Self {
        CommentId(s)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Author profile attached to posts and comments.
///
/// Backend rows arrive with a joined `user` object; push rows usually do
/// not, and a lookup that fails leaves the placeholder (all fields empty).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(default, deserialize_with = "de_null_default")]
    pub id: UserId,
    #[serde(default, deserialize_with = "de_null_default")]
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl UserRef {
    pub fn new(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: None,
        }
    }

    /// True if no profile data was ever resolved for this reference.
    pub fn is_placeholder(&self) -> bool {
        self.id.0.is_empty() && self.name.is_empty()
    }
}

/// Kind of media attached to a post.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl Default for MediaKind {
    fn default() -> Self {
        MediaKind::Image
    }
}

/// Reference to media stored by the backend (path only, no bytes).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub path: String,
    #[serde(default)]
    pub kind: MediaKind,
}

/// A like is a (post, user) membership pair. No duplicates, no ordering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    #[serde(rename = "postId")]
    pub post_id: PostId,
    #[serde(rename = "userId")]
    pub user_id: UserId,
}

impl Like {
    pub fn new(post_id: impl Into<PostId>, user_id: impl Into<UserId>) -> Self {
        Self {
            post_id: post_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// A post as held by the feed store.
///
/// Decoded from backend rows. Bulk-read rows carry the joined author, like
/// rows and a comment-count summary; push rows are bare (missing joins
/// decode to defaults).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,

    /// Id of the owning user (the raw row column, independent of the join).
    #[serde(rename = "userId", default)]
    pub owner_id: Option<UserId>,

    /// Rich text body.
    #[serde(default, deserialize_with = "de_null_default")]
    pub body: String,

    /// Optional attached media.
    #[serde(default)]
    pub file: Option<MediaRef>,

    #[serde(default, deserialize_with = "de_null_default")]
    pub created_at: Timestamp,

    /// Joined author profile (placeholder when the row had no join).
    #[serde(rename = "user", default, deserialize_with = "de_null_default")]
    pub author: UserRef,

    /// Like membership set. Author ids are unique (enforced on ingestion).
    #[serde(rename = "postLikes", default, deserialize_with = "de_null_default")]
    pub likes: Vec<Like>,

    /// Comment-count summary, not the full comment list.
    /// Tolerates `[{"count": n}]`, a full row array, a plain number or null.
    #[serde(rename = "comments", default, deserialize_with = "de_comment_count")]
    pub comment_count: u64,
}

impl Post {
    /// Decode a validated raw record.
    pub fn from_record(record: &Value) -> crate::error::Result<Self> {
        Ok(serde_json::from_value(record.clone())?)
    }

    /// Whether the given user is in the like set.
    pub fn liked_by(&self, user_id: &UserId) -> bool {
        self.likes.iter().any(|like| &like.user_id == user_id)
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    /// Drop duplicate likes by author id, first occurrence wins.
    pub fn dedupe_likes(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.likes.retain(|like| seen.insert(like.user_id.clone()));
    }
}

/// Shallow patch for a post, decoded from an UPDATE row.
///
/// The allow-list is {body, file}: joined author, likes and comment count
/// are never clobbered by a bare row update.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PostPatch {
    #[serde(default)]
    pub body: Option<String>,

    /// Missing = untouched; explicit null = cleared.
    #[serde(default, deserialize_with = "de_nullable")]
    pub file: Option<Option<MediaRef>>,
}

impl PostPatch {
    /// Decode from a raw UPDATE record. Fields outside the allow-list are
    /// ignored.
    pub fn from_record(record: &Value) -> crate::error::Result<Self> {
        Ok(serde_json::from_value(record.clone())?)
    }

    /// Merge this patch onto a post.
    pub fn apply(&self, post: &mut Post) {
        if let Some(body) = &self.body {
            post.body = body.clone();
        }
        if let Some(file) = &self.file {
            post.file = file.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_none() && self.file.is_none()
    }
}

/// A comment on a post.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,

    #[serde(rename = "postId", default)]
    pub post_id: Option<PostId>,

    /// Raw row column; the resolved profile lives in `author`.
    #[serde(rename = "userId", default)]
    pub author_id: Option<UserId>,

    #[serde(default, deserialize_with = "de_null_default")]
    pub text: String,

    #[serde(default, deserialize_with = "de_null_default")]
    pub created_at: Timestamp,

    /// Resolved author profile (placeholder until resolution).
    #[serde(rename = "user", default, deserialize_with = "de_null_default")]
    pub author: UserRef,
}

impl Comment {
    /// Decode a validated raw record.
    pub fn from_record(record: &Value) -> crate::error::Result<Self> {
        Ok(serde_json::from_value(record.clone())?)
    }
}

/// Shallow patch for a comment (text only).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CommentPatch {
    #[serde(default)]
    pub text: Option<String>,
}

impl CommentPatch {
    pub fn from_record(record: &Value) -> crate::error::Result<Self> {
        Ok(serde_json::from_value(record.clone())?)
    }

    pub fn apply(&self, comment: &mut Comment) {
        if let Some(text) = &self.text {
            comment.text = text.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none()
    }
}

/// Input for creating a post.
#[derive(Clone, Debug, Serialize)]
pub struct NewPost {
    pub body: String,
    pub file: Option<MediaRef>,
}

impl NewPost {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            file: None,
        }
    }

    pub fn with_file(mut self, file: MediaRef) -> Self {
        self.file = Some(file);
        self
    }
}

/// Input for creating a comment.
#[derive(Clone, Debug, Serialize)]
pub struct NewComment {
    #[serde(rename = "postId")]
    pub post_id: PostId,
    #[serde(rename = "userId")]
    pub author_id: UserId,
    pub text: String,
}

impl NewComment {
    pub fn new(
        post_id: impl Into<PostId>,
        author_id: impl Into<UserId>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            post_id: post_id.into(),
            author_id: author_id.into(),
            text: text.into(),
        }
    }
}

/// Input for creating a notification.
#[derive(Clone, Debug, Serialize)]
pub struct NewNotification {
    #[serde(rename = "senderId")]
    pub sender_id: UserId,
    #[serde(rename = "receiverId")]
    pub receiver_id: UserId,
    pub title: String,
    /// Structured payload (e.g. `{postId, commentId}` for comment alerts).
    pub data: Value,
}

/// Externally observed snapshot of the feed.
#[derive(Clone, Debug, Serialize)]
pub struct FeedViewState {
    /// Ordered posts, newest first.
    pub posts: Vec<Post>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub has_more: bool,
}

// --- Serde helpers ---

fn opaque_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accept string or integer ids, normalizing to a string.
fn de_opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}

/// Treat an explicit null the same as a missing field.
fn de_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Distinguish a missing field (outer None) from an explicit null
/// (Some(None)).
fn de_nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Normalize the `comments` field to a count. Bulk rows carry
/// `[{"count": n}]`, detail rows a full comment array, push rows nothing.
fn de_comment_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct CountRow {
        count: u64,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CommentField {
        Counted(Vec<CountRow>),
        Rows(Vec<Value>),
        Count(u64),
        Null,
    }

    Ok(match CommentField::deserialize(deserializer)? {
        CommentField::Counted(rows) => rows.into_iter().map(|r| r.count).sum(),
        CommentField::Rows(rows) => rows.len() as u64,
        CommentField::Count(n) => n,
        CommentField::Null => 0,
    })
}
