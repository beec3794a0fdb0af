use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

mod backend;
pub use backend::{Backend, Method};

mod collection;
pub use collection::{Collection, CollectionId, NewCollection};

mod comment;
pub use comment::{Comment, CommentId, CommentQuery, CommentScope, NewComment};

mod entity;
pub use entity::{Entity, EntityId, EntityPatch, NewEntity};

mod error;
pub use error::ApiError;

mod notification;
pub use notification::{Notification, NotificationId};

mod query;
pub use query::{FilterPatch, ListFilters, ListQuery, SortBy, SortDir, TimeFrame};

mod user;
pub use user::{ConnectionStatus, Profile, ProfilePatch, UserId};

mod vote;
pub use vote::{VoteAction, Votes};

/// Scopes every request path, as in `/{project}/comments`
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> ProjectId {
        ProjectId(id.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of one cached list, eg. `"home"` or `"user:<uuid>"`
#[derive(
    Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct ListId(pub String);

impl ListId {
    pub fn new(id: impl Into<String>) -> ListId {
        ListId(id.into())
    }
}

impl std::fmt::Display for ListId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Anything that can be held in a paginated list, deduplicated by its key
pub trait Listed: Clone + std::fmt::Debug + Send + Sync + 'static {
    fn list_key(&self) -> Uuid;
}

impl Listed for Entity {
    fn list_key(&self) -> Uuid {
        self.id.0
    }
}

impl Listed for Notification {
    fn list_key(&self) -> Uuid {
        self.id.0
    }
}

impl Listed for Collection {
    fn list_key(&self) -> Uuid {
        self.id.0
    }
}

pub fn now() -> Time {
    Utc::now()
}
