use uuid::Uuid;

use crate::{EntityId, Time, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct NotificationId(pub Uuid);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,

    /// Recipient
    pub user_id: UserId,

    /// Eg. `"comment"`, `"follow"`, `"mention"`
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub entity_id: Option<EntityId>,
    #[serde(default)]
    pub read: bool,
    pub created_at: Time,
}
