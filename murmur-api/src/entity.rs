use std::collections::BTreeMap;

use uuid::Uuid;

use crate::{Time, UserId, Votes, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn stub() -> EntityId {
        EntityId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    pub author_id: UserId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub votes: Votes,
    #[serde(default)]
    pub comments_count: u32,
    pub created_at: Time,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntity {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub source_id: Option<String>,
}

impl NewEntity {
    pub fn to_pending(&self, id: EntityId, author_id: UserId, date: Time) -> Entity {
        Entity {
            id,
            author_id,
            title: self.title.clone(),
            content: self.content.clone(),
            keywords: self.keywords.clone(),
            attachments: self.attachments.clone(),
            location: self.location.clone(),
            metadata: self.metadata.clone(),
            source_id: self.source_id.clone(),
            votes: Votes::default(),
            comments_count: 0,
            created_at: date,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

impl EntityPatch {
    pub fn apply_to(&self, e: &mut Entity) {
        if let Some(title) = &self.title {
            e.title = title.clone();
        }
        if let Some(content) = &self.content {
            e.content = content.clone();
        }
        if let Some(keywords) = &self.keywords {
            e.keywords = keywords.clone();
        }
    }
}
