use uuid::Uuid;

use crate::{EntityId, Time, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CollectionId(pub Uuid);

/// A user-curated list of entities
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: CollectionId,
    pub owner_id: UserId,
    pub name: String,
    #[serde(default)]
    pub entity_ids: Vec<EntityId>,
    pub created_at: Time,
}

impl Collection {
    pub fn contains(&self, e: &EntityId) -> bool {
        self.entity_ids.contains(e)
    }

    pub fn with_entity(&self, e: EntityId) -> Collection {
        let mut res = self.clone();
        if !res.contains(&e) {
            res.entity_ids.push(e);
        }
        res
    }

    pub fn without_entity(&self, e: &EntityId) -> Collection {
        let mut res = self.clone();
        res.entity_ids.retain(|id| id != e);
        res
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCollection {
    pub name: String,
    #[serde(default)]
    pub entity_ids: Vec<EntityId>,
}

impl NewCollection {
    pub fn to_pending(&self, id: CollectionId, owner_id: UserId, date: Time) -> Collection {
        Collection {
            id,
            owner_id,
            name: self.name.clone(),
            entity_ids: self.entity_ids.clone(),
            created_at: date,
        }
    }
}
