use uuid::Uuid;

use crate::{EntityId, SortBy, Time, UserId, Votes, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn stub() -> CommentId {
        CommentId(STUB_UUID)
    }

    /// Client-generated id for a comment the server has not confirmed yet
    pub fn temporary() -> CommentId {
        CommentId(Uuid::new_v4())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub entity_id: EntityId,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    pub author_id: UserId,
    pub content: String,
    #[serde(default)]
    pub gif: Option<String>,
    #[serde(default)]
    pub mentions: Vec<UserId>,
    #[serde(default)]
    pub votes: Votes,
    #[serde(default)]
    pub replies_count: u32,
    pub created_at: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub entity_id: EntityId,
    pub parent_id: Option<CommentId>,
    pub content: String,
    #[serde(default)]
    pub gif: Option<String>,
    #[serde(default)]
    pub mentions: Vec<UserId>,
}

impl NewComment {
    /// Build the locally displayed version of this comment, before the server assigns its id
    pub fn to_pending(&self, id: CommentId, author_id: UserId, date: Time) -> Comment {
        Comment {
            id,
            entity_id: self.entity_id,
            parent_id: self.parent_id,
            author_id,
            content: self.content.clone(),
            gif: self.gif.clone(),
            mentions: self.mentions.clone(),
            votes: Votes::default(),
            replies_count: 0,
            created_at: date,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommentScope {
    Entity(EntityId),
    User(UserId),
    Parent(CommentId),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommentQuery {
    pub scope: CommentScope,
    pub sort_by: SortBy,
    pub page: u32,
    pub limit: u32,
}

impl CommentQuery {
    pub fn new(scope: CommentScope) -> CommentQuery {
        CommentQuery {
            scope,
            sort_by: SortBy::Top,
            page: 1,
            limit: 10,
        }
    }

    pub fn to_params(&self) -> Vec<(String, String)> {
        let scope = match self.scope {
            CommentScope::Entity(e) => ("entityId", e.0.to_string()),
            CommentScope::User(u) => ("userId", u.0.to_string()),
            CommentScope::Parent(c) => ("parentId", c.0.to_string()),
        };
        vec![
            (scope.0.to_string(), scope.1),
            (String::from("sortBy"), self.sort_by.as_str().to_string()),
            (String::from("page"), self.page.to_string()),
            (String::from("limit"), self.limit.to_string()),
        ]
    }

    pub fn from_params(params: &[(String, String)]) -> Option<CommentQuery> {
        let mut scope = None;
        let mut query = CommentQuery::new(CommentScope::User(UserId::stub()));
        for (k, v) in params {
            match k.as_str() {
                "entityId" => scope = Some(CommentScope::Entity(EntityId(v.parse().ok()?))),
                "userId" => scope = Some(CommentScope::User(UserId(v.parse().ok()?))),
                "parentId" => scope = Some(CommentScope::Parent(CommentId(v.parse().ok()?))),
                "sortBy" => query.sort_by = SortBy::parse(v)?,
                "page" => query.page = v.parse().ok()?,
                "limit" => query.limit = v.parse().ok()?,
                _ => (),
            }
        }
        query.scope = scope?;
        Some(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_params_parse_back() {
        let mut q = CommentQuery::new(CommentScope::Parent(CommentId(Uuid::new_v4())));
        q.sort_by = SortBy::New;
        q.page = 3;
        assert_eq!(CommentQuery::from_params(&q.to_params()), Some(q));
    }

    #[test]
    fn query_without_scope_is_rejected() {
        let params = vec![(String::from("page"), String::from("1"))];
        assert_eq!(CommentQuery::from_params(&params), None);
    }
}
