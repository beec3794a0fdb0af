use anyhow::Context;
use serde::de::DeserializeOwned;

use crate::{
    api::{
        Backend, Collection, CollectionId, Comment, CommentId, CommentQuery, Entity, EntityId,
        EntityPatch, ListQuery, Method, NewCollection, NewComment, NewEntity, Notification,
        NotificationId, Profile, ProfilePatch, ProjectId, UserId, VoteAction,
    },
    Error,
};

/// Typed access to every endpoint of a project
#[derive(Clone, Debug)]
pub struct Remote<B> {
    backend: B,
    project: ProjectId,
}

/// One of the relationship changes a user can make towards another user
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UserAction {
    Follow,
    Unfollow,
    Connect,
    Accept,
    Decline,
}

impl UserAction {
    pub fn path_segment(&self) -> &'static str {
        match self {
            UserAction::Follow => "follow",
            UserAction::Unfollow => "unfollow",
            UserAction::Connect => "connect",
            UserAction::Accept => "accept",
            UserAction::Decline => "decline",
        }
    }
}

fn decode<T: DeserializeOwned>(value: serde_json::Value, what: &str) -> Result<T, Error> {
    Ok(serde_json::from_value(value).with_context(|| format!("decoding {what}"))?)
}

fn encode<T: serde::Serialize>(value: &T, what: &str) -> Result<serde_json::Value, Error> {
    Ok(serde_json::to_value(value).with_context(|| format!("encoding {what}"))?)
}

impl<B: Backend> Remote<B> {
    pub fn new(backend: B, project: ProjectId) -> Result<Remote<B>, Error> {
        if project.is_empty() {
            return Err(Error::MissingProject);
        }
        Ok(Remote { backend, project })
    }

    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, Error> {
        let path = format!("/{}{}", self.project, path);
        tracing::debug!(method = method.as_str(), %path, "sending request");
        Ok(self.backend.request(method, &path, params, body).await?)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
        what: &str,
    ) -> Result<T, Error> {
        decode(self.call(Method::Get, path, params, None).await?, what)
    }

    // comments

    pub async fn fetch_comments(&self, query: &CommentQuery) -> Result<Vec<Comment>, Error> {
        self.get("/comments", &query.to_params(), "comments").await
    }

    pub async fn fetch_comment(&self, id: CommentId) -> Result<Comment, Error> {
        self.get(&format!("/comments/{}", id.0), &[], "comment").await
    }

    pub async fn create_comment(&self, comment: &NewComment) -> Result<Comment, Error> {
        let body = encode(comment, "new comment")?;
        decode(
            self.call(Method::Post, "/comments", &[], Some(body)).await?,
            "created comment",
        )
    }

    pub async fn delete_comment(&self, id: CommentId) -> Result<(), Error> {
        self.call(Method::Delete, &format!("/comments/{}", id.0), &[], None)
            .await?;
        Ok(())
    }

    pub async fn vote_comment(&self, id: CommentId, action: VoteAction) -> Result<Comment, Error> {
        let path = format!("/comments/{}/{}", id.0, action.path_segment());
        decode(
            self.call(Method::Patch, &path, &[], None).await?,
            "voted comment",
        )
    }

    // entities

    pub async fn fetch_entities(&self, query: &ListQuery) -> Result<Vec<Entity>, Error> {
        self.get("/entities", &query.to_params(), "entities").await
    }

    pub async fn create_entity(&self, entity: &NewEntity) -> Result<Entity, Error> {
        let body = encode(entity, "new entity")?;
        decode(
            self.call(Method::Post, "/entities", &[], Some(body)).await?,
            "created entity",
        )
    }

    pub async fn update_entity(&self, id: EntityId, patch: &EntityPatch) -> Result<Entity, Error> {
        let body = encode(patch, "entity patch")?;
        decode(
            self.call(Method::Patch, &format!("/entities/{}", id.0), &[], Some(body))
                .await?,
            "updated entity",
        )
    }

    pub async fn delete_entity(&self, id: EntityId) -> Result<(), Error> {
        self.call(Method::Delete, &format!("/entities/{}", id.0), &[], None)
            .await?;
        Ok(())
    }

    pub async fn vote_entity(&self, id: EntityId, action: VoteAction) -> Result<Entity, Error> {
        let path = format!("/entities/{}/{}", id.0, action.path_segment());
        decode(
            self.call(Method::Patch, &path, &[], None).await?,
            "voted entity",
        )
    }

    // notifications

    pub async fn fetch_notifications(&self, query: &ListQuery) -> Result<Vec<Notification>, Error> {
        self.get("/notifications", &query.to_params(), "notifications")
            .await
    }

    pub async fn mark_notification_read(&self, id: NotificationId) -> Result<Notification, Error> {
        let path = format!("/notifications/{}/read", id.0);
        decode(
            self.call(Method::Patch, &path, &[], None).await?,
            "read notification",
        )
    }

    pub async fn mark_all_notifications_read(&self) -> Result<(), Error> {
        self.call(Method::Patch, "/notifications/read-all", &[], None)
            .await?;
        Ok(())
    }

    pub async fn delete_notification(&self, id: NotificationId) -> Result<(), Error> {
        self.call(Method::Delete, &format!("/notifications/{}", id.0), &[], None)
            .await?;
        Ok(())
    }

    // collections

    pub async fn fetch_collections(&self, query: &ListQuery) -> Result<Vec<Collection>, Error> {
        self.get("/collections", &query.to_params(), "collections")
            .await
    }

    pub async fn create_collection(&self, collection: &NewCollection) -> Result<Collection, Error> {
        let body = encode(collection, "new collection")?;
        decode(
            self.call(Method::Post, "/collections", &[], Some(body))
                .await?,
            "created collection",
        )
    }

    pub async fn delete_collection(&self, id: CollectionId) -> Result<(), Error> {
        self.call(Method::Delete, &format!("/collections/{}", id.0), &[], None)
            .await?;
        Ok(())
    }

    pub async fn add_to_collection(
        &self,
        id: CollectionId,
        entity: EntityId,
    ) -> Result<Collection, Error> {
        let path = format!("/collections/{}/entities/{}", id.0, entity.0);
        decode(
            self.call(Method::Post, &path, &[], None).await?,
            "collection",
        )
    }

    pub async fn remove_from_collection(
        &self,
        id: CollectionId,
        entity: EntityId,
    ) -> Result<Collection, Error> {
        let path = format!("/collections/{}/entities/{}", id.0, entity.0);
        decode(
            self.call(Method::Delete, &path, &[], None).await?,
            "collection",
        )
    }

    // users

    pub async fn fetch_profile(&self, id: UserId) -> Result<Profile, Error> {
        self.get(&format!("/users/{}", id.0), &[], "profile").await
    }

    pub async fn user_action(&self, id: UserId, action: UserAction) -> Result<Profile, Error> {
        let path = format!("/users/{}/{}", id.0, action.path_segment());
        decode(self.call(Method::Post, &path, &[], None).await?, "profile")
    }

    pub async fn update_profile(&self, id: UserId, patch: &ProfilePatch) -> Result<Profile, Error> {
        let body = encode(patch, "profile patch")?;
        decode(
            self.call(Method::Patch, &format!("/users/{}", id.0), &[], Some(body))
                .await?,
            "updated profile",
        )
    }
}
