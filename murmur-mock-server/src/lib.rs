use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use murmur_api::{
    self as api, ApiError, Backend, Collection, CollectionId, Comment, CommentId, CommentQuery,
    CommentScope, ConnectionStatus, Entity, EntityId, EntityPatch, ListFilters, ListQuery, Method,
    NewCollection, NewComment, NewEntity, Notification, NotificationId, Profile, ProfilePatch,
    SortBy, SortDir, UserId, Uuid, VoteAction, Votes,
};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// In-memory stand-in for the backend of one project, recording every request it gets
pub struct MockServer(Mutex<Db>);

/// A request as received by the mock server
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Request {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

struct Db {
    current_user: UserId,
    comments: Vec<Comment>,
    entities: Vec<Entity>,
    notifications: Vec<Notification>,
    collections: Vec<Collection>,
    profiles: BTreeMap<UserId, Profile>,
    requests: Vec<Request>,
    next_failures: VecDeque<ApiError>,
    fail_all: Option<ApiError>,
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::internal(format!("serializing: {e}")))
}

fn from_body<T: DeserializeOwned>(body: Option<Value>) -> Result<T, ApiError> {
    let body = body.ok_or_else(|| ApiError::bad_request("Missing request body"))?;
    serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request("Invalid request body").with_details(e.to_string()))
}

fn parse_id(segment: &str, what: &str) -> Result<Uuid, ApiError> {
    segment
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid {what} id")).with_details(segment))
}

fn paginate<T>(items: Vec<T>, page: u32, limit: u32) -> Vec<T> {
    let skip = page.saturating_sub(1) as usize * limit as usize;
    items.into_iter().skip(skip).take(limit as usize).collect()
}

fn method_not_allowed(method: Method, path: &str) -> ApiError {
    ApiError::new(405, "Method not allowed").with_details(format!("{} {path}", method.as_str()))
}

fn matches_any(haystack: &str, needles: &[String]) -> bool {
    needles.is_empty() || {
        let haystack = haystack.to_lowercase();
        needles
            .iter()
            .any(|n| haystack.contains(&n.to_lowercase()))
    }
}

fn sort_by_votes<T, F>(items: &mut [T], sort_by: SortBy, key: F)
where
    F: Fn(&T) -> (&Votes, api::Time),
{
    match sort_by {
        SortBy::New => items.sort_by_key(|i| std::cmp::Reverse(key(i).1)),
        SortBy::Top | SortBy::Hot => {
            items.sort_by_key(|i| std::cmp::Reverse((key(i).0.score(), key(i).1)))
        }
        SortBy::Controversial => items.sort_by_key(|i| {
            let v = key(i).0;
            std::cmp::Reverse(v.up.len().min(v.down.len()))
        }),
    }
}

impl Db {
    fn profile_mut(&mut self, id: UserId) -> Result<&mut Profile, ApiError> {
        self.profiles
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found("user"))
    }

    fn comment_mut(&mut self, id: CommentId) -> Result<&mut Comment, ApiError> {
        self.comments
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ApiError::not_found("comment"))
    }

    fn entity_mut(&mut self, id: EntityId) -> Result<&mut Entity, ApiError> {
        self.entities
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| ApiError::not_found("entity"))
    }

    fn collection_mut(&mut self, id: CollectionId) -> Result<&mut Collection, ApiError> {
        let user = self.current_user;
        let c = self
            .collections
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ApiError::not_found("collection"))?;
        match c.owner_id == user {
            true => Ok(c),
            false => Err(ApiError::forbidden()),
        }
    }

    fn route(
        &mut self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let segments = path.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>();
        // the first segment is the project, a single one is served
        match (method, &segments[1.min(segments.len())..]) {
            (Method::Get, ["comments"]) => self.fetch_comments(params),
            (Method::Post, ["comments"]) => self.create_comment(from_body(body)?),
            (Method::Get, ["comments", id]) => {
                let id = CommentId(parse_id(id, "comment")?);
                to_json(&*self.comment_mut(id)?)
            }
            (Method::Delete, ["comments", id]) => {
                self.delete_comment(CommentId(parse_id(id, "comment")?))
            }
            (Method::Patch, ["comments", id, action]) => {
                let action = VoteAction::from_path_segment(action)
                    .ok_or_else(|| ApiError::not_found("route"))?;
                let user = self.current_user;
                let c = self.comment_mut(CommentId(parse_id(id, "comment")?))?;
                action.apply(&mut c.votes, user);
                to_json(&*c)
            }

            (Method::Get, ["entities"]) => self.fetch_entities(params),
            (Method::Post, ["entities"]) => self.create_entity(from_body(body)?),
            (Method::Patch, ["entities", id]) => {
                let patch: EntityPatch = from_body(body)?;
                let user = self.current_user;
                let e = self.entity_mut(EntityId(parse_id(id, "entity")?))?;
                if e.author_id != user {
                    return Err(ApiError::forbidden());
                }
                patch.apply_to(e);
                to_json(&*e)
            }
            (Method::Delete, ["entities", id]) => {
                let id = EntityId(parse_id(id, "entity")?);
                let user = self.current_user;
                if self.entity_mut(id)?.author_id != user {
                    return Err(ApiError::forbidden());
                }
                self.entities.retain(|e| e.id != id);
                self.comments.retain(|c| c.entity_id != id);
                Ok(Value::Null)
            }
            (Method::Patch, ["entities", id, action]) => {
                let action = VoteAction::from_path_segment(action)
                    .ok_or_else(|| ApiError::not_found("route"))?;
                let user = self.current_user;
                let e = self.entity_mut(EntityId(parse_id(id, "entity")?))?;
                action.apply(&mut e.votes, user);
                to_json(&*e)
            }

            (Method::Get, ["notifications"]) => {
                let query = ListQuery::from_params(params)
                    .ok_or_else(|| ApiError::bad_request("Invalid list query"))?;
                let mut res = self
                    .notifications
                    .iter()
                    .filter(|n| n.user_id == self.current_user)
                    .cloned()
                    .collect::<Vec<_>>();
                res.sort_by_key(|n| std::cmp::Reverse(n.created_at));
                to_json(&paginate(res, query.page, query.limit))
            }
            (Method::Patch, ["notifications", "read-all"]) => {
                let user = self.current_user;
                for n in self.notifications.iter_mut().filter(|n| n.user_id == user) {
                    n.read = true;
                }
                Ok(Value::Null)
            }
            (Method::Patch, ["notifications", id, "read"]) => {
                let id = NotificationId(parse_id(id, "notification")?);
                let user = self.current_user;
                let n = self
                    .notifications
                    .iter_mut()
                    .find(|n| n.id == id && n.user_id == user)
                    .ok_or_else(|| ApiError::not_found("notification"))?;
                n.read = true;
                to_json(&*n)
            }
            (Method::Delete, ["notifications", id]) => {
                let id = NotificationId(parse_id(id, "notification")?);
                let user = self.current_user;
                let before = self.notifications.len();
                self.notifications
                    .retain(|n| !(n.id == id && n.user_id == user));
                match self.notifications.len() < before {
                    true => Ok(Value::Null),
                    false => Err(ApiError::not_found("notification")),
                }
            }

            (Method::Get, ["collections"]) => {
                let query = ListQuery::from_params(params)
                    .ok_or_else(|| ApiError::bad_request("Invalid list query"))?;
                let owner = query.filters.user_id.unwrap_or(self.current_user);
                let mut res = self
                    .collections
                    .iter()
                    .filter(|c| c.owner_id == owner)
                    .cloned()
                    .collect::<Vec<_>>();
                res.sort_by_key(|c| std::cmp::Reverse(c.created_at));
                to_json(&paginate(res, query.page, query.limit))
            }
            (Method::Post, ["collections"]) => {
                let new: NewCollection = from_body(body)?;
                if new.name.trim().is_empty() {
                    return Err(ApiError::bad_request("Collection name must not be empty"));
                }
                let c = new.to_pending(CollectionId(Uuid::new_v4()), self.current_user, api::now());
                self.collections.push(c.clone());
                to_json(&c)
            }
            (Method::Delete, ["collections", id]) => {
                let id = CollectionId(parse_id(id, "collection")?);
                self.collection_mut(id)?;
                self.collections.retain(|c| c.id != id);
                Ok(Value::Null)
            }
            (m @ (Method::Post | Method::Delete), ["collections", id, "entities", entity]) => {
                let id = CollectionId(parse_id(id, "collection")?);
                let entity = EntityId(parse_id(entity, "entity")?);
                if !self.entities.iter().any(|e| e.id == entity) {
                    return Err(ApiError::not_found("entity"));
                }
                let c = self.collection_mut(id)?;
                *c = match m {
                    Method::Post => c.with_entity(entity),
                    _ => c.without_entity(&entity),
                };
                to_json(&*c)
            }

            (Method::Get, ["users", id]) => {
                let id = UserId(parse_id(id, "user")?);
                to_json(&*self.profile_mut(id)?)
            }
            (Method::Patch, ["users", id]) => {
                let id = UserId(parse_id(id, "user")?);
                if id != self.current_user {
                    return Err(ApiError::forbidden());
                }
                let patch: ProfilePatch = from_body(body)?;
                let p = self.profile_mut(id)?;
                patch.apply_to(p);
                to_json(&*p)
            }
            (Method::Post, ["users", id, action]) => {
                let id = UserId(parse_id(id, "user")?);
                let user = self.current_user;
                if id == user {
                    return Err(ApiError::bad_request("Cannot target oneself"));
                }
                let p = self.profile_mut(id)?;
                match *action {
                    "follow" => {
                        p.followers.insert(user);
                    }
                    "unfollow" => {
                        p.followers.remove(&user);
                    }
                    "connect" => p.connection = ConnectionStatus::PendingOutgoing,
                    "accept" if p.connection == ConnectionStatus::PendingIncoming => {
                        p.connection = ConnectionStatus::Connected
                    }
                    "accept" => return Err(ApiError::bad_request("No pending connection request")),
                    "decline" => p.connection = ConnectionStatus::None,
                    _ => return Err(ApiError::not_found("route")),
                }
                to_json(&*p)
            }

            (_, ["comments" | "entities" | "notifications" | "collections" | "users", ..]) => {
                Err(method_not_allowed(method, path))
            }
            _ => Err(ApiError::not_found("route").with_details(path)),
        }
    }

    fn fetch_comments(&self, params: &[(String, String)]) -> Result<Value, ApiError> {
        let query = CommentQuery::from_params(params)
            .ok_or_else(|| ApiError::bad_request("Invalid comment query"))?;
        let mut res = self
            .comments
            .iter()
            .filter(|c| match query.scope {
                CommentScope::Entity(e) => c.entity_id == e && c.parent_id.is_none(),
                CommentScope::User(u) => c.author_id == u,
                CommentScope::Parent(p) => c.parent_id == Some(p),
            })
            .cloned()
            .collect::<Vec<_>>();
        sort_by_votes(&mut res, query.sort_by, |c| (&c.votes, c.created_at));
        to_json(&paginate(res, query.page, query.limit))
    }

    fn create_comment(&mut self, new: NewComment) -> Result<Value, ApiError> {
        if new.content.trim().is_empty() && new.gif.is_none() {
            return Err(ApiError::bad_request("Comment must not be empty"));
        }
        self.entity_mut(new.entity_id)?;
        if let Some(parent) = new.parent_id {
            self.comment_mut(parent)?.replies_count += 1;
        }
        self.entity_mut(new.entity_id)?.comments_count += 1;
        let c = new.to_pending(CommentId(Uuid::new_v4()), self.current_user, api::now());
        self.comments.push(c.clone());
        to_json(&c)
    }

    fn delete_comment(&mut self, id: CommentId) -> Result<Value, ApiError> {
        let c = self.comment_mut(id)?.clone();
        if c.author_id != self.current_user {
            return Err(ApiError::forbidden().with_details("not your comment"));
        }
        let mut removed = vec![id];
        let mut next = 0;
        while next < removed.len() {
            let parent = removed[next];
            removed.extend(
                self.comments
                    .iter()
                    .filter(|c| c.parent_id == Some(parent))
                    .map(|c| c.id),
            );
            next += 1;
        }
        self.comments.retain(|c| !removed.contains(&c.id));
        if let Some(parent) = c.parent_id {
            if let Ok(p) = self.comment_mut(parent) {
                p.replies_count = p.replies_count.saturating_sub(1);
            }
        }
        if let Ok(e) = self.entity_mut(c.entity_id) {
            e.comments_count = e.comments_count.saturating_sub(removed.len() as u32);
        }
        Ok(Value::Null)
    }

    fn fetch_entities(&self, params: &[(String, String)]) -> Result<Value, ApiError> {
        let query = ListQuery::from_params(params)
            .ok_or_else(|| ApiError::bad_request("Invalid list query"))?;
        let f = &query.filters;
        let now = api::now();
        let mut res = self
            .entities
            .iter()
            .filter(|e| self.entity_matches(e, f, now))
            .cloned()
            .collect::<Vec<_>>();
        sort_by_votes(&mut res, f.sort_by, |e| (&e.votes, e.created_at));
        if f.sort_dir == SortDir::Asc {
            res.reverse();
        }
        to_json(&paginate(res, query.page, query.limit))
    }

    fn entity_matches(&self, e: &Entity, f: &ListFilters, now: api::Time) -> bool {
        let followed = || {
            self.profiles
                .get(&e.author_id)
                .map_or(false, |p| p.is_followed_by(&self.current_user))
        };
        f.user_id.map_or(true, |u| e.author_id == u)
            && (!f.followed_only || followed())
            && f.time_frame.duration().map_or(true, |d| now - e.created_at <= d)
            && matches_any(&e.title, &f.title_filters)
            && matches_any(&e.content, &f.content_filters)
            && matches_any(e.location.as_deref().unwrap_or(""), &f.location_filters)
            && (f.keywords_filters.is_empty()
                || e.keywords.iter().any(|k| f.keywords_filters.contains(k)))
            && (f.attachments_filters.is_empty()
                || e.attachments.iter().any(|a| f.attachments_filters.contains(a)))
            && f.metadata_filters
                .iter()
                .all(|(k, v)| e.metadata.get(k) == Some(v))
            && f.source_id
                .as_ref()
                .map_or(true, |s| e.source_id.as_ref() == Some(s))
    }

    fn create_entity(&mut self, new: NewEntity) -> Result<Value, ApiError> {
        if new.title.trim().is_empty() {
            return Err(ApiError::bad_request("Title must not be empty"));
        }
        let e = new.to_pending(EntityId(Uuid::new_v4()), self.current_user, api::now());
        self.entities.push(e.clone());
        to_json(&e)
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer::as_user(UserId::stub())
    }

    /// A server on which every request is made as `user`
    pub fn as_user(user: UserId) -> MockServer {
        MockServer(Mutex::new(Db {
            current_user: user,
            comments: Vec::new(),
            entities: Vec::new(),
            notifications: Vec::new(),
            collections: Vec::new(),
            profiles: BTreeMap::new(),
            requests: Vec::new(),
            next_failures: VecDeque::new(),
            fail_all: None,
        }))
    }

    pub fn current_user(&self) -> UserId {
        self.0.lock().current_user
    }

    pub fn add_comments(&self, comments: Vec<Comment>) {
        self.0.lock().comments.extend(comments);
    }

    pub fn add_entities(&self, entities: Vec<Entity>) {
        self.0.lock().entities.extend(entities);
    }

    pub fn add_notifications(&self, notifications: Vec<Notification>) {
        self.0.lock().notifications.extend(notifications);
    }

    pub fn add_collections(&self, collections: Vec<Collection>) {
        self.0.lock().collections.extend(collections);
    }

    pub fn add_profiles(&self, profiles: Vec<Profile>) {
        let mut db = self.0.lock();
        for p in profiles {
            db.profiles.insert(p.id, p);
        }
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.0.lock().comments.clone()
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.0.lock().entities.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.0.lock().notifications.clone()
    }

    pub fn collections(&self) -> Vec<Collection> {
        self.0.lock().collections.clone()
    }

    pub fn profile(&self, id: UserId) -> Option<Profile> {
        self.0.lock().profiles.get(&id).cloned()
    }

    /// Make the next request fail with `err`, whatever it is
    pub fn fail_next(&self, err: ApiError) {
        self.0.lock().next_failures.push_back(err);
    }

    /// Make every request fail with `err` until called again with `None`
    pub fn fail_all(&self, err: Option<ApiError>) {
        self.0.lock().fail_all = err;
    }

    /// Every request received so far, oldest first
    pub fn requests(&self) -> Vec<Request> {
        self.0.lock().requests.clone()
    }

    pub fn count_requests(&self, method: Method, path: &str) -> usize {
        self.0
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn clear_requests(&self) {
        self.0.lock().requests.clear();
    }

    fn handle(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let mut db = self.0.lock();
        db.requests.push(Request {
            method,
            path: path.to_string(),
            params: params.to_vec(),
            body: body.clone(),
        });
        if let Some(err) = db.next_failures.pop_front() {
            return Err(err);
        }
        if let Some(err) = &db.fail_all {
            return Err(err.clone());
        }
        db.route(method, path, params, body)
    }
}

#[async_trait]
impl Backend for MockServer {
    async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let res = self.handle(method, path, params, body);
        if let Err(e) = &res {
            tracing::debug!(method = method.as_str(), %path, "mock server refused request: {e}");
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(title: &str, author: UserId) -> Entity {
        NewEntity {
            title: title.to_string(),
            content: String::from("content"),
            ..NewEntity::default()
        }
        .to_pending(EntityId(Uuid::new_v4()), author, api::now())
    }

    fn call(
        server: &MockServer,
        method: Method,
        path: &str,
        params: Vec<(String, String)>,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        server.handle(method, path, &params, body)
    }

    #[test]
    fn entities_are_filtered_and_paginated() {
        let server = MockServer::new();
        let other = UserId(Uuid::new_v4());
        server.add_entities(
            (0..15)
                .map(|i| entity(&format!("mine {i}"), UserId::stub()))
                .chain((0..3).map(|i| entity(&format!("theirs {i}"), other)))
                .collect(),
        );
        let mut query = ListQuery {
            filters: ListFilters::sorted_by(SortBy::New),
            page: 2,
            limit: 10,
        };
        query.filters.user_id = Some(UserId::stub());
        let res = call(&server, Method::Get, "/demo/entities", query.to_params(), None).unwrap();
        assert_eq!(res.as_array().unwrap().len(), 5);

        query.filters.user_id = None;
        query.filters.title_filters = vec![String::from("THEIRS")];
        query.page = 1;
        let res = call(&server, Method::Get, "/demo/entities", query.to_params(), None).unwrap();
        let res: Vec<Entity> = serde_json::from_value(res).unwrap();
        assert_eq!(res.len(), 3);
        assert!(res.iter().all(|e| e.author_id == other));
        assert_eq!(server.count_requests(Method::Get, "/demo/entities"), 2);
    }

    #[test]
    fn failures_are_injected_in_order() {
        let server = MockServer::new();
        server.fail_next(ApiError::internal("first"));
        let params = ListQuery {
            filters: ListFilters::default(),
            page: 1,
            limit: 10,
        }
        .to_params();
        assert_eq!(
            call(&server, Method::Get, "/demo/entities", params.clone(), None),
            Err(ApiError::internal("first"))
        );
        assert!(call(&server, Method::Get, "/demo/entities", params.clone(), None).is_ok());
        server.fail_all(Some(ApiError::forbidden()));
        assert_eq!(
            call(&server, Method::Get, "/demo/entities", params, None),
            Err(ApiError::forbidden())
        );
        assert_eq!(server.requests().len(), 3);
    }

    #[test]
    fn deleting_a_comment_removes_its_replies() {
        let server = MockServer::new();
        let e = entity("post", UserId::stub());
        server.add_entities(vec![e.clone()]);
        let mut parent = None;
        for content in ["root", "reply", "nested"] {
            let new = NewComment {
                entity_id: e.id,
                parent_id: parent,
                content: content.to_string(),
                gif: None,
                mentions: Vec::new(),
            };
            let c = call(
                &server,
                Method::Post,
                "/demo/comments",
                Vec::new(),
                Some(to_json(&new).unwrap()),
            )
            .unwrap();
            parent = Some(serde_json::from_value::<Comment>(c).unwrap().id);
        }
        let root = server.comments()[0].id;
        assert_eq!(server.comments()[1].replies_count, 1);
        call(
            &server,
            Method::Delete,
            &format!("/demo/comments/{}", root.0),
            Vec::new(),
            None,
        )
        .unwrap();
        assert!(server.comments().is_empty());
        assert_eq!(server.entities()[0].comments_count, 0);
    }

    #[test]
    fn unknown_routes() {
        let server = MockServer::new();
        let err = call(&server, Method::Get, "/demo/nothing", Vec::new(), None).unwrap_err();
        assert!(err.is_not_found());
        let err = call(&server, Method::Delete, "/demo/entities", Vec::new(), None).unwrap_err();
        assert_eq!(err.status, 405);
    }
}
