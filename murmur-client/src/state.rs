use std::{collections::HashMap, sync::Arc};

use crate::{
    api::{self, Collection, Comment, CommentId, Entity, Notification, Profile, UserId},
    comment::{CommentTree, InsertReport},
    list::{ListAction, ListCache},
    store::Reducer,
    ClientConfig,
};

/// Everything the client holds on behalf of the UI
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientState {
    pub comments: CommentTree,
    pub entities: ListCache<Entity>,
    pub notifications: ListCache<Notification>,
    pub collections: ListCache<Collection>,
    pub profiles: Arc<HashMap<UserId, Arc<Profile>>>,
}

impl ClientState {
    pub fn new(config: &ClientConfig) -> ClientState {
        let (limit, sort) = (config.default_limit, config.default_sort);
        ClientState {
            comments: CommentTree::new(),
            entities: ListCache::new(limit, sort),
            notifications: ListCache::new(limit, sort),
            collections: ListCache::new(limit, sort),
            profiles: Arc::new(HashMap::new()),
        }
    }

    pub fn profile(&self, user: &UserId) -> Option<&Profile> {
        self.profiles.get(user).map(|p| &**p)
    }
}

#[derive(Clone, Debug)]
pub enum CommentAction {
    Insert {
        comments: Vec<Comment>,
        is_new: bool,
    },
    Remove(CommentId),
    MarkFailed(CommentId),
    Update(Comment),

    /// A pending comment was confirmed by the server
    Replace {
        temporary_id: CommentId,
        comment: Comment,
    },
    Clear,
}

#[derive(Clone, Debug)]
pub enum ProfileAction {
    Upsert(Profile),
    Remove(UserId),
}

#[derive(Clone, Debug)]
pub enum Action {
    Comments(CommentAction),
    Entities(ListAction<Entity>),
    Notifications(ListAction<Notification>),
    Collections(ListAction<Collection>),
    Profiles(ProfileAction),
}

/// What a dispatched action did
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reduced {
    Inserted(InsertReport),
    Removed(Vec<CommentId>),
    Changed(bool),
}

impl Reduced {
    pub fn changed(&self) -> bool {
        match self {
            Reduced::Inserted(r) => r.inserted > 0,
            Reduced::Removed(ids) => !ids.is_empty(),
            Reduced::Changed(c) => *c,
        }
    }

    pub fn insert_report(self) -> InsertReport {
        match self {
            Reduced::Inserted(r) => r,
            _ => InsertReport::default(),
        }
    }
}

impl Reducer for ClientState {
    type Action = Action;
    type Outcome = Reduced;

    fn reduce(&mut self, action: Action) -> Reduced {
        match action {
            Action::Comments(a) => match a {
                CommentAction::Insert { comments, is_new } => {
                    Reduced::Inserted(self.comments.insert(comments, is_new))
                }
                CommentAction::Remove(id) => Reduced::Removed(self.comments.remove(&id)),
                CommentAction::MarkFailed(id) => Reduced::Changed(self.comments.mark_failed(&id)),
                CommentAction::Update(c) => Reduced::Changed(self.comments.update(c)),
                CommentAction::Replace {
                    temporary_id,
                    comment,
                } => Reduced::Inserted(self.comments.replace(&temporary_id, comment)),
                CommentAction::Clear => {
                    let had_any = !self.comments.is_empty();
                    self.comments.clear();
                    Reduced::Changed(had_any)
                }
            },
            Action::Entities(a) => Reduced::Changed(self.entities.reduce(a, api::now())),
            Action::Notifications(a) => {
                Reduced::Changed(self.notifications.reduce(a, api::now()))
            }
            Action::Collections(a) => Reduced::Changed(self.collections.reduce(a, api::now())),
            Action::Profiles(ProfileAction::Upsert(p)) => {
                Arc::make_mut(&mut self.profiles).insert(p.id, Arc::new(p));
                Reduced::Changed(true)
            }
            Action::Profiles(ProfileAction::Remove(id)) => {
                let existed = self.profiles.contains_key(&id);
                if existed {
                    Arc::make_mut(&mut self.profiles).remove(&id);
                }
                Reduced::Changed(existed)
            }
        }
    }
}
