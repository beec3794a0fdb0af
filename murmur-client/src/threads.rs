use std::{collections::HashSet, sync::Arc};

use crate::{
    api::{
        self, Backend, Comment, CommentId, CommentQuery, CommentScope, EntityId, NewComment,
        SortBy, UserId, VoteAction,
    },
    comment::{CommentTree, InsertReport, TreeNode},
    optimistic::{Coordinator, Optimistic, OptimisticCommand, Outcome},
    state::{Action, ClientState, CommentAction},
    ClientConfig, Error, Remote, Session, Store,
};

/// Rewrite the replies count of `parent` if it is in the tree, returning the previous count
fn update_replies_count<F>(
    store: &Store<ClientState>,
    parent: Option<CommentId>,
    f: F,
) -> Option<u32>
where
    F: FnOnce(u32) -> u32,
{
    let parent = parent
        .and_then(|p| store.select(|s| s.comments.get(&p).map(|n| n.comment.clone())))?;
    let previous = parent.replies_count;
    store.dispatch(Action::Comments(CommentAction::Update(Comment {
        replies_count: f(previous),
        ..parent
    })));
    Some(previous)
}

/// A comment shown before the server confirmed it
struct PendingComment {
    store: Store<ClientState>,
    temporary_id: CommentId,
    comment: Option<Comment>,
}

impl OptimisticCommand for PendingComment {
    type Server = Comment;

    fn apply(&mut self) {
        if let Some(c) = self.comment.take() {
            self.store.dispatch(Action::Comments(CommentAction::Insert {
                comments: vec![c],
                is_new: true,
            }));
        }
    }

    fn commit(&mut self, comment: Comment) {
        let parent = comment.parent_id;
        self.store.dispatch(Action::Comments(CommentAction::Replace {
            temporary_id: self.temporary_id,
            comment,
        }));
        update_replies_count(&self.store, parent, |n| n + 1);
    }

    fn rollback(&mut self) {
        self.store
            .dispatch(Action::Comments(CommentAction::Remove(self.temporary_id)));
    }
}

/// A comment removed along with its replies, restored as it was if the server refuses
struct RemovedComment {
    store: Store<ClientState>,
    id: CommentId,
    parent: Option<CommentId>,

    /// Replies count of the parent before the removal
    parent_replies: Option<u32>,
    subtree: Vec<TreeNode>,
}

impl OptimisticCommand for RemovedComment {
    type Server = ();

    fn apply(&mut self) {
        self.store
            .dispatch(Action::Comments(CommentAction::Remove(self.id)));
        self.parent_replies =
            update_replies_count(&self.store, self.parent, |n| n.saturating_sub(1));
    }

    fn commit(&mut self, _: ()) {}

    fn rollback(&mut self) {
        // parents come first in the subtree, so every reply finds its parent back
        for node in self.subtree.drain(..) {
            let id = node.comment.id;
            self.store.dispatch(Action::Comments(CommentAction::Insert {
                comments: vec![node.comment],
                is_new: node.is_new,
            }));
            if node.failed {
                self.store
                    .dispatch(Action::Comments(CommentAction::MarkFailed(id)));
            }
        }
        if let Some(count) = self.parent_replies.take() {
            update_replies_count(&self.store, self.parent, |_| count);
        }
    }
}

/// Comment threads of the project, kept in the store's comment tree
pub struct CommentThreads<B> {
    store: Store<ClientState>,
    remote: Arc<Remote<B>>,
    session: Session,
    config: ClientConfig,
    coordinator: Coordinator<CommentId>,
}

impl<B> Clone for CommentThreads<B> {
    fn clone(&self) -> Self {
        CommentThreads {
            store: self.store.clone(),
            remote: self.remote.clone(),
            session: self.session.clone(),
            config: self.config.clone(),
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<B: Backend> CommentThreads<B> {
    pub fn new(
        store: Store<ClientState>,
        remote: Arc<Remote<B>>,
        session: Session,
        config: ClientConfig,
    ) -> CommentThreads<B> {
        CommentThreads {
            store,
            remote,
            session,
            config,
            coordinator: Coordinator::new(),
        }
    }

    pub fn tree(&self) -> CommentTree {
        self.store.select(|s| s.comments.clone())
    }

    pub fn is_updating(&self, id: &CommentId) -> bool {
        self.coordinator.is_updating(id)
    }

    fn insert(&self, comments: Vec<Comment>, is_new: bool) -> InsertReport {
        self.store
            .dispatch(Action::Comments(CommentAction::Insert { comments, is_new }))
            .insert_report()
    }

    /// Insert comments given in any order, retrying the skipped ones as long as that makes
    /// progress
    fn insert_all(&self, comments: Vec<Comment>, is_new: bool) -> InsertReport {
        let mut total = InsertReport {
            inserted: 0,
            skipped: comments,
        };
        loop {
            let report = self.insert(std::mem::take(&mut total.skipped), is_new);
            total.inserted += report.inserted;
            total.skipped = report.skipped;
            if report.inserted == 0 || total.skipped.is_empty() {
                return total;
            }
        }
    }

    /// Fetch one page of comments into the tree. Replies to comments not in the tree are left
    /// out, and listed in the returned report.
    pub async fn fetch(&self, query: &CommentQuery, is_new: bool) -> Result<InsertReport, Error> {
        let comments = match self.remote.fetch_comments(query).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("{}", e.diagnostic("Error fetching comments"));
                return Err(e);
            }
        };
        let report = self.insert(comments, is_new);
        if report.skipped_count() > 0 {
            tracing::warn!(
                skipped = report.skipped_count(),
                "some replies were fetched before their parent"
            );
        }
        Ok(report)
    }

    fn query(&self, scope: CommentScope, sort_by: SortBy, page: u32) -> CommentQuery {
        CommentQuery {
            sort_by,
            page,
            limit: self.config.default_limit,
            ..CommentQuery::new(scope)
        }
    }

    pub async fn fetch_for_entity(
        &self,
        entity: EntityId,
        sort_by: SortBy,
        page: u32,
    ) -> Result<InsertReport, Error> {
        self.fetch(&self.query(CommentScope::Entity(entity), sort_by, page), false)
            .await
    }

    pub async fn fetch_for_user(
        &self,
        user: UserId,
        sort_by: SortBy,
        page: u32,
    ) -> Result<InsertReport, Error> {
        self.fetch(&self.query(CommentScope::User(user), sort_by, page), false)
            .await
    }

    pub async fn fetch_replies(
        &self,
        parent: CommentId,
        sort_by: SortBy,
        page: u32,
    ) -> Result<InsertReport, Error> {
        self.fetch(&self.query(CommentScope::Parent(parent), sort_by, page), false)
            .await
    }

    /// Fetch a single comment, eg. one linked to from a notification, along with whichever of
    /// its ancestors are missing. It is marked as new.
    pub async fn fetch_highlight(&self, id: CommentId) -> Result<InsertReport, Error> {
        let comment = self.remote.fetch_comment(id).await?;
        let report = self.insert(vec![comment], true);
        self.repair_orphans(report, true).await
    }

    /// Fetch the missing ancestors of the replies skipped in `report`, then insert these
    /// replies again
    pub async fn repair_orphans(
        &self,
        report: InsertReport,
        is_new: bool,
    ) -> Result<InsertReport, Error> {
        if report.skipped.is_empty() {
            return Ok(report);
        }
        let mut missing = report.missing_parents().into_iter().collect::<Vec<_>>();
        let mut seen = HashSet::new();
        let mut ancestors = Vec::new();
        while let Some(id) = missing.pop() {
            if !seen.insert(id) || self.store.select(|s| s.comments.contains(&id)) {
                continue;
            }
            tracing::debug!(comment = ?id, "fetching missing parent");
            let c = self.remote.fetch_comment(id).await?;
            missing.extend(c.parent_id);
            ancestors.push(c);
        }
        let repaired = self.insert_all(ancestors, false);
        let res = self.insert_all(report.skipped, is_new);
        Ok(InsertReport {
            inserted: report.inserted + repaired.inserted + res.inserted,
            skipped: res.skipped,
        })
    }

    /// Show the comment right away, under a temporary id until the server confirms it. If the
    /// server refuses it, it is removed again.
    pub async fn create(&self, new: NewComment) -> Result<Comment, Error> {
        let author = self.session.require_user()?;
        if new.content.trim().is_empty() && new.gif.is_none() {
            return Err(Error::EmptyContent);
        }
        let temporary_id = CommentId::temporary();
        let command = PendingComment {
            store: self.store.clone(),
            temporary_id,
            comment: Some(new.to_pending(temporary_id, author, api::now())),
        };
        self.coordinator
            .perform(temporary_id, "Error creating comment", command, async {
                let c = self.remote.create_comment(&new).await?;
                Ok::<_, Error>((c.clone(), c))
            })
            .await?
            .committed()
            .ok_or(Error::MissingId("pending comment"))
    }

    /// Remove a comment and all its replies right away, restoring them if the server refuses
    pub async fn delete(&self, id: CommentId) -> Result<Outcome<()>, Error> {
        self.session.require_user()?;
        let subtree = self.store.select(|s| s.comments.subtree(&id));
        if subtree.is_empty() {
            return Err(Error::MissingId("comment"));
        }
        let command = RemovedComment {
            store: self.store.clone(),
            id,
            parent: subtree[0].comment.parent_id,
            parent_replies: None,
            subtree,
        };
        self.coordinator
            .perform(id, "Error deleting comment", command, async {
                self.remote.delete_comment(id).await?;
                Ok::<_, Error>(((), ()))
            })
            .await
    }

    pub async fn vote(&self, id: CommentId, action: VoteAction) -> Result<Outcome<Comment>, Error> {
        let user = self.session.require_user()?;
        let current = self
            .store
            .select(|s| s.comments.get(&id).map(|n| n.comment.clone()))
            .ok_or(Error::MissingId("comment"))?;
        let next = Comment {
            votes: current.votes.applied(action, user),
            ..current.clone()
        };
        let store = self.store.clone();
        let command = Optimistic::new(current, next, move |c| {
            store.dispatch(Action::Comments(CommentAction::Update(c)));
        });
        self.coordinator
            .perform(id, "Error voting on comment", command, async {
                let c = self.remote.vote_comment(id, action).await?;
                Ok::<_, Error>((c.clone(), c))
            })
            .await
    }

    /// Flag a comment whose confirmation failed, leaving it in place
    pub fn mark_failed(&self, id: CommentId) -> bool {
        self.store
            .dispatch(Action::Comments(CommentAction::MarkFailed(id)))
            .changed()
    }

    pub fn clear(&self) {
        self.store.dispatch(Action::Comments(CommentAction::Clear));
    }
}
