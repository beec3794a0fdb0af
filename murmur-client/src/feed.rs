use std::{marker::PhantomData, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;

use crate::{
    api::{
        self, Backend, Collection, CollectionId, Entity, EntityId, EntityPatch, FilterPatch,
        ListId, ListQuery, Listed, NewCollection, NewEntity, Notification, NotificationId, Time,
        UserId, Uuid, VoteAction,
    },
    list::{InsertPosition, ListAction, ListCache, ListState},
    optimistic::{Coordinator, Optimistic, OptimisticCommand, Outcome},
    state::{Action, ClientState, Reduced},
    ClientConfig, Debouncer, Error, Remote, Session, Store,
};

/// One kind of paginated feed, and how to fetch it
#[async_trait]
pub trait FeedKind: Send + Sync + 'static {
    type Item: Listed + Eq;

    /// Used in log and error messages
    const NAME: &'static str;

    fn slice(state: &ClientState) -> &ListCache<Self::Item>;
    fn action(action: ListAction<Self::Item>) -> Action;

    async fn fetch<B: Backend>(
        remote: &Remote<B>,
        query: &ListQuery,
    ) -> Result<Vec<Self::Item>, Error>;
}

/// Feeds whose items the current user can create
#[async_trait]
pub trait Creatable: FeedKind {
    type New: Send + Sync;

    /// Locally displayed version of `new`, under a temporary key
    fn pending(new: &Self::New, author: UserId, now: Time) -> Self::Item;

    async fn create<B: Backend>(remote: &Remote<B>, new: &Self::New) -> Result<Self::Item, Error>;
}

/// Feeds whose items the current user can delete
#[async_trait]
pub trait Removable: FeedKind {
    async fn delete<B: Backend>(remote: &Remote<B>, key: Uuid) -> Result<(), Error>;
}

pub struct Entities;
pub struct Notifications;
pub struct Collections;

#[async_trait]
impl FeedKind for Entities {
    type Item = Entity;
    const NAME: &'static str = "entities";

    fn slice(state: &ClientState) -> &ListCache<Entity> {
        &state.entities
    }

    fn action(action: ListAction<Entity>) -> Action {
        Action::Entities(action)
    }

    async fn fetch<B: Backend>(
        remote: &Remote<B>,
        query: &ListQuery,
    ) -> Result<Vec<Entity>, Error> {
        remote.fetch_entities(query).await
    }
}

#[async_trait]
impl Creatable for Entities {
    type New = NewEntity;

    fn pending(new: &NewEntity, author: UserId, now: Time) -> Entity {
        new.to_pending(EntityId(Uuid::new_v4()), author, now)
    }

    async fn create<B: Backend>(remote: &Remote<B>, new: &NewEntity) -> Result<Entity, Error> {
        remote.create_entity(new).await
    }
}

#[async_trait]
impl Removable for Entities {
    async fn delete<B: Backend>(remote: &Remote<B>, key: Uuid) -> Result<(), Error> {
        remote.delete_entity(EntityId(key)).await
    }
}

#[async_trait]
impl FeedKind for Notifications {
    type Item = Notification;
    const NAME: &'static str = "notifications";

    fn slice(state: &ClientState) -> &ListCache<Notification> {
        &state.notifications
    }

    fn action(action: ListAction<Notification>) -> Action {
        Action::Notifications(action)
    }

    async fn fetch<B: Backend>(
        remote: &Remote<B>,
        query: &ListQuery,
    ) -> Result<Vec<Notification>, Error> {
        remote.fetch_notifications(query).await
    }
}

#[async_trait]
impl Removable for Notifications {
    async fn delete<B: Backend>(remote: &Remote<B>, key: Uuid) -> Result<(), Error> {
        remote.delete_notification(NotificationId(key)).await
    }
}

#[async_trait]
impl FeedKind for Collections {
    type Item = Collection;
    const NAME: &'static str = "collections";

    fn slice(state: &ClientState) -> &ListCache<Collection> {
        &state.collections
    }

    fn action(action: ListAction<Collection>) -> Action {
        Action::Collections(action)
    }

    async fn fetch<B: Backend>(
        remote: &Remote<B>,
        query: &ListQuery,
    ) -> Result<Vec<Collection>, Error> {
        remote.fetch_collections(query).await
    }
}

#[async_trait]
impl Creatable for Collections {
    type New = NewCollection;

    fn pending(new: &NewCollection, author: UserId, now: Time) -> Collection {
        new.to_pending(CollectionId(Uuid::new_v4()), author, now)
    }

    async fn create<B: Backend>(
        remote: &Remote<B>,
        new: &NewCollection,
    ) -> Result<Collection, Error> {
        remote.create_collection(new).await
    }
}

#[async_trait]
impl Removable for Collections {
    async fn delete<B: Backend>(remote: &Remote<B>, key: Uuid) -> Result<(), Error> {
        remote.delete_collection(CollectionId(key)).await
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UpdateOptions {
    /// Fetch right away instead of waiting for the quiet period
    pub immediate: bool,

    /// Reset every filter not in the patch to its default
    pub reset_unspecified: bool,

    /// Page length for this list, kept for later updates
    pub limit: Option<u32>,
}

impl UpdateOptions {
    pub fn immediate() -> UpdateOptions {
        UpdateOptions {
            immediate: true,
            ..UpdateOptions::default()
        }
    }
}

/// Optimistic insertion of an item the server has not created yet
struct PendingItem<K: FeedKind> {
    store: Store<ClientState>,
    list: ListId,
    key: Uuid,
    item: Option<K::Item>,
    position: InsertPosition,
}

impl<K: FeedKind> OptimisticCommand for PendingItem<K> {
    type Server = K::Item;

    fn apply(&mut self) {
        if let Some(entity) = self.item.take() {
            self.store.dispatch(K::action(ListAction::AddEntity {
                list: self.list.clone(),
                entity,
                position: self.position,
            }));
        }
    }

    fn commit(&mut self, entity: K::Item) {
        self.store.dispatch(K::action(ListAction::ReplaceEntity {
            key: self.key,
            entity,
        }));
    }

    fn rollback(&mut self) {
        self.store.dispatch(K::action(ListAction::RemoveEntity {
            list: self.list.clone(),
            key: self.key,
        }));
    }
}

/// Optimistic removal, restored at its previous index on failure
struct RemovedItem<K: FeedKind> {
    store: Store<ClientState>,
    list: ListId,
    key: Uuid,
    restore: Option<(usize, K::Item)>,
}

impl<K: FeedKind> OptimisticCommand for RemovedItem<K> {
    type Server = ();

    fn apply(&mut self) {
        self.store.dispatch(K::action(ListAction::RemoveEntity {
            list: self.list.clone(),
            key: self.key,
        }));
    }

    fn commit(&mut self, _: ()) {}

    fn rollback(&mut self) {
        if let Some((index, entity)) = self.restore.take() {
            self.store.dispatch(K::action(ListAction::InsertAt {
                list: self.list.clone(),
                index,
                entity,
            }));
        }
    }
}

/// Every notification marked read at once, each restored on failure
struct AllRead {
    store: Store<ClientState>,
    unread: Vec<Notification>,
}

impl AllRead {
    fn write(&self, read: bool) {
        for n in self.unread.iter() {
            self.store
                .dispatch(Action::Notifications(ListAction::ReplaceEntity {
                    key: n.list_key(),
                    entity: Notification { read, ..n.clone() },
                }));
        }
    }
}

impl OptimisticCommand for AllRead {
    type Server = ();

    fn apply(&mut self) {
        self.write(true);
    }

    fn commit(&mut self, _: ()) {}

    fn rollback(&mut self) {
        self.write(false);
    }
}

/// Paginated, filterable lists of one kind of item.
///
/// Clones share the same store, debounce timers and in-flight guards.
pub struct ListFeed<K, B> {
    store: Store<ClientState>,
    remote: Arc<Remote<B>>,
    session: Session,
    config: ClientConfig,
    debouncer: Arc<Debouncer<ListId>>,
    coordinator: Coordinator<Uuid>,
    kind: PhantomData<fn() -> K>,
}

impl<K, B> Clone for ListFeed<K, B> {
    fn clone(&self) -> Self {
        ListFeed {
            store: self.store.clone(),
            remote: self.remote.clone(),
            session: self.session.clone(),
            config: self.config.clone(),
            debouncer: self.debouncer.clone(),
            coordinator: self.coordinator.clone(),
            kind: PhantomData,
        }
    }
}

impl<K, B> ListFeed<K, B>
where
    K: FeedKind,
    B: Backend + 'static,
{
    pub fn new(
        store: Store<ClientState>,
        remote: Arc<Remote<B>>,
        session: Session,
        config: ClientConfig,
    ) -> ListFeed<K, B> {
        ListFeed {
            store,
            remote,
            session,
            config,
            debouncer: Arc::new(Debouncer::new()),
            coordinator: Coordinator::new(),
            kind: PhantomData,
        }
    }

    fn dispatch(&self, action: ListAction<K::Item>) -> Reduced {
        self.store.dispatch(K::action(action))
    }

    pub fn state(&self, list: &ListId) -> Option<ListState<K::Item>> {
        self.store.select(|s| K::slice(s).get(list).cloned())
    }

    pub fn is_updating(&self, key: &Uuid) -> bool {
        self.coordinator.is_updating(key)
    }

    pub fn is_fetch_pending(&self, list: &ListId) -> bool {
        self.debouncer.is_pending(list)
    }

    /// Create the list and fetch its first page, unless it already exists. Returns whether the
    /// list was created.
    pub async fn initialize(&self, list: &ListId) -> Result<bool, Error> {
        if !self.dispatch(ListAction::Initialize(list.clone())).changed() {
            return Ok(false);
        }
        self.fetch(list).await?;
        Ok(true)
    }

    /// Change the filters of a list, resetting it to its first page.
    ///
    /// The first page is fetched right away for an empty patch or with `options.immediate`;
    /// otherwise the fetch waits for the configured quiet period, and is superseded by any
    /// further update of the same list in the meantime. The list stays loading during that
    /// period, so no next page can be requested for the new filters before their first one.
    pub async fn update_filters(
        &self,
        list: &ListId,
        patch: FilterPatch,
        options: UpdateOptions,
    ) -> Result<(), Error> {
        let immediate = options.immediate || patch.is_empty();
        self.dispatch(ListAction::UpdateFilters {
            list: list.clone(),
            patch,
            reset_unspecified: options.reset_unspecified,
            limit: options.limit,
        });
        if immediate {
            self.debouncer.cancel(list);
            self.fetch(list).await?;
            return Ok(());
        }
        self.dispatch(ListAction::SetLoading(list.clone(), true));
        let feed = self.clone();
        let key = list.clone();
        self.debouncer
            .schedule(list.clone(), self.config.debounce, async move {
                // failures are already logged and recorded in the list state
                let _ = feed.fetch_first_page(&key).await;
            });
        Ok(())
    }

    /// Fetch the first page of the filters set by `update_filters`. Returns false without
    /// fetching if the list moved past it in the meantime.
    async fn fetch_first_page(&self, list: &ListId) -> Result<bool, Error> {
        let page = self.store.select(|s| K::slice(s).get(list).map(|l| l.page));
        if page != Some(1) {
            tracing::warn!(%list, ?page, "not fetching first page of a list that moved past it");
            return Ok(false);
        }
        self.fetch(list).await
    }

    /// Fetch the current page of a list. Returns false if the list no longer exists, or changed
    /// filters while the page was being fetched.
    pub async fn fetch(&self, list: &ListId) -> Result<bool, Error> {
        let query = self.store.select(|s| {
            K::slice(s).get(list).map(|l| {
                let query = ListQuery {
                    filters: l.filters.clone(),
                    page: l.page,
                    limit: l.limit,
                };
                (query, l.generation)
            })
        });
        let (query, generation) = match query {
            Some(q) => q,
            None => {
                tracing::debug!(%list, feed = K::NAME, "not fetching unknown list");
                return Ok(false);
            }
        };
        self.dispatch(ListAction::SetLoading(list.clone(), true));
        tracing::debug!(%list, feed = K::NAME, page = query.page, "fetching page");
        match K::fetch(&*self.remote, &query).await {
            Ok(entities) => Ok(self
                .dispatch(ListAction::ApplyPage {
                    list: list.clone(),
                    generation,
                    entities,
                    append: query.page > 1,
                })
                .changed()),
            Err(e) => {
                let msg = e.diagnostic(&format!("Error fetching {}", K::NAME));
                tracing::error!(%list, page = query.page, "{msg}");
                self.dispatch(ListAction::FetchFailed {
                    list: list.clone(),
                    generation,
                    page: query.page,
                    error: msg,
                });
                Err(e)
            }
        }
    }

    /// Refetch the first page with the current filters
    pub async fn refresh(&self, list: &ListId) -> Result<bool, Error> {
        self.debouncer.cancel(list);
        self.dispatch(ListAction::UpdateFilters {
            list: list.clone(),
            patch: FilterPatch::default(),
            reset_unspecified: false,
            limit: None,
        });
        self.fetch(list).await
    }

    /// Fetch the next page. Does nothing, returning false, while the list is loading, while
    /// a filter change is waiting for its first page, or once the list is exhausted. A failed
    /// page is requested again by the next call.
    pub async fn load_more(&self, list: &ListId) -> Result<bool, Error> {
        if self.debouncer.is_pending(list) {
            tracing::trace!(%list, feed = K::NAME, "first page of new filters still pending");
            return Ok(false);
        }
        if !self.dispatch(ListAction::NextPage(list.clone())).changed() {
            tracing::trace!(%list, feed = K::NAME, "nothing more to load");
            return Ok(false);
        }
        self.fetch(list).await
    }

    pub fn cleanup(&self, list: &ListId) -> bool {
        self.debouncer.cancel(list);
        self.dispatch(ListAction::Cleanup(list.clone())).changed()
    }

    /// Drop the lists not fetched for longer than the configured time to live, returning
    /// whether any was dropped
    pub fn cleanup_stale(&self) -> Result<bool, Error> {
        let ttl = chrono::Duration::from_std(self.config.list_ttl)
            .context("converting list time to live")?;
        Ok(self
            .dispatch(ListAction::CleanupOlderThan {
                ttl,
                now: api::now(),
            })
            .changed())
    }

    /// Writes an item back into every list holding it
    fn replacer(&self, key: Uuid) -> impl FnMut(K::Item) {
        let store = self.store.clone();
        move |entity| {
            store.dispatch(K::action(ListAction::ReplaceEntity { key, entity }));
        }
    }

    fn find(&self, key: &Uuid, what: &'static str) -> Result<K::Item, Error> {
        self.store
            .select(|s| K::slice(s).find(key).cloned())
            .ok_or(Error::MissingId(what))
    }
}

impl<K, B> ListFeed<K, B>
where
    K: Creatable,
    B: Backend + 'static,
{
    /// Show `new` in `list` right away, replaced by the server's version once created or
    /// removed again if creation fails
    pub async fn create(
        &self,
        list: &ListId,
        new: K::New,
        position: InsertPosition,
    ) -> Result<K::Item, Error> {
        let author = self.session.require_user()?;
        let pending = K::pending(&new, author, api::now());
        let key = pending.list_key();
        let command = PendingItem::<K> {
            store: self.store.clone(),
            list: list.clone(),
            key,
            item: Some(pending),
            position,
        };
        let context = format!("Error creating in {}", K::NAME);
        let remote = self.remote.clone();
        let outcome = self
            .coordinator
            .perform(key, &context, command, async move {
                let created = K::create(&*remote, &new).await?;
                Ok::<_, Error>((created.clone(), created))
            })
            .await?;
        // temporary keys are fresh, so the creation cannot be skipped
        outcome
            .committed()
            .ok_or(Error::MissingId("pending item"))
    }
}

impl<K, B> ListFeed<K, B>
where
    K: Removable,
    B: Backend + 'static,
{
    /// Remove an item from `list` right away, putting it back where it was if the deletion fails
    pub async fn delete(&self, list: &ListId, key: Uuid) -> Result<Outcome<()>, Error> {
        self.session.require_user()?;
        let restore = self.store.select(|s| {
            let l = K::slice(s).get(list)?;
            let index = l.position(&key)?;
            Some((index, l.entities[index].clone()))
        });
        let command = RemovedItem::<K> {
            store: self.store.clone(),
            list: list.clone(),
            key,
            restore,
        };
        let context = format!("Error deleting from {}", K::NAME);
        let remote = self.remote.clone();
        self.coordinator
            .perform(key, &context, command, async move {
                K::delete(&*remote, key).await?;
                Ok::<_, Error>(((), ()))
            })
            .await
    }
}

impl<B: Backend + 'static> ListFeed<Entities, B> {
    pub async fn vote(&self, id: EntityId, action: VoteAction) -> Result<Outcome<Entity>, Error> {
        let user = self.session.require_user()?;
        let current = self.find(&id.0, "entity")?;
        let next = Entity {
            votes: current.votes.applied(action, user),
            ..current.clone()
        };
        let command = Optimistic::new(current, next, self.replacer(id.0));
        self.coordinator
            .perform(id.0, "Error voting", command, async {
                let e = self.remote.vote_entity(id, action).await?;
                Ok::<_, Error>((e.clone(), e))
            })
            .await
    }

    pub async fn update(&self, id: EntityId, patch: EntityPatch) -> Result<Outcome<Entity>, Error> {
        self.session.require_user()?;
        let current = self.find(&id.0, "entity")?;
        let mut next = current.clone();
        patch.apply_to(&mut next);
        let command = Optimistic::new(current, next, self.replacer(id.0));
        self.coordinator
            .perform(id.0, "Error updating entity", command, async {
                let e = self.remote.update_entity(id, &patch).await?;
                Ok::<_, Error>((e.clone(), e))
            })
            .await
    }
}

impl<B: Backend + 'static> ListFeed<Notifications, B> {
    pub async fn mark_read(&self, id: NotificationId) -> Result<Outcome<Notification>, Error> {
        self.session.require_user()?;
        let current = self.find(&id.0, "notification")?;
        let next = Notification {
            read: true,
            ..current.clone()
        };
        let command = Optimistic::new(current, next, self.replacer(id.0));
        self.coordinator
            .perform(id.0, "Error marking notification read", command, async {
                let n = self.remote.mark_notification_read(id).await?;
                Ok::<_, Error>((n.clone(), n))
            })
            .await
    }

    pub async fn mark_all_read(&self) -> Result<Outcome<()>, Error> {
        self.session.require_user()?;
        let unread = self.store.select(|s| {
            let mut seen = std::collections::HashSet::new();
            s.notifications
                .list_ids()
                .filter_map(|id| s.notifications.get(id))
                .flat_map(|l| l.entities.iter())
                .filter(|n| !n.read && seen.insert(n.id))
                .cloned()
                .collect::<Vec<_>>()
        });
        let command = AllRead {
            store: self.store.clone(),
            unread,
        };
        // nil never collides with a real notification id
        self.coordinator
            .perform(Uuid::nil(), "Error marking notifications read", command, async {
                self.remote.mark_all_notifications_read().await?;
                Ok::<_, Error>(((), ()))
            })
            .await
    }

    pub fn unread_count(&self, list: &ListId) -> usize {
        self.store.select(|s| {
            s.notifications
                .get(list)
                .map(|l| l.entities.iter().filter(|n| !n.read).count())
                .unwrap_or(0)
        })
    }
}

impl<B: Backend + 'static> ListFeed<Collections, B> {
    pub async fn add_entity(
        &self,
        id: CollectionId,
        entity: EntityId,
    ) -> Result<Outcome<Collection>, Error> {
        self.session.require_user()?;
        let current = self.find(&id.0, "collection")?;
        let next = current.with_entity(entity);
        let command = Optimistic::new(current, next, self.replacer(id.0));
        self.coordinator
            .perform(id.0, "Error adding to collection", command, async {
                let c = self.remote.add_to_collection(id, entity).await?;
                Ok::<_, Error>((c.clone(), c))
            })
            .await
    }

    pub async fn remove_entity(
        &self,
        id: CollectionId,
        entity: EntityId,
    ) -> Result<Outcome<Collection>, Error> {
        self.session.require_user()?;
        let current = self.find(&id.0, "collection")?;
        let next = current.without_entity(&entity);
        let command = Optimistic::new(current, next, self.replacer(id.0));
        self.coordinator
            .perform(id.0, "Error removing from collection", command, async {
                let c = self.remote.remove_from_collection(id, entity).await?;
                Ok::<_, Error>((c.clone(), c))
            })
            .await
    }
}
