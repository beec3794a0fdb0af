use std::{collections::HashMap, sync::Arc};

use crate::api::{FilterPatch, ListFilters, ListId, Listed, SortBy, Time, Uuid};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InsertPosition {
    First,
    Last,
}

/// Cached state of one paginated list
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListState<T> {
    /// In fetch order, never twice the same key
    pub entities: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub filters: ListFilters,
    pub loading: bool,
    pub has_more: bool,
    pub error: Option<String>,
    pub last_fetched: Option<Time>,

    /// Bumped whenever the filters change, so that pages requested before that can be told apart
    pub generation: u64,
}

impl<T: Listed> ListState<T> {
    fn new(limit: u32, sort_by: SortBy) -> ListState<T> {
        ListState {
            entities: Vec::new(),
            page: 1,
            limit,
            filters: ListFilters::sorted_by(sort_by),
            loading: true,
            has_more: true,
            error: None,
            last_fetched: None,
            generation: 0,
        }
    }

    pub fn get(&self, key: &Uuid) -> Option<&T> {
        self.entities.iter().find(|e| e.list_key() == *key)
    }

    pub fn position(&self, key: &Uuid) -> Option<usize> {
        self.entities.iter().position(|e| e.list_key() == *key)
    }

    /// Whether a next page may be requested right now
    pub fn can_load_more(&self) -> bool {
        !self.loading && self.has_more
    }
}

#[derive(Clone, Debug)]
pub enum ListAction<T> {
    Initialize(ListId),
    UpdateFilters {
        list: ListId,
        patch: FilterPatch,
        reset_unspecified: bool,

        /// Page length of this list from now on, the cache default if unset at creation
        limit: Option<u32>,
    },
    SetLoading(ListId, bool),
    SetError(ListId, Option<String>),

    /// A fetch of `page` failed: records the error and, for a next page, steps back to the
    /// previous one so that it is requested again. Ignored for an older generation.
    FetchFailed {
        list: ListId,
        generation: u64,
        page: u32,
        error: String,
    },
    SetHasMore(ListId, bool),
    SetEntities {
        list: ListId,
        entities: Vec<T>,
        append: bool,
    },

    /// Result of a fetch: entities plus the page-length heuristic for `has_more`, dropped if
    /// the list changed generation since the fetch was issued
    ApplyPage {
        list: ListId,
        generation: u64,
        entities: Vec<T>,
        append: bool,
    },
    IncrementPage(ListId),

    /// Move to the next page and mark the list loading, unless it cannot load more
    NextPage(ListId),
    AddEntity {
        list: ListId,
        entity: T,
        position: InsertPosition,
    },
    InsertAt {
        list: ListId,
        index: usize,
        entity: T,
    },
    RemoveEntity {
        list: ListId,
        key: Uuid,
    },

    /// Replace the entity with this key in every list holding it
    ReplaceEntity {
        key: Uuid,
        entity: T,
    },
    Cleanup(ListId),
    CleanupOlderThan {
        ttl: chrono::Duration,
        now: Time,
    },
}

/// Every cached list of one kind of item, keyed by list id
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListCache<T> {
    lists: Arc<HashMap<ListId, Arc<ListState<T>>>>,
    default_limit: u32,
    default_sort: SortBy,
}

impl<T: Listed> ListCache<T> {
    pub fn new(default_limit: u32, default_sort: SortBy) -> ListCache<T> {
        ListCache {
            lists: Arc::new(HashMap::new()),
            default_limit,
            default_sort,
        }
    }

    pub fn get(&self, list: &ListId) -> Option<&ListState<T>> {
        self.lists.get(list).map(|l| &**l)
    }

    pub fn contains(&self, list: &ListId) -> bool {
        self.lists.contains_key(list)
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn list_ids(&self) -> impl Iterator<Item = &ListId> {
        self.lists.keys()
    }

    /// Apply `f` to the list if it exists, returning whether it did
    fn with_list<F>(&mut self, list: &ListId, f: F) -> bool
    where
        F: FnOnce(&mut ListState<T>),
    {
        if !self.lists.contains_key(list) {
            tracing::debug!(%list, "ignoring update of unknown list");
            return false;
        }
        if let Some(l) = Arc::make_mut(&mut self.lists).get_mut(list) {
            f(Arc::make_mut(l));
        }
        true
    }

    fn get_or_create(&mut self, list: &ListId) -> &mut ListState<T> {
        let (limit, sort) = (self.default_limit, self.default_sort);
        let l = Arc::make_mut(&mut self.lists)
            .entry(list.clone())
            .or_insert_with(|| Arc::new(ListState::new(limit, sort)));
        Arc::make_mut(l)
    }

    /// Returns true if the list did not exist yet
    pub fn initialize(&mut self, list: &ListId) -> bool {
        if self.lists.contains_key(list) {
            return false;
        }
        self.get_or_create(list);
        true
    }

    /// Resets pagination, and creates the list if need be
    pub fn update_filters(
        &mut self,
        list: &ListId,
        patch: &FilterPatch,
        reset_unspecified: bool,
        limit: Option<u32>,
    ) {
        let default_sort = self.default_sort;
        let l = self.get_or_create(list);
        if reset_unspecified {
            l.filters = ListFilters::sorted_by(default_sort);
        }
        l.filters.apply(patch);
        if let Some(limit) = limit.filter(|&n| n > 0) {
            l.limit = limit;
        }
        l.page = 1;
        l.has_more = true;
        l.error = None;
        l.generation += 1;
    }

    pub fn set_loading(&mut self, list: &ListId, loading: bool) -> bool {
        self.with_list(list, |l| l.loading = loading)
    }

    pub fn set_error(&mut self, list: &ListId, error: Option<String>) -> bool {
        self.with_list(list, |l| {
            l.error = error;
            l.loading = false;
        })
    }

    /// Returns false, leaving the list untouched, if the filters changed since the failed fetch
    pub fn fetch_failed(
        &mut self,
        list: &ListId,
        generation: u64,
        page: u32,
        error: String,
    ) -> bool {
        if self.get(list).map(|l| l.generation) != Some(generation) {
            tracing::debug!(%list, page, "ignoring failure of stale fetch");
            return false;
        }
        self.with_list(list, |l| {
            if page > 1 && l.page == page {
                l.page -= 1;
            }
            l.error = Some(error);
            l.loading = false;
        })
    }

    pub fn set_has_more(&mut self, list: &ListId, has_more: bool) -> bool {
        self.with_list(list, |l| l.has_more = has_more)
    }

    pub fn set_entities(&mut self, list: &ListId, entities: Vec<T>, append: bool, now: Time) -> bool {
        self.with_list(list, |l| {
            match append {
                true => {
                    let new = entities
                        .into_iter()
                        .filter(|e| l.get(&e.list_key()).is_none())
                        .collect::<Vec<_>>();
                    l.entities.extend(new);
                }
                false => l.entities = entities,
            }
            l.loading = false;
            l.last_fetched = Some(now);
        })
    }

    /// Returns false, leaving the list untouched, if the page belongs to an older generation
    pub fn apply_page(
        &mut self,
        list: &ListId,
        generation: u64,
        entities: Vec<T>,
        append: bool,
        now: Time,
    ) -> bool {
        let limit = match self.get(list) {
            Some(l) if l.generation == generation => l.limit,
            Some(l) => {
                tracing::warn!(
                    %list,
                    page_generation = generation,
                    current_generation = l.generation,
                    "dropping stale page"
                );
                return false;
            }
            None => {
                tracing::warn!(%list, "dropping page for list that no longer exists");
                return false;
            }
        };
        let has_more = entities.len() >= limit as usize;
        self.set_entities(list, entities, append, now);
        self.set_has_more(list, has_more)
    }

    pub fn increment_page(&mut self, list: &ListId) -> bool {
        self.with_list(list, |l| l.page += 1)
    }

    /// Returns false, leaving the list untouched, when it is loading or exhausted
    pub fn begin_next_page(&mut self, list: &ListId) -> bool {
        if !self.get(list).map_or(false, |l| l.can_load_more()) {
            return false;
        }
        self.with_list(list, |l| {
            l.page += 1;
            l.loading = true;
        })
    }

    pub fn add_entity(&mut self, list: &ListId, entity: T, position: InsertPosition) -> bool {
        self.with_list(list, |l| {
            l.entities.retain(|e| e.list_key() != entity.list_key());
            match position {
                InsertPosition::First => l.entities.insert(0, entity),
                InsertPosition::Last => l.entities.push(entity),
            }
        })
    }

    pub fn insert_at(&mut self, list: &ListId, index: usize, entity: T) -> bool {
        self.with_list(list, |l| {
            l.entities.retain(|e| e.list_key() != entity.list_key());
            let index = index.min(l.entities.len());
            l.entities.insert(index, entity);
        })
    }

    pub fn remove_entity(&mut self, list: &ListId, key: &Uuid) -> bool {
        self.with_list(list, |l| l.entities.retain(|e| e.list_key() != *key))
    }

    /// First cached copy of an entity, whichever list holds it
    pub fn find(&self, key: &Uuid) -> Option<&T> {
        self.lists.values().find_map(|l| l.get(key))
    }

    /// Returns the number of lists that held the entity.
    ///
    /// `entity` may carry another key than `key` (a pending item confirmed by the server); if a
    /// list already holds that other key, the entry for `key` is dropped instead.
    pub fn replace_entity(&mut self, key: &Uuid, entity: &T) -> usize {
        let holding = self
            .lists
            .iter()
            .filter(|(_, l)| l.position(key).is_some())
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        for list in holding.iter() {
            self.with_list(list, |l| {
                let new_key = entity.list_key();
                let duplicate = new_key != *key && l.position(&new_key).is_some();
                if let Some(pos) = l.position(key) {
                    match duplicate {
                        true => {
                            l.entities.remove(pos);
                        }
                        false => l.entities[pos] = entity.clone(),
                    }
                }
            });
        }
        holding.len()
    }

    pub fn cleanup(&mut self, list: &ListId) -> bool {
        if !self.lists.contains_key(list) {
            return false;
        }
        Arc::make_mut(&mut self.lists).remove(list);
        true
    }

    /// Drop every list last fetched more than `ttl` before `now`, returning how many were
    /// dropped. Lists that were never fetched are kept.
    pub fn cleanup_older_than(&mut self, ttl: chrono::Duration, now: Time) -> usize {
        let expired = self
            .lists
            .iter()
            .filter(|(_, l)| matches!(l.last_fetched, Some(t) if now - t > ttl))
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        if !expired.is_empty() {
            let lists = Arc::make_mut(&mut self.lists);
            for id in expired.iter() {
                lists.remove(id);
            }
        }
        expired.len()
    }

    /// Returns whether the action changed anything
    pub fn reduce(&mut self, action: ListAction<T>, now: Time) -> bool {
        match action {
            ListAction::Initialize(list) => self.initialize(&list),
            ListAction::UpdateFilters {
                list,
                patch,
                reset_unspecified,
                limit,
            } => {
                self.update_filters(&list, &patch, reset_unspecified, limit);
                true
            }
            ListAction::SetLoading(list, loading) => self.set_loading(&list, loading),
            ListAction::SetError(list, error) => self.set_error(&list, error),
            ListAction::FetchFailed {
                list,
                generation,
                page,
                error,
            } => self.fetch_failed(&list, generation, page, error),
            ListAction::SetHasMore(list, has_more) => self.set_has_more(&list, has_more),
            ListAction::SetEntities {
                list,
                entities,
                append,
            } => self.set_entities(&list, entities, append, now),
            ListAction::ApplyPage {
                list,
                generation,
                entities,
                append,
            } => self.apply_page(&list, generation, entities, append, now),
            ListAction::IncrementPage(list) => self.increment_page(&list),
            ListAction::NextPage(list) => self.begin_next_page(&list),
            ListAction::AddEntity {
                list,
                entity,
                position,
            } => self.add_entity(&list, entity, position),
            ListAction::InsertAt {
                list,
                index,
                entity,
            } => self.insert_at(&list, index, entity),
            ListAction::RemoveEntity { list, key } => self.remove_entity(&list, &key),
            ListAction::ReplaceEntity { key, entity } => self.replace_entity(&key, &entity) > 0,
            ListAction::Cleanup(list) => self.cleanup(&list),
            ListAction::CleanupOlderThan { ttl, now } => self.cleanup_older_than(ttl, now) > 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FilterPatch, TimeFrame};
    use chrono::TimeZone;

    #[derive(Clone, Debug, Eq, PartialEq)]
    struct Item(u8);

    impl Listed for Item {
        fn list_key(&self) -> Uuid {
            Uuid::from_u128(self.0 as u128)
        }
    }

    fn at(secs: i64) -> Time {
        chrono::Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn items(r: std::ops::Range<u8>) -> Vec<Item> {
        r.map(Item).collect()
    }

    fn home() -> ListId {
        ListId::new("home")
    }

    fn cache() -> ListCache<Item> {
        let mut c = ListCache::new(10, SortBy::Hot);
        c.initialize(&home());
        c
    }

    #[test]
    fn initialize_defaults() {
        let mut c = cache();
        let l = c.get(&home()).unwrap();
        assert_eq!(l.page, 1);
        assert_eq!(l.limit, 10);
        assert_eq!(l.filters.sort_by, SortBy::Hot);
        assert!(l.has_more);
        assert!(l.loading);
        assert!(!c.initialize(&home()));
    }

    #[test]
    fn has_more_follows_page_length() {
        let mut c = cache();
        assert!(c.apply_page(&home(), 0, items(0..10), false, at(0)));
        assert!(c.get(&home()).unwrap().has_more);
        c.increment_page(&home());
        assert!(c.apply_page(&home(), 0, items(10..17), true, at(1)));
        let l = c.get(&home()).unwrap();
        assert!(!l.has_more);
        assert!(!l.can_load_more());
        assert_eq!(l.entities.len(), 17);
        assert_eq!(l.last_fetched, Some(at(1)));
    }

    #[test]
    fn append_skips_known_entities() {
        let mut c = cache();
        c.set_entities(&home(), items(0..5), false, at(0));
        c.set_entities(&home(), items(3..8), true, at(1));
        let l = c.get(&home()).unwrap();
        assert_eq!(l.entities, items(0..8));
        assert!(!l.loading);
    }

    #[test]
    fn replace_without_append() {
        let mut c = cache();
        c.set_entities(&home(), items(0..5), false, at(0));
        c.set_entities(&home(), items(7..9), false, at(1));
        assert_eq!(c.get(&home()).unwrap().entities, items(7..9));
    }

    #[test]
    fn filter_change_resets_pagination() {
        let mut c = cache();
        c.apply_page(&home(), 0, items(0..3), false, at(0));
        c.increment_page(&home());
        c.increment_page(&home());
        c.set_error(&home(), Some(String::from("boom")));
        c.update_filters(
            &home(),
            &FilterPatch::default().time_frame(TimeFrame::Week),
            false,
            None,
        );
        let l = c.get(&home()).unwrap();
        assert_eq!(l.page, 1);
        assert!(l.has_more);
        assert_eq!(l.error, None);
        assert_eq!(l.filters.time_frame, TimeFrame::Week);
        assert_eq!(l.generation, 1);
    }

    #[test]
    fn reset_unspecified_filters() {
        let mut c = cache();
        c.update_filters(
            &home(),
            &FilterPatch::default()
                .sort_by(SortBy::New)
                .keywords(vec![String::from("rust")]),
            false,
            None,
        );
        c.update_filters(&home(), &FilterPatch::default().followed_only(true), true, None);
        let f = &c.get(&home()).unwrap().filters;
        assert_eq!(f.sort_by, SortBy::Hot);
        assert!(f.keywords_filters.is_empty());
        assert!(f.followed_only);
    }

    #[test]
    fn update_filters_creates_list() {
        let mut c = ListCache::<Item>::new(5, SortBy::Top);
        c.update_filters(&home(), &FilterPatch::default(), false, None);
        let l = c.get(&home()).unwrap();
        assert_eq!(l.limit, 5);
        assert_eq!(l.filters.sort_by, SortBy::Top);
    }

    #[test]
    fn per_list_limit_drives_has_more() {
        let mut c = cache();
        c.update_filters(&home(), &FilterPatch::default(), false, Some(3));
        assert!(c.apply_page(&home(), 1, items(0..3), false, at(0)));
        let l = c.get(&home()).unwrap();
        assert_eq!(l.limit, 3);
        assert!(l.has_more);
        c.increment_page(&home());
        c.apply_page(&home(), 1, items(3..5), true, at(1));
        assert!(!c.get(&home()).unwrap().has_more);

        // later updates without a limit keep it, and zero is ignored
        c.update_filters(&home(), &FilterPatch::default(), false, None);
        c.update_filters(&home(), &FilterPatch::default(), false, Some(0));
        assert_eq!(c.get(&home()).unwrap().limit, 3);
    }

    #[test]
    fn failed_next_page_is_requested_again() {
        let mut c = cache();
        c.apply_page(&home(), 0, items(0..10), false, at(0));
        assert!(c.begin_next_page(&home()));
        assert!(c.fetch_failed(&home(), 0, 2, String::from("boom")));
        let l = c.get(&home()).unwrap();
        assert_eq!(l.page, 1);
        assert!(!l.loading);
        assert_eq!(l.error.as_deref(), Some("boom"));
        assert!(c.begin_next_page(&home()));
        assert_eq!(c.get(&home()).unwrap().page, 2);

        // a failed first page stays on the first page
        let other = ListId::new("other");
        c.initialize(&other);
        assert!(c.fetch_failed(&other, 0, 1, String::from("boom")));
        assert_eq!(c.get(&other).unwrap().page, 1);
    }

    #[test]
    fn stale_failure_is_ignored() {
        let mut c = cache();
        c.apply_page(&home(), 0, items(0..10), false, at(0));
        c.begin_next_page(&home());
        c.update_filters(&home(), &FilterPatch::default().sort_by(SortBy::New), false, None);
        assert!(!c.fetch_failed(&home(), 0, 2, String::from("boom")));
        let l = c.get(&home()).unwrap();
        assert_eq!(l.page, 1);
        assert_eq!(l.error, None);
    }

    #[test]
    fn stale_page_is_dropped() {
        let mut c = cache();
        c.apply_page(&home(), 0, items(0..10), false, at(0));
        c.increment_page(&home());
        c.update_filters(&home(), &FilterPatch::default().sort_by(SortBy::New), false, None);
        // page 2 of the old filters arrives late
        assert!(!c.apply_page(&home(), 0, items(10..20), true, at(1)));
        let l = c.get(&home()).unwrap();
        assert_eq!(l.entities, items(0..10));
        assert_eq!(l.page, 1);
        assert!(!c.apply_page(&ListId::new("gone"), 0, items(0..1), false, at(1)));
    }

    #[test]
    fn optimistic_add_and_remove() {
        let mut c = cache();
        c.set_entities(&home(), items(1..3), false, at(0));
        c.add_entity(&home(), Item(0), InsertPosition::First);
        c.add_entity(&home(), Item(3), InsertPosition::Last);
        assert_eq!(c.get(&home()).unwrap().entities, items(0..4));
        c.remove_entity(&home(), &Item(1).list_key());
        assert_eq!(
            c.get(&home()).unwrap().entities,
            vec![Item(0), Item(2), Item(3)]
        );
        c.insert_at(&home(), 1, Item(1));
        assert_eq!(c.get(&home()).unwrap().entities, items(0..4));
        assert!(!c.add_entity(&ListId::new("unknown"), Item(9), InsertPosition::First));
    }

    #[test]
    fn replace_in_every_list() {
        let mut c = cache();
        let other = ListId::new("other");
        c.initialize(&other);
        c.set_entities(&home(), items(0..3), false, at(0));
        c.set_entities(&other, items(2..4), false, at(0));
        assert_eq!(c.replace_entity(&Item(2).list_key(), &Item(2)), 2);
        assert_eq!(c.replace_entity(&Item(9).list_key(), &Item(9)), 0);
        assert_eq!(c.find(&Item(3).list_key()), Some(&Item(3)));

        // a pending item whose confirmed version was already fetched
        c.add_entity(&home(), Item(42), InsertPosition::First);
        assert_eq!(c.replace_entity(&Item(42).list_key(), &Item(1)), 1);
        assert_eq!(c.get(&home()).unwrap().entities, items(0..3));
    }

    #[test]
    fn next_page_requires_idle_list_with_more() {
        let mut c = cache();
        // still loading the first page
        assert!(!c.begin_next_page(&home()));
        c.apply_page(&home(), 0, items(0..10), false, at(0));
        assert!(c.begin_next_page(&home()));
        assert!(!c.begin_next_page(&home()));
        c.apply_page(&home(), 0, items(10..13), true, at(1));
        assert!(!c.begin_next_page(&home()));
        assert_eq!(c.get(&home()).unwrap().page, 2);
        assert!(!c.begin_next_page(&ListId::new("unknown")));
    }

    #[test]
    fn cleanup_by_ttl() {
        let mut c = cache();
        let fresh = ListId::new("fresh");
        let never = ListId::new("never-fetched");
        c.initialize(&fresh);
        c.initialize(&never);
        c.set_entities(&home(), items(0..1), false, at(0));
        c.set_entities(&fresh, items(0..1), false, at(100));
        assert_eq!(c.cleanup_older_than(chrono::Duration::seconds(60), at(120)), 1);
        assert!(!c.contains(&home()));
        assert!(c.contains(&fresh));
        assert!(c.contains(&never));
        assert!(c.cleanup(&fresh));
        assert!(!c.cleanup(&fresh));
    }

    #[test]
    fn random_pages_never_duplicate() {
        bolero::check!()
            .with_type::<Vec<(u8, u8, bool)>>()
            .cloned()
            .for_each(|pages| {
                let mut c = cache();
                for (start, len, append) in pages {
                    let start = start % 64;
                    let page = items(start..start.saturating_add(len % 16));
                    let before = c.get(&home()).unwrap().entities.clone();
                    let unique = page
                        .iter()
                        .filter(|e| !before.contains(e))
                        .count();
                    c.set_entities(&home(), page.clone(), append, at(0));
                    let after = &c.get(&home()).unwrap().entities;
                    match append {
                        true => assert_eq!(after.len(), before.len() + unique),
                        false => assert_eq!(*after, page),
                    }
                    let mut keys = after.iter().map(|e| e.0).collect::<Vec<_>>();
                    keys.sort_unstable();
                    keys.dedup();
                    assert_eq!(keys.len(), after.len());
                }
            });
    }
}
