use std::sync::Arc;

use crate::{
    api::Backend,
    feed::{Collections, Entities, ListFeed, Notifications},
    profile::Profiles,
    state::ClientState,
    threads::CommentThreads,
    ClientConfig, Error, Remote, Session, Store,
};

/// Every facade of one session, all sharing the same store
pub struct Client<B> {
    pub store: Store<ClientState>,
    pub session: Session,
    pub comments: CommentThreads<B>,
    pub entities: ListFeed<Entities, B>,
    pub notifications: ListFeed<Notifications, B>,
    pub collections: ListFeed<Collections, B>,
    pub profiles: Profiles<B>,
}

impl<B: Backend + 'static> Client<B> {
    pub fn new(backend: B, session: Session, config: ClientConfig) -> Result<Client<B>, Error> {
        let remote = Arc::new(Remote::new(backend, session.project.clone())?);
        let store = Store::new(ClientState::new(&config));
        Ok(Client {
            comments: CommentThreads::new(
                store.clone(),
                remote.clone(),
                session.clone(),
                config.clone(),
            ),
            entities: ListFeed::new(store.clone(), remote.clone(), session.clone(), config.clone()),
            notifications: ListFeed::new(
                store.clone(),
                remote.clone(),
                session.clone(),
                config.clone(),
            ),
            collections: ListFeed::new(store.clone(), remote.clone(), session.clone(), config),
            profiles: Profiles::new(store.clone(), remote, session.clone()),
            store,
            session,
        })
    }

    pub fn state(&self) -> ClientState {
        self.store.get_state()
    }
}
