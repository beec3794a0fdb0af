use std::sync::Arc;

use crate::{
    api::{Backend, ConnectionStatus, Profile, ProfilePatch, UserId},
    optimistic::{Coordinator, Optimistic, Outcome},
    remote::UserAction,
    state::{Action, ClientState, ProfileAction},
    Error, Remote, Session, Store,
};

/// User profiles, and the current user's relationships with them
pub struct Profiles<B> {
    store: Store<ClientState>,
    remote: Arc<Remote<B>>,
    session: Session,
    coordinator: Coordinator<UserId>,
}

impl<B> Clone for Profiles<B> {
    fn clone(&self) -> Self {
        Profiles {
            store: self.store.clone(),
            remote: self.remote.clone(),
            session: self.session.clone(),
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<B: Backend> Profiles<B> {
    pub fn new(store: Store<ClientState>, remote: Arc<Remote<B>>, session: Session) -> Profiles<B> {
        Profiles {
            store,
            remote,
            session,
            coordinator: Coordinator::new(),
        }
    }

    pub fn get(&self, id: &UserId) -> Option<Profile> {
        self.store.select(|s| s.profile(id).cloned())
    }

    pub fn is_updating(&self, id: &UserId) -> bool {
        self.coordinator.is_updating(id)
    }

    pub async fn fetch(&self, id: UserId) -> Result<Profile, Error> {
        let p = self.remote.fetch_profile(id).await?;
        self.store
            .dispatch(Action::Profiles(ProfileAction::Upsert(p.clone())));
        Ok(p)
    }

    async fn relate<F>(
        &self,
        id: UserId,
        action: UserAction,
        context: &str,
        change: F,
    ) -> Result<Outcome<Profile>, Error>
    where
        F: FnOnce(&mut Profile, UserId),
    {
        let user = self.session.require_user()?;
        let current = self.get(&id).ok_or(Error::MissingId("profile"))?;
        let mut next = current.clone();
        change(&mut next, user);
        let store = self.store.clone();
        let command = Optimistic::new(current, next, move |p| {
            store.dispatch(Action::Profiles(ProfileAction::Upsert(p)));
        });
        self.coordinator
            .perform(id, context, command, async {
                let p = self.remote.user_action(id, action).await?;
                Ok::<_, Error>((p.clone(), p))
            })
            .await
    }

    pub async fn follow(&self, id: UserId) -> Result<Outcome<Profile>, Error> {
        self.relate(id, UserAction::Follow, "Error following user", |p, me| {
            p.followers.insert(me);
        })
        .await
    }

    pub async fn unfollow(&self, id: UserId) -> Result<Outcome<Profile>, Error> {
        self.relate(id, UserAction::Unfollow, "Error unfollowing user", |p, me| {
            p.followers.remove(&me);
        })
        .await
    }

    pub async fn request_connection(&self, id: UserId) -> Result<Outcome<Profile>, Error> {
        self.relate(
            id,
            UserAction::Connect,
            "Error requesting connection",
            |p, _| p.connection = ConnectionStatus::PendingOutgoing,
        )
        .await
    }

    pub async fn accept_connection(&self, id: UserId) -> Result<Outcome<Profile>, Error> {
        self.relate(
            id,
            UserAction::Accept,
            "Error accepting connection",
            |p, _| p.connection = ConnectionStatus::Connected,
        )
        .await
    }

    pub async fn decline_connection(&self, id: UserId) -> Result<Outcome<Profile>, Error> {
        self.relate(
            id,
            UserAction::Decline,
            "Error declining connection",
            |p, _| p.connection = ConnectionStatus::None,
        )
        .await
    }

    /// Update the current user's own profile
    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<Outcome<Profile>, Error> {
        let user = self.session.require_user()?;
        let current = self.get(&user).ok_or(Error::MissingId("profile"))?;
        let mut next = current.clone();
        patch.apply_to(&mut next);
        let store = self.store.clone();
        let command = Optimistic::new(current, next, move |p| {
            store.dispatch(Action::Profiles(ProfileAction::Upsert(p)));
        });
        self.coordinator
            .perform(user, "Error updating profile", command, async {
                let p = self.remote.update_profile(user, &patch).await?;
                Ok::<_, Error>((p.clone(), p))
            })
            .await
    }
}
