use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use parking_lot::Mutex;

/// State that evolves only through actions
pub trait Reducer: Clone + Send + Sync + 'static {
    type Action: Debug + Send;
    type Outcome;

    fn reduce(&mut self, action: Self::Action) -> Self::Outcome;
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SubscriptionId(u64);

type Listener<S> = Arc<dyn Fn(&S) + Send + Sync>;

struct Inner<S> {
    state: S,
    next_subscription: u64,
    listeners: BTreeMap<SubscriptionId, Listener<S>>,
}

/// Shared, observable state container.
///
/// Clones share the same state. Listeners are called after every dispatch, in subscription
/// order, with the state as it was right after that dispatch.
pub struct Store<S> {
    inner: Arc<Mutex<Inner<S>>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Store {
            inner: self.inner.clone(),
        }
    }
}

impl<S: Reducer> Store<S> {
    pub fn new(state: S) -> Store<S> {
        Store {
            inner: Arc::new(Mutex::new(Inner {
                state,
                next_subscription: 0,
                listeners: BTreeMap::new(),
            })),
        }
    }

    /// Snapshot of the current state
    pub fn get_state(&self) -> S {
        self.inner.lock().state.clone()
    }

    /// Read part of the state without cloning all of it
    pub fn select<R, F: FnOnce(&S) -> R>(&self, f: F) -> R {
        f(&self.inner.lock().state)
    }

    pub fn dispatch(&self, action: S::Action) -> S::Outcome {
        tracing::trace!(?action, "dispatching");
        let (outcome, state, listeners) = {
            let mut inner = self.inner.lock();
            let outcome = inner.state.reduce(action);
            if inner.listeners.is_empty() {
                return outcome;
            }
            let listeners = inner.listeners.values().cloned().collect::<Vec<_>>();
            (outcome, inner.state.clone(), listeners)
        };
        // listeners may read or dispatch again, so the lock must be released by now
        for l in listeners {
            l(&state);
        }
        outcome
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = SubscriptionId(inner.next_subscription);
        inner.next_subscription += 1;
        inner.listeners.insert(id, Arc::new(listener));
        id
    }

    /// Returns whether the subscription existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.lock().listeners.remove(&id).is_some()
    }
}
