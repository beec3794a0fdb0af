use std::{collections::HashSet, fmt::Debug, future::Future, hash::Hash, sync::Arc};

use parking_lot::Mutex;

use crate::Error;

/// A local change applied before the server confirms it.
///
/// `apply` is called first; then exactly one of `commit` (with the server's answer) or
/// `rollback` is called.
pub trait OptimisticCommand {
    type Server;

    fn apply(&mut self);
    fn commit(&mut self, server: Self::Server);
    fn rollback(&mut self);
}

/// The common case: show `next` now, then either the server's value or `snapshot` again
pub struct Optimistic<T, W> {
    snapshot: T,
    next: Option<T>,
    write: W,
}

impl<T, W> Optimistic<T, W>
where
    W: FnMut(T),
{
    pub fn new(current: T, next: T, write: W) -> Optimistic<T, W> {
        Optimistic {
            snapshot: current,
            next: Some(next),
            write,
        }
    }
}

impl<T, W> OptimisticCommand for Optimistic<T, W>
where
    T: Clone,
    W: FnMut(T),
{
    type Server = T;

    fn apply(&mut self) {
        if let Some(next) = self.next.take() {
            (self.write)(next);
        }
    }

    fn commit(&mut self, server: T) {
        (self.write)(server);
    }

    fn rollback(&mut self) {
        (self.write)(self.snapshot.clone());
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome<T> {
    Committed(T),

    /// Another mutation of the same key was still in flight, nothing was done
    Skipped,
}

impl<T> Outcome<T> {
    pub fn committed(self) -> Option<T> {
        match self {
            Outcome::Committed(t) => Some(t),
            Outcome::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped)
    }
}

/// Runs optimistic commands, at most one at a time per key
pub struct Coordinator<K> {
    in_flight: Arc<Mutex<HashSet<K>>>,
}

impl<K> Clone for Coordinator<K> {
    fn clone(&self) -> Self {
        Coordinator {
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<K> Default for Coordinator<K> {
    fn default() -> Self {
        Coordinator {
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

/// Releases its key when dropped, whatever the outcome of the mutation
struct InFlight<K: Eq + Hash> {
    set: Arc<Mutex<HashSet<K>>>,
    key: K,
}

impl<K: Eq + Hash> Drop for InFlight<K> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

impl<K> Coordinator<K>
where
    K: Clone + Debug + Eq + Hash,
{
    pub fn new() -> Coordinator<K> {
        Coordinator::default()
    }

    pub fn is_updating(&self, key: &K) -> bool {
        self.in_flight.lock().contains(key)
    }

    fn acquire(&self, key: &K) -> Option<InFlight<K>> {
        match self.in_flight.lock().insert(key.clone()) {
            true => Some(InFlight {
                set: self.in_flight.clone(),
                key: key.clone(),
            }),
            false => None,
        }
    }

    /// Apply `command`, await `request`, then commit its result or roll back.
    ///
    /// `request` is not polled at all when the key is already being updated. On failure, the
    /// error is logged with `context` before being returned.
    pub async fn perform<C, F, R>(
        &self,
        key: K,
        context: &str,
        mut command: C,
        request: F,
    ) -> Result<Outcome<R>, Error>
    where
        C: OptimisticCommand,
        F: Future<Output = Result<(C::Server, R), Error>>,
    {
        let _guard = match self.acquire(&key) {
            Some(g) => g,
            None => {
                tracing::debug!(?key, "mutation already in flight, ignoring");
                return Ok(Outcome::Skipped);
            }
        };
        command.apply();
        match request.await {
            Ok((server, res)) => {
                command.commit(server);
                Ok(Outcome::Committed(res))
            }
            Err(e) => {
                command.rollback();
                tracing::error!(?key, "{}", e.diagnostic(context));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use futures::FutureExt;

    fn recorder() -> (Arc<Mutex<Vec<i32>>>, impl FnMut(i32) + Clone) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let writer = {
            let log = log.clone();
            move |v: i32| log.lock().push(v)
        };
        (log, writer)
    }

    #[tokio::test]
    async fn commit_replaces_with_server_value() {
        let (log, write) = recorder();
        let c = Coordinator::new();
        let res = c
            .perform(1, "Error", Optimistic::new(0, 1, write), async {
                Ok((2, "done"))
            })
            .await
            .unwrap();
        assert_eq!(res, Outcome::Committed("done"));
        assert_eq!(*log.lock(), vec![1, 2]);
        assert!(!c.is_updating(&1));
    }

    #[tokio::test]
    async fn failure_rolls_back() {
        let (log, write) = recorder();
        let c = Coordinator::new();
        let res = c
            .perform(1, "Error", Optimistic::new(0, 1, write), async {
                Err::<(i32, ()), _>(Error::Api(ApiError::internal("boom")))
            })
            .await;
        assert!(matches!(res, Err(Error::Api(_))));
        assert_eq!(*log.lock(), vec![1, 0]);
        assert!(!c.is_updating(&1));
    }

    #[tokio::test]
    async fn same_key_is_serialized() {
        let (log, write) = recorder();
        let c = Coordinator::new();
        let (release, wait) = futures::channel::oneshot::channel::<()>();
        let mut first = Box::pin(c.perform(
            1,
            "Error",
            Optimistic::new(0, 1, write.clone()),
            async {
                wait.await.expect("sender dropped");
                Ok((1, ()))
            },
        ));
        // start the first mutation, leaving it blocked on the request
        assert!((&mut first).now_or_never().is_none());
        assert!(c.is_updating(&1));

        let polled = Arc::new(Mutex::new(false));
        let second = c
            .perform(1, "Error", Optimistic::new(1, 5, write.clone()), {
                let polled = polled.clone();
                async move {
                    *polled.lock() = true;
                    Ok((5, ()))
                }
            })
            .await
            .unwrap();
        assert!(second.is_skipped());
        assert!(!*polled.lock());

        // other keys are not blocked
        let other = c
            .perform(2, "Error", Optimistic::new(0, 7, write), async { Ok((7, ())) })
            .await
            .unwrap();
        assert_eq!(other, Outcome::Committed(()));

        release.send(()).unwrap();
        assert_eq!(first.await.unwrap(), Outcome::Committed(()));
        assert_eq!(*log.lock(), vec![1, 7, 7, 1]);
        assert!(!c.is_updating(&1));
    }
}
