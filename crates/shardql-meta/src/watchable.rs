//! Watched projections — locally cached views of replicated state.
//!
//! A [`Projection`] is the single writer, owned by whatever replication path
//! feeds it. [`Watchable`] handles are read-only: synchronous `get()` plus
//! change notification. Both sit on a `tokio::sync::watch` channel, so a
//! reader never touches the value while the writer is mutating it.

use tokio::sync::watch;
use tracing::{debug, trace};

use crate::error::{MetaError, MetaResult};
use crate::lattice::{Semilattice, is_joined};
use crate::signal::Signal;

/// Writer side of a watched projection.
#[derive(Debug)]
pub struct Projection<T> {
    name: &'static str,
    tx: watch::Sender<T>,
}

impl<T: Clone + Send + Sync + 'static> Projection<T> {
    pub fn new(name: &'static str, initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { name, tx }
    }

    /// Hand out a read-only handle.
    pub fn watch(&self) -> Watchable<T> {
        Watchable {
            name: self.name,
            rx: self.tx.subscribe(),
        }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Mutate in place. Watchers are only woken when `f` reports a change.
    pub fn apply(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }
}

impl<T: Semilattice + Send + Sync + 'static> Projection<T> {
    /// Merge `delta` into the projection; returns whether anything changed.
    pub fn join(&self, delta: &T) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if is_joined(state, delta) {
                false
            } else {
                state.join(delta);
                true
            }
        });
        if changed {
            trace!(projection = self.name, "projection advanced");
        }
        changed
    }
}

/// Read-only handle on a projection.
#[derive(Debug)]
pub struct Watchable<T> {
    name: &'static str,
    rx: watch::Receiver<T>,
}

impl<T> Clone for Watchable<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            rx: self.rx.clone(),
        }
    }
}

impl<T: Clone> Watchable<T> {
    /// A watchable whose value never changes.
    pub fn constant(name: &'static str, value: T) -> Self {
        let (_tx, rx) = watch::channel(value);
        Self { name, rx }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Borrow the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.rx.borrow())
    }

    /// Wait for the next change and return the new value.
    pub async fn changed(&mut self) -> MetaResult<T> {
        self.rx
            .changed()
            .await
            .map_err(|_| MetaError::ProjectionClosed(self.name.to_string()))?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Block until `pred` holds for the projection's value.
    ///
    /// The predicate is checked against the current value first, then once
    /// per change notification. Returns `Interrupted` as soon as the
    /// interruptor fires, and `ProjectionClosed` if the writer goes away
    /// while the predicate still fails.
    pub async fn run_until_satisfied<P>(&self, mut pred: P, interruptor: &Signal) -> MetaResult<()>
    where
        P: FnMut(&T) -> bool,
    {
        let mut rx = self.rx.clone();
        tokio::select! {
            biased;
            res = rx.wait_for(|value| pred(value)) => match res {
                Ok(_) => {
                    debug!(projection = self.name, "projection satisfied");
                    Ok(())
                }
                Err(_) => Err(MetaError::ProjectionClosed(self.name.to_string())),
            },
            _ = interruptor.wait() => {
                debug!(projection = self.name, "wait on projection interrupted");
                Err(MetaError::Interrupted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalSource;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use crate::lattice::{Lww, Stamp};
    use uuid::Uuid;

    type Map = BTreeMap<u32, Lww<u32>>;

    fn entry(key: u32, value: u32) -> Map {
        let mut map = BTreeMap::new();
        map.insert(key, Lww::new(value, Stamp::new(1, Uuid::nil())));
        map
    }

    #[tokio::test]
    async fn satisfied_immediately() {
        let projection = Projection::new("test", entry(1, 1));
        let watch = projection.watch();
        let delta = entry(1, 1);
        watch
            .run_until_satisfied(|s| is_joined(s, &delta), &Signal::never())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wakes_when_projection_catches_up() {
        let projection = Projection::new("test", Map::new());
        let watch = projection.watch();
        let delta = entry(3, 30);

        let expected = delta.clone();
        let waiter = tokio::spawn(async move {
            watch
                .run_until_satisfied(|s| is_joined(s, &expected), &Signal::never())
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(projection.join(&entry(9, 90)));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        assert!(projection.join(&delta));
        let res = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
        assert_eq!(res, Ok(()));
    }

    #[tokio::test]
    async fn interrupted_wait_returns_promptly() {
        let projection = Projection::new("test", Map::new());
        let watch = projection.watch();
        let source = SignalSource::new();
        let interruptor = source.signal();
        let delta = entry(1, 1);

        let waiter = tokio::spawn(async move {
            watch
                .run_until_satisfied(|s| is_joined(s, &delta), &interruptor)
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        source.pulse();

        let res = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("interrupt should unblock the waiter")
            .unwrap();
        assert_eq!(res, Err(MetaError::Interrupted));
        drop(projection);
    }

    #[tokio::test]
    async fn closed_projection_is_reported() {
        let projection = Projection::new("gone", Map::new());
        let watch = projection.watch();
        drop(projection);

        let delta = entry(1, 1);
        let res = watch
            .run_until_satisfied(|s| is_joined(s, &delta), &Signal::never())
            .await;
        assert_eq!(res, Err(MetaError::ProjectionClosed("gone".to_string())));
    }

    #[test]
    fn join_reports_no_change_for_absorbed_delta() {
        let projection = Projection::new("test", entry(1, 1));
        assert!(!projection.join(&entry(1, 1)));
        assert!(projection.apply(|m| m.remove(&1).is_some()));
        assert!(projection.get().is_empty());
    }
}
