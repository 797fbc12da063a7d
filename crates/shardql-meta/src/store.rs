//! MetadataStore — actor owning the authoritative semilattice state.
//!
//! Only the spawned task ever mutates the state. Every other context talks
//! to it through the command channel, so joins from concurrent queries are
//! serialized without a lock being held across an await.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::{MetaError, MetaResult};
use crate::lattice::{Semilattice, is_joined};
use crate::types::ClusterMetadata;
use crate::watchable::{Projection, Watchable};

/// Capacity of the command channel between handles and the actor.
const COMMAND_BUFFER: usize = 64;

enum Command<S> {
    Join {
        delta: S,
        reply: oneshot::Sender<S>,
    },
    Get {
        reply: oneshot::Sender<S>,
    },
    Shutdown,
}

/// Handle on the authoritative metadata store. Cheap to clone.
pub struct MetadataStore<S = ClusterMetadata> {
    tx: mpsc::Sender<Command<S>>,
    committed: Watchable<S>,
}

impl<S> Clone for MetadataStore<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            committed: self.committed.clone(),
        }
    }
}

impl<S> MetadataStore<S>
where
    S: Semilattice + std::fmt::Debug + Send + Sync + 'static,
{
    /// Spawn the owning task on the current tokio runtime.
    pub fn spawn(initial: S) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let committed = Projection::new("authoritative", initial);
        let watch = committed.watch();
        tokio::spawn(run_store(committed, rx));
        debug!("metadata store spawned");
        Self {
            tx,
            committed: watch,
        }
    }

    /// Merge `delta` into the authoritative state and return the state as
    /// it stands right after the merge.
    pub async fn join(&self, delta: S) -> MetaResult<S> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Join { delta, reply })
            .await
            .map_err(|_| MetaError::StoreClosed)?;
        rx.await.map_err(|_| MetaError::StoreClosed)
    }

    /// Current authoritative state.
    pub async fn get(&self) -> MetaResult<S> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Get { reply })
            .await
            .map_err(|_| MetaError::StoreClosed)?;
        rx.await.map_err(|_| MetaError::StoreClosed)
    }

    /// Watch every committed state.
    pub fn subscribe(&self) -> Watchable<S> {
        self.committed.clone()
    }

    /// Ask the actor to stop. Pending and later requests fail with
    /// `StoreClosed`.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }
}

async fn run_store<S>(state: Projection<S>, mut rx: mpsc::Receiver<Command<S>>)
where
    S: Semilattice + std::fmt::Debug + Send + Sync + 'static,
{
    while let Some(command) = rx.recv().await {
        match command {
            Command::Join { delta, reply } => {
                let mut current = state.get();
                if !is_joined(&current, &delta) {
                    current.join(&delta);
                    state.apply(|s| {
                        *s = current.clone();
                        true
                    });
                    debug!("metadata delta committed");
                } else {
                    debug!("metadata delta already absorbed");
                }
                let _ = reply.send(current);
            }
            Command::Get { reply } => {
                let _ = reply.send(state.get());
            }
            Command::Shutdown => break,
        }
    }
    info!("metadata store stopped");
}
