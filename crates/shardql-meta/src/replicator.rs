//! Replicator — pushes committed authoritative state into the local
//! namespaces and databases projections.
//!
//! Stands in for the cluster's gossip path on a single node. Each projection
//! can be given its own delay so the two views lag independently, which is
//! exactly the situation join-and-wait has to cope with.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::store::MetadataStore;
use crate::types::{ClusterMetadata, DatabasesMetadata, NamespacesMetadata};
use crate::watchable::Projection;

/// Background task owning both projection writers.
pub struct Replicator {
    handle: JoinHandle<()>,
}

impl Replicator {
    /// Start replicating with no artificial lag.
    pub fn spawn(
        store: &MetadataStore<ClusterMetadata>,
        namespaces: Projection<NamespacesMetadata>,
        databases: Projection<DatabasesMetadata>,
    ) -> Self {
        Self::spawn_with_delays(store, namespaces, databases, Duration::ZERO, Duration::ZERO)
    }

    /// Start replicating, sleeping `namespaces_delay` before each namespaces
    /// update and `databases_delay` before each databases update.
    pub fn spawn_with_delays(
        store: &MetadataStore<ClusterMetadata>,
        namespaces: Projection<NamespacesMetadata>,
        databases: Projection<DatabasesMetadata>,
        namespaces_delay: Duration,
        databases_delay: Duration,
    ) -> Self {
        let mut committed = store.subscribe();
        let handle = tokio::spawn(async move {
            let mut snapshot = committed.get();
            loop {
                if !namespaces_delay.is_zero() {
                    tokio::time::sleep(namespaces_delay).await;
                }
                namespaces.join(&snapshot.namespaces);

                if !databases_delay.is_zero() {
                    tokio::time::sleep(databases_delay).await;
                }
                databases.join(&snapshot.databases);
                debug!("snapshot replicated to local projections");

                match committed.changed().await {
                    Ok(next) => snapshot = next,
                    Err(_) => break,
                }
            }
            info!("replicator stopped");
        });
        Self { handle }
    }

    /// Stop replicating. Projections keep their last value but their
    /// watchers see the writer go away.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Drop for Replicator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
