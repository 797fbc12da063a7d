//! ClusterAccess — handles on the replicated cluster metadata.
//!
//! Merging into the authoritative store is not enough for a query that needs
//! to act on the new metadata right away: the local namespaces and databases
//! projections are fed by a separate replication path and may lag. Join-and-
//! wait is the barrier between the two.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use shardql_meta::{
    ClusterMetadata, DatabasesMetadata, MetaError, MetadataStore, NamespacesMetadata,
    PeerDirectory, Signal, Watchable, is_joined,
};

use crate::error::EnvResult;
use crate::namespace::NamespaceRepo;

/// Everything a query needs to read or change cluster metadata.
pub struct ClusterAccess {
    ns_repo: Arc<dyn NamespaceRepo>,
    namespaces: Watchable<NamespacesMetadata>,
    databases: Watchable<DatabasesMetadata>,
    metadata: MetadataStore<ClusterMetadata>,
    directory: Watchable<PeerDirectory>,
    this_machine: Uuid,
}

impl ClusterAccess {
    pub fn new(
        ns_repo: Arc<dyn NamespaceRepo>,
        namespaces: Watchable<NamespacesMetadata>,
        databases: Watchable<DatabasesMetadata>,
        metadata: MetadataStore<ClusterMetadata>,
        directory: Watchable<PeerDirectory>,
        this_machine: Uuid,
    ) -> Self {
        Self {
            ns_repo,
            namespaces,
            databases,
            metadata,
            directory,
            this_machine,
        }
    }

    pub fn ns_repo(&self) -> &Arc<dyn NamespaceRepo> {
        &self.ns_repo
    }

    pub fn namespaces(&self) -> &Watchable<NamespacesMetadata> {
        &self.namespaces
    }

    pub fn databases(&self) -> &Watchable<DatabasesMetadata> {
        &self.databases
    }

    pub fn metadata(&self) -> &MetadataStore<ClusterMetadata> {
        &self.metadata
    }

    pub fn directory(&self) -> &Watchable<PeerDirectory> {
        &self.directory
    }

    pub fn this_machine(&self) -> Uuid {
        self.this_machine
    }

    /// Merge `delta` into the authoritative metadata, then wait until both
    /// local projections reflect the merged state.
    ///
    /// The merge itself is not interruptible and is never rolled back. Each
    /// wait returns `Interrupted` as soon as `interruptor` fires.
    pub async fn join_and_wait_to_propagate(
        &self,
        delta: ClusterMetadata,
        interruptor: &Signal,
    ) -> EnvResult<()> {
        let snapshot = self.metadata.join(delta).await?;
        debug!(
            node = %self.this_machine,
            namespaces = snapshot.namespaces.namespaces.len(),
            databases = snapshot.databases.databases.len(),
            "metadata joined, waiting for local propagation"
        );

        let waited = async {
            self.namespaces
                .run_until_satisfied(|ns| is_joined(ns, &snapshot.namespaces), interruptor)
                .await?;
            self.databases
                .run_until_satisfied(|dbs| is_joined(dbs, &snapshot.databases), interruptor)
                .await
        }
        .await;

        match waited {
            Ok(()) => {
                debug!("metadata propagated to local projections");
                Ok(())
            }
            Err(MetaError::Interrupted) => {
                info!("interrupted while waiting for metadata to propagate");
                Err(MetaError::Interrupted.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
