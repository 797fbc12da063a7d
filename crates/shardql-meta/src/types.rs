//! Cluster metadata domain types.
//!
//! Every type here is a [`Semilattice`]; the whole [`ClusterMetadata`] value
//! is what the authoritative store holds and what deltas are made of.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lattice::{Deletable, Lww, Semilattice, Stamp};

/// Definition of one namespace (table).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceMetadata {
    pub name: Lww<String>,
    pub database: Lww<Uuid>,
    pub primary_key: Lww<String>,
}

impl NamespaceMetadata {
    pub fn new(name: &str, database: Uuid, primary_key: &str, stamp: Stamp) -> Self {
        Self {
            name: Lww::new(name.to_string(), stamp),
            database: Lww::new(database, stamp),
            primary_key: Lww::new(primary_key.to_string(), stamp),
        }
    }
}

impl Semilattice for NamespaceMetadata {
    fn join(&mut self, other: &Self) {
        self.name.join(&other.name);
        self.database.join(&other.database);
        self.primary_key.join(&other.primary_key);
    }
}

/// Definition of one database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    pub name: Lww<String>,
}

impl DatabaseMetadata {
    pub fn new(name: &str, stamp: Stamp) -> Self {
        Self {
            name: Lww::new(name.to_string(), stamp),
        }
    }
}

impl Semilattice for DatabaseMetadata {
    fn join(&mut self, other: &Self) {
        self.name.join(&other.name);
    }
}

/// All namespaces known to the cluster, keyed by namespace id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespacesMetadata {
    pub namespaces: BTreeMap<Uuid, Deletable<NamespaceMetadata>>,
}

impl NamespacesMetadata {
    pub fn insert(&mut self, id: Uuid, namespace: NamespaceMetadata) {
        self.namespaces
            .entry(id)
            .and_modify(|existing| existing.join(&Deletable::Live(namespace.clone())))
            .or_insert(Deletable::Live(namespace));
    }

    pub fn delete(&mut self, id: Uuid) {
        self.namespaces.insert(id, Deletable::Deleted);
    }

    /// Look up a live namespace by name within a database.
    pub fn find(&self, database: Uuid, name: &str) -> Option<Uuid> {
        self.namespaces.iter().find_map(|(id, entry)| {
            let ns = entry.live()?;
            (ns.database.value == database && ns.name.value == name).then_some(*id)
        })
    }

    pub fn get(&self, id: &Uuid) -> Option<&NamespaceMetadata> {
        self.namespaces.get(id).and_then(Deletable::live)
    }
}

impl Semilattice for NamespacesMetadata {
    fn join(&mut self, other: &Self) {
        self.namespaces.join(&other.namespaces);
    }
}

/// All databases known to the cluster, keyed by database id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabasesMetadata {
    pub databases: BTreeMap<Uuid, Deletable<DatabaseMetadata>>,
}

impl DatabasesMetadata {
    pub fn insert(&mut self, id: Uuid, database: DatabaseMetadata) {
        self.databases
            .entry(id)
            .and_modify(|existing| existing.join(&Deletable::Live(database.clone())))
            .or_insert(Deletable::Live(database));
    }

    pub fn delete(&mut self, id: Uuid) {
        self.databases.insert(id, Deletable::Deleted);
    }

    /// Look up a live database by name.
    pub fn find(&self, name: &str) -> Option<Uuid> {
        self.databases.iter().find_map(|(id, entry)| {
            let db = entry.live()?;
            (db.name.value == name).then_some(*id)
        })
    }
}

impl Semilattice for DatabasesMetadata {
    fn join(&mut self, other: &Self) {
        self.databases.join(&other.databases);
    }
}

/// The cluster-wide replicated configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMetadata {
    pub namespaces: NamespacesMetadata,
    pub databases: DatabasesMetadata,
}

impl ClusterMetadata {
    /// A delta creating a single database.
    pub fn create_database(id: Uuid, name: &str, stamp: Stamp) -> Self {
        let mut delta = Self::default();
        delta.databases.insert(id, DatabaseMetadata::new(name, stamp));
        delta
    }

    /// A delta creating a single namespace.
    pub fn create_namespace(id: Uuid, namespace: NamespaceMetadata) -> Self {
        let mut delta = Self::default();
        delta.namespaces.insert(id, namespace);
        delta
    }
}

impl Semilattice for ClusterMetadata {
    fn join(&mut self, other: &Self) {
        self.namespaces.join(&other.namespaces);
        self.databases.join(&other.databases);
    }
}

/// Address a peer advertises in the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub address: String,
    pub port: u16,
}

/// Read-only directory of peers, keyed by node identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDirectory {
    pub peers: BTreeMap<Uuid, PeerInfo>,
}

impl PeerDirectory {
    pub fn get(&self, node: &Uuid) -> Option<&PeerInfo> {
        self.peers.get(node)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
