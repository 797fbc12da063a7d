//! shardql-meta — convergent cluster metadata for the ShardQL query layer.
//!
//! Cluster configuration (namespace and database definitions) is a
//! join-semilattice: replicas merge with [`Semilattice::join`] and converge
//! regardless of delivery order. This crate provides:
//!
//! ```text
//! MetadataStore (actor, sole owner of the authoritative ClusterMetadata)
//!   ├── join(delta) → snapshot
//!   ├── get()       → snapshot
//!   └── subscribe() → watch of every committed snapshot
//!
//! Replicator (stand-in for the gossip path)
//!   └── pushes snapshots into the two local projections
//!
//! Projection<T> / Watchable<T> (tokio watch)
//!   ├── namespaces projection
//!   └── databases projection
//!       └── run_until_satisfied(pred, interruptor)
//! ```
//!
//! [`Signal`] is the broadcast cancellation token shared by every blocking
//! operation of a query.

pub mod error;
pub mod lattice;
pub mod replicator;
pub mod signal;
pub mod store;
pub mod types;
pub mod watchable;

pub use error::{MetaError, MetaResult};
pub use lattice::{Deletable, Lww, Semilattice, Stamp, is_joined};
pub use replicator::Replicator;
pub use signal::{Signal, SignalSource};
pub use store::MetadataStore;
pub use types::*;
pub use watchable::{Projection, Watchable};
