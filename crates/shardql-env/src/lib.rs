//! shardql-env — the per-query execution environment of the ShardQL query
//! layer.
//!
//! Every query is evaluated against an [`Environment`]:
//!
//! ```text
//! Environment
//!   ├── OptargsStore      global optargs, compiled up front, evaluated lazily
//!   ├── Trace (optional)  profiling span tree when `profile: true`
//!   ├── JsRunner (lazy)   one per environment, home thread only
//!   ├── eval callback     fired after every evaluation step
//!   └── ClusterAccess     shared, cluster-wide
//!         ├── MetadataStore + join_and_wait_to_propagate
//!         ├── namespaces / databases projections
//!         └── NamespaceRepo ──► NamespaceInterfaceAdapter (profiling)
//! ```
//!
//! Configuration is read from TOML via [`EnvConfig`].

pub mod cluster;
pub mod compile;
pub mod config;
pub mod env;
pub mod error;
pub mod js;
pub mod namespace;
pub mod optargs;
pub mod profile;
pub mod query;

#[cfg(test)]
mod testing;

pub use cluster::ClusterAccess;
pub use compile::{Compiler, DbRef, Func, TermCompiler, Val};
pub use config::{EnvConfig, JsConfig};
pub use env::{EnvDeps, Environment, EvalCallback};
pub use error::{EnvError, EnvResult};
pub use js::{ExtprocPool, JsRunner};
pub use namespace::{
    InMemoryNamespaceRepo, NamespaceInterface, NamespaceInterfaceAdapter, NamespaceRepo,
    NamespaceResolver, OrderToken, ReadRequest, ReadResponse, Region, WriteRequest, WriteResponse,
};
pub use optargs::{OptargBinding, OptargsStore, WireOptargs};
pub use profile::{Event, EventLog, ProfileBool, ProfileScope, Span, Trace};
pub use query::{Backtrace, Frame, Query, Term, TermKind};
