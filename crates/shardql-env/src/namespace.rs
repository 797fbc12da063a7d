//! Namespace access — the sharded read/write interface and its profiling
//! decorator.
//!
//! ```text
//! NamespaceResolver(id, env)
//!   └── NamespaceRepo::get_namespace_if(id) ──► Arc<dyn NamespaceInterface>
//!         └── NamespaceInterfaceAdapter (same trait)
//!               ├── stamps request.profile from the environment
//!               ├── opens a span in the environment's trace
//!               ├── forwards unchanged
//!               └── files the response's per-shard event logs under the span
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};
use uuid::Uuid;

use shardql_meta::Signal;

use crate::env::Environment;
use crate::error::{EnvError, EnvResult};
use crate::profile::{EventLog, ProfileBool, ProfileScope};

/// A shard's key range, `[left, right)`; `right == None` is unbounded.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Region {
    pub left: String,
    pub right: Option<String>,
}

impl Region {
    pub fn new(left: &str, right: Option<&str>) -> Self {
        Self {
            left: left.to_string(),
            right: right.map(str::to_string),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        key >= self.left.as_str() && self.right.as_deref().is_none_or(|right| key < right)
    }
}

/// Orders writes and reads issued from the same source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderToken(pub u64);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub query: Value,
    pub profile: ProfileBool,
}

impl ReadRequest {
    pub fn new(query: Value) -> Self {
        Self {
            query,
            profile: ProfileBool::DontProfile,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub result: Value,
    pub n_shards: usize,
    /// One log per shard that served the read, in shard order.
    pub event_log: Vec<EventLog>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub query: Value,
    pub profile: ProfileBool,
}

impl WriteRequest {
    pub fn new(query: Value) -> Self {
        Self {
            query,
            profile: ProfileBool::DontProfile,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub result: Value,
    pub n_shards: usize,
    pub event_log: Vec<EventLog>,
}

/// Read/write capability of one namespace.
#[async_trait]
pub trait NamespaceInterface: Send + Sync {
    async fn read(
        &self,
        read: ReadRequest,
        order_token: Option<OrderToken>,
        interruptor: &Signal,
    ) -> EnvResult<ReadResponse>;

    async fn read_outdated(
        &self,
        read: ReadRequest,
        interruptor: &Signal,
    ) -> EnvResult<ReadResponse>;

    async fn write(
        &self,
        write: WriteRequest,
        order_token: Option<OrderToken>,
        interruptor: &Signal,
    ) -> EnvResult<WriteResponse>;

    fn get_sharding_scheme(&self) -> EnvResult<BTreeSet<Region>>;

    /// Fires once the namespace can serve requests.
    fn get_initial_ready_signal(&self) -> Signal;
}

/// Source of live namespace interfaces.
pub trait NamespaceRepo: Send + Sync {
    fn get_namespace_if(
        &self,
        id: Uuid,
        interruptor: &Signal,
    ) -> Option<Arc<dyn NamespaceInterface>>;
}

/// Repository over a fixed set of registered interfaces.
#[derive(Default)]
pub struct InMemoryNamespaceRepo {
    namespaces: RwLock<HashMap<Uuid, Arc<dyn NamespaceInterface>>>,
}

impl InMemoryNamespaceRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: Uuid, namespace: Arc<dyn NamespaceInterface>) {
        self.namespaces
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, namespace);
        debug!(%id, "namespace registered");
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        self.namespaces
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(id)
            .is_some()
    }
}

impl NamespaceRepo for InMemoryNamespaceRepo {
    fn get_namespace_if(
        &self,
        id: Uuid,
        interruptor: &Signal,
    ) -> Option<Arc<dyn NamespaceInterface>> {
        if interruptor.is_pulsed() {
            return None;
        }
        self.namespaces
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

/// Profiling decorator over a namespace interface.
///
/// May be empty when the namespace could not be resolved; check
/// [`has`](Self::has) before use.
pub struct NamespaceInterfaceAdapter<'a> {
    internal: Option<Arc<dyn NamespaceInterface>>,
    env: &'a Environment,
}

impl<'a> NamespaceInterfaceAdapter<'a> {
    pub fn new(internal: Option<Arc<dyn NamespaceInterface>>, env: &'a Environment) -> Self {
        Self { internal, env }
    }

    pub fn has(&self) -> bool {
        self.internal.is_some()
    }

    fn internal(&self) -> EnvResult<&Arc<dyn NamespaceInterface>> {
        self.internal
            .as_ref()
            .ok_or_else(|| EnvError::invariant("use of an unresolved namespace interface"))
    }
}

#[async_trait]
impl<'a> NamespaceInterface for NamespaceInterfaceAdapter<'a> {
    async fn read(
        &self,
        mut read: ReadRequest,
        order_token: Option<OrderToken>,
        interruptor: &Signal,
    ) -> EnvResult<ReadResponse> {
        let internal = self.internal()?;
        let scope = ProfileScope::leaf(self.env.trace_handle(), "Perform read.");
        read.profile = self.env.profile();
        let response = internal.read(read, order_token, interruptor).await?;
        trace!(n_shards = response.n_shards, "read returned");
        scope.give_splits(response.n_shards, response.event_log.clone());
        Ok(response)
    }

    async fn read_outdated(
        &self,
        mut read: ReadRequest,
        interruptor: &Signal,
    ) -> EnvResult<ReadResponse> {
        let internal = self.internal()?;
        let scope = ProfileScope::leaf(self.env.trace_handle(), "Perform outdated read.");
        read.profile = self.env.profile();
        let response = internal.read_outdated(read, interruptor).await?;
        trace!(n_shards = response.n_shards, "outdated read returned");
        scope.give_splits(response.n_shards, response.event_log.clone());
        Ok(response)
    }

    async fn write(
        &self,
        mut write: WriteRequest,
        order_token: Option<OrderToken>,
        interruptor: &Signal,
    ) -> EnvResult<WriteResponse> {
        let internal = self.internal()?;
        let scope = ProfileScope::leaf(self.env.trace_handle(), "Perform write.");
        write.profile = self.env.profile();
        let response = internal.write(write, order_token, interruptor).await?;
        trace!(n_shards = response.n_shards, "write returned");
        scope.give_splits(response.n_shards, response.event_log.clone());
        Ok(response)
    }

    fn get_sharding_scheme(&self) -> EnvResult<BTreeSet<Region>> {
        self.internal()?.get_sharding_scheme()
    }

    fn get_initial_ready_signal(&self) -> Signal {
        match &self.internal {
            Some(internal) => internal.get_initial_ready_signal(),
            None => Signal::never(),
        }
    }
}

/// Resolves a namespace id against the environment's cluster.
pub struct NamespaceResolver<'a> {
    id: Uuid,
    internal: Option<Arc<dyn NamespaceInterface>>,
    env: &'a Environment,
}

impl<'a> NamespaceResolver<'a> {
    /// Look `id` up now. A missing namespace, or an environment without
    /// cluster access, yields an empty handle rather than an error.
    pub fn new(id: Uuid, env: &'a Environment) -> Self {
        let internal = env
            .cluster_access()
            .and_then(|cluster| cluster.ns_repo().get_namespace_if(id, env.interruptor()));
        if internal.is_none() {
            debug!(%id, "namespace not resolved");
        }
        Self { id, internal, env }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn get_namespace_if(&self) -> NamespaceInterfaceAdapter<'a> {
        NamespaceInterfaceAdapter::new(self.internal.clone(), self.env)
    }
}
