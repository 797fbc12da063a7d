//! Shared fakes for unit tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use shardql_meta::{
    ClusterMetadata, DatabasesMetadata, MetadataStore, NamespacesMetadata, PeerDirectory,
    Projection, Signal, SignalSource, Watchable,
};

use crate::cluster::ClusterAccess;
use crate::config::JsConfig;
use crate::error::{EnvError, EnvResult};
use crate::js::{ExtprocPool, JsRunner};
use crate::namespace::{
    InMemoryNamespaceRepo, NamespaceInterface, OrderToken, ReadRequest, ReadResponse, Region,
    WriteRequest, WriteResponse,
};
use crate::profile::{Event, EventLog, ProfileBool};

pub const THIS_MACHINE: Uuid = Uuid::from_u128(0x5eed);

// ── Tracing setup ────────────────────────────────────────────────

static TRACING_INIT: Once = Once::new();

/// Controlled by `RUST_LOG`. Only the first call takes effect.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

// ── Namespace ────────────────────────────────────────────────────

/// In-memory namespace split into `n` shards. Records the profile flag of
/// the last request it saw.
pub struct FakeNamespace {
    shards: usize,
    reads: AtomicUsize,
    last_read_profile: Mutex<Option<ProfileBool>>,
    last_write_profile: Mutex<Option<ProfileBool>>,
    failure: Mutex<Option<EnvError>>,
    ready: SignalSource,
    gate: Option<Signal>,
}

impl FakeNamespace {
    pub const ID: Uuid = Uuid::from_u128(0x7e57);

    pub fn with_shards(shards: usize) -> Self {
        Self {
            shards,
            reads: AtomicUsize::new(0),
            last_read_profile: Mutex::new(None),
            last_write_profile: Mutex::new(None),
            failure: Mutex::new(None),
            ready: SignalSource::new(),
            gate: None,
        }
    }

    /// Hold every read until `gate` fires.
    pub fn with_gate(mut self, gate: Signal) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn fail_with(&self, err: EnvError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn mark_ready(&self) {
        self.ready.pulse();
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn last_read_profile(&self) -> Option<ProfileBool> {
        *self.last_read_profile.lock().unwrap()
    }

    pub fn last_write_profile(&self) -> Option<ProfileBool> {
        *self.last_write_profile.lock().unwrap()
    }

    fn check_failure(&self) -> EnvResult<()> {
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn event_logs(&self, profile: ProfileBool) -> Vec<EventLog> {
        (0..self.shards)
            .map(|shard| match profile {
                ProfileBool::Profile => EventLog::new(vec![
                    Event::Start {
                        description: format!("shard {shard}"),
                        at_us: 0,
                    },
                    Event::Stop { at_us: 10 },
                ]),
                ProfileBool::DontProfile => EventLog::default(),
            })
            .collect()
    }

    fn read_response(&self, read: &ReadRequest) -> ReadResponse {
        ReadResponse {
            result: json!({ "query": read.query.clone() }),
            n_shards: self.shards,
            event_log: self.event_logs(read.profile),
        }
    }
}

#[async_trait]
impl NamespaceInterface for FakeNamespace {
    async fn read(
        &self,
        read: ReadRequest,
        _order_token: Option<OrderToken>,
        interruptor: &Signal,
    ) -> EnvResult<ReadResponse> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        *self.last_read_profile.lock().unwrap() = Some(read.profile);
        if let Some(gate) = &self.gate {
            gate.wait().await;
        }
        interruptor.check()?;
        self.check_failure()?;
        Ok(self.read_response(&read))
    }

    async fn read_outdated(
        &self,
        read: ReadRequest,
        interruptor: &Signal,
    ) -> EnvResult<ReadResponse> {
        self.read(read, None, interruptor).await
    }

    async fn write(
        &self,
        write: WriteRequest,
        _order_token: Option<OrderToken>,
        interruptor: &Signal,
    ) -> EnvResult<WriteResponse> {
        *self.last_write_profile.lock().unwrap() = Some(write.profile);
        interruptor.check()?;
        self.check_failure()?;
        Ok(WriteResponse {
            result: json!({ "inserted": 1 }),
            n_shards: self.shards,
            event_log: self.event_logs(write.profile),
        })
    }

    fn get_sharding_scheme(&self) -> EnvResult<BTreeSet<Region>> {
        Ok((0..self.shards)
            .map(|i| {
                let left = format!("{i:04}");
                let right = (i + 1 < self.shards).then(|| format!("{:04}", i + 1));
                Region::new(&left, right.as_deref())
            })
            .collect())
    }

    fn get_initial_ready_signal(&self) -> Signal {
        self.ready.signal()
    }
}

// ── Cluster ──────────────────────────────────────────────────────

/// A cluster whose local projections are written by hand.
pub struct Harness {
    pub cluster: Arc<ClusterAccess>,
    pub store: MetadataStore<ClusterMetadata>,
    pub namespaces: Projection<NamespacesMetadata>,
    pub databases: Projection<DatabasesMetadata>,
    pub repo: Arc<InMemoryNamespaceRepo>,
}

pub fn harness() -> Harness {
    init_tracing();
    let store = MetadataStore::spawn(ClusterMetadata::default());
    let namespaces = Projection::new("namespaces", NamespacesMetadata::default());
    let databases = Projection::new("databases", DatabasesMetadata::default());
    let repo = Arc::new(InMemoryNamespaceRepo::new());
    let cluster = Arc::new(ClusterAccess::new(
        repo.clone(),
        namespaces.watch(),
        databases.watch(),
        store.clone(),
        Watchable::constant("directory", PeerDirectory::default()),
        THIS_MACHINE,
    ));
    Harness {
        cluster,
        store,
        namespaces,
        databases,
        repo,
    }
}

/// Cluster access with `namespace` registered under [`FakeNamespace::ID`].
/// Must be called inside a tokio runtime.
pub fn test_cluster(namespace: Arc<FakeNamespace>) -> Arc<ClusterAccess> {
    let h = harness();
    h.repo.register(FakeNamespace::ID, namespace);
    h.cluster
}

// ── JS ───────────────────────────────────────────────────────────

/// Runner that echoes the source back as a string.
pub struct FakeRunner {
    connected: AtomicBool,
}

impl JsRunner for FakeRunner {
    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn eval(&self, source: &str, interruptor: &Signal) -> EnvResult<Value> {
        interruptor.check()?;
        Ok(Value::String(source.to_string()))
    }
}

#[derive(Default)]
pub struct FakePool {
    runners: Mutex<Vec<Arc<FakeRunner>>>,
}

impl FakePool {
    pub fn begins(&self) -> usize {
        self.runners.lock().unwrap().len()
    }

    pub fn disconnect_all(&self) {
        for runner in self.runners.lock().unwrap().iter() {
            runner.connected.store(false, Ordering::SeqCst);
        }
    }
}

impl ExtprocPool for FakePool {
    fn begin(&self, _config: &JsConfig, interruptor: &Signal) -> EnvResult<Arc<dyn JsRunner>> {
        interruptor.check()?;
        let runner = Arc::new(FakeRunner {
            connected: AtomicBool::new(true),
        });
        self.runners.lock().unwrap().push(runner.clone());
        Ok(runner)
    }
}
