//! End-to-end: a query creates a database, waits for it to reach the local
//! projections through a lagging replicator, then reads from a namespace in a
//! profiled environment.

use std::collections::BTreeSet;
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use shardql_env::{
    ClusterAccess, EnvDeps, EnvError, EnvResult, Environment, EventLog, InMemoryNamespaceRepo,
    NamespaceInterface, OrderToken, ProfileBool, Query, ReadRequest, ReadResponse, Region, Term,
    WriteRequest, WriteResponse,
};
use shardql_meta::{
    ClusterMetadata, DatabasesMetadata, MetadataStore, NamespaceMetadata, NamespacesMetadata,
    PeerDirectory, Projection, Replicator, Signal, SignalSource, Stamp, Watchable,
};

// ── Tracing setup ────────────────────────────────────────────────

static TRACING_INIT: Once = Once::new();

fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

// ── Fixtures ─────────────────────────────────────────────────────

const NODE: Uuid = Uuid::from_u128(1);

/// Two-shard namespace returning one event log per shard.
struct TwoShards;

#[async_trait]
impl NamespaceInterface for TwoShards {
    async fn read(
        &self,
        read: ReadRequest,
        _order_token: Option<OrderToken>,
        interruptor: &Signal,
    ) -> EnvResult<ReadResponse> {
        interruptor.check()?;
        Ok(ReadResponse {
            result: json!({ "profiled": read.profile == ProfileBool::Profile }),
            n_shards: 2,
            event_log: vec![EventLog::default(), EventLog::default()],
        })
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
        _write: WriteRequest,
        _order_token: Option<OrderToken>,
        _interruptor: &Signal,
    ) -> EnvResult<WriteResponse> {
        Err(EnvError::cannot_perform("read-only namespace"))
    }

    fn get_sharding_scheme(&self) -> EnvResult<BTreeSet<Region>> {
        Ok(BTreeSet::from([Region::new("", Some("m")), Region::new("m", None)]))
    }

    fn get_initial_ready_signal(&self) -> Signal {
        Signal::pulsed()
    }
}

struct Node {
    cluster: Arc<ClusterAccess>,
    store: MetadataStore<ClusterMetadata>,
    repo: Arc<InMemoryNamespaceRepo>,
    _replicator: Replicator,
}

fn node(namespaces_delay: Duration, databases_delay: Duration) -> Node {
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
        NODE,
    ));
    let replicator = Replicator::spawn_with_delays(
        &store,
        namespaces,
        databases,
        namespaces_delay,
        databases_delay,
    );
    Node {
        cluster,
        store,
        repo,
        _replicator: replicator,
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[tokio::test]
async fn created_database_is_visible_to_the_next_query() {
    let node = node(Duration::from_millis(30), Duration::from_millis(60));
    let db = Uuid::new_v4();
    let ns = Uuid::new_v4();
    let mut delta = ClusterMetadata::create_database(db, "store1", Stamp::new(1, NODE));
    delta
        .namespaces
        .insert(ns, NamespaceMetadata::new("users", db, "id", Stamp::new(1, NODE)));

    tokio::time::timeout(
        Duration::from_secs(2),
        node.cluster.join_and_wait_to_propagate(delta, &Signal::never()),
    )
    .await
    .expect("join-and-wait should finish once the replicator catches up")
    .unwrap();

    // No sleep: the projections must already reflect the merge.
    assert_eq!(node.cluster.databases().get().find("store1"), Some(db));
    assert_eq!(node.cluster.namespaces().get().find(db, "users"), Some(ns));

    node.repo.register(ns, Arc::new(TwoShards));
    let query = Query::new(Term::datum("r.table('users')"))
        .with_optarg("db", Term::db("store1"))
        .with_optarg("profile", Term::datum(true));
    let deps = EnvDeps::new(node.cluster.clone(), Signal::never());
    let env = Environment::for_query(deps, &query).unwrap();

    let db_val = env.get_optarg("db").unwrap().unwrap();
    assert_eq!(db_val.as_db().and_then(|d| d.id), Some(db));

    let adapter = env.resolve_namespace(ns);
    assert!(adapter.get_initial_ready_signal().is_pulsed());
    let response = adapter
        .read(ReadRequest::new(json!({})), Some(OrderToken(7)), env.interruptor())
        .await
        .unwrap();
    assert_eq!(response.result, json!({ "profiled": true }));

    let spans = env.trace().unwrap();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].shard_logs.len(), 2);
}

#[tokio::test]
async fn interrupting_a_slow_propagation() {
    let node = node(Duration::ZERO, Duration::from_secs(30));
    let source = SignalSource::new();
    let interruptor = source.signal();
    let db = Uuid::new_v4();

    let cluster = node.cluster.clone();
    let call = tokio::spawn(async move {
        cluster
            .join_and_wait_to_propagate(
                ClusterMetadata::create_database(db, "slow", Stamp::new(1, NODE)),
                &interruptor,
            )
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    source.pulse();

    let res = tokio::time::timeout(Duration::from_secs(1), call)
        .await
        .expect("interrupt should end the wait")
        .unwrap();
    assert_eq!(res, Err(EnvError::Interrupted));
    assert_eq!(node.store.get().await.unwrap().databases.find("slow"), Some(db));
    assert_eq!(node.cluster.databases().get().find("slow"), None);
}

#[tokio::test]
async fn query_without_optargs_uses_the_default_database() {
    let node = node(Duration::ZERO, Duration::ZERO);
    let env = Environment::for_query(
        EnvDeps::new(node.cluster.clone(), Signal::never()),
        &Query::new(Term::datum(1)),
    )
    .unwrap();

    assert_eq!(env.profile(), ProfileBool::DontProfile);
    let db = env.get_optarg("db").unwrap().unwrap();
    assert_eq!(db.db_name(), Some("test"));
    // Nothing named "test" exists in this cluster.
    assert_eq!(db.as_db().and_then(|d| d.id), None);
}
