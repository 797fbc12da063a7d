//! Environment — the per-query execution context.
//!
//! An environment is built once per query (or per internal operation) and
//! lives until the query finishes. It owns the query's optargs, its optional
//! profiling trace, a lazily started JS runner and the eval callback, and
//! borrows everything cluster-wide through [`ClusterAccess`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use shardql_meta::Signal;

use crate::cluster::ClusterAccess;
use crate::compile::{Compiler, TermCompiler, Val};
use crate::config::EnvConfig;
use crate::error::{EnvError, EnvResult};
use crate::js::{ExtprocPool, JsRunner};
use crate::namespace::{NamespaceInterfaceAdapter, NamespaceResolver};
use crate::optargs::{OptargBinding, OptargsStore};
use crate::profile::{self, ProfileBool, Span, Trace};
use crate::query::Query;

/// Invoked after every evaluation step. Used for yielding and progress
/// accounting by long-running queries.
pub type EvalCallback = Arc<dyn Fn() + Send + Sync>;

/// Where a JS runner may be used: the tokio task that first asked for it, or
/// the OS thread when that happened outside any task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExecContext {
    Task(tokio::task::Id),
    Thread(ThreadId),
}

impl ExecContext {
    fn current() -> Self {
        match tokio::task::try_id() {
            Some(id) => ExecContext::Task(id),
            None => ExecContext::Thread(thread::current().id()),
        }
    }
}

struct JsChannel {
    context: ExecContext,
    runner: Arc<dyn JsRunner>,
}

/// Shared dependencies an environment is built from.
#[derive(Clone)]
pub struct EnvDeps {
    pub cluster: Arc<ClusterAccess>,
    pub extproc_pool: Option<Arc<dyn ExtprocPool>>,
    pub interruptor: Signal,
    pub compiler: Arc<dyn Compiler>,
    pub config: EnvConfig,
}

impl EnvDeps {
    pub fn new(cluster: Arc<ClusterAccess>, interruptor: Signal) -> Self {
        Self {
            cluster,
            extproc_pool: None,
            interruptor,
            compiler: Arc::new(TermCompiler),
            config: EnvConfig::default(),
        }
    }

    pub fn with_extproc_pool(mut self, pool: Arc<dyn ExtprocPool>) -> Self {
        self.extproc_pool = Some(pool);
        self
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_config(mut self, config: EnvConfig) -> Self {
        self.config = config;
        self
    }
}

pub struct Environment {
    optargs: OptargsStore,
    trace: Option<Mutex<Trace>>,
    cluster: Option<Arc<ClusterAccess>>,
    extproc_pool: Option<Arc<dyn ExtprocPool>>,
    js_channel: Mutex<Option<JsChannel>>,
    interruptor: Signal,
    eval_callback: Mutex<Option<EvalCallback>>,
    config: EnvConfig,
}

impl Environment {
    /// Environment for a client query.
    ///
    /// Compiles the query's global optargs (rejecting duplicates and binding
    /// the default `db`) and turns profiling on when the `profile` optarg is
    /// the literal `true`.
    pub fn for_query(deps: EnvDeps, query: &Query) -> EnvResult<Self> {
        let profile = ProfileBool::from(query.static_optarg("profile") == Some(&Value::Bool(true)));
        let optargs =
            OptargsStore::from_query(query, deps.compiler.clone(), &deps.config.default_database)?;
        info!(
            optargs = optargs.len(),
            profile = profile.is_profile(),
            "query environment created"
        );
        Ok(Self::build(deps, optargs, profile))
    }

    /// Environment for an internal operation: no optargs.
    pub fn with_profile(deps: EnvDeps, profile: ProfileBool) -> Self {
        let optargs = OptargsStore::new(deps.compiler.clone());
        Self::build(deps, optargs, profile)
    }

    /// Environment with no cluster and no JS pool, for evaluating terms that
    /// touch neither.
    pub fn standalone(interruptor: Signal) -> Self {
        Self {
            optargs: OptargsStore::new(Arc::new(TermCompiler)),
            trace: None,
            cluster: None,
            extproc_pool: None,
            js_channel: Mutex::new(None),
            interruptor,
            eval_callback: Mutex::new(None),
            config: EnvConfig::default(),
        }
    }

    fn build(deps: EnvDeps, optargs: OptargsStore, profile: ProfileBool) -> Self {
        Self {
            optargs,
            trace: profile.is_profile().then(|| Mutex::new(Trace::new())),
            cluster: Some(deps.cluster),
            extproc_pool: deps.extproc_pool,
            js_channel: Mutex::new(None),
            interruptor: deps.interruptor,
            eval_callback: Mutex::new(None),
            config: deps.config,
        }
    }

    /// `Profile` iff this environment carries a trace.
    pub fn profile(&self) -> ProfileBool {
        ProfileBool::from(self.trace.is_some())
    }

    /// Value of global optarg `key`, or `None` if the query did not bind it.
    pub fn get_optarg(&self, key: &str) -> EnvResult<Option<Val>> {
        self.optargs.get(key, self)
    }

    pub fn get_all_optargs(&self) -> &std::collections::BTreeMap<String, OptargBinding> {
        self.optargs.get_all()
    }

    pub fn optargs(&self) -> &OptargsStore {
        &self.optargs
    }

    pub fn optargs_mut(&mut self) -> &mut OptargsStore {
        &mut self.optargs
    }

    /// The environment's JS runner, starting one if there is none yet or the
    /// previous one lost its worker.
    ///
    /// The first call binds the runner to the calling task (or thread, outside
    /// a task). Calls from any other context fail with `Invariant`.
    pub fn get_js_runner(&self) -> EnvResult<Arc<dyn JsRunner>> {
        let Some(pool) = &self.extproc_pool else {
            return Err(EnvError::invariant("environment has no extproc pool"));
        };
        let current = ExecContext::current();

        let mut slot = lock(&self.js_channel);
        match slot.as_ref() {
            Some(channel) if channel.context != current => {
                return Err(EnvError::invariant(format!(
                    "js runner requested from {current:?}, bound to {:?}",
                    channel.context
                )));
            }
            Some(channel) if channel.runner.connected() => return Ok(channel.runner.clone()),
            _ => {}
        }
        let runner = pool.begin(&self.config.js, &self.interruptor)?;
        debug!(replaced = slot.is_some(), context = ?current, "js runner started");
        *slot = Some(JsChannel {
            context: current,
            runner: runner.clone(),
        });
        Ok(runner)
    }

    pub fn set_eval_callback(&self, callback: Option<EvalCallback>) {
        *lock(&self.eval_callback) = callback;
    }

    pub fn do_eval_callback(&self) {
        let callback = lock(&self.eval_callback).clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn interruptor(&self) -> &Signal {
        &self.interruptor
    }

    pub fn cluster_access(&self) -> Option<&Arc<ClusterAccess>> {
        self.cluster.as_ref()
    }

    /// Profiling-aware handle on namespace `id`. Empty if the namespace is
    /// unknown or this environment has no cluster access.
    pub fn resolve_namespace(&self, id: Uuid) -> NamespaceInterfaceAdapter<'_> {
        NamespaceResolver::new(id, self).get_namespace_if()
    }

    /// Snapshot of the span tree, if profiling.
    pub fn trace(&self) -> Option<Vec<Span>> {
        self.trace.as_ref().map(|trace| profile::lock(trace).spans())
    }

    /// Detach the trace, e.g. to attach it to the query response.
    pub fn take_trace(&mut self) -> Option<Trace> {
        self.trace
            .take()
            .map(|trace| trace.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn trace_handle(&self) -> Option<&Mutex<Trace>> {
        self.trace.as_ref()
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
