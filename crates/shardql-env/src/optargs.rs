//! OptargsStore — a query's global optional arguments as deferred bindings.
//!
//! Each optarg is compiled once, when the store is built, and evaluated on
//! first `get`. The first successful result is kept for the lifetime of the
//! store (and therefore of the owning environment); a failed evaluation is
//! not cached and runs again on the next `get`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::compile::{Compiler, Func, Val};
use crate::env::Environment;
use crate::error::{EnvError, EnvResult};
use crate::query::{Query, Term};

/// Serializable form of a store: key → source term.
pub type WireOptargs = BTreeMap<String, Term>;

/// One compiled optarg.
#[derive(Clone)]
pub struct OptargBinding {
    key: String,
    source: Term,
    func: Arc<dyn Func>,
    memo: OnceLock<Val>,
}

impl OptargBinding {
    pub fn new(key: &str, source: Term, func: Arc<dyn Func>) -> Self {
        Self {
            key: key.to_string(),
            source,
            func,
            memo: OnceLock::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source(&self) -> &Term {
        &self.source
    }

    /// Whether a value has been computed and cached.
    pub fn is_evaluated(&self) -> bool {
        self.memo.get().is_some()
    }

    fn invoke(&self, env: &Environment) -> EnvResult<Val> {
        if let Some(val) = self.memo.get() {
            return Ok(val.clone());
        }
        let val = self.func.call(env)?;
        // A concurrent caller may have won the race; keep whichever landed.
        Ok(self.memo.get_or_init(|| val).clone())
    }
}

impl fmt::Debug for OptargBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptargBinding")
            .field("key", &self.key)
            .field("source", &self.source)
            .field("evaluated", &self.is_evaluated())
            .finish()
    }
}

/// key → compiled optarg. Keys are unique; the first binding for a key wins.
pub struct OptargsStore {
    optargs: BTreeMap<String, OptargBinding>,
    compiler: Arc<dyn Compiler>,
}

impl OptargsStore {
    /// An empty store.
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self {
            optargs: BTreeMap::new(),
            compiler,
        }
    }

    /// Build a store from a client query.
    ///
    /// A key given twice rejects the whole query. After the explicit
    /// optargs, `db` is bound to `db(default_database)` unless the client
    /// already bound it; the synthesized term points at the query root.
    pub fn from_query(
        query: &Query,
        compiler: Arc<dyn Compiler>,
        default_database: &str,
    ) -> EnvResult<Self> {
        let mut store = Self::new(compiler);
        for (key, value) in &query.global_optargs {
            if store.add(key, value)? {
                return Err(EnvError::duplicate_optarg(key));
            }
        }

        let default_db = Term::db(default_database).with_backtrace(query.query.backtrace.clone());
        // An explicit `db` has already been added and wins here.
        let overridden = store.add("db", &default_db)?;
        debug!(
            optargs = store.len(),
            db_overridden = overridden,
            "global optargs compiled"
        );
        Ok(store)
    }

    /// Compile and bind `value` under `key`.
    ///
    /// Returns `true` (and changes nothing) if `key` is already bound.
    pub fn add(&mut self, key: &str, value: &Term) -> EnvResult<bool> {
        if self.optargs.contains_key(key) {
            return Ok(true);
        }
        let mut source = value.clone();
        source.propagate_backtrace(&value.backtrace);
        let func = self.compiler.compile(&source)?;
        self.optargs
            .insert(key.to_string(), OptargBinding::new(key, source, func));
        Ok(false)
    }

    /// Replace the contents wholesale. Only legal on an empty store.
    pub fn init(&mut self, bindings: BTreeMap<String, OptargBinding>) -> EnvResult<()> {
        if !self.optargs.is_empty() {
            return Err(EnvError::invariant(format!(
                "init on a store already holding {} optargs",
                self.optargs.len()
            )));
        }
        self.optargs = bindings;
        Ok(())
    }

    /// Compile a shipped store and `init` with it.
    pub fn init_from_wire(&mut self, wire: &WireOptargs) -> EnvResult<()> {
        let mut bindings = BTreeMap::new();
        for (key, term) in wire {
            let func = self.compiler.compile(term)?;
            bindings.insert(key.clone(), OptargBinding::new(key, term.clone(), func));
        }
        self.init(bindings)
    }

    /// Evaluate optarg `key` in `env`, or `None` if it is not bound.
    pub fn get(&self, key: &str, env: &Environment) -> EnvResult<Option<Val>> {
        match self.optargs.get(key) {
            Some(binding) => binding.invoke(env).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_all(&self) -> &BTreeMap<String, OptargBinding> {
        &self.optargs
    }

    pub fn to_wire(&self) -> WireOptargs {
        self.optargs
            .iter()
            .map(|(key, binding)| (key.clone(), binding.source.clone()))
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.optargs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.optargs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.optargs.is_empty()
    }
}

impl fmt::Debug for OptargsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.optargs.iter()).finish()
    }
}
