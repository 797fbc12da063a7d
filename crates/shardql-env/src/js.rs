//! JavaScript evaluation seam.
//!
//! JS runs out of process. An [`ExtprocPool`] hands out [`JsRunner`]s; each
//! environment keeps at most one runner and asks the pool for a fresh one only
//! when the current one has disconnected.

use std::sync::Arc;

use serde_json::Value;

use shardql_meta::Signal;

use crate::config::JsConfig;
use crate::error::EnvResult;

/// Connection to one JS worker process.
pub trait JsRunner: Send + Sync {
    fn connected(&self) -> bool;

    fn eval(&self, source: &str, interruptor: &Signal) -> EnvResult<Value>;
}

/// Pool of JS worker processes.
pub trait ExtprocPool: Send + Sync {
    /// Start a runner on a free worker.
    fn begin(&self, config: &JsConfig, interruptor: &Signal) -> EnvResult<Arc<dyn JsRunner>>;
}
