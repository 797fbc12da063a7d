//! Execution profiling.
//!
//! A [`Trace`] exists only for queries that asked for `profile: true`. Spans
//! are kept in an arena in the order they were opened; each span remembers
//! the span that was innermost-open when it started, so interleaved scopes
//! still close correctly. Storage responses contribute one [`EventLog`] per
//! shard, tagged by shard index.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Whether a request should collect profiling events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileBool {
    Profile,
    #[default]
    DontProfile,
}

impl ProfileBool {
    pub fn is_profile(self) -> bool {
        self == ProfileBool::Profile
    }
}

impl From<bool> for ProfileBool {
    fn from(profile: bool) -> Self {
        if profile {
            ProfileBool::Profile
        } else {
            ProfileBool::DontProfile
        }
    }
}

/// A single profiling event recorded by a shard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Start { description: String, at_us: u64 },
    Stop { at_us: u64 },
    Sample {
        description: String,
        mean_duration_us: u64,
        n_samples: u64,
    },
}

/// Events one shard produced while serving a request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub events: Vec<Event>,
}

impl EventLog {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShardLog {
    pub shard: usize,
    pub log: EventLog,
}

/// A closed-or-open span as rendered for callers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Span {
    pub name: String,
    /// `None` while the span is still open.
    pub duration_us: Option<u64>,
    pub shard_logs: Vec<ShardLog>,
    pub children: Vec<Span>,
}

/// Handle to a span inside a [`Trace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpanId(usize);

#[derive(Debug)]
struct Node {
    name: String,
    parent: Option<usize>,
    started: Instant,
    duration: Option<Duration>,
    shard_logs: Vec<ShardLog>,
}

/// Append-only span tree for one query.
#[derive(Debug, Default)]
pub struct Trace {
    nodes: Vec<Node>,
    open: Vec<usize>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a span nested under the innermost open span. Spans opened while
    /// it is open nest under it in turn.
    pub fn start(&mut self, name: &str) -> SpanId {
        let id = self.push(name);
        self.open.push(id.0);
        id
    }

    /// Open a span nested under the innermost open span that never becomes a
    /// parent itself. Leaf spans open at the same time are siblings.
    pub fn start_leaf(&mut self, name: &str) -> SpanId {
        self.push(name)
    }

    fn push(&mut self, name: &str) -> SpanId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            name: name.to_string(),
            parent: self.open.last().copied(),
            started: Instant::now(),
            duration: None,
            shard_logs: Vec::new(),
        });
        SpanId(id)
    }

    /// Attach per-shard event logs to `span`.
    pub fn give_splits(&mut self, span: SpanId, n_shards: usize, logs: Vec<EventLog>) {
        if logs.len() != n_shards {
            warn!(
                n_shards,
                logs = logs.len(),
                "shard count does not match number of event logs"
            );
        }
        if let Some(node) = self.nodes.get_mut(span.0) {
            node.shard_logs.extend(
                logs.into_iter()
                    .enumerate()
                    .map(|(shard, log)| ShardLog { shard, log }),
            );
        }
    }

    /// Close `span`. Closing twice is a no-op.
    pub fn finish(&mut self, span: SpanId) {
        if let Some(node) = self.nodes.get_mut(span.0) {
            if node.duration.is_none() {
                node.duration = Some(node.started.elapsed());
            }
        }
        self.open.retain(|id| *id != span.0);
    }

    pub fn span_count(&self) -> usize {
        self.nodes.len()
    }

    /// The span tree, roots in opening order.
    pub fn spans(&self) -> Vec<Span> {
        self.children_of(None)
    }

    fn children_of(&self, parent: Option<usize>) -> Vec<Span> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent == parent)
            .map(|(id, node)| Span {
                name: node.name.clone(),
                duration_us: node.duration.map(|d| d.as_micros() as u64),
                shard_logs: node.shard_logs.clone(),
                children: self.children_of(Some(id)),
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.spans()).unwrap_or(serde_json::Value::Null)
    }
}

/// Guard for one span. Opens on creation and closes on drop; with no trace
/// every method is a no-op.
pub struct ProfileScope<'a> {
    trace: Option<&'a Mutex<Trace>>,
    span: Option<SpanId>,
}

impl<'a> ProfileScope<'a> {
    pub fn start(trace: Option<&'a Mutex<Trace>>, name: &str) -> Self {
        let span = trace.map(|t| lock(t).start(name));
        Self { trace, span }
    }

    /// Like [`start`](Self::start), but opens a leaf span.
    pub fn leaf(trace: Option<&'a Mutex<Trace>>, name: &str) -> Self {
        let span = trace.map(|t| lock(t).start_leaf(name));
        Self { trace, span }
    }

    pub fn give_splits(&self, n_shards: usize, logs: Vec<EventLog>) {
        if let (Some(trace), Some(span)) = (self.trace, self.span) {
            lock(trace).give_splits(span, n_shards, logs);
        }
    }
}

impl Drop for ProfileScope<'_> {
    fn drop(&mut self) {
        if let (Some(trace), Some(span)) = (self.trace, self.span) {
            lock(trace).finish(span);
        }
    }
}

/// Lock the trace, ignoring poisoning.
pub(crate) fn lock(trace: &Mutex<Trace>) -> std::sync::MutexGuard<'_, Trace> {
    trace.lock().unwrap_or_else(PoisonError::into_inner)
}
