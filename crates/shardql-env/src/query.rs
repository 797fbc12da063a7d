//! Query terms as handed over by the wire parser.
//!
//! Only the shape this layer needs: a top-level term, the ordered list of
//! global optargs, and the source-location backtrace each term carries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step on the path from the query root to a term.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frame {
    Pos(usize),
    Opt(String),
}

/// Source location of a term inside the client's query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backtrace {
    pub frames: Vec<Frame>,
}

impl Backtrace {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// This backtrace extended by one frame.
    pub fn with(&self, frame: Frame) -> Self {
        let mut frames = self.frames.clone();
        frames.push(frame);
        Self { frames }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "snake_case")]
pub enum TermKind {
    Datum(Value),
    Db(Box<Term>),
    MakeArray(Vec<Term>),
    Javascript(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub kind: TermKind,
    #[serde(default, skip_serializing_if = "Backtrace::is_empty")]
    pub backtrace: Backtrace,
}

impl Term {
    pub fn new(kind: TermKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::default(),
        }
    }

    pub fn datum(value: impl Into<Value>) -> Self {
        Self::new(TermKind::Datum(value.into()))
    }

    /// `r.db(name)`
    pub fn db(name: &str) -> Self {
        Self::new(TermKind::Db(Box::new(Self::datum(name))))
    }

    pub fn make_array(items: Vec<Term>) -> Self {
        Self::new(TermKind::MakeArray(items))
    }

    pub fn javascript(source: &str) -> Self {
        Self::new(TermKind::Javascript(source.to_string()))
    }

    pub fn with_backtrace(mut self, backtrace: Backtrace) -> Self {
        self.backtrace = backtrace;
        self
    }

    /// The literal value, if this term is a datum.
    pub fn as_datum(&self) -> Option<&Value> {
        match &self.kind {
            TermKind::Datum(value) => Some(value),
            _ => None,
        }
    }

    /// Give this term and every sub-term without a location `backtrace`.
    /// Sub-terms that already carry one keep it and hand it further down.
    pub fn propagate_backtrace(&mut self, backtrace: &Backtrace) {
        if self.backtrace.is_empty() {
            self.backtrace = backtrace.clone();
        }
        let own = self.backtrace.clone();
        match &mut self.kind {
            TermKind::Db(name) => name.propagate_backtrace(&own),
            TermKind::MakeArray(items) => {
                for item in items {
                    item.propagate_backtrace(&own);
                }
            }
            TermKind::Datum(_) | TermKind::Javascript(_) => {}
        }
    }
}

/// A parsed client query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub query: Term,
    #[serde(default)]
    pub global_optargs: Vec<(String, Term)>,
}

impl Query {
    pub fn new(query: Term) -> Self {
        Self {
            query,
            global_optargs: Vec::new(),
        }
    }

    pub fn with_optarg(mut self, key: &str, value: Term) -> Self {
        self.global_optargs.push((key.to_string(), value));
        self
    }

    /// The literal value of optarg `key`, when the client sent it as a datum.
    /// Used for settings that must be known before any evaluation, such as
    /// `profile`.
    pub fn static_optarg(&self, key: &str) -> Option<&Value> {
        self.global_optargs
            .iter()
            .filter(|(k, _)| k == key)
            .find_map(|(_, term)| term.as_datum())
    }
}
