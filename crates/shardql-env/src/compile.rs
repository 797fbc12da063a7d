//! Compiler seam: turning a term into something an environment can call.
//!
//! The full query compiler lives elsewhere. [`TermCompiler`] covers the
//! terms that show up as global optargs: literals, `db`, arrays and
//! `javascript`.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::env::Environment;
use crate::error::{EnvError, EnvResult};
use crate::query::{Term, TermKind};

/// Reference to a database produced by evaluating `db(name)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DbRef {
    pub name: String,
    /// Resolved id, when the environment has cluster metadata and the
    /// database exists there.
    pub id: Option<Uuid>,
}

/// Result of evaluating a term.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Val {
    Datum(Value),
    Db(DbRef),
}

impl Val {
    pub fn as_datum(&self) -> Option<&Value> {
        match self {
            Val::Datum(value) => Some(value),
            Val::Db(_) => None,
        }
    }

    pub fn as_db(&self) -> Option<&DbRef> {
        match self {
            Val::Db(db) => Some(db),
            Val::Datum(_) => None,
        }
    }

    /// The database name this value designates: a database reference or a
    /// plain string.
    pub fn db_name(&self) -> Option<&str> {
        match self {
            Val::Db(db) => Some(&db.name),
            Val::Datum(Value::String(name)) => Some(name),
            Val::Datum(_) => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Val::Db(_) => "DATABASE",
            Val::Datum(value) => datum_type_name(value),
        }
    }
}

fn datum_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Bool(_) => "BOOL",
        Value::Number(_) => "NUMBER",
        Value::String(_) => "STRING",
        Value::Array(_) => "ARRAY",
        Value::Object(_) => "OBJECT",
    }
}

/// A compiled, zero-argument closure.
pub trait Func: Send + Sync {
    fn call(&self, env: &Environment) -> EnvResult<Val>;
}

/// Expression compiler.
pub trait Compiler: Send + Sync {
    fn compile(&self, term: &Term) -> EnvResult<Arc<dyn Func>>;
}

/// Compiler for optarg-shaped terms.
#[derive(Debug, Default, Clone, Copy)]
pub struct TermCompiler;

impl Compiler for TermCompiler {
    fn compile(&self, term: &Term) -> EnvResult<Arc<dyn Func>> {
        check(term)?;
        Ok(Arc::new(CompiledTerm { term: term.clone() }))
    }
}

/// Reject what can be rejected before evaluation.
fn check(term: &Term) -> EnvResult<()> {
    match &term.kind {
        TermKind::Datum(_) => Ok(()),
        TermKind::Db(name) => match name.as_datum() {
            Some(Value::String(_)) => Ok(()),
            Some(other) => Err(EnvError::query(format!(
                "Expected type STRING but found {}.",
                datum_type_name(other)
            ))),
            None => check(name),
        },
        TermKind::MakeArray(items) => items.iter().try_for_each(check),
        TermKind::Javascript(source) if source.trim().is_empty() => {
            Err(EnvError::query("Empty javascript source."))
        }
        TermKind::Javascript(_) => Ok(()),
    }
}

struct CompiledTerm {
    term: Term,
}

impl fmt::Debug for CompiledTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTerm")
            .field("term", &self.term)
            .finish()
    }
}

impl Func for CompiledTerm {
    fn call(&self, env: &Environment) -> EnvResult<Val> {
        eval(&self.term, env)
    }
}

fn eval(term: &Term, env: &Environment) -> EnvResult<Val> {
    let val = match &term.kind {
        TermKind::Datum(value) => Val::Datum(value.clone()),
        TermKind::Db(name) => {
            let name = match eval(name, env)? {
                Val::Datum(Value::String(name)) => name,
                other => {
                    return Err(EnvError::query(format!(
                        "Expected type STRING but found {}.",
                        other.type_name()
                    )));
                }
            };
            let id = env
                .cluster_access()
                .and_then(|cluster| cluster.databases().with(|dbs| dbs.find(&name)));
            Val::Db(DbRef { name, id })
        }
        TermKind::MakeArray(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match eval(item, env)? {
                    Val::Datum(value) => out.push(value),
                    other => {
                        return Err(EnvError::query(format!(
                            "Expected type DATUM but found {}.",
                            other.type_name()
                        )));
                    }
                }
            }
            Val::Datum(Value::Array(out))
        }
        TermKind::Javascript(source) => {
            let runner = env.get_js_runner()?;
            Val::Datum(runner.eval(source, env.interruptor())?)
        }
    };
    env.do_eval_callback();
    Ok(val)
}
