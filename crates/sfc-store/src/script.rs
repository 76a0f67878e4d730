//! Scripts and the execution engine abstraction.
//!
//! A [`Script`] is an ordered list of structured operations. Backends decide
//! how to render or apply them; the lifecycle engine only builds, queues, and
//! hands them over.

use std::fmt;

use serde::{Deserialize, Serialize};
use sfc_types::{Urn, UrnSegment, Value};

use crate::error::{StoreError, StoreResult};
use crate::reader::ResultTable;

/// A single backing-store operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScriptOp {
    Create {
        urn: Urn,
        properties: Vec<(String, Value)>,
    },
    Alter {
        urn: Urn,
        properties: Vec<(String, Value)>,
    },
    /// Drop the object and everything below it.
    Drop { urn: Urn },
    /// Replace the leaf segment of `urn`.
    Rename { urn: Urn, new_leaf: UrnSegment },
    /// Re-home `urn` (and its subtree) under `new_parent`.
    Move { urn: Urn, new_parent: Urn },
    /// Backend-specific text, passed through verbatim.
    Statement(String),
}

impl fmt::Display for ScriptOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptOp::Create { urn, properties } => {
                write!(f, "CREATE {urn} ({} properties)", properties.len())
            }
            ScriptOp::Alter { urn, properties } => {
                write!(f, "ALTER {urn} ({} properties)", properties.len())
            }
            ScriptOp::Drop { urn } => write!(f, "DROP {urn}"),
            ScriptOp::Rename { urn, new_leaf } => write!(f, "RENAME {urn} TO {new_leaf}"),
            ScriptOp::Move { urn, new_parent } => write!(f, "MOVE {urn} TO {new_parent}"),
            ScriptOp::Statement(text) => f.write_str(text),
        }
    }
}

/// An ordered list of operations executed as one unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    ops: Vec<ScriptOp>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: ScriptOp) {
        self.ops.push(op);
    }

    /// Append every operation of `other`.
    pub fn append(&mut self, other: Script) {
        self.ops.extend(other.ops);
    }

    pub fn ops(&self) -> &[ScriptOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl From<ScriptOp> for Script {
    fn from(op: ScriptOp) -> Self {
        Self { ops: vec![op] }
    }
}

impl FromIterator<ScriptOp> for Script {
    fn from_iter<T: IntoIterator<Item = ScriptOp>>(iter: T) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{op}")?;
        }
        Ok(())
    }
}

/// Outcome of executing a script.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionResult {
    None,
    Scalar(Value),
    RowCount(u64),
    ResultSet(ResultTable),
    /// Queued in an action log instead of executed.
    Deferred,
}

/// Runs scripts against a backing store.
pub trait ExecutionEngine: Send + Sync {
    fn execute(&self, script: &Script) -> StoreResult<ExecutionResult>;

    /// Run several scripts.
    ///
    /// When `transacted` is set either every script applies or none does.
    /// Otherwise scripts run in order and execution stops at the first failure.
    /// The default implementation only provides the non-transacted behavior
    /// and refuses transacted batches with
    /// [`StoreError::TransactionsUnsupported`]; backends with transactions
    /// must override it.
    fn execute_batch(&self, scripts: &[Script], transacted: bool) -> StoreResult<ExecutionResult> {
        if transacted {
            return Err(StoreError::TransactionsUnsupported);
        }
        let mut rows = 0;
        for script in scripts {
            if let ExecutionResult::RowCount(n) = self.execute(script)? {
                rows += n;
            }
        }
        Ok(ExecutionResult::RowCount(rows))
    }
}
