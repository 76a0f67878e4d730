//! In-memory, URN-keyed backing store.
//!
//! Every object is a row of named property values stored under its URN.
//! [`MemoryConnection`] implements [`Connection`], [`Enumerator`], and
//! [`ExecutionEngine`] over that map, with instrumentation counters and
//! failure injection for tests.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

use sfc_types::{Urn, Value};
use tracing::debug;

use crate::connection::{Connection, ConnectionId};
use crate::error::{StoreError, StoreResult};
use crate::reader::{DataReader, Enumerator, Request, ResultTable, TableReader, URN_COLUMN};
use crate::script::{ExecutionEngine, ExecutionResult, Script, ScriptOp};

type Row = BTreeMap<String, Value>;
type Nodes = BTreeMap<Urn, Row>;

/// Snapshot of the store's instrumentation counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub open_readers: usize,
    pub open_clones: usize,
    pub queries_issued: usize,
    pub scripts_executed: usize,
}

#[derive(Debug, Default)]
struct Backend {
    nodes: RwLock<Nodes>,
    open_readers: AtomicUsize,
    open_clones: AtomicUsize,
    queries_issued: AtomicUsize,
    scripts_executed: AtomicUsize,
    refuse_clones: AtomicBool,
    fail_next_query: AtomicBool,
    fail_next_execution: AtomicBool,
}

/// In-memory backing store.
///
/// Cloning the store shares the underlying data.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    backend: Arc<Backend>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row, bypassing script validation. The leaf segment's attributes
    /// are stored as properties unless `properties` sets them.
    pub fn insert(&self, urn: Urn, properties: Vec<(String, Value)>) {
        let mut row = key_properties(&urn);
        row.extend(properties);
        self.backend
            .nodes
            .write()
            .expect("lock poisoned")
            .insert(urn, row);
    }

    pub fn get(&self, urn: &Urn) -> Option<BTreeMap<String, Value>> {
        self.backend
            .nodes
            .read()
            .expect("lock poisoned")
            .get(urn)
            .cloned()
    }

    pub fn property(&self, urn: &Urn, name: &str) -> Option<Value> {
        self.get(urn).and_then(|row| row.get(name).cloned())
    }

    pub fn contains(&self, urn: &Urn) -> bool {
        self.backend
            .nodes
            .read()
            .expect("lock poisoned")
            .contains_key(urn)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.backend.nodes.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All URNs in sorted order.
    pub fn urns(&self) -> Vec<Urn> {
        self.backend
            .nodes
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Open a primary connection allowing one active reader.
    pub fn connect(&self) -> Arc<dyn Connection> {
        Arc::new(MemoryConnection::new(self.backend.clone(), false, false))
    }

    /// Open a primary connection that multiplexes readers.
    pub fn connect_multiplexed(&self) -> Arc<dyn Connection> {
        Arc::new(MemoryConnection::new(self.backend.clone(), false, true))
    }

    pub fn stats(&self) -> StoreStats {
        let b = &self.backend;
        StoreStats {
            open_readers: b.open_readers.load(AtomicOrdering::SeqCst),
            open_clones: b.open_clones.load(AtomicOrdering::SeqCst),
            queries_issued: b.queries_issued.load(AtomicOrdering::SeqCst),
            scripts_executed: b.scripts_executed.load(AtomicOrdering::SeqCst),
        }
    }

    /// Make every subsequent `Connection::copy` fail.
    pub fn refuse_clones(&self, refuse: bool) {
        self.backend.refuse_clones.store(refuse, AtomicOrdering::SeqCst);
    }

    /// Make the next query fail.
    pub fn fail_next_query(&self) {
        self.backend.fail_next_query.store(true, AtomicOrdering::SeqCst);
    }

    /// Make the next script execution fail.
    pub fn fail_next_execution(&self) {
        self.backend
            .fail_next_execution
            .store(true, AtomicOrdering::SeqCst);
    }
}

impl Backend {
    fn query(&self, request: &Request) -> ResultTable {
        let nodes = self.nodes.read().expect("lock poisoned");
        let mut matched: Vec<(&Urn, &Row)> = nodes
            .iter()
            .filter(|(urn, _)| request.query.matches(urn))
            .collect();

        let fields: Vec<String> = if request.fields.is_empty() {
            matched
                .iter()
                .flat_map(|(_, row)| row.keys().cloned())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        } else {
            request
                .fields
                .iter()
                .filter(|f| !f.eq_ignore_ascii_case(URN_COLUMN))
                .cloned()
                .collect()
        };

        if !request.order_by.is_empty() {
            matched.sort_by(|(_, a), (_, b)| {
                request
                    .order_by
                    .iter()
                    .map(|f| compare_values(a.get(f), b.get(f)))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let mut columns = vec![URN_COLUMN.to_string()];
        columns.extend(fields.iter().cloned());
        let mut table = ResultTable::new(columns);
        for (urn, row) in matched {
            let mut values = vec![Value::Text(urn.to_string())];
            values.extend(fields.iter().map(|f| row.get(f).cloned().unwrap_or_default()));
            table.push_row(values);
        }
        table
    }

    fn apply_script(&self, nodes: &mut Nodes, script: &Script) -> StoreResult<u64> {
        let mut rows = 0;
        for op in script.ops() {
            rows += apply(nodes, op)?;
        }
        self.scripts_executed.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(rows)
    }

    fn take_execution_fault(&self) -> StoreResult<()> {
        if self.fail_next_execution.swap(false, AtomicOrdering::SeqCst) {
            return Err(StoreError::ExecutionFailed("injected failure".into()));
        }
        Ok(())
    }
}

fn key_properties(urn: &Urn) -> Row {
    urn.leaf()
        .map(|leaf| {
            leaf.attributes()
                .map(|(k, v)| (k.to_string(), Value::Text(v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Int(x)), Some(Value::Int(y))) => x.cmp(y),
        (Some(Value::Float(x)), Some(Value::Float(y))) => x.total_cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::DateTime(x)), Some(Value::DateTime(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Move `from` and its subtree to `to`.
fn rekey(nodes: &mut Nodes, from: &Urn, to: &Urn) {
    let affected: Vec<Urn> = nodes
        .keys()
        .filter(|u| from.is_prefix_of(u))
        .cloned()
        .collect();
    for old in affected {
        if let Some(row) = nodes.remove(&old) {
            let mut segments = to.segments().to_vec();
            segments.extend_from_slice(&old.segments()[from.len()..]);
            nodes.insert(Urn::from_segments(segments), row);
        }
    }
}

fn require(nodes: &Nodes, urn: &Urn) -> StoreResult<()> {
    if nodes.contains_key(urn) {
        Ok(())
    } else {
        Err(StoreError::NotFound(urn.to_string()))
    }
}

fn require_absent(nodes: &Nodes, urn: &Urn) -> StoreResult<()> {
    if nodes.contains_key(urn) {
        Err(StoreError::AlreadyExists(urn.to_string()))
    } else {
        Ok(())
    }
}

fn apply(nodes: &mut Nodes, op: &ScriptOp) -> StoreResult<u64> {
    match op {
        ScriptOp::Create { urn, properties } => {
            require_absent(nodes, urn)?;
            if let Some(parent) = urn.parent() {
                require(nodes, &parent)?;
            }
            let mut row = key_properties(urn);
            row.extend(properties.iter().cloned());
            nodes.insert(urn.clone(), row);
            Ok(1)
        }
        ScriptOp::Alter { urn, properties } => {
            let row = nodes
                .get_mut(urn)
                .ok_or_else(|| StoreError::NotFound(urn.to_string()))?;
            row.extend(properties.iter().cloned());
            Ok(1)
        }
        ScriptOp::Drop { urn } => {
            require(nodes, urn)?;
            let before = nodes.len();
            nodes.retain(|u, _| !urn.is_prefix_of(u));
            Ok((before - nodes.len()) as u64)
        }
        ScriptOp::Rename { urn, new_leaf } => {
            require(nodes, urn)?;
            let target = match urn.parent() {
                Some(parent) => parent.child(new_leaf.clone()),
                None => Urn::from_segments(vec![new_leaf.clone()]),
            };
            if target == *urn {
                return Ok(0);
            }
            require_absent(nodes, &target)?;
            rekey(nodes, urn, &target);
            if let Some(row) = nodes.get_mut(&target) {
                for (k, v) in new_leaf.attributes() {
                    row.insert(k.to_string(), Value::Text(v.to_string()));
                }
            }
            Ok(1)
        }
        ScriptOp::Move { urn, new_parent } => {
            require(nodes, urn)?;
            require(nodes, new_parent)?;
            if urn.is_prefix_of(new_parent) {
                return Err(StoreError::ExecutionFailed(format!(
                    "cannot move {urn} under its own subtree"
                )));
            }
            let leaf = urn
                .leaf()
                .cloned()
                .ok_or_else(|| StoreError::NotFound(urn.to_string()))?;
            let target = new_parent.child(leaf);
            require_absent(nodes, &target)?;
            rekey(nodes, urn, &target);
            Ok(1)
        }
        ScriptOp::Statement(text) => {
            if text.trim().is_empty() {
                return Err(StoreError::ExecutionFailed("empty statement".into()));
            }
            debug!(statement = %text, "statement accepted");
            Ok(0)
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A session against an [`InMemoryStore`].
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    backend: Arc<Backend>,
    open: AtomicBool,
    is_clone: bool,
    multiple_active_readers: bool,
    active_readers: Arc<AtomicUsize>,
}

impl MemoryConnection {
    fn new(backend: Arc<Backend>, is_clone: bool, multiple_active_readers: bool) -> Self {
        if is_clone {
            backend.open_clones.fetch_add(1, AtomicOrdering::SeqCst);
        }
        Self {
            id: uuid::Uuid::now_v7(),
            backend,
            open: AtomicBool::new(true),
            is_clone,
            multiple_active_readers,
            active_readers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_clone(&self) -> bool {
        self.is_clone
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.open.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::ConnectionClosed(self.id))
        }
    }
}

impl Connection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn connect(&self) -> StoreResult<()> {
        if !self.open.swap(true, AtomicOrdering::SeqCst) && self.is_clone {
            self.backend.open_clones.fetch_add(1, AtomicOrdering::SeqCst);
        }
        Ok(())
    }

    fn disconnect(&self) -> StoreResult<()> {
        if self.open.swap(false, AtomicOrdering::SeqCst) && self.is_clone {
            self.backend.open_clones.fetch_sub(1, AtomicOrdering::SeqCst);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(AtomicOrdering::SeqCst)
    }

    fn copy(&self) -> StoreResult<Arc<dyn Connection>> {
        self.ensure_open()?;
        if self.backend.refuse_clones.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::CloneRefused(format!(
                "store refuses to clone connection {}",
                self.id
            )));
        }
        let clone = MemoryConnection::new(self.backend.clone(), true, self.multiple_active_readers);
        debug!(source = %self.id, clone = %clone.id, "cloned connection");
        Ok(Arc::new(clone))
    }

    fn supports_multiple_active_readers(&self) -> bool {
        self.multiple_active_readers
    }

    fn enumerator(&self) -> &dyn Enumerator {
        self
    }

    fn engine(&self) -> &dyn ExecutionEngine {
        self
    }
}

impl Enumerator for MemoryConnection {
    fn get_data(&self, request: &Request) -> StoreResult<Box<dyn DataReader>> {
        self.ensure_open()?;
        if self.backend.fail_next_query.swap(false, AtomicOrdering::SeqCst) {
            return Err(StoreError::QueryFailed("injected failure".into()));
        }
        if !self.multiple_active_readers && self.active_readers.load(AtomicOrdering::SeqCst) > 0 {
            return Err(StoreError::ReaderBusy(self.id));
        }
        self.backend.queries_issued.fetch_add(1, AtomicOrdering::SeqCst);
        let table = self.backend.query(request);
        debug!(query = %request.query, rows = table.len(), "query executed");

        self.active_readers.fetch_add(1, AtomicOrdering::SeqCst);
        self.backend.open_readers.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(Box::new(MemoryReader {
            inner: table.into_reader(),
            backend: self.backend.clone(),
            active_readers: self.active_readers.clone(),
            released: false,
        }))
    }
}

impl ExecutionEngine for MemoryConnection {
    fn execute(&self, script: &Script) -> StoreResult<ExecutionResult> {
        self.ensure_open()?;
        self.backend.take_execution_fault()?;
        let mut nodes = self.backend.nodes.write().expect("lock poisoned");
        let mut working = nodes.clone();
        let rows = self.backend.apply_script(&mut working, script)?;
        *nodes = working;
        Ok(ExecutionResult::RowCount(rows))
    }

    fn execute_batch(&self, scripts: &[Script], transacted: bool) -> StoreResult<ExecutionResult> {
        if !transacted {
            let mut rows = 0;
            for script in scripts {
                if let ExecutionResult::RowCount(n) = self.execute(script)? {
                    rows += n;
                }
            }
            return Ok(ExecutionResult::RowCount(rows));
        }

        self.ensure_open()?;
        self.backend.take_execution_fault()?;
        let mut nodes = self.backend.nodes.write().expect("lock poisoned");
        let mut working = nodes.clone();
        let mut rows = 0;
        for script in scripts {
            rows += self.backend.apply_script(&mut working, script)?;
        }
        *nodes = working;
        debug!(scripts = scripts.len(), rows, "transacted batch committed");
        Ok(ExecutionResult::RowCount(rows))
    }
}

struct MemoryReader {
    inner: TableReader,
    backend: Arc<Backend>,
    active_readers: Arc<AtomicUsize>,
    released: bool,
}

impl MemoryReader {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.active_readers.fetch_sub(1, AtomicOrdering::SeqCst);
            self.backend.open_readers.fetch_sub(1, AtomicOrdering::SeqCst);
        }
    }
}

impl DataReader for MemoryReader {
    fn columns(&self) -> &[String] {
        self.inner.columns()
    }

    fn read(&mut self) -> StoreResult<bool> {
        self.inner.read()
    }

    fn value(&self, ordinal: usize) -> StoreResult<&Value> {
        self.inner.value(ordinal)
    }

    fn close(&mut self) {
        self.inner.close();
        self.release();
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        self.release();
    }
}
