//! Connection-context mode state machine.
//!
//! A [`ConnectionContext`] decides what happens to a script handed to it:
//!
//! | mode                 | effect of [`ConnectionContext::execute`]       |
//! |----------------------|------------------------------------------------|
//! | `Offline`            | nothing reaches the backing store              |
//! | `Online`             | executed immediately                           |
//! | `TransactedBatch`    | queued; flushed all-or-nothing                 |
//! | `NonTransactedBatch` | queued; flushed in order, stopping on failure  |
//!
//! Mode changes follow a fixed table. Entering a batch mode is only allowed
//! from `Online` or another batch mode. Leaving a batch toward `Online` (or a
//! different batch mode) flushes the action log; leaving toward `Offline`
//! discards it. Entering `Offline` always force-disconnects.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{StoreError, StoreResult};
use crate::script::{ExecutionResult, Script};

/// Connection-context mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionMode {
    #[default]
    Offline,
    Online,
    TransactedBatch,
    NonTransactedBatch,
}

impl ConnectionMode {
    pub const ALL: [ConnectionMode; 4] = [
        ConnectionMode::Offline,
        ConnectionMode::Online,
        ConnectionMode::TransactedBatch,
        ConnectionMode::NonTransactedBatch,
    ];

    pub fn is_batch(self) -> bool {
        matches!(
            self,
            ConnectionMode::TransactedBatch | ConnectionMode::NonTransactedBatch
        )
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionMode::Offline => "Offline",
            ConnectionMode::Online => "Online",
            ConnectionMode::TransactedBatch => "TransactedBatch",
            ConnectionMode::NonTransactedBatch => "NonTransactedBatch",
        };
        f.write_str(s)
    }
}

/// Scripts queued while in a batch mode.
#[derive(Clone, Debug, Default)]
pub struct ActionLog {
    scripts: Vec<Script>,
}

impl ActionLog {
    pub fn push(&mut self, script: Script) {
        self.scripts.push(script);
    }

    pub fn scripts(&self) -> &[Script] {
        &self.scripts
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    fn clear(&mut self) -> usize {
        let n = self.scripts.len();
        self.scripts.clear();
        n
    }
}

#[derive(Debug)]
struct ContextState {
    mode: ConnectionMode,
    log: ActionLog,
}

/// Mode state machine owned by a domain root.
#[derive(Debug)]
pub struct ConnectionContext {
    connection: Option<Arc<dyn Connection>>,
    state: Mutex<ContextState>,
}

impl ConnectionContext {
    /// A context over `connection`, starting `Online`.
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection: Some(connection),
            state: Mutex::new(ContextState {
                mode: ConnectionMode::Online,
                log: ActionLog::default(),
            }),
        }
    }

    /// A context with no connection handle. It is permanently `Offline`.
    pub fn offline() -> Self {
        Self {
            connection: None,
            state: Mutex::new(ContextState {
                mode: ConnectionMode::Offline,
                log: ActionLog::default(),
            }),
        }
    }

    pub fn connection(&self) -> Option<&Arc<dyn Connection>> {
        self.connection.as_ref()
    }

    /// Current mode. Always `Offline` when there is no connection handle.
    pub fn mode(&self) -> ConnectionMode {
        if self.connection.is_none() {
            return ConnectionMode::Offline;
        }
        self.state.lock().expect("context lock poisoned").mode
    }

    /// Switch modes, applying the side effects of the transition.
    ///
    /// A failed flush leaves both the mode and the unexecuted scripts in place.
    pub fn set_mode(&self, to: ConnectionMode) -> StoreResult<()> {
        use ConnectionMode::*;

        let mut state = self.state.lock().expect("context lock poisoned");
        let from = if self.connection.is_none() {
            Offline
        } else {
            state.mode
        };
        if from == to {
            return Ok(());
        }

        match (from, to) {
            (Offline, Online) => {
                let conn = self.connection.as_ref().ok_or(StoreError::NoConnection)?;
                conn.connect()?;
            }
            (Offline, _) => return Err(StoreError::InvalidModeTransition { from, to }),
            (_, Offline) => {
                let discarded = state.log.clear();
                if discarded > 0 {
                    warn!(discarded, "discarded queued scripts on switch to offline");
                }
                self.disconnect_quietly();
            }
            (Online, _) => {}
            (_, _) => {
                self.flush_locked(&mut state)?;
            }
        }

        state.mode = to;
        info!(%from, %to, "connection mode changed");
        Ok(())
    }

    /// Execute every queued script. Safe to call at any time; an empty log is a no-op.
    ///
    /// Returns the number of scripts executed.
    pub fn flush_action_log(&self) -> StoreResult<usize> {
        let mut state = self.state.lock().expect("context lock poisoned");
        self.flush_locked(&mut state)
    }

    /// Number of scripts waiting in the action log.
    pub fn pending_scripts(&self) -> usize {
        self.state.lock().expect("context lock poisoned").log.len()
    }

    /// Snapshot of the queued scripts.
    pub fn action_log(&self) -> ActionLog {
        self.state.lock().expect("context lock poisoned").log.clone()
    }

    /// Route `script` according to the current mode.
    pub fn execute(&self, script: Script) -> StoreResult<ExecutionResult> {
        let mut state = self.state.lock().expect("context lock poisoned");
        let mode = if self.connection.is_none() {
            ConnectionMode::Offline
        } else {
            state.mode
        };
        match mode {
            ConnectionMode::Offline => {
                debug!(ops = script.len(), "offline, script not executed");
                Ok(ExecutionResult::None)
            }
            ConnectionMode::Online => {
                let conn = self.connection.as_ref().ok_or(StoreError::NoConnection)?;
                debug!(ops = script.len(), "executing script");
                conn.engine().execute(&script)
            }
            ConnectionMode::TransactedBatch | ConnectionMode::NonTransactedBatch => {
                state.log.push(script);
                debug!(queued = state.log.len(), "script queued in action log");
                Ok(ExecutionResult::Deferred)
            }
        }
    }

    /// Drop every queued script without executing it. Returns how many were dropped.
    pub fn discard_action_log(&self) -> usize {
        self.state.lock().expect("context lock poisoned").log.clear()
    }

    /// Close the connection and enter `Offline`, whatever the current mode.
    /// Queued scripts are discarded.
    pub fn force_disconnected(&self) {
        let mut state = self.state.lock().expect("context lock poisoned");
        state.log.clear();
        self.disconnect_quietly();
        state.mode = ConnectionMode::Offline;
    }

    fn disconnect_quietly(&self) {
        if let Some(conn) = &self.connection {
            if let Err(e) = conn.disconnect() {
                warn!(error = %e, "disconnect failed while going offline");
            }
        }
    }

    fn flush_locked(&self, state: &mut ContextState) -> StoreResult<usize> {
        if state.log.is_empty() {
            return Ok(0);
        }
        let conn = self.connection.as_ref().ok_or(StoreError::NoConnection)?;
        let total = state.log.len();

        if state.mode == ConnectionMode::TransactedBatch {
            conn.engine().execute_batch(state.log.scripts(), true)?;
            state.log.clear();
        } else {
            while !state.log.is_empty() {
                conn.engine().execute(&state.log.scripts[0])?;
                state.log.scripts.remove(0);
            }
        }

        info!(scripts = total, mode = %state.mode, "flushed action log");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::script::ScriptOp;
    use sfc_types::Urn;
    use super::ConnectionMode::*;

    fn context() -> (InMemoryStore, ConnectionContext) {
        let store = InMemoryStore::new();
        store.insert(Urn::parse("Catalog[@Name='main']").unwrap(), Vec::new());
        let ctx = ConnectionContext::new(store.connect());
        (store, ctx)
    }

    fn create(name: &str) -> Script {
        Script::from(ScriptOp::Create {
            urn: Urn::parse(&format!("Catalog[@Name='main']/Login[@Name='{name}']")).unwrap(),
            properties: Vec::new(),
        })
    }

    /// Put `ctx` in `mode` starting from Online.
    fn enter(ctx: &ConnectionContext, mode: ConnectionMode) {
        ctx.set_mode(Online).unwrap();
        ctx.set_mode(mode).unwrap();
        assert_eq!(ctx.mode(), mode);
    }

    // ---- Test 1: the full transition table ----

    #[test]
    fn transition_table() {
        for from in ConnectionMode::ALL {
            for to in ConnectionMode::ALL {
                let (store, ctx) = context();
                enter(&ctx, from);
                ctx.execute(create("queued")).unwrap();
                let result = ctx.set_mode(to);

                let expect_ok = !(from == Offline && to.is_batch());
                assert_eq!(result.is_ok(), expect_ok, "{from} -> {to}");
                if !expect_ok {
                    assert!(matches!(
                        result,
                        Err(StoreError::InvalidModeTransition { .. })
                    ));
                    assert_eq!(ctx.mode(), Offline);
                    continue;
                }
                assert_eq!(ctx.mode(), to, "{from} -> {to}");

                let created = store.contains(
                    &Urn::parse("Catalog[@Name='main']/Login[@Name='queued']").unwrap(),
                );
                match (from, to) {
                    // Online executes right away.
                    (Online, _) => assert!(created),
                    (Offline, _) => assert!(!created),
                    // Leaving a batch for offline discards.
                    (f, Offline) if f.is_batch() => {
                        assert!(!created);
                        assert_eq!(ctx.pending_scripts(), 0);
                    }
                    (f, t) if f == t => {
                        assert!(!created);
                        assert_eq!(ctx.pending_scripts(), 1);
                    }
                    // batch -> Online / other batch flushes.
                    _ => {
                        assert!(created, "{from} -> {to}");
                        assert_eq!(ctx.pending_scripts(), 0);
                    }
                }
                if to == Offline {
                    assert!(!ctx.connection().unwrap().is_open());
                }
            }
        }
    }

    // ---- Test 2: online to batch does not flush ----

    #[test]
    fn entering_batch_keeps_log_until_flush() {
        let (store, ctx) = context();
        ctx.set_mode(TransactedBatch).unwrap();
        assert_eq!(ctx.execute(create("a")).unwrap(), ExecutionResult::Deferred);
        assert_eq!(ctx.execute(create("b")).unwrap(), ExecutionResult::Deferred);
        assert_eq!(ctx.pending_scripts(), 2);
        assert_eq!(store.len(), 1);

        assert_eq!(ctx.flush_action_log().unwrap(), 2);
        assert_eq!(store.len(), 3);
        // Idempotent checkpoint.
        assert_eq!(ctx.flush_action_log().unwrap(), 0);
        assert_eq!(ctx.mode(), TransactedBatch);
    }

    // ---- Test 3: failed transacted flush keeps everything ----

    #[test]
    fn failed_transacted_flush_keeps_log_and_mode() {
        let (store, ctx) = context();
        ctx.set_mode(TransactedBatch).unwrap();
        ctx.execute(create("a")).unwrap();
        ctx.execute(create("a")).unwrap();

        assert!(ctx.set_mode(Online).is_err());
        assert_eq!(ctx.mode(), TransactedBatch);
        assert_eq!(ctx.pending_scripts(), 2);
        assert_eq!(store.len(), 1);
    }

    // ---- Test 4: failed non-transacted flush keeps the unexecuted tail ----

    #[test]
    fn failed_non_transacted_flush_keeps_tail() {
        let (store, ctx) = context();
        ctx.set_mode(NonTransactedBatch).unwrap();
        ctx.execute(create("a")).unwrap();
        ctx.execute(create("a")).unwrap();
        ctx.execute(create("b")).unwrap();

        assert!(ctx.flush_action_log().is_err());
        assert_eq!(ctx.pending_scripts(), 2);
        assert_eq!(store.len(), 2);
    }

    // ---- Test 5: no handle means offline ----

    #[test]
    fn missing_handle_forces_offline() {
        let ctx = ConnectionContext::offline();
        assert_eq!(ctx.mode(), Offline);
        assert!(matches!(ctx.set_mode(Online), Err(StoreError::NoConnection)));
        assert!(matches!(
            ctx.set_mode(TransactedBatch),
            Err(StoreError::InvalidModeTransition { .. })
        ));
        assert_eq!(ctx.execute(create("x")).unwrap(), ExecutionResult::None);
    }

    // ---- Test 6: offline and back reconnects ----

    #[test]
    fn offline_round_trip_reconnects() {
        let (_store, ctx) = context();
        ctx.set_mode(Offline).unwrap();
        assert!(!ctx.connection().unwrap().is_open());
        ctx.set_mode(Online).unwrap();
        assert!(ctx.connection().unwrap().is_open());
    }

    #[test]
    fn force_disconnected_discards_and_goes_offline() {
        let (_store, ctx) = context();
        ctx.set_mode(NonTransactedBatch).unwrap();
        ctx.execute(create("a")).unwrap();
        ctx.force_disconnected();
        assert_eq!(ctx.mode(), Offline);
        assert_eq!(ctx.pending_scripts(), 0);
        assert_eq!(ctx.discard_action_log(), 0);
    }
}
