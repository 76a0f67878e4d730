//! Backing-store plumbing for SFC.
//!
//! The object lifecycle engine in `sfc-core` never talks to a concrete
//! database. It consumes the abstractions defined here:
//!
//! - [`Connection`] -- open/close/clone of a backing-store session, plus the
//!   hand-offs to query and execution facilities
//! - [`Enumerator`] / [`DataReader`] -- issue a [`Request`] and stream rows
//! - [`ExecutionEngine`] -- run a [`Script`]
//! - [`ConnectionContext`] -- the Offline / Online / batch mode state machine
//!   and its [`ActionLog`]
//!
//! [`InMemoryStore`] implements all of them over a URN-keyed map and is what
//! tests and embedders use.

pub mod connection;
pub mod context;
pub mod error;
pub mod memory;
pub mod reader;
pub mod script;

pub use connection::{ActiveQueriesMode, Connection, ConnectionId};
pub use context::{ActionLog, ConnectionContext, ConnectionMode};
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStore, MemoryConnection, StoreStats};
pub use reader::{DataReader, Enumerator, Request, ResultTable, TableReader, URN_COLUMN};
pub use script::{ExecutionEngine, ExecutionResult, Script, ScriptOp};
