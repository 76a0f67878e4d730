//! Object queries for SFC domains.
//!
//! An [`ObjectQuery`] runs a URN query expression against a domain's backing
//! store and hands back either a materialized [`ResultTable`](sfc_store::ResultTable)
//! or an [`ObjectIterator`] that turns each row into a live
//! [`Instance`](sfc_core::Instance), reusing objects already loaded in the
//! domain's collections.

pub mod error;
pub mod iterator;
pub mod query;

pub use error::{QueryError, QueryResult};
pub use iterator::ObjectIterator;
pub use query::ObjectQuery;
