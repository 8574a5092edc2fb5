//! Connection capability consumed by [`DbAdapter`](crate::DbAdapter).
//!
//! A connection executes SQL text, yields normalized rows and provides the
//! *flat* transaction primitives; nesting lives in the adapter. Passing a
//! reference works anywhere an owned connection does, so one connection
//! can back an adapter and still be used directly.

use std::future::Future;

use crate::error::DbResult;
use crate::row::DbRow;
use crate::value::SqlValue;

pub mod stub;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use stub::StubConnection;

/// Capability contract for a database connection.
///
/// Failures must surface as query errors carrying the offending SQL and
/// the driver diagnostic. Implementations normalize every row to
/// [`DbRow`] (ordered string-keyed [`SqlValue`]s) before returning it.
pub trait Connection: Send + Sync {
    /// Run a statement not expected to return rows; returns the affected
    /// row count.
    fn execute(
        &self,
        sql: &str,
        bindings: &[SqlValue],
    ) -> impl Future<Output = DbResult<u64>> + Send;

    /// Run a statement and return its rows, in result-set order.
    fn select(
        &self,
        sql: &str,
        bindings: &[SqlValue],
    ) -> impl Future<Output = DbResult<Vec<DbRow>>> + Send;

    /// Start a database transaction (flat; no nesting).
    fn begin_transaction(&self) -> impl Future<Output = DbResult<()>> + Send;

    /// Commit the active database transaction.
    fn commit(&self) -> impl Future<Output = DbResult<()>> + Send;

    /// Roll back the active database transaction.
    fn rollback(&self) -> impl Future<Output = DbResult<()>> + Send;

    /// Driver-correct escaped form of a scalar, without surrounding
    /// quotes.
    fn escape(&self, value: &str) -> String;
}

impl<C: Connection> Connection for &C {
    async fn execute(&self, sql: &str, bindings: &[SqlValue]) -> DbResult<u64> {
        (*self).execute(sql, bindings).await
    }

    async fn select(&self, sql: &str, bindings: &[SqlValue]) -> DbResult<Vec<DbRow>> {
        (*self).select(sql, bindings).await
    }

    async fn begin_transaction(&self) -> DbResult<()> {
        (*self).begin_transaction().await
    }

    async fn commit(&self) -> DbResult<()> {
        (*self).commit().await
    }

    async fn rollback(&self) -> DbResult<()> {
        (*self).rollback().await
    }

    fn escape(&self, value: &str) -> String {
        (*self).escape(value)
    }
}
