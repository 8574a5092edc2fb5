//! Transaction-aware execution adapter.
//!
//! [`DbAdapter`] wraps a [`Connection`] and adds what the flat connection
//! contract does not give you: nested logical transactions emulated with
//! savepoints, row-shaping query helpers and chunked pagination over a
//! [`QueryBuilder`].
//!
//! One adapter per connection, driven from a single logical call chain:
//! the nesting counter and the positional savepoint names (`sp1`, `sp2`,
//! ...) are not reentrancy-safe, so interleaving transaction calls from
//! concurrent tasks corrupts the protocol.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::builder::QueryBuilder;
use crate::connection::Connection;
use crate::error::{DbError, DbResult};
use crate::row::DbRow;
use crate::value::SqlValue;

/// Adapter pairing a connection with nested-transaction bookkeeping.
///
/// `Connection` is implemented for `&C`, so an adapter can borrow a
/// connection the caller keeps using directly.
pub struct DbAdapter<C> {
    connection: C,
    depth: AtomicU32,
}

impl<C: Connection> DbAdapter<C> {
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            depth: AtomicU32::new(0),
        }
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Current transaction nesting depth (0 = no open transaction).
    pub fn transaction_depth(&self) -> u32 {
        self.depth.load(Ordering::Relaxed)
    }

    // ==================== Transactions ====================

    /// Open a transaction level: a real `BEGIN` at depth 0, a
    /// `SAVEPOINT spN` below. Returns the new depth.
    pub async fn begin_transaction(&self) -> DbResult<u32> {
        let depth = self.depth.load(Ordering::Relaxed);
        if depth == 0 {
            self.connection.begin_transaction().await?;
        } else {
            self.connection
                .execute(&format!("SAVEPOINT sp{depth}"), &[])
                .await?;
        }
        let new_depth = depth + 1;
        self.depth.store(new_depth, Ordering::Relaxed);
        Ok(new_depth)
    }

    /// Close the innermost transaction level: a real `COMMIT` when it is
    /// the outermost, `RELEASE SAVEPOINT spN` otherwise. Returns the new
    /// depth.
    pub async fn commit(&self) -> DbResult<u32> {
        let depth = self.depth.load(Ordering::Relaxed);
        if depth == 0 {
            return Err(DbError::transaction(
                "commit() called with no open transaction (depth 0)",
            ));
        }
        let new_depth = depth - 1;
        if new_depth == 0 {
            self.connection.commit().await?;
        } else {
            self.connection
                .execute(&format!("RELEASE SAVEPOINT sp{new_depth}"), &[])
                .await?;
        }
        self.depth.store(new_depth, Ordering::Relaxed);
        Ok(new_depth)
    }

    /// Undo the innermost transaction level: `ROLLBACK TO SAVEPOINT spN`
    /// when nested, a real `ROLLBACK` at the outermost level. With
    /// `force`, a real `ROLLBACK` is issued regardless of nesting and the
    /// depth resets to 0. Returns the new depth.
    pub async fn rollback(&self, force: bool) -> DbResult<u32> {
        let depth = self.depth.load(Ordering::Relaxed);
        if depth == 0 {
            return Err(DbError::transaction(
                "rollback() called with no open transaction (depth 0)",
            ));
        }
        let new_depth = depth - 1;
        if force || new_depth == 0 {
            self.connection.rollback().await?;
            self.depth.store(0, Ordering::Relaxed);
            Ok(0)
        } else {
            self.connection
                .execute(&format!("ROLLBACK TO SAVEPOINT sp{new_depth}"), &[])
                .await?;
            self.depth.store(new_depth, Ordering::Relaxed);
            Ok(new_depth)
        }
    }

    /// Run `f` inside a transaction level: commits on `Ok`, rolls back
    /// one level on `Err` and propagates the original error. A rollback
    /// failure is reported combined with the original error.
    pub async fn transaction<T, F>(&self, f: F) -> DbResult<T>
    where
        F: AsyncFnOnce() -> DbResult<T>,
    {
        self.begin_transaction().await?;
        match f().await {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(error) => match self.rollback(false).await {
                Ok(_) => Err(error),
                Err(rollback_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(%rollback_err, "rollback after failed transaction body also failed");
                    Err(DbError::Other(format!(
                        "{error} (rollback failed: {rollback_err})"
                    )))
                }
            },
        }
    }

    // ==================== Execution & result shaping ====================

    /// Run a statement not expected to return rows; returns the affected
    /// row count.
    pub async fn execute(&self, sql: &str, bindings: &[SqlValue]) -> DbResult<u64> {
        #[cfg(feature = "tracing")]
        tracing::debug!(sql, "execute");
        self.connection.execute(sql, bindings).await
    }

    /// All rows, in result-set order.
    pub async fn select_all(&self, sql: &str, bindings: &[SqlValue]) -> DbResult<Vec<DbRow>> {
        #[cfg(feature = "tracing")]
        tracing::debug!(sql, "select");
        self.connection.select(sql, bindings).await
    }

    /// The first row, or an empty row when the result set is empty.
    pub async fn select_row(&self, sql: &str, bindings: &[SqlValue]) -> DbResult<DbRow> {
        Ok(self
            .select_all(sql, bindings)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    /// The first column of every row.
    pub async fn select_column(&self, sql: &str, bindings: &[SqlValue]) -> DbResult<Vec<SqlValue>> {
        Ok(self
            .select_all(sql, bindings)
            .await?
            .into_iter()
            .map(|row| row.into_first_value().unwrap_or(SqlValue::Null))
            .collect())
    }

    /// The first column of the first row; `None` when the result set is
    /// empty — distinct from a stored SQL `NULL`, which comes back as
    /// `Some(SqlValue::Null)`.
    pub async fn select_value(
        &self,
        sql: &str,
        bindings: &[SqlValue],
    ) -> DbResult<Option<SqlValue>> {
        Ok(self
            .select_all(sql, bindings)
            .await?
            .into_iter()
            .next()
            .and_then(DbRow::into_first_value))
    }

    /// Map built from two-column rows: first column (plain string form)
    /// becomes the key, second the value. A row with any other column
    /// count is an error.
    pub async fn select_key_value(
        &self,
        sql: &str,
        bindings: &[SqlValue],
    ) -> DbResult<HashMap<String, SqlValue>> {
        let rows = self.select_all(sql, bindings).await?;
        let mut map = HashMap::with_capacity(rows.len());
        for row in rows {
            if row.len() != 2 {
                return Err(DbError::builder(format!(
                    "select_key_value() expects exactly 2 columns per row, got {}",
                    row.len()
                )));
            }
            let mut columns = row.into_iter();
            let (_, key) = columns.next().expect("row has 2 columns");
            let (_, value) = columns.next().expect("row has 2 columns");
            map.insert(key.plain(), value);
        }
        Ok(map)
    }

    // ==================== Chunked pagination ====================

    /// Fetch the query's rows in pages of `page_size` via repeated
    /// LIMIT/OFFSET, invoking `handler` once per page.
    ///
    /// The total is taken from a `count(*)` variant of the query first;
    /// zero rows means the handler is never invoked. The page loop runs
    /// at least once and stops when the remaining-row counter, decremented
    /// by `page_size` after each page, reaches zero. A handler error
    /// aborts the iteration and propagates.
    pub async fn chunk<F>(
        &self,
        page_size: u64,
        query: &QueryBuilder,
        mut handler: F,
    ) -> DbResult<()>
    where
        F: FnMut(Vec<DbRow>) -> DbResult<()>,
    {
        if page_size == 0 {
            return Err(DbError::builder("chunk() requires a page size of at least 1"));
        }

        let mut count_query = query.copy();
        count_query.count("*");
        let total = self
            .select_value(&count_query.to_sql()?, &[])
            .await?
            .and_then(|value| value.as_i64())
            .unwrap_or(0);
        if total <= 0 {
            return Ok(());
        }

        let mut items_left = total;
        let mut offset: u64 = 0;
        loop {
            let mut page = query.copy();
            page.limit(page_size).offset(offset);
            let rows = self.select_all(&page.to_sql()?, &[]).await?;
            handler(rows)?;
            offset += page_size;
            items_left -= page_size as i64;
            if items_left <= 0 {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
