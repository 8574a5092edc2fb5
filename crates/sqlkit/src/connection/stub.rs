//! Scripted in-memory connection for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::connection::Connection;
use crate::error::DbResult;
use crate::row::DbRow;
use crate::value::SqlValue;

/// A connection double that records every statement and replays queued
/// result sets.
///
/// Part of the library (not test-only) so downstream crates can assert on
/// the exact SQL their code issues:
///
/// ```ignore
/// let con = StubConnection::new();
/// con.push_result_set(vec![row! { "id" => 1 }]);
/// let db = DbAdapter::new(&con);
/// // ... drive the adapter ...
/// assert_eq!(con.log(), vec!["SELECT *\nFROM users".to_string()]);
/// ```
#[derive(Default)]
pub struct StubConnection {
    log: Mutex<Vec<String>>,
    results: Mutex<VecDeque<Vec<DbRow>>>,
}

impl StubConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the rows the next `select` call will return. Each call feeds
    /// exactly one query; unqueued queries return no rows.
    pub fn push_result_set(&self, rows: Vec<DbRow>) {
        self.results.lock().unwrap().push_back(rows);
    }

    /// Every statement seen so far, in order. Transaction primitives are
    /// recorded as `begin` / `commit` / `rollback`.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    fn record(&self, entry: &str) {
        self.log.lock().unwrap().push(entry.to_string());
    }
}

impl Connection for StubConnection {
    async fn execute(&self, sql: &str, _bindings: &[SqlValue]) -> DbResult<u64> {
        self.record(sql);
        Ok(1)
    }

    async fn select(&self, sql: &str, _bindings: &[SqlValue]) -> DbResult<Vec<DbRow>> {
        self.record(sql);
        Ok(self.results.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn begin_transaction(&self) -> DbResult<()> {
        self.record("begin");
        Ok(())
    }

    async fn commit(&self) -> DbResult<()> {
        self.record("commit");
        Ok(())
    }

    async fn rollback(&self) -> DbResult<()> {
        self.record("rollback");
        Ok(())
    }

    fn escape(&self, value: &str) -> String {
        value.replace('\'', "''")
    }
}
