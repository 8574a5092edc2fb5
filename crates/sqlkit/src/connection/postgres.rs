//! tokio-postgres backed connection.

use tokio_postgres::Row;
use tokio_postgres::types::{ToSql, Type};

use crate::connection::Connection;
use crate::error::{DbError, DbResult};
use crate::row::DbRow;
use crate::value::SqlValue;

/// [`Connection`] over a `tokio_postgres::Client`.
///
/// The caller owns the connection task (`tokio_postgres::connect` returns
/// a `(Client, Connection)` pair; spawn the latter). Flat transaction
/// primitives are issued as plain `BEGIN`/`COMMIT`/`ROLLBACK` statements
/// so the adapter's savepoint protocol composes with them.
pub struct PgConnection {
    client: tokio_postgres::Client,
}

impl PgConnection {
    pub fn new(client: tokio_postgres::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }

    pub fn into_client(self) -> tokio_postgres::Client {
        self.client
    }
}

impl Connection for PgConnection {
    async fn execute(&self, sql: &str, bindings: &[SqlValue]) -> DbResult<u64> {
        let params = to_params(bindings);
        let refs = param_refs(&params);
        self.client
            .execute(sql, &refs)
            .await
            .map_err(|e| DbError::query(sql, e.to_string()))
    }

    async fn select(&self, sql: &str, bindings: &[SqlValue]) -> DbResult<Vec<DbRow>> {
        let params = to_params(bindings);
        let refs = param_refs(&params);
        let rows = self
            .client
            .query(sql, &refs)
            .await
            .map_err(|e| DbError::query(sql, e.to_string()))?;
        rows.iter().map(to_db_row).collect()
    }

    async fn begin_transaction(&self) -> DbResult<()> {
        self.client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| DbError::query("BEGIN", e.to_string()))
    }

    async fn commit(&self) -> DbResult<()> {
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(|e| DbError::query("COMMIT", e.to_string()))
    }

    async fn rollback(&self) -> DbResult<()> {
        self.client
            .batch_execute("ROLLBACK")
            .await
            .map_err(|e| DbError::query("ROLLBACK", e.to_string()))
    }

    // Standard conforming strings: doubling the quote is sufficient.
    fn escape(&self, value: &str) -> String {
        value.replace('\'', "''")
    }
}

fn to_params(bindings: &[SqlValue]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    bindings
        .iter()
        .map(|value| -> Box<dyn ToSql + Sync + Send> {
            match value {
                SqlValue::Null => Box::new(Option::<String>::None),
                SqlValue::Int(n) => Box::new(*n),
                SqlValue::Float(f) => Box::new(*f),
                SqlValue::Bool(b) => Box::new(*b),
                SqlValue::Text(s) => Box::new(s.clone()),
                // Expressions cannot be bound; they travel as text.
                SqlValue::Expr(e) => Box::new(e.as_str().to_string()),
            }
        })
        .collect()
}

fn param_refs(params: &[Box<dyn ToSql + Sync + Send>]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| &**p as &(dyn ToSql + Sync)).collect()
}

fn to_db_row(row: &Row) -> DbResult<DbRow> {
    let mut out = DbRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        out.push(column.name(), column_value(row, idx, column.type_())?);
    }
    Ok(out)
}

fn column_value(row: &Row, idx: usize, ty: &Type) -> DbResult<SqlValue> {
    let name = row.columns()[idx].name();
    let decode = |e: tokio_postgres::Error| DbError::decode(name, e.to_string());

    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)
            .map_err(decode)?
            .map(SqlValue::Bool)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .map_err(decode)?
            .map(|n| SqlValue::Int(n as i64))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)
            .map_err(decode)?
            .map(|n| SqlValue::Int(n as i64))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)
            .map_err(decode)?
            .map(SqlValue::Int)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)
            .map_err(decode)?
            .map(|f| SqlValue::Float(f as f64))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)
            .map_err(decode)?
            .map(SqlValue::Float)
    } else if *ty == Type::UUID {
        row.try_get::<_, Option<uuid::Uuid>>(idx)
            .map_err(decode)?
            .map(SqlValue::from)
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<chrono::NaiveDate>>(idx)
            .map_err(decode)?
            .map(SqlValue::from)
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .map_err(decode)?
            .map(SqlValue::from)
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .map_err(decode)?
            .map(SqlValue::from)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<serde_json::Value>>(idx)
            .map_err(decode)?
            .map(SqlValue::from)
    } else {
        row.try_get::<_, Option<String>>(idx)
            .map_err(decode)?
            .map(SqlValue::Text)
    };

    Ok(value.unwrap_or(SqlValue::Null))
}
