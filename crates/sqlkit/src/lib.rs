//! # sqlkit
//!
//! A fluent SQL statement builder and a transaction-aware database
//! adapter over a pluggable connection.
//!
//! ## Features
//!
//! - **SQL explicit**: statements are composed from string fragments;
//!   clause ordering, escaping and WHERE merging are structured
//! - **One builder, four statements**: SELECT / INSERT / UPDATE / DELETE
//!   share the fluent [`QueryBuilder`] surface
//! - **Injected escaping**: the escaper is a per-family strategy passed
//!   at construction (see [`SqlFactory`]), never process-global state
//! - **Nested transactions**: [`DbAdapter`] emulates nesting over flat
//!   BEGIN/COMMIT/ROLLBACK with positional savepoints
//! - **Shaped results**: list / row / column / scalar / key-value
//!   helpers, plus LIMIT/OFFSET chunking for large result sets
//! - **Testable by construction**: [`StubConnection`] records every
//!   statement and replays scripted result sets
//!
//! ## Building statements
//!
//! ```ignore
//! use sqlkit::SqlFactory;
//!
//! let factory = SqlFactory::standard();
//!
//! let mut query = factory.make();
//! query
//!     .from_as("orders", "o")
//!     .select("o.id, o.total")
//!     .and_where_equals("o.status", "paid")
//!     .add_order("o.created_at DESC")
//!     .limit(20);
//! let sql = query.to_sql()?;
//! ```
//!
//! ## Running them
//!
//! ```ignore
//! use sqlkit::DbAdapter;
//!
//! let db = DbAdapter::new(connection);
//! let rows = db.select_all(&sql, &[]).await?;
//!
//! db.transaction(async || {
//!     db.execute("UPDATE accounts SET balance = balance - 100", &[])
//!         .await?;
//!     db.execute("UPDATE accounts SET balance = balance + 100", &[])
//!         .await?;
//!     Ok(())
//! })
//! .await?;
//! ```

pub mod adapter;
pub mod builder;
pub mod connection;
pub mod error;
pub mod row;
pub mod value;

pub use adapter::DbAdapter;
pub use builder::{QueryBuilder, SqlFactory, StatementKind, TableRef};
pub use connection::{Connection, StubConnection};
pub use error::{DbError, DbResult};
pub use row::DbRow;
pub use value::{EscapeFn, SqlExpr, SqlValue, standard_escape};

#[cfg(feature = "postgres")]
pub use connection::postgres::PgConnection;
