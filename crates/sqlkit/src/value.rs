//! Scalar values, raw SQL expressions and the escaping strategy.
//!
//! Every value that flows through the builder or comes back from a
//! [`Connection`](crate::Connection) is normalized to [`SqlValue`], so the
//! rendering rules live in exactly one place. Escaping is a strategy
//! injected per builder family (see [`SqlFactory`](crate::SqlFactory)),
//! never global state.

use std::fmt;
use std::sync::Arc;

/// Escaping strategy: maps a raw scalar to a SQL-safe fragment
/// (without surrounding quotes).
pub type EscapeFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// The ANSI quote-doubling escaper (`'` becomes `''`).
///
/// Correct for any backend running with standard conforming strings;
/// drivers with their own escaping rules supply their own closure.
pub fn standard_escape() -> EscapeFn {
    Arc::new(|value: &str| value.replace('\'', "''"))
}

/// A raw SQL fragment embedded verbatim, bypassing quoting and escaping.
///
/// Use for expressions the database evaluates itself:
///
/// ```ignore
/// qb.value("updated_at", SqlExpr::new("NOW()"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlExpr(String);

impl SqlExpr {
    pub fn new(expr: impl Into<String>) -> Self {
        Self(expr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A normalized SQL scalar.
///
/// Connections must map driver rows to this variant before returning them,
/// and the builder renders every interpolated value through it.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Expr(SqlExpr),
}

impl SqlValue {
    /// Render as a SQL literal: `NULL`, verbatim numbers and expressions,
    /// `0`/`1` for booleans, quoted-and-escaped text.
    pub fn render(&self, escape: &EscapeFn) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Text(s) => format!("'{}'", escape(s)),
            Self::Expr(e) => e.as_str().to_string(),
        }
    }

    /// Plain string form without quoting or escaping (used for IN-list
    /// items, key-value keys and format-template substitution).
    pub fn plain(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Text(s) => s.clone(),
            Self::Expr(e) => e.as_str().to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer reading, if the value has one (`Float` truncates,
    /// `Text` is parsed).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) => Some(*f as i64),
            Self::Text(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
            _ => None,
        }
    }

    /// Coercing integer form for `%d` template substitution.
    pub(crate) fn as_i64_lossy(&self) -> i64 {
        match self {
            Self::Bool(b) => *b as i64,
            Self::Null => 0,
            Self::Expr(e) => text_to_i64(e.as_str()),
            other => other.as_i64().unwrap_or(0),
        }
    }

    /// Coercing float form for `%f` template substitution.
    pub(crate) fn as_f64_lossy(&self) -> f64 {
        match self {
            Self::Int(n) => *n as f64,
            Self::Float(f) => *f,
            Self::Bool(b) => *b as i64 as f64,
            Self::Null => 0.0,
            Self::Text(s) => s.trim().parse().unwrap_or(0.0),
            Self::Expr(e) => e.as_str().trim().parse().unwrap_or(0.0),
        }
    }
}

fn text_to_i64(s: &str) -> i64 {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        .unwrap_or(0)
}

macro_rules! impl_from_int {
    ($($t:ty),+) => {
        $(impl From<$t> for SqlValue {
            fn from(value: $t) -> Self {
                Self::Int(value as i64)
            }
        })+
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for SqlValue {
    fn from(value: f32) -> Self {
        Self::Float(value as f64)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<SqlExpr> for SqlValue {
    fn from(value: SqlExpr) -> Self {
        Self::Expr(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

impl From<uuid::Uuid> for SqlValue {
    fn from(value: uuid::Uuid) -> Self {
        Self::Text(value.hyphenated().to_string())
    }
}

impl From<chrono::NaiveDate> for SqlValue {
    fn from(value: chrono::NaiveDate) -> Self {
        Self::Text(value.format("%Y-%m-%d").to_string())
    }
}

impl From<chrono::NaiveDateTime> for SqlValue {
    fn from(value: chrono::NaiveDateTime) -> Self {
        Self::Text(value.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

impl From<chrono::DateTime<chrono::Utc>> for SqlValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        Self::Text(value.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => Self::Text(s),
            // Arrays and objects are stored as their JSON text form.
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<&SqlValue> for serde_json::Value {
    fn from(value: &SqlValue) -> Self {
        match value {
            SqlValue::Null => serde_json::Value::Null,
            SqlValue::Int(n) => serde_json::Value::from(*n),
            SqlValue::Float(f) => serde_json::Value::from(*f),
            SqlValue::Bool(b) => serde_json::Value::from(*b),
            SqlValue::Text(s) => serde_json::Value::from(s.clone()),
            SqlValue::Expr(e) => serde_json::Value::from(e.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_scalars() {
        let escape = standard_escape();
        assert_eq!(SqlValue::Null.render(&escape), "NULL");
        assert_eq!(SqlValue::Int(23).render(&escape), "23");
        assert_eq!(SqlValue::Float(1.56).render(&escape), "1.56");
        assert_eq!(SqlValue::Bool(true).render(&escape), "1");
        assert_eq!(SqlValue::Bool(false).render(&escape), "0");
        assert_eq!(
            SqlValue::Text("val'/*".to_string()).render(&escape),
            "'val''/*'"
        );
        assert_eq!(
            SqlValue::Expr(SqlExpr::new("NOW()")).render(&escape),
            "NOW()"
        );
    }

    #[test]
    fn option_maps_to_null() {
        assert_eq!(SqlValue::from(None::<i32>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(5)), SqlValue::Int(5));
    }

    #[test]
    fn lossy_int_parses_numeric_text() {
        assert_eq!(SqlValue::Text("21.21".into()).as_i64_lossy(), 21);
        assert_eq!(SqlValue::Text("42".into()).as_i64_lossy(), 42);
        assert_eq!(SqlValue::Text("abc".into()).as_i64_lossy(), 0);
    }

    #[test]
    fn json_round_trip() {
        let value = SqlValue::from(serde_json::json!({"a": 1}));
        assert_eq!(value, SqlValue::Text("{\"a\":1}".to_string()));
        assert_eq!(
            serde_json::Value::from(&SqlValue::Int(7)),
            serde_json::json!(7)
        );
    }
}
