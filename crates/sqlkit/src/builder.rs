//! Fluent SQL statement builder.
//!
//! [`QueryBuilder`] is a cheap, clonable value representing exactly one of
//! SELECT / INSERT / UPDATE / DELETE, rendered to SQL text on demand with
//! [`QueryBuilder::to_sql`]. Values are interpolated as escaped literals
//! through the [`EscapeFn`] the builder family was constructed with.
//!
//! ## Design
//!
//! - SQL stays explicit (fragments are strings), but clause ordering,
//!   escaping and WHERE merging are structured.
//! - Rendering never mutates the builder; deferred WHERE hooks run
//!   against a clone.
//! - Misuse in a chaining call (first `or_where`, empty IN-list, template
//!   arity mismatch) is recorded and surfaced by `to_sql()`, before any
//!   SQL reaches a connection.

use std::sync::Arc;

use md5::{Digest, Md5};

use crate::error::{DbError, DbResult};
use crate::value::{EscapeFn, SqlValue, standard_escape};

const WHERE_AND: &str = "AND";
const WHERE_OR: &str = "OR";

/// The mutually exclusive statement mode of a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// FROM target: a plain table name or a nested builder rendered
/// parenthesized.
#[derive(Clone)]
pub enum TableRef {
    Name(String),
    Subquery(Box<QueryBuilder>),
}

impl From<&str> for TableRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for TableRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<QueryBuilder> for TableRef {
    fn from(query: QueryBuilder) -> Self {
        Self::Subquery(Box::new(query))
    }
}

impl From<&QueryBuilder> for TableRef {
    fn from(query: &QueryBuilder) -> Self {
        Self::Subquery(Box::new(query.clone()))
    }
}

type WhereHook = Arc<dyn Fn(&mut QueryBuilder) + Send + Sync>;

type ValueRow = Vec<(String, SqlValue)>;

/// A builder family sharing one escaping strategy.
///
/// The escaper is injected once at construction and treated as read-only;
/// every builder made by the factory carries it.
#[derive(Clone)]
pub struct SqlFactory {
    escape: EscapeFn,
}

impl SqlFactory {
    pub fn new(escape: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            escape: Arc::new(escape),
        }
    }

    /// Factory using the ANSI quote-doubling escaper.
    pub fn standard() -> Self {
        Self {
            escape: standard_escape(),
        }
    }

    /// Create a fresh builder (default statement kind: SELECT).
    pub fn make(&self) -> QueryBuilder {
        QueryBuilder::new(self.escape.clone())
    }

    /// Create a fresh builder carrying a log label, emitted as a leading
    /// `/*label*/` comment.
    pub fn labeled(&self, label: &str) -> QueryBuilder {
        let mut query = self.make();
        query.set_label(label);
        query
    }
}

/// Fluent, clonable SQL statement builder.
///
/// All mutators return `&mut Self` for chaining. `to_sql()` renders the
/// statement and reports any usage error recorded along the way.
#[derive(Clone)]
pub struct QueryBuilder {
    kind: StatementKind,
    table: Option<TableRef>,
    alias: Option<String>,
    label: Option<String>,
    select: Vec<String>,
    joins: Vec<String>,
    wheres: Vec<String>,
    group_by: Vec<String>,
    having: Option<String>,
    order: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    rows: Vec<ValueRow>,
    batch: bool,
    conflict_target: Option<String>,
    conflict_action: Option<String>,
    returning: Option<String>,
    count_over: Option<String>,
    where_hooks: Vec<WhereHook>,
    build_error: Option<String>,
    escape: EscapeFn,
}

impl QueryBuilder {
    pub fn new(escape: EscapeFn) -> Self {
        Self {
            kind: StatementKind::Select,
            table: None,
            alias: None,
            label: None,
            select: Vec::new(),
            joins: Vec::new(),
            wheres: Vec::new(),
            group_by: Vec::new(),
            having: None,
            order: Vec::new(),
            limit: None,
            offset: None,
            rows: Vec::new(),
            batch: false,
            conflict_target: None,
            conflict_action: None,
            returning: None,
            count_over: None,
            where_hooks: Vec::new(),
            build_error: None,
            escape,
        }
    }

    /// Independent deep copy (alias for `clone()`, kept for call-site
    /// readability next to `count()`/`limit()` chains).
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    // ==================== Label ====================

    pub fn set_label(&mut self, label: &str) -> &mut Self {
        self.label = Some(label.to_string());
        self
    }

    /// Set the label only when none was set before.
    pub fn set_label_if_empty(&mut self, label: &str) -> &mut Self {
        if self.label.is_none() {
            self.set_label(label);
        }
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    // ==================== Statement kind & target ====================

    pub fn from(&mut self, table: impl Into<TableRef>) -> &mut Self {
        self.table = Some(table.into());
        self.alias = None;
        self
    }

    pub fn from_as(&mut self, table: impl Into<TableRef>, alias: &str) -> &mut Self {
        self.table = Some(table.into());
        self.alias = Some(alias.to_string());
        self
    }

    pub fn set_from_alias(&mut self, alias: &str) -> &mut Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn from_alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn insert(&mut self, table: Option<&str>) -> &mut Self {
        if let Some(table) = table {
            self.table = Some(TableRef::Name(table.to_string()));
        }
        self.kind = StatementKind::Insert;
        self
    }

    pub fn update(&mut self, table: Option<&str>) -> &mut Self {
        if let Some(table) = table {
            self.table = Some(TableRef::Name(table.to_string()));
        }
        self.kind = StatementKind::Update;
        self
    }

    pub fn delete(&mut self, table: Option<&str>) -> &mut Self {
        if let Some(table) = table {
            self.table = Some(TableRef::Name(table.to_string()));
        }
        self.kind = StatementKind::Delete;
        self
    }

    // ==================== Values (INSERT / UPDATE) ====================

    /// Replace the value row. Pair order becomes column order.
    pub fn values<I, K, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SqlValue>,
    {
        self.rows = vec![
            values
                .into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
        ];
        self
    }

    /// Append one column to the current value row.
    pub fn value(&mut self, column: &str, value: impl Into<SqlValue>) -> &mut Self {
        if self.rows.is_empty() {
            self.rows.push(Vec::new());
        }
        self.rows[0].push((column.to_string(), value.into()));
        self
    }

    /// Replace all value rows (used with [`QueryBuilder::batch_mode`]).
    pub fn value_rows<I, R, K, V>(&mut self, rows: I) -> &mut Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SqlValue>,
    {
        self.rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(column, value)| (column.into(), value.into()))
                    .collect()
            })
            .collect();
        self
    }

    /// Multi-row mode for INSERT.
    pub fn batch_mode(&mut self, enable: bool) -> &mut Self {
        self.batch = enable;
        self
    }

    pub fn on_conflict_do_nothing(&mut self, target: Option<&str>) -> &mut Self {
        self.conflict_target = target.map(str::to_string);
        self.conflict_action = Some("DO NOTHING".to_string());
        self
    }

    /// Any SQL part valid after `RETURNING` (INSERT only).
    pub fn returning(&mut self, sql_part: &str) -> &mut Self {
        self.returning = Some(sql_part.to_string());
        self
    }

    // ==================== SELECT ====================

    /// Replace the SELECT list.
    pub fn select(&mut self, cols: &str) -> &mut Self {
        self.select = vec![cols.to_string()];
        self
    }

    /// Append to the SELECT list.
    pub fn add_select(&mut self, cols: &str) -> &mut Self {
        self.select.push(cols.to_string());
        self
    }

    /// Turn the query into a row count.
    ///
    /// Clears ORDER BY. Without GROUP BY the SELECT list becomes
    /// `count(fields)`; with GROUP BY the whole current rendering is
    /// wrapped as a derived table and counted from the outside, under a
    /// deterministic content-hashed alias.
    pub fn count(&mut self, fields: &str) -> &mut Self {
        self.clear_order();
        self.count_over = Some(fields.to_string());
        self
    }

    /// Reduce the query to an existence probe (`SELECT 1 ... LIMIT 1`).
    pub fn exists(&mut self) -> &mut Self {
        self.select("1").limit(1)
    }

    /// Prefix columns with a table alias (the FROM alias when none given).
    pub fn col(&self, columns: &[&str], table_alias: Option<&str>) -> String {
        match table_alias.or(self.alias.as_deref()) {
            Some(alias) => columns
                .iter()
                .map(|column| format!("{alias}.{column}"))
                .collect::<Vec<_>>()
                .join(", "),
            None => columns.join(", "),
        }
    }

    // ==================== JOIN ====================

    /// Append a raw join fragment, e.g.
    /// `"LEFT JOIN some_table AS t ON (t.id=o.id)"`.
    /// With `once`, a byte-identical fragment is not added twice.
    pub fn add_join(&mut self, fragment: &str, once: bool) -> &mut Self {
        if !once || !self.joins.iter().any(|join| join == fragment) {
            self.joins.push(fragment.to_string());
        }
        self
    }

    /// Join another builder: synthesizes
    /// `"{kind} {other FROM rendering} {condition}"` and, when the join
    /// was actually added, merges the other builder's WHERE fragment into
    /// this builder's WHERE list as an additional AND condition.
    pub fn join(
        &mut self,
        kind: &str,
        other: &QueryBuilder,
        condition: Option<&str>,
        once: bool,
    ) -> &mut Self {
        let from = match other.build_from() {
            Ok(from) => from,
            Err(error) => return self.fail(error.to_string()),
        };
        let fragment = match condition {
            Some(condition) => format!("{kind} {from} {condition}"),
            None => format!("{kind} {from}"),
        };
        let fragment = fragment.trim().to_string();
        let joins_before = self.joins.len();
        self.add_join(&fragment, once);
        if self.joins.len() != joins_before {
            match other.build_where(true) {
                Ok(Some(where_fragment)) => {
                    self.and_where(&where_fragment);
                }
                Ok(None) => {}
                Err(error) => {
                    self.fail(error.to_string());
                }
            }
        }
        self
    }

    pub fn inner_join(
        &mut self,
        other: &QueryBuilder,
        condition: Option<&str>,
        once: bool,
    ) -> &mut Self {
        self.join("INNER JOIN", other, condition, once)
    }

    pub fn left_join(
        &mut self,
        other: &QueryBuilder,
        condition: Option<&str>,
        once: bool,
    ) -> &mut Self {
        self.join("LEFT JOIN", other, condition, once)
    }

    pub fn right_join(
        &mut self,
        other: &QueryBuilder,
        condition: Option<&str>,
        once: bool,
    ) -> &mut Self {
        self.join("RIGHT JOIN", other, condition, once)
    }

    // ==================== WHERE ====================

    /// Append a raw AND condition.
    pub fn and_where(&mut self, cond: &str) -> &mut Self {
        self.push_where(WHERE_AND, cond.to_string())
    }

    /// Append a raw OR condition. Fails at render time when no prior
    /// condition exists to combine with.
    pub fn or_where(&mut self, cond: &str) -> &mut Self {
        if self.wheres.is_empty() {
            return self.fail("or_where(): invalid first OR condition");
        }
        self.push_where(WHERE_OR, cond.to_string())
    }

    /// AND condition from a %-style template; each argument is escaped
    /// and substituted positionally (`%s` string, `%d` integer,
    /// `%f` float, `%%` literal percent).
    pub fn and_where_fmt<I>(&mut self, template: &str, args: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<SqlValue>,
    {
        let args: Vec<SqlValue> = args.into_iter().map(Into::into).collect();
        match format_template(template, &args, &self.escape) {
            Ok(cond) => self.push_where(WHERE_AND, cond),
            Err(message) => self.fail(message),
        }
    }

    /// OR variant of [`QueryBuilder::and_where_fmt`].
    pub fn or_where_fmt<I>(&mut self, template: &str, args: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<SqlValue>,
    {
        if self.wheres.is_empty() {
            return self.fail("or_where_fmt(): invalid first OR condition");
        }
        let args: Vec<SqlValue> = args.into_iter().map(Into::into).collect();
        match format_template(template, &args, &self.escape) {
            Ok(cond) => self.push_where(WHERE_OR, cond),
            Err(message) => self.fail(message),
        }
    }

    /// AND the other builder's WHERE clause, parenthesized. No-op when the
    /// other builder has no conditions.
    pub fn and_where_nested(&mut self, other: &QueryBuilder) -> &mut Self {
        match other.build_where(true) {
            Ok(Some(fragment)) => self.push_where(WHERE_AND, format!("({fragment})")),
            Ok(None) => self,
            Err(error) => self.fail(error.to_string()),
        }
    }

    /// OR variant of [`QueryBuilder::and_where_nested`].
    pub fn or_where_nested(&mut self, other: &QueryBuilder) -> &mut Self {
        if self.wheres.is_empty() {
            return self.fail("or_where_nested(): invalid first OR condition");
        }
        match other.build_where(true) {
            Ok(Some(fragment)) => self.push_where(WHERE_OR, format!("({fragment})")),
            Ok(None) => self,
            Err(error) => self.fail(error.to_string()),
        }
    }

    /// `col='value'`, or `col IS NULL` for a null value.
    pub fn and_where_equals(&mut self, column: &str, value: impl Into<SqlValue>) -> &mut Self {
        self.where_equals(column, value.into(), true)
    }

    /// `col<>'value'`, or `col IS NOT NULL` for a null value.
    pub fn and_where_not_equals(&mut self, column: &str, value: impl Into<SqlValue>) -> &mut Self {
        self.where_equals(column, value.into(), false)
    }

    fn where_equals(&mut self, column: &str, value: SqlValue, equals: bool) -> &mut Self {
        if value.is_null() {
            let operator = if equals { "" } else { "NOT " };
            let cond = format!("{column} IS {operator}NULL");
            return self.push_where(WHERE_AND, cond);
        }
        let operator = if equals { "=" } else { "<>" };
        let cond = format!("{column}{operator}'{}'", (self.escape)(&value.plain()));
        self.push_where(WHERE_AND, cond)
    }

    /// `col IN ('a', 'b', ...)`; every item escaped and quoted.
    /// An empty list is a usage error.
    pub fn and_where_in<I>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<SqlValue>,
    {
        self.where_in_list(column, values, true)
    }

    /// `col NOT IN ('a', 'b', ...)`.
    pub fn and_where_not_in<I>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<SqlValue>,
    {
        self.where_in_list(column, values, false)
    }

    fn where_in_list<I>(&mut self, column: &str, values: I, equals: bool) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<SqlValue>,
    {
        let values: Vec<SqlValue> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return self.fail(format!(
                "and_where_in(): expected a non-empty list for column '{column}'"
            ));
        }
        let escaped: Vec<String> = values
            .iter()
            .map(|value| (self.escape)(&value.plain()))
            .collect();
        let list = format!("'{}'", escaped.join("', '"));
        let negation = if equals { "" } else { " NOT" };
        self.push_where(WHERE_AND, format!("{column}{negation} IN ({list})"))
    }

    /// `col IN (SELECT ...)` from a sub-builder.
    pub fn and_where_in_query(&mut self, column: &str, query: &QueryBuilder) -> &mut Self {
        match query.to_sql() {
            Ok(sql) => self.push_where(WHERE_AND, format!("{column} IN ({sql})")),
            Err(error) => self.fail(error.to_string()),
        }
    }

    /// `col NOT IN (SELECT ...)` from a sub-builder.
    pub fn and_where_not_in_query(&mut self, column: &str, query: &QueryBuilder) -> &mut Self {
        match query.to_sql() {
            Ok(sql) => self.push_where(WHERE_AND, format!("{column} NOT IN ({sql})")),
            Err(error) => self.fail(error.to_string()),
        }
    }

    fn push_where(&mut self, operator: &str, cond: String) -> &mut Self {
        if self.wheres.is_empty() {
            self.wheres.push(cond);
        } else {
            self.wheres.push(format!("{operator} {cond}"));
        }
        self
    }

    /// Register a deferred WHERE hook, invoked at render time against a
    /// clone of the builder. The stored builder is never mutated by
    /// rendering, so a shared base query can acquire context-dependent
    /// predicates per render.
    pub fn on_build_where(
        &mut self,
        hook: impl Fn(&mut QueryBuilder) + Send + Sync + 'static,
    ) -> &mut Self {
        self.where_hooks.push(Arc::new(hook));
        self
    }

    // ==================== GROUP BY / HAVING / ORDER ====================

    /// Append a GROUP BY expression.
    pub fn group_by(&mut self, cond: &str) -> &mut Self {
        self.group_by.push(cond.to_string());
        self
    }

    pub fn having(&mut self, cond: &str) -> &mut Self {
        self.having = Some(cond.to_string());
        self
    }

    /// Replace the ORDER BY list.
    pub fn order_by(&mut self, cond: &str) -> &mut Self {
        self.order = vec![cond.to_string()];
        self
    }

    pub fn clear_order(&mut self) -> &mut Self {
        self.order.clear();
        self
    }

    /// Append an ORDER BY expression.
    pub fn add_order(&mut self, cond: &str) -> &mut Self {
        self.order.push(cond.to_string());
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    // ==================== Rendering ====================

    /// Render the statement. Surfaces any usage error recorded by a
    /// chaining mutator; never mutates the builder.
    pub fn to_sql(&self) -> DbResult<String> {
        if let Some(message) = &self.build_error {
            return Err(DbError::Builder(message.clone()));
        }
        match self.kind {
            StatementKind::Select => self.to_select(),
            StatementKind::Insert => self.to_insert(),
            StatementKind::Update => self.to_update(),
            StatementKind::Delete => self.to_delete(),
        }
    }

    /// The FROM target rendering: `table`, `table AS alias` or
    /// `(subquery) AS alias`.
    pub fn build_from(&self) -> DbResult<String> {
        let mut from = match &self.table {
            Some(TableRef::Name(name)) => name.clone(),
            Some(TableRef::Subquery(query)) => format!("({})", query.to_sql()?),
            None => return Err(DbError::builder("no table set, call from() first")),
        };
        if let Some(alias) = &self.alias {
            from.push_str(" AS ");
            from.push_str(alias);
        }
        Ok(from)
    }

    /// The WHERE clause with deferred hooks applied; `raw` omits the
    /// leading newline and `WHERE` keyword. `None` when no conditions.
    pub fn build_where(&self, raw: bool) -> DbResult<Option<String>> {
        let conditions = if self.where_hooks.is_empty() {
            self.wheres.clone()
        } else {
            let mut staged = self.clone();
            staged.where_hooks.clear();
            for hook in &self.where_hooks {
                hook(&mut staged);
            }
            if let Some(message) = staged.build_error {
                return Err(DbError::Builder(message));
            }
            staged.wheres
        };
        if conditions.is_empty() {
            return Ok(None);
        }
        let joined = conditions.join(" ");
        Ok(Some(if raw {
            joined
        } else {
            format!("\nWHERE {joined}")
        }))
    }

    fn to_select(&self) -> DbResult<String> {
        if let Some(fields) = &self.count_over {
            if !self.group_by.is_empty() {
                return self.to_grouped_count(fields);
            }
        }

        let select_list = match &self.count_over {
            Some(fields) => format!("count({fields})"),
            None if self.select.is_empty() => {
                if !self.joins.is_empty() {
                    return Err(DbError::builder(
                        "SELECT columns must be set explicitly with select() when JOIN is used",
                    ));
                }
                "*".to_string()
            }
            None => self.select.join(", "),
        };

        let mut sql = String::new();
        if let Some(label) = &self.label {
            sql.push_str(&format!("/*{label}*/\n"));
        }
        sql.push_str("SELECT ");
        sql.push_str(&select_list);
        sql.push_str("\nFROM ");
        sql.push_str(&self.build_from()?);
        if !self.joins.is_empty() {
            sql.push('\n');
            sql.push_str(&self.joins.join("\n"));
        }
        if let Some(where_sql) = self.build_where(false)? {
            sql.push_str(&where_sql);
        }
        if !self.group_by.is_empty() {
            sql.push_str("\nGROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if let Some(having) = &self.having {
            sql.push_str("\nHAVING ");
            sql.push_str(having);
        }
        if !self.order.is_empty() {
            sql.push_str("\nORDER BY ");
            sql.push_str(&self.order.join(", "));
        }
        if let Some(limit) = self.limit.filter(|n| *n > 0) {
            sql.push_str(&format!("\nLIMIT {limit}"));
            if let Some(offset) = self.offset.filter(|n| *n > 0) {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }
        Ok(sql)
    }

    /// Grouped count: the current rendering becomes a derived table under
    /// a deterministic alias hashed from the subquery text, so repeated
    /// renders of structurally identical queries agree on the alias.
    fn to_grouped_count(&self, fields: &str) -> DbResult<String> {
        let mut inner = self.clone();
        inner.label = None;
        inner.count_over = None;
        let subquery = inner.to_select()?;
        let alias = derived_table_alias(&subquery);

        let mut sql = String::new();
        if let Some(label) = &self.label {
            sql.push_str(&format!("/*{label}*/\n"));
        }
        sql.push_str(&format!("SELECT count({fields})\nFROM ({subquery}) AS {alias}"));
        Ok(sql)
    }

    fn to_insert(&self) -> DbResult<String> {
        let table = self.table_name()?;
        let rows: &[ValueRow] = if self.batch {
            &self.rows
        } else {
            &self.rows[..self.rows.len().min(1)]
        };
        let first = rows
            .first()
            .filter(|row| !row.is_empty())
            .ok_or_else(|| DbError::builder("INSERT requires values, call values() first"))?;
        let columns: Vec<&str> = first.iter().map(|(column, _)| column.as_str()).collect();

        let mut rendered_rows = Vec::with_capacity(rows.len());
        for row in rows {
            let mut rendered = Vec::with_capacity(columns.len());
            for column in &columns {
                let value = row
                    .iter()
                    .find(|(name, _)| name.as_str() == *column)
                    .map(|(_, value)| value)
                    .ok_or_else(|| {
                        DbError::builder(format!("batch row is missing column '{column}'"))
                    })?;
                rendered.push(value.render(&self.escape));
            }
            rendered_rows.push(rendered.join(", "));
        }

        let mut sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            rendered_rows.join("), (")
        );

        if let Some(action) = &self.conflict_action {
            match &self.conflict_target {
                Some(target) => sql.push_str(&format!(" ON CONFLICT ({target}) {action}")),
                None => sql.push_str(&format!(" ON CONFLICT {action}")),
            }
        }
        if let Some(returning) = &self.returning {
            sql.push_str(" RETURNING ");
            sql.push_str(returning);
        }
        Ok(sql)
    }

    fn to_update(&self) -> DbResult<String> {
        let row = self
            .rows
            .first()
            .filter(|row| !row.is_empty())
            .ok_or_else(|| DbError::builder("UPDATE requires values, call values() first"))?;
        let assignments: Vec<String> = row
            .iter()
            .map(|(column, value)| format!("{column}={}", value.render(&self.escape)))
            .collect();

        let mut target = self.table_name()?.to_string();
        if let Some(alias) = &self.alias {
            target.push_str(" AS ");
            target.push_str(alias);
        }

        let mut sql = format!("UPDATE {target} SET {}", assignments.join(", "));
        if let Some(where_sql) = self.build_where(false)? {
            sql.push_str(&where_sql);
        }
        Ok(sql)
    }

    fn to_delete(&self) -> DbResult<String> {
        let mut sql = format!("DELETE FROM {}", self.build_from()?);
        if let Some(where_sql) = self.build_where(false)? {
            sql.push_str(&where_sql);
        }
        Ok(sql)
    }

    fn table_name(&self) -> DbResult<&str> {
        match &self.table {
            Some(TableRef::Name(name)) => Ok(name),
            Some(TableRef::Subquery(_)) => Err(DbError::builder(
                "statement requires a plain table name, not a subquery",
            )),
            None => Err(DbError::builder("no table set, call from() first")),
        }
    }

    /// Record a usage error; the first one wins and `to_sql()` reports it.
    fn fail(&mut self, message: impl Into<String>) -> &mut Self {
        if self.build_error.is_none() {
            self.build_error = Some(message.into());
        }
        self
    }
}

/// Deterministic identifier-safe alias for a derived table:
/// `t` followed by the MD5 hex digest of the subquery text.
fn derived_table_alias(subquery: &str) -> String {
    let digest = Md5::digest(subquery.as_bytes());
    let mut alias = String::with_capacity(1 + digest.len() * 2);
    alias.push('t');
    for byte in digest {
        alias.push_str(&format!("{byte:02x}"));
    }
    alias
}

/// Positional %-template substitution. `%s` substitutes the escaped
/// string form, `%d` the integer form, `%f` the float form; quotes come
/// from the template. Arity mismatch is an error.
fn format_template(
    template: &str,
    args: &[SqlValue],
    escape: &EscapeFn,
) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut remaining = args.iter();
    let mut used = 0usize;
    let mut chars = template.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(spec @ ('s' | 'd' | 'f')) => {
                let arg = remaining.next().ok_or_else(|| {
                    format!("template '{template}' expects more than the {used} argument(s) provided")
                })?;
                used += 1;
                match spec {
                    's' => out.push_str(&escape(&arg.plain())),
                    'd' => out.push_str(&arg.as_i64_lossy().to_string()),
                    _ => out.push_str(&arg.as_f64_lossy().to_string()),
                }
            }
            other => {
                let spec = other.map(|c| c.to_string()).unwrap_or_default();
                return Err(format!(
                    "unsupported format spec '%{spec}' in template '{template}'"
                ));
            }
        }
    }
    if remaining.next().is_some() {
        return Err(format!(
            "template '{template}' has {used} placeholder(s) but more arguments were provided"
        ));
    }
    Ok(out)
}
