//! Normalized result rows.

use crate::value::SqlValue;

/// A result row: an ordered sequence of `(column name, value)` pairs.
///
/// Keeping the pairs ordered preserves the column order the statement
/// produced, which the shaping helpers on
/// [`DbAdapter`](crate::DbAdapter) rely on (`select_column` takes the
/// first column, `select_key_value` the first two).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbRow {
    columns: Vec<(String, SqlValue)>,
}

impl DbRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. Duplicate names are kept as-is; lookup returns
    /// the first match.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.columns.push((column.into(), value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Value of the first column, if the row has any.
    pub fn first_value(&self) -> Option<&SqlValue> {
        self.columns.first().map(|(_, value)| value)
    }

    pub(crate) fn into_first_value(self) -> Option<SqlValue> {
        self.columns.into_iter().next().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, SqlValue)> {
        self.columns.iter()
    }

    /// Render as a JSON object (column order follows serde_json's map).
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .columns
            .iter()
            .map(|(name, value)| (name.clone(), serde_json::Value::from(value)))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl IntoIterator for DbRow {
    type Item = (String, SqlValue);
    type IntoIter = std::vec::IntoIter<(String, SqlValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

impl<'a> IntoIterator for &'a DbRow {
    type Item = &'a (String, SqlValue);
    type IntoIter = std::slice::Iter<'a, (String, SqlValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for DbRow {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

/// Build a [`DbRow`] in place:
///
/// ```ignore
/// let row = row! { "id" => 1, "name" => "A" };
/// ```
#[macro_export]
macro_rules! row {
    () => {
        $crate::DbRow::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::DbRow::new();
        $( row.push($column, $value); )+
        row
    }};
}

#[cfg(test)]
mod tests {
    use crate::SqlValue;

    #[test]
    fn row_macro_preserves_order() {
        let row = row! { "id" => 1, "name" => "A" };
        assert_eq!(row.len(), 2);
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(row.get("name"), Some(&SqlValue::Text("A".into())));
        assert_eq!(row.first_value(), Some(&SqlValue::Int(1)));
    }

    #[test]
    fn to_json_object() {
        let row = row! { "id" => 1, "ok" => true };
        assert_eq!(row.to_json(), serde_json::json!({"id": 1, "ok": true}));
    }
}
