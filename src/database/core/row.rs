//! Query result rows
//!
//! Engine rows only live as long as the statement that produced them, so
//! query helpers copy each row into an owned [`Row`]: an ordered mapping
//! from column name to a tagged [`Value`].

use rusqlite::types::{FromSql, Value, ValueRef};
use serde_json::{Map, Value as JsonValue};

use super::error::{StoreError, StoreResult};

/// A single result row, columns kept in result order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Copy the current engine row into an owned `Row`
    pub(crate) fn from_engine(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let stmt = row.as_ref();
        let mut columns = Vec::with_capacity(stmt.column_count());
        for (idx, name) in stmt.column_names().into_iter().enumerate() {
            let value: Value = row.get_ref(idx)?.into();
            columns.push((name.to_string(), value));
        }
        Ok(Row { columns })
    }

    /// Value of the named column, if the row has it
    ///
    /// When several columns share a name (e.g. `SELECT a.id, b.id`), the
    /// first one wins.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Convert the named column to a Rust type
    ///
    /// Missing columns and failed conversions are reported as
    /// [`StoreError::Query`] with the engine's own error kinds.
    pub fn get_as<T: FromSql>(&self, column: &str) -> StoreResult<T> {
        let (idx, value) = self
            .columns
            .iter()
            .enumerate()
            .find(|(_, (name, _))| name == column)
            .map(|(idx, (_, value))| (idx, value))
            .ok_or_else(|| {
                StoreError::Query(rusqlite::Error::InvalidColumnName(column.to_string()))
            })?;

        T::column_result(ValueRef::from(value)).map_err(|e| {
            StoreError::Query(rusqlite::Error::FromSqlConversionFailure(
                idx,
                value.data_type(),
                Box::new(e),
            ))
        })
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Column names in result order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Render the row as a JSON object (blobs become arrays of bytes)
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::with_capacity(self.columns.len());
        for (name, value) in &self.columns {
            let json = match value {
                Value::Null => JsonValue::Null,
                Value::Integer(i) => JsonValue::from(*i),
                Value::Real(f) => JsonValue::from(*f),
                Value::Text(s) => JsonValue::from(s.as_str()),
                Value::Blob(b) => JsonValue::from(b.clone()),
            };
            map.insert(name.clone(), json);
        }
        JsonValue::Object(map)
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Row {
            columns: iter.into_iter().collect(),
        }
    }
}
