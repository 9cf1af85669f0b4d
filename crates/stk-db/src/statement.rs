//! Backend-neutral statement and row representation.
//!
//! A [`Statement`] is SQL text with `$1..$n` placeholders plus the ordered
//! values bound to them. Values never end up inside the SQL text.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{StoreError, StoreOp};

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Decimal(Decimal),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Text(_) => "text",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Timestamp(_) => "timestamp",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            SqlValue::Decimal(v) => Some(*v),
            SqlValue::Int(v) => Some(Decimal::from(*v)),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: Cow<'static, str>,
    params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<Cow<'static, str>>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append the value for the next positional placeholder.
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Zero-based access to a bound value (`$1` is `param(0)`).
    pub fn param(&self, index: usize) -> Option<&SqlValue> {
        self.params.get(index)
    }
}

/// One result row: ordered `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.columns.push((column.into(), value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    fn require(&self, column: &str) -> Result<&SqlValue, StoreError> {
        self.get(column).ok_or_else(|| {
            StoreError::transaction(StoreOp::Decode, format!("missing column `{column}`"))
        })
    }

    pub fn int(&self, column: &str) -> Result<i64, StoreError> {
        let v = self.require(column)?;
        v.as_int().ok_or_else(|| mismatch(column, "int", v))
    }

    pub fn text(&self, column: &str) -> Result<String, StoreError> {
        let v = self.require(column)?;
        v.as_text()
            .map(str::to_string)
            .ok_or_else(|| mismatch(column, "text", v))
    }

    pub fn decimal(&self, column: &str) -> Result<Decimal, StoreError> {
        let v = self.require(column)?;
        v.as_decimal().ok_or_else(|| mismatch(column, "decimal", v))
    }

    /// Like [`Row::decimal`] but maps SQL NULL (e.g. `SUM` over no rows) to `None`.
    pub fn opt_decimal(&self, column: &str) -> Result<Option<Decimal>, StoreError> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            v => v.as_decimal().map(Some).ok_or_else(|| mismatch(column, "decimal", v)),
        }
    }

    pub fn timestamp(&self, column: &str) -> Result<DateTime<Utc>, StoreError> {
        match self.require(column)? {
            SqlValue::Timestamp(t) => Ok(*t),
            v => Err(mismatch(column, "timestamp", v)),
        }
    }
}

fn mismatch(column: &str, expected: &str, found: &SqlValue) -> StoreError {
    StoreError::transaction(
        StoreOp::Decode,
        format!(
            "column `{column}`: expected {expected}, found {}",
            found.kind()
        ),
    )
}

/// Rows returned by a statement plus the number of rows it changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
}

impl QueryOutput {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            rows_affected: 0,
        }
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows: Vec::new(),
            rows_affected,
        }
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_keeps_placeholder_order() {
        let s = Statement::new("update products set stock = stock - $1 where id = $2")
            .bind(3_i64)
            .bind(17_i64);
        assert_eq!(s.params(), &[SqlValue::Int(3), SqlValue::Int(17)]);
        assert_eq!(s.param(1), Some(&SqlValue::Int(17)));
        assert!(!s.sql().contains("17"));
    }

    #[test]
    fn option_binds_as_null() {
        let s = Statement::new("select $1").bind(None::<i64>);
        assert_eq!(s.params(), &[SqlValue::Null]);
    }

    #[test]
    fn typed_getters_decode_and_report_mismatch() {
        let row = Row::new()
            .with("id", 5_i64)
            .with("name", "Burger Classic")
            .with("price", Decimal::new(999, 2))
            .with("total", SqlValue::Null);

        assert_eq!(row.int("id").unwrap(), 5);
        assert_eq!(row.text("name").unwrap(), "Burger Classic");
        assert_eq!(row.decimal("price").unwrap(), Decimal::new(999, 2));
        assert_eq!(row.decimal("id").unwrap(), Decimal::from(5));
        assert_eq!(row.opt_decimal("total").unwrap(), None);

        let err = row.int("name").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Transaction {
                op: StoreOp::Decode,
                ..
            }
        ));
        assert!(row.text("missing").is_err());
    }
}
