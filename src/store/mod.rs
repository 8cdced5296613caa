//! Relational document store
//!
//! This module provides:
//! - Backend-neutral statements, values and rows
//! - The `DocumentStore` / `StoreTransaction` traits used by both pipelines
//! - A PostgreSQL backend (pgvector + pgai)
//! - Statement builders for the documents and embedding tables

mod convert;
mod documents;
mod postgres;
mod schema;

#[cfg(test)]
pub(crate) mod memory;

pub use convert::*;
pub use documents::*;
pub use postgres::*;
pub use schema::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A bind parameter or a decoded column value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Binds as a text NULL
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(v) => Some(*v),
            SqlValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SqlValue::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
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

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// A parameterized statement. `name` labels it in logs.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub name: &'static str,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(name: &'static str, sql: impl Into<String>) -> Self {
        Self {
            name,
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append the next positional parameter (`$1`, `$2`, ...)
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Parameter at zero-based `index`
    pub fn param(&self, index: usize) -> Option<&SqlValue> {
        self.params.get(index)
    }
}

/// One result row with named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

fn decode_error(column: &str, expected: &str, found: &SqlValue) -> Error {
    Error::Database(sqlx::Error::Decode(
        format!("column '{}': expected {}, found {:?}", column, expected, found).into(),
    ))
}

impl Row {
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }

    /// Builder-style column append, mostly for tests and fakes
    pub fn with(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.columns.push((name.to_string(), value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// First column value, consuming the row
    pub fn into_first(self) -> Option<SqlValue> {
        self.columns.into_iter().next().map(|(_, value)| value)
    }

    /// Column value, if the column exists
    pub fn value(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Column value, failing when the column is absent
    pub fn get(&self, name: &str) -> Result<&SqlValue> {
        self.value(name)
            .ok_or_else(|| Error::Database(sqlx::Error::ColumnNotFound(name.to_string())))
    }

    pub fn text(&self, name: &str) -> Result<String> {
        match self.get(name)? {
            SqlValue::Text(v) => Ok(v.clone()),
            other => Err(decode_error(name, "text", other)),
        }
    }

    pub fn opt_text(&self, name: &str) -> Result<Option<String>> {
        match self.value(name) {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Text(v)) => Ok(Some(v.clone())),
            Some(other) => Err(decode_error(name, "text", other)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        let value = self.get(name)?;
        value.as_i64().ok_or_else(|| decode_error(name, "integer", value))
    }

    pub fn float(&self, name: &str) -> Result<f64> {
        let value = self.get(name)?;
        value.as_f64().ok_or_else(|| decode_error(name, "float", value))
    }

    pub fn timestamp(&self, name: &str) -> Result<DateTime<Utc>> {
        let value = self.get(name)?;
        value
            .as_timestamp()
            .ok_or_else(|| decode_error(name, "timestamp", value))
    }

    pub fn opt_timestamp(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        match self.value(name) {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Timestamp(v)) => Ok(Some(*v)),
            Some(other) => Err(decode_error(name, "timestamp", other)),
        }
    }
}

/// Explicit row-to-record mapping
pub trait FromStoreRow: Sized {
    fn from_row(row: &Row) -> Result<Self>;
}

/// Map every row, failing on the first row that does not decode
pub fn decode_rows<T: FromStoreRow>(rows: &[Row]) -> Result<Vec<T>> {
    rows.iter().map(T::from_row).collect()
}

/// Auto-commit access to the store plus transaction creation
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a transaction. Dropping it without `commit` rolls back.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Run a statement, returning the number of affected rows
    async fn execute(&self, statement: &Statement) -> Result<u64>;

    /// First column of the first row, `None` when there is no row or it is NULL
    async fn execute_scalar(&self, statement: &Statement) -> Result<Option<SqlValue>>;

    /// All rows of a query
    async fn query(&self, statement: &Statement) -> Result<Vec<Row>>;
}

/// A scoped transaction
#[async_trait]
pub trait StoreTransaction: Send {
    async fn execute(&mut self, statement: &Statement) -> Result<u64>;

    async fn execute_scalar(&mut self, statement: &Statement) -> Result<Option<SqlValue>>;

    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
