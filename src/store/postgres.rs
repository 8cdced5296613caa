//! PostgreSQL backend

use super::{schema_sql, DocumentStore, Row, SqlValue, Statement, StoreTransaction};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row as _, Transaction, TypeInfo};
use std::time::Duration;
use tracing::{debug, info};

/// Document store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Connect to the database
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        debug!("Connecting to PostgreSQL (max {} connections)", config.max_connections);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Create extensions, tables and indexes if missing
    pub async fn init_schema(&self, dimensions: usize) -> Result<()> {
        info!("Initializing database schema ({} dimensions)", dimensions);
        sqlx::raw_sql(&schema_sql(dimensions))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn build_query(statement: &Statement) -> Query<'_, Postgres, PgArguments> {
    let mut query = sqlx::query(&statement.sql);
    for param in &statement.params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Json(v) => query.bind(v.clone()),
            SqlValue::Timestamp(v) => query.bind(*v),
        };
    }
    query
}

fn unsupported_column(column: &str, type_name: &str) -> Error {
    Error::Database(sqlx::Error::Decode(
        format!("unsupported column type {} for '{}'", type_name, column).into(),
    ))
}

fn decode_row(row: &PgRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());

    for (index, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        let value = match type_name {
            "INT2" => row.try_get::<Option<i16>, _>(index)?.map(|v| SqlValue::Int(v.into())),
            "INT4" => row.try_get::<Option<i32>, _>(index)?.map(|v| SqlValue::Int(v.into())),
            "INT8" => row.try_get::<Option<i64>, _>(index)?.map(SqlValue::Int),
            "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(|v| SqlValue::Float(v.into())),
            "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(SqlValue::Float),
            "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(SqlValue::Bool),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                row.try_get::<Option<String>, _>(index)?.map(SqlValue::Text)
            }
            "JSON" | "JSONB" => row
                .try_get::<Option<serde_json::Value>, _>(index)?
                .map(SqlValue::Json),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(index)?
                .map(SqlValue::Timestamp),
            "TIMESTAMP" => row
                .try_get::<Option<NaiveDateTime>, _>(index)?
                .map(|v| SqlValue::Timestamp(v.and_utc())),
            other => return Err(unsupported_column(column.name(), other)),
        };
        columns.push((column.name().to_string(), value.unwrap_or(SqlValue::Null)));
    }

    Ok(Row::new(columns))
}

fn first_value(row: Option<PgRow>) -> Result<Option<SqlValue>> {
    match row {
        Some(row) => Ok(decode_row(&row)?
            .into_first()
            .filter(|value| !value.is_null())),
        None => Ok(None),
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        debug!("Executing {}", statement.name);
        let result = build_query(statement).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn execute_scalar(&self, statement: &Statement) -> Result<Option<SqlValue>> {
        debug!("Executing scalar {}", statement.name);
        let row = build_query(statement).fetch_optional(&self.pool).await?;
        first_value(row)
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
        debug!("Querying {}", statement.name);
        let rows = build_query(statement).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }
}

/// Transaction on a pooled connection; rolled back on drop unless committed
pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        debug!("Executing {} in transaction", statement.name);
        let result = build_query(statement).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn execute_scalar(&mut self, statement: &Statement) -> Result<Option<SqlValue>> {
        debug!("Executing scalar {} in transaction", statement.name);
        let row = build_query(statement)
            .fetch_optional(&mut *self.tx)
            .await?;
        first_value(row)
    }

    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        debug!("Querying {} in transaction", statement.name);
        let rows = build_query(statement).fetch_all(&mut *self.tx).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgStoreTransaction { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let PgStoreTransaction { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
