//! In-memory `DocumentStore` for pipeline tests
//!
//! Understands the named statements built in `documents.rs` and the search
//! pipeline, enforces the unique and foreign key constraints of the real
//! schema, and supports fault injection.

use super::{DocumentStore, Row, SqlValue, Statement, StoreStats, StoreTransaction};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: i64,
    pub catalog_id: String,
    pub title: String,
    pub summary: Option<String>,
    pub comments: Option<String>,
    pub metadata: serde_json::Value,
    pub pdf_uri: Option<String>,
    pub published: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    documents: BTreeMap<i64, StoredDocument>,
    summary_embeddings: BTreeMap<i64, String>,
    metadata_embeddings: BTreeMap<i64, String>,
    next_id: i64,
}

#[derive(Debug, Default)]
struct Faults {
    broken_documents: HashSet<String>,
    flaky_documents: HashMap<String, u32>,
    failing_queries: u32,
    broken_queries: bool,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Tables,
    faults: Faults,
    search_rows: Vec<Row>,
    log: Vec<&'static str>,
    commits: u32,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
}

fn protocol(message: impl Into<String>) -> Error {
    Error::Database(sqlx::Error::Protocol(message.into()))
}

fn text_param(statement: &Statement, index: usize) -> Result<String> {
    statement
        .param(index)
        .and_then(SqlValue::as_text)
        .map(str::to_string)
        .ok_or_else(|| protocol(format!("{}: ${} must be text", statement.name, index + 1)))
}

fn opt_text_param(statement: &Statement, index: usize) -> Option<String> {
    statement
        .param(index)
        .and_then(SqlValue::as_text)
        .map(str::to_string)
}

fn int_param(statement: &Statement, index: usize) -> Result<i64> {
    statement
        .param(index)
        .and_then(SqlValue::as_i64)
        .ok_or_else(|| protocol(format!("{}: ${} must be an integer", statement.name, index + 1)))
}

fn document_row(doc: &StoredDocument) -> Row {
    Row::default()
        .with("id", doc.id)
        .with("catalog_id", doc.catalog_id.as_str())
        .with("title", doc.title.as_str())
        .with("summary", doc.summary.clone())
        .with("comments", doc.comments.clone())
        .with("metadata", doc.metadata.clone())
        .with("pdf_uri", doc.pdf_uri.clone())
        .with("published", doc.published)
        .with("created_on", doc.published)
        .with("last_updated_on", doc.published)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// `insert_document` always fails for this catalog id
    pub fn break_document(&self, catalog_id: &str) {
        self.lock().faults.broken_documents.insert(catalog_id.to_string());
    }

    /// `insert_document` fails transiently `times` times for this catalog id
    pub fn flake_document(&self, catalog_id: &str, times: u32) {
        self.lock()
            .faults
            .flaky_documents
            .insert(catalog_id.to_string(), times);
    }

    /// The next `times` auto-commit queries fail transiently
    pub fn fail_queries(&self, times: u32) {
        self.lock().faults.failing_queries = times;
    }

    /// Every auto-commit query fails with a non-transient error
    pub fn break_queries(&self) {
        self.lock().faults.broken_queries = true;
    }

    /// Rows returned for `search_documents`
    pub fn set_search_rows(&self, rows: Vec<Row>) {
        self.lock().search_rows = rows;
    }

    /// Names of every statement run so far, in order
    pub fn statements(&self) -> Vec<&'static str> {
        self.lock().log.clone()
    }

    pub fn commits(&self) -> u32 {
        self.lock().commits
    }

    pub fn stats(&self) -> StoreStats {
        let shared = self.lock();
        StoreStats {
            documents: shared.tables.documents.len() as i64,
            summary_embeddings: shared.tables.summary_embeddings.len() as i64,
            metadata_embeddings: shared.tables.metadata_embeddings.len() as i64,
        }
    }

    pub fn document(&self, catalog_id: &str) -> Option<StoredDocument> {
        self.lock()
            .tables
            .documents
            .values()
            .find(|d| d.catalog_id == catalog_id)
            .cloned()
    }

    fn snapshot(&self) -> Tables {
        self.lock().tables.clone()
    }

    /// Run one statement against `tables`, returning rows and affected count
    fn run(&self, tables: &mut Tables, statement: &Statement) -> Result<(Vec<Row>, u64)> {
        let mut shared = self.lock();
        shared.log.push(statement.name);

        match statement.name {
            "delete_summary_embedding" | "delete_metadata_embedding" => {
                let catalog_id = text_param(statement, 0)?;
                let ids: Vec<i64> = tables
                    .documents
                    .values()
                    .filter(|d| d.catalog_id == catalog_id)
                    .map(|d| d.id)
                    .collect();
                let table = if statement.name == "delete_summary_embedding" {
                    &mut tables.summary_embeddings
                } else {
                    &mut tables.metadata_embeddings
                };
                let removed = ids.iter().filter(|id| table.remove(*id).is_some()).count();
                Ok((Vec::new(), removed as u64))
            }
            "delete_document" => {
                let catalog_id = text_param(statement, 0)?;
                let ids: Vec<i64> = tables
                    .documents
                    .values()
                    .filter(|d| d.catalog_id == catalog_id)
                    .map(|d| d.id)
                    .collect();
                for id in &ids {
                    if tables.summary_embeddings.contains_key(id)
                        || tables.metadata_embeddings.contains_key(id)
                    {
                        return Err(protocol("foreign key violation on documents"));
                    }
                }
                for id in &ids {
                    tables.documents.remove(id);
                }
                Ok((Vec::new(), ids.len() as u64))
            }
            "insert_document" => {
                let catalog_id = text_param(statement, 0)?;
                if shared.faults.broken_documents.contains(&catalog_id) {
                    return Err(protocol(format!("injected failure for {}", catalog_id)));
                }
                if let Some(remaining) = shared.faults.flaky_documents.get_mut(&catalog_id) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(Error::Database(sqlx::Error::PoolTimedOut));
                    }
                }
                if tables.documents.values().any(|d| d.catalog_id == catalog_id) {
                    return Err(protocol("unique violation on documents.catalog_id"));
                }

                tables.next_id += 1;
                let id = tables.next_id;
                let published = statement
                    .param(6)
                    .and_then(SqlValue::as_timestamp)
                    .ok_or_else(|| protocol("insert_document: $7 must be a timestamp"))?;
                let metadata = match statement.param(4) {
                    Some(SqlValue::Json(v)) => v.clone(),
                    _ => return Err(protocol("insert_document: $5 must be json")),
                };
                tables.documents.insert(
                    id,
                    StoredDocument {
                        id,
                        catalog_id,
                        title: text_param(statement, 1)?,
                        summary: opt_text_param(statement, 2),
                        comments: opt_text_param(statement, 3),
                        metadata,
                        pdf_uri: opt_text_param(statement, 5),
                        published,
                    },
                );
                Ok((vec![Row::default().with("id", id)], 1))
            }
            "insert_summary_embedding" => {
                let id = int_param(statement, 0)?;
                let summary = tables.documents.get(&id).and_then(|d| d.summary.clone());
                match summary {
                    Some(text) => {
                        if tables.summary_embeddings.insert(id, text).is_some() {
                            return Err(protocol("duplicate summary embedding"));
                        }
                        Ok((Vec::new(), 1))
                    }
                    None => Ok((Vec::new(), 0)),
                }
            }
            "insert_metadata_embedding" => {
                let id = int_param(statement, 0)?;
                let metadata = tables.documents.get(&id).map(|d| d.metadata.to_string());
                match metadata {
                    Some(text) => {
                        if tables.metadata_embeddings.insert(id, text).is_some() {
                            return Err(protocol("duplicate metadata embedding"));
                        }
                        Ok((Vec::new(), 1))
                    }
                    None => Ok((Vec::new(), 0)),
                }
            }
            "find_document" => {
                let catalog_id = text_param(statement, 0)?;
                let rows = tables
                    .documents
                    .values()
                    .filter(|d| d.catalog_id == catalog_id)
                    .map(document_row)
                    .collect();
                Ok((rows, 0))
            }
            "store_stats" => {
                let row = Row::default()
                    .with("documents", tables.documents.len() as i64)
                    .with("summary_embeddings", tables.summary_embeddings.len() as i64)
                    .with("metadata_embeddings", tables.metadata_embeddings.len() as i64);
                Ok((vec![row], 0))
            }
            "search_documents" => {
                let limit = int_param(statement, 1)?.max(0) as usize;
                let rows = shared.search_rows.iter().take(limit).cloned().collect();
                Ok((rows, 0))
            }
            other => Err(protocol(format!("unsupported statement {}", other))),
        }
    }

    /// Auto-commit execution with query fault injection
    fn run_autocommit(&self, statement: &Statement) -> Result<(Vec<Row>, u64)> {
        {
            let mut shared = self.lock();
            if shared.faults.broken_queries {
                shared.log.push(statement.name);
                return Err(protocol("injected query failure"));
            }
            if shared.faults.failing_queries > 0 {
                shared.faults.failing_queries -= 1;
                shared.log.push(statement.name);
                return Err(Error::Database(sqlx::Error::PoolTimedOut));
            }
        }

        let mut tables = self.snapshot();
        let outcome = self.run(&mut tables, statement)?;
        self.lock().tables = tables;
        Ok(outcome)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            working: self.snapshot(),
        }))
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        Ok(self.run_autocommit(statement)?.1)
    }

    async fn execute_scalar(&self, statement: &Statement) -> Result<Option<SqlValue>> {
        let (rows, _) = self.run_autocommit(statement)?;
        Ok(rows.into_iter().next().and_then(Row::into_first))
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
        Ok(self.run_autocommit(statement)?.0)
    }
}

/// Works on a private copy of the tables; `commit` publishes it
pub struct MemoryTransaction {
    store: MemoryStore,
    working: Tables,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        Ok(self.store.run(&mut self.working, statement)?.1)
    }

    async fn execute_scalar(&mut self, statement: &Statement) -> Result<Option<SqlValue>> {
        let (rows, _) = self.store.run(&mut self.working, statement)?;
        Ok(rows.into_iter().next().and_then(Row::into_first))
    }

    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        Ok(self.store.run(&mut self.working, statement)?.0)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { store, working } = *self;
        let mut shared = store.lock();
        shared.tables = working;
        shared.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
