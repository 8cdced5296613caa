//! Statements over the documents and embedding tables

use super::{
    metadata_from_value, metadata_to_value, uri_from_value, uri_to_value, DocumentStore,
    FromStoreRow, Row, SqlValue, Statement,
};
use crate::embed::EmbeddingSql;
use crate::error::Result;
use crate::models::{Document, Paper};
use serde::Serialize;

const DOCUMENT_COLUMNS: &str = "id, catalog_id, title, summary, comments, metadata, pdf_uri, \
                                published, created_on, last_updated_on";

/// Remove the summary embedding owned by a catalog id
pub fn delete_summary_embedding(catalog_id: &str) -> Statement {
    Statement::new(
        "delete_summary_embedding",
        "DELETE FROM document_summary_embeddings \
         WHERE id IN (SELECT id FROM documents WHERE catalog_id = $1)",
    )
    .bind(catalog_id)
}

/// Remove the metadata embedding owned by a catalog id
pub fn delete_metadata_embedding(catalog_id: &str) -> Statement {
    Statement::new(
        "delete_metadata_embedding",
        "DELETE FROM document_metadata_embeddings \
         WHERE id IN (SELECT id FROM documents WHERE catalog_id = $1)",
    )
    .bind(catalog_id)
}

/// Remove the document row for a catalog id
pub fn delete_document(catalog_id: &str) -> Statement {
    Statement::new(
        "delete_document",
        "DELETE FROM documents WHERE catalog_id = $1",
    )
    .bind(catalog_id)
}

/// Insert a paper, returning the new surrogate id. An empty summary is
/// stored as NULL.
pub fn insert_document(paper: &Paper) -> Result<Statement> {
    let summary = Some(paper.summary.as_str()).filter(|s| !s.is_empty());

    Ok(Statement::new(
        "insert_document",
        "INSERT INTO documents (catalog_id, title, summary, comments, metadata, pdf_uri, published) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING id",
    )
    .bind(paper.id.as_str())
    .bind(paper.title.as_str())
    .bind(summary)
    .bind(paper.comments.as_deref())
    .bind(metadata_to_value(&paper.metadata())?)
    .bind(uri_to_value(paper.pdf_uri.as_ref()))
    .bind(paper.published))
}

/// Embed the stored summary of document `$1`
pub fn insert_summary_embedding(embedding: &EmbeddingSql, document_id: i64) -> Statement {
    Statement::new(
        "insert_summary_embedding",
        format!(
            "INSERT INTO document_summary_embeddings (id, embedding) \
             SELECT d.id, {} FROM documents d \
             WHERE d.id = $1 AND d.summary IS NOT NULL",
            embedding.embed_expr("d.summary")
        ),
    )
    .bind(document_id)
}

/// Embed the stored metadata JSON of document `$1`
pub fn insert_metadata_embedding(embedding: &EmbeddingSql, document_id: i64) -> Statement {
    Statement::new(
        "insert_metadata_embedding",
        format!(
            "INSERT INTO document_metadata_embeddings (id, embedding) \
             SELECT d.id, {} FROM documents d \
             WHERE d.id = $1",
            embedding.embed_expr("d.metadata::text")
        ),
    )
    .bind(document_id)
}

/// Look up one document by catalog id
pub fn find_document(catalog_id: &str) -> Statement {
    Statement::new(
        "find_document",
        format!("SELECT {} FROM documents WHERE catalog_id = $1", DOCUMENT_COLUMNS),
    )
    .bind(catalog_id)
}

/// Row counts for the three tables
pub fn store_stats() -> Statement {
    Statement::new(
        "store_stats",
        "SELECT \
            (SELECT count(*) FROM documents) AS documents, \
            (SELECT count(*) FROM document_summary_embeddings) AS summary_embeddings, \
            (SELECT count(*) FROM document_metadata_embeddings) AS metadata_embeddings",
    )
}

impl FromStoreRow for Document {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Document {
            id: row.int("id")?,
            catalog_id: row.text("catalog_id")?,
            title: row.text("title")?,
            summary: row.opt_text("summary")?,
            comments: row.opt_text("comments")?,
            metadata: metadata_from_value(row.value("metadata"))?,
            pdf_uri: uri_from_value(row.value("pdf_uri"))?,
            published: row.timestamp("published")?,
            created_on: row.timestamp("created_on")?,
            last_updated_on: row.timestamp("last_updated_on")?,
        })
    }
}

/// Table sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub documents: i64,
    pub summary_embeddings: i64,
    pub metadata_embeddings: i64,
}

impl FromStoreRow for StoreStats {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(StoreStats {
            documents: row.int("documents")?,
            summary_embeddings: row.int("summary_embeddings")?,
            metadata_embeddings: row.int("metadata_embeddings")?,
        })
    }
}

/// Fetch a stored document
pub async fn load_document(store: &dyn DocumentStore, catalog_id: &str) -> Result<Option<Document>> {
    let rows = store.query(&find_document(catalog_id)).await?;
    rows.first().map(Document::from_row).transpose()
}

/// Fetch table sizes
pub async fn load_stats(store: &dyn DocumentStore) -> Result<StoreStats> {
    let rows = store.query(&store_stats()).await?;
    rows.first()
        .map(StoreStats::from_row)
        .transpose()
        .map(Option::unwrap_or_default)
}

/// Surrogate id from an `INSERT ... RETURNING id` scalar
pub fn returned_id(value: Option<SqlValue>) -> Option<i64> {
    value.and_then(|v| v.as_i64())
}
