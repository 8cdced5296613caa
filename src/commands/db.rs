//! Database commands: schema setup, table stats and single-document lookup

use crate::catalog::to_short_id;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::Document;
use crate::store::{
    load_document, load_stats, DocumentStore, PgDocumentStore, StoreStats, HNSW_MAX_DIMENSIONS,
};
use serde::Serialize;
use tracing::info;

/// Result of `db init`
#[derive(Debug, Clone, Serialize)]
pub struct SchemaInfo {
    pub dimensions: usize,
    pub hnsw_index: bool,
}

/// Create extensions, tables and indexes
pub async fn cmd_db_init(config: &Config, store: &PgDocumentStore) -> Result<SchemaInfo> {
    let dimensions = config.embedding_sql()?.dimensions();
    store.ping().await?;
    store.init_schema(dimensions).await?;

    Ok(SchemaInfo {
        dimensions,
        hnsw_index: dimensions <= HNSW_MAX_DIMENSIONS,
    })
}

/// Row counts of the document and embedding tables
pub async fn cmd_db_status(store: &dyn DocumentStore) -> Result<StoreStats> {
    info!("Getting store stats");
    load_stats(store).await
}

/// Look up one stored document by catalog id
pub async fn cmd_show(store: &dyn DocumentStore, id: &str) -> Result<Document> {
    let catalog_id = to_short_id(id.trim()).to_string();
    load_document(store, &catalog_id)
        .await?
        .ok_or(Error::PaperNotFound(catalog_id))
}

pub fn print_schema_info(info: &SchemaInfo) {
    println!("✓ Database schema ready ({} dimensions)", info.dimensions);
    if !info.hnsw_index {
        println!(
            "  ⚠ No HNSW index: pgvector indexes at most {} dimensions, searches will scan",
            HNSW_MAX_DIMENSIONS
        );
    }
}

pub fn print_store_stats(stats: &StoreStats) {
    println!("\n📊 papersift Store\n");
    println!("Documents:           {}", stats.documents);
    println!("Summary embeddings:  {}", stats.summary_embeddings);
    println!("Metadata embeddings: {}", stats.metadata_embeddings);
}

pub fn print_document(doc: &Document) {
    println!("\n{}: {}", doc.catalog_id, doc.title);
    println!("Published: {}", doc.published.format("%Y-%m-%d"));
    if !doc.metadata.authors.is_empty() {
        println!("Authors: {}", doc.metadata.authors.join(", "));
    }
    if !doc.metadata.categories.is_empty() {
        println!("Categories: {}", doc.metadata.categories.join(", "));
    }
    if let Some(comments) = &doc.comments {
        println!("Comments: {}", comments);
    }
    if let Some(uri) = &doc.pdf_uri {
        println!("PDF: {}", uri);
    }
    if let Some(summary) = &doc.summary {
        println!("\n{}", summary);
    }
    println!("\nStored {} (updated {})", doc.created_on, doc.last_updated_on);
}
