//! Semantic search over summary embeddings
//!
//! The query text is embedded inside PostgreSQL by the same pgai function
//! used during ingestion and ranked by cosine distance.

use crate::embed::EmbeddingSql;
use crate::error::{Error, Result};
use crate::models::{SearchRequest, SearchResultItem};
use crate::resilience::ResiliencePolicy;
use crate::store::{
    decode_rows, metadata_from_value, uri_from_value, DocumentStore, FromStoreRow, Row, Statement,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Nearest-neighbour statement: `$1` query text, `$2` result limit
pub fn search_documents(embedding: &EmbeddingSql, query: &str, top_k: usize) -> Statement {
    let sql = format!(
        "WITH query AS (SELECT {} AS embedding) \
         SELECT d.catalog_id, d.title, d.summary, d.comments, d.metadata, d.pdf_uri, d.published, \
                (e.embedding <=> q.embedding)::float8 AS distance \
         FROM document_summary_embeddings e \
         JOIN documents d ON d.id = e.id \
         CROSS JOIN query q \
         ORDER BY distance ASC \
         LIMIT $2",
        embedding.embed_expr("$1")
    );

    Statement::new("search_documents", sql)
        .bind(query)
        .bind(top_k as i64)
}

impl FromStoreRow for SearchResultItem {
    fn from_row(row: &Row) -> Result<Self> {
        let metadata = match row.value("metadata") {
            Some(value) if !value.is_null() => Some(metadata_from_value(Some(value))?),
            _ => None,
        };

        Ok(SearchResultItem {
            catalog_id: row.text("catalog_id")?,
            title: row.text("title")?,
            summary: row.opt_text("summary")?,
            comments: row.opt_text("comments")?,
            metadata,
            pdf_uri: uri_from_value(row.value("pdf_uri"))?,
            published: row.opt_timestamp("published")?,
            distance: row.float("distance")?,
        })
    }
}

/// Query-to-results pipeline
pub struct SearchPipeline {
    store: Arc<dyn DocumentStore>,
    embedding: EmbeddingSql,
    policy: Arc<ResiliencePolicy>,
    max_top_k: usize,
}

impl SearchPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedding: EmbeddingSql,
        policy: Arc<ResiliencePolicy>,
        max_top_k: usize,
    ) -> Self {
        Self {
            store,
            embedding,
            policy,
            max_top_k,
        }
    }

    /// Up to `top_k` documents ordered by ascending distance.
    ///
    /// A missing request, a blank query or `top_k == 0` return no results
    /// without touching the store. Store failures that survive the policy
    /// surface as `Error::SearchStoreFailed`.
    pub async fn search(
        &self,
        request: Option<&SearchRequest>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResultItem>> {
        let Some(request) = request else {
            debug!("No search request");
            return Ok(Vec::new());
        };

        let query = request.query.trim();
        if query.is_empty() {
            debug!("Empty query");
            return Ok(Vec::new());
        }

        if request.top_k == 0 {
            return Ok(Vec::new());
        }

        let top_k = if request.top_k > self.max_top_k {
            warn!(
                "top_k {} exceeds the maximum, using {}",
                request.top_k, self.max_top_k
            );
            self.max_top_k
        } else {
            request.top_k
        };

        info!(top_k, "Searching for: {}", query);

        let statement = search_documents(&self.embedding, query, top_k);
        let rows = self
            .policy
            .execute(cancel, || self.store.query(&statement))
            .await
            .map_err(|e| {
                error!(policy = self.policy.name(), "Search failed: {}", e);
                Error::SearchStoreFailed(Box::new(e))
            })?;

        let items: Vec<SearchResultItem> = decode_rows(&rows)?;
        debug!("Found {} results", items.len());
        Ok(items)
    }
}
