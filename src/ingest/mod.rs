//! Ingestion pipeline
//!
//! Drains papers from the catalog and stores each one with its embeddings.
//! Every paper is written in its own transaction:
//! delete old embeddings, delete the old document, insert the document,
//! embed the summary, embed the metadata, commit. Re-ingesting a paper
//! therefore replaces it.

use crate::catalog::CatalogClient;
use crate::embed::EmbeddingSql;
use crate::error::{Error, Result};
use crate::models::{IndexingFailure, IndexingReport, IndexingRequest, Paper};
use crate::resilience::ResiliencePolicy;
use crate::store::{
    delete_document, delete_metadata_embedding, delete_summary_embedding, insert_document,
    insert_metadata_embedding, insert_summary_embedding, returned_id, DocumentStore,
    StoreTransaction,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Catalog-to-store ingestion
pub struct IngestionPipeline {
    catalog: Arc<dyn CatalogClient>,
    store: Arc<dyn DocumentStore>,
    embedding: EmbeddingSql,
    page_size: usize,
    policy: Option<Arc<ResiliencePolicy>>,
}

impl IngestionPipeline {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        store: Arc<dyn DocumentStore>,
        embedding: EmbeddingSql,
        page_size: usize,
    ) -> Self {
        Self {
            catalog,
            store,
            embedding,
            page_size,
            policy: None,
        }
    }

    /// Retry each paper's transaction under `policy`
    pub fn with_resilience(mut self, policy: Arc<ResiliencePolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Fetch and store every paper named in `request`.
    ///
    /// A missing request is rejected. Catalog errors abort the request;
    /// failures storing a single paper are logged, recorded in the report,
    /// and do not stop the remaining papers.
    pub async fn process_indexing_request(
        &self,
        request: Option<&IndexingRequest>,
        cancel: &CancellationToken,
    ) -> Result<IndexingReport> {
        let request = request.ok_or_else(|| {
            Error::invalid_argument("indexing_request", "an indexing request is required")
        })?;

        let mut report = IndexingReport {
            requested: request.ids.len(),
            ..Default::default()
        };

        if request.ids.is_empty() {
            info!("No ids provided");
            return Ok(report);
        }

        info!(requested = report.requested, "Indexing papers");

        let mut papers = self
            .catalog
            .fetch_papers(&request.ids, self.page_size, cancel.clone());

        while let Some(next) = papers.next().await {
            let paper = next?;

            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            report.attempted += 1;
            match self.persist(&paper, cancel).await {
                Ok(document_id) => {
                    info!(catalog_id = %paper.id, document_id, "Stored {}", paper.display_title());
                    report.stored.push(paper.id);
                }
                Err(e) => {
                    let failure = Error::PersistenceFailed {
                        catalog_id: paper.id.clone(),
                        source: Box::new(e),
                    };
                    error!(catalog_id = %paper.id, "{}", failure);
                    report.failed.push(IndexingFailure {
                        catalog_id: paper.id,
                        error: failure.to_string(),
                    });
                }
            }
        }

        if cancel.is_cancelled() {
            report.cancelled = true;
            warn!(attempted = report.attempted, "Indexing cancelled");
        }

        info!(
            requested = report.requested,
            attempted = report.attempted,
            stored = report.stored.len(),
            failed = report.failed.len(),
            "Indexing finished"
        );

        Ok(report)
    }

    async fn persist(&self, paper: &Paper, cancel: &CancellationToken) -> Result<i64> {
        match &self.policy {
            Some(policy) => policy.execute(cancel, || self.store_paper(paper)).await,
            None => self.store_paper(paper).await,
        }
    }

    /// Replace one paper and its embeddings in a single transaction,
    /// returning the new document id
    pub async fn store_paper(&self, paper: &Paper) -> Result<i64> {
        let mut tx = self.store.begin().await?;

        match self.write_paper(tx.as_mut(), paper).await {
            Ok(document_id) => {
                tx.commit().await?;
                Ok(document_id)
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(catalog_id = %paper.id, "Rollback failed: {}", rollback_error);
                }
                Err(e)
            }
        }
    }

    async fn write_paper(&self, tx: &mut dyn StoreTransaction, paper: &Paper) -> Result<i64> {
        let catalog_id = paper.id.as_str();

        tx.execute(&delete_summary_embedding(catalog_id)).await?;
        tx.execute(&delete_metadata_embedding(catalog_id)).await?;
        let replaced = tx.execute(&delete_document(catalog_id)).await?;
        if replaced > 0 {
            debug!(catalog_id, "Replacing existing document");
        }

        let document_id = returned_id(tx.execute_scalar(&insert_document(paper)?).await?)
            .ok_or_else(|| {
                Error::Database(sqlx::Error::Protocol(
                    "insert into documents returned no id".to_string(),
                ))
            })?;

        if paper.summary.is_empty() {
            debug!(catalog_id, "No summary, skipping summary embedding");
        } else {
            tx.execute(&insert_summary_embedding(&self.embedding, document_id))
                .await?;
        }

        tx.execute(&insert_metadata_embedding(&self.embedding, document_id))
            .await?;

        Ok(document_id)
    }
}
