//! Index command implementation

use super::build_policy;
use crate::catalog::CatalogClient;
use crate::config::Config;
use crate::error::Result;
use crate::ingest::IngestionPipeline;
use crate::models::{IndexingReport, IndexingRequest};
use crate::resilience::INGESTION_POLICY;
use crate::store::DocumentStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Fetch papers by id and store them with their embeddings
pub async fn cmd_index(
    config: &Config,
    store: Arc<dyn DocumentStore>,
    catalog: Arc<dyn CatalogClient>,
    ids: Vec<String>,
    cancel: &CancellationToken,
) -> Result<IndexingReport> {
    let mut pipeline = IngestionPipeline::new(
        catalog,
        store,
        config.embedding_sql()?,
        config.catalog.page_size,
    );

    if config.resilience.wrap_ingestion {
        pipeline = pipeline.with_resilience(build_policy(config, INGESTION_POLICY)?);
    }

    let request = IndexingRequest::new(ids);
    pipeline.process_indexing_request(Some(&request), cancel).await
}

/// Print an indexing report to console
pub fn print_indexing_report(report: &IndexingReport) {
    if report.cancelled {
        println!("\n⚠ Indexing cancelled");
    } else if report.is_complete_success() {
        println!("\n✓ Indexing complete");
    } else {
        println!("\n✗ Indexing finished with failures");
    }

    println!("  Ids requested: {}", report.requested);
    println!("  Papers fetched: {}", report.attempted);
    println!("  Papers stored: {}", report.stored.len());

    for id in &report.stored {
        println!("    {}", id);
    }

    if !report.failed.is_empty() {
        println!("  Failures: {}", report.failed.len());
        for failure in &report.failed {
            println!("    {}: {}", failure.catalog_id, failure.error);
        }
    }
}
