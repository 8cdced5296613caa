//! Search command implementation

use super::build_policy;
use crate::config::Config;
use crate::error::Result;
use crate::models::{SearchRequest, SearchResponse};
use crate::resilience::SEARCH_POLICY;
use crate::search::SearchPipeline;
use crate::store::DocumentStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run a semantic search; `top_k` falls back to `search.default_top_k`
pub async fn cmd_search(
    config: &Config,
    store: Arc<dyn DocumentStore>,
    query: &str,
    top_k: Option<usize>,
    cancel: &CancellationToken,
) -> Result<SearchResponse> {
    let pipeline = SearchPipeline::new(
        store,
        config.embedding_sql()?,
        build_policy(config, SEARCH_POLICY)?,
        config.search.max_top_k,
    );

    let request = SearchRequest::new(query, top_k.unwrap_or(config.search.default_top_k));
    let items = pipeline.search(Some(&request), cancel).await?;

    Ok(SearchResponse { items })
}

/// Print search results to console
pub fn print_search_results(query: &str, response: &SearchResponse) {
    println!("\n🔍 Query: {}\n", query);
    println!("Found {} results:\n", response.items.len());

    for (i, item) in response.items.iter().enumerate() {
        println!("{}. [distance: {:.3}] {}", i + 1, item.distance, item.catalog_id);
        println!("   Title: {}", item.title.split_whitespace().collect::<Vec<_>>().join(" "));

        if let Some(metadata) = &item.metadata {
            if !metadata.authors.is_empty() {
                println!("   Authors: {}", metadata.authors.join(", "));
            }
        }

        if let Some(summary) = &item.summary {
            let flat = summary.split_whitespace().collect::<Vec<_>>().join(" ");
            let preview = match flat.char_indices().nth(200) {
                Some((cut, _)) => format!("{}...", &flat[..cut]),
                None => flat,
            };
            println!("   {}\n", preview);
        } else {
            println!();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AiConfig;
    use crate::store::memory::MemoryStore;
    use crate::store::Row;

    fn config() -> Config {
        let mut config = Config {
            ai: AiConfig {
                provider: Some("openai".to_string()),
                embedding_model: Some("text-embedding-3-small".to_string()),
                dimensions: None,
            },
            ..Default::default()
        };
        config.search.default_top_k = 2;
        config
    }

    fn row(id: &str, distance: f64) -> Row {
        Row::default()
            .with("catalog_id", id)
            .with("title", "A title")
            .with("summary", None::<String>)
            .with("comments", None::<String>)
            .with("metadata", None::<String>)
            .with("pdf_uri", None::<String>)
            .with("published", None::<String>)
            .with("distance", distance)
    }

    #[tokio::test]
    async fn test_search_uses_default_top_k() {
        let store = MemoryStore::new();
        store.set_search_rows(vec![row("a", 0.1), row("b", 0.2), row("c", 0.3)]);

        let response = cmd_search(&config(), Arc::new(store.clone()), "query", None, &CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<&str> = response.items.iter().map(|i| i.catalog_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(response.items[0].metadata.is_none());
        assert!(response.items[0].published.is_none());
    }

    #[tokio::test]
    async fn test_search_explicit_top_k() {
        let store = MemoryStore::new();
        store.set_search_rows(vec![row("a", 0.1), row("b", 0.2), row("c", 0.3)]);

        let response = cmd_search(&config(), Arc::new(store), "query", Some(3), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.items.len(), 3);
    }
}
