//! Domain records shared by the catalog client, the store and both pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A paper as returned by the catalog, normalized from one Atom entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    /// Short catalog id, e.g. `2107.05580v1`
    pub id: String,
    pub title: String,
    pub summary: String,
    pub comments: Option<String>,
    pub pdf_uri: Option<Url>,
    /// Epoch zero when the feed omits or mangles the timestamp
    pub published: DateTime<Utc>,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
}

impl Paper {
    /// `"<id>: <title>"`, used in logs and CLI output
    pub fn display_title(&self) -> String {
        format!("{}: {}", self.id, self.title)
    }

    /// The metadata value persisted and embedded alongside the document
    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            authors: self.authors.clone(),
            categories: self.categories.clone(),
        }
    }
}

/// Authors and categories, stored as a camelCase JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// A persisted document row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i64,
    pub catalog_id: String,
    pub title: String,
    pub summary: Option<String>,
    pub comments: Option<String>,
    pub metadata: DocumentMetadata,
    pub pdf_uri: Option<Url>,
    pub published: DateTime<Utc>,
    pub created_on: DateTime<Utc>,
    pub last_updated_on: DateTime<Utc>,
}

/// One ranked search hit. Lower `distance` is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    pub catalog_id: String,
    pub title: String,
    pub summary: Option<String>,
    pub comments: Option<String>,
    pub metadata: Option<DocumentMetadata>,
    pub pdf_uri: Option<Url>,
    pub published: Option<DateTime<Utc>>,
    pub distance: f64,
}

/// Body of an indexing request: `{ "ids": [...] }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingRequest {
    #[serde(default)]
    pub ids: Vec<String>,
}

impl IndexingRequest {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

/// Body of a search request: `{ "query": "...", "top_k": 5 }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
        }
    }
}

/// Body of a search response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub items: Vec<SearchResultItem>,
}

/// A paper that could not be stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingFailure {
    pub catalog_id: String,
    pub error: String,
}

/// Outcome of one indexing request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingReport {
    /// Ids in the request as received
    pub requested: usize,
    /// Papers the catalog returned
    pub attempted: usize,
    /// Catalog ids committed, in processing order
    pub stored: Vec<String>,
    pub failed: Vec<IndexingFailure>,
    /// Processing stopped early on cancellation
    pub cancelled: bool,
}

impl IndexingReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}
