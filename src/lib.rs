//! papersift - arXiv ingestion and semantic search on PostgreSQL
//!
//! This crate provides:
//! - A paginated arXiv export API client with PDF download
//! - An ingestion pipeline that stores papers and their pgai embeddings
//! - A semantic search pipeline over pgvector, guarded by retries and a
//!   circuit breaker
//! - The `papersift` CLI commands

pub mod catalog;
pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod models;
pub mod resilience;
pub mod search;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
