//! PostgreSQL schema definition

/// Placeholder replaced with the vector dimensionality
const DIMENSIONS_TOKEN: &str = "{dimensions}";

/// pgvector's HNSW index supports at most this many dimensions
pub const HNSW_MAX_DIMENSIONS: usize = 2000;

/// SQL schema for the document store
pub const SCHEMA_SQL: &str = r#"
CREATE EXTENSION IF NOT EXISTS vector;
CREATE EXTENSION IF NOT EXISTS ai CASCADE;

-- Documents: one row per catalog paper
CREATE TABLE IF NOT EXISTS documents (
    id BIGSERIAL PRIMARY KEY,
    catalog_id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    summary TEXT,
    comments TEXT,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    pdf_uri TEXT,
    published TIMESTAMPTZ NOT NULL,
    created_on TIMESTAMPTZ NOT NULL DEFAULT now(),
    last_updated_on TIMESTAMPTZ NOT NULL DEFAULT now()
);

-- Summary embeddings, 1:1 with documents
CREATE TABLE IF NOT EXISTS document_summary_embeddings (
    id BIGINT PRIMARY KEY REFERENCES documents(id),
    embedding VECTOR({dimensions}) NOT NULL
);

-- Metadata embeddings, 1:1 with documents
CREATE TABLE IF NOT EXISTS document_metadata_embeddings (
    id BIGINT PRIMARY KEY REFERENCES documents(id),
    embedding VECTOR({dimensions}) NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_published ON documents(published);
"#;

/// Approximate nearest-neighbor index on summary embeddings
const SUMMARY_INDEX_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_summary_embeddings_cosine
    ON document_summary_embeddings USING hnsw (embedding vector_cosine_ops);
"#;

/// Render the schema for a given vector dimensionality
pub fn schema_sql(dimensions: usize) -> String {
    let mut sql = SCHEMA_SQL.replace(DIMENSIONS_TOKEN, &dimensions.to_string());
    if dimensions <= HNSW_MAX_DIMENSIONS {
        sql.push_str(SUMMARY_INDEX_SQL);
    }
    sql
}
