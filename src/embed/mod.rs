//! In-database embedding generation
//!
//! Embeddings are computed by the store itself through pgai functions. This
//! module renders those calls for the configured provider so that the
//! ingestion and search statements can inline them.

use crate::config::AiConfig;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Embedding provider reachable from the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    Ollama,
    OpenAi,
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AiProvider::Ollama => write!(f, "ollama"),
            AiProvider::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for AiProvider {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "azure-openai" => Ok(Self::OpenAi),
            _ => Err(Error::Config(format!(
                "Unsupported AI provider '{}'; expected 'ollama' or 'openai'",
                value
            ))),
        }
    }
}

/// Model names are inlined as SQL literals, so only a conservative
/// character set is accepted.
fn is_safe_model_name(model: &str) -> bool {
    !model.is_empty()
        && model
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '/' | '-'))
}

/// Renders provider-specific embedding expressions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingSql {
    provider: AiProvider,
    model: String,
    dimensions: usize,
}

impl EmbeddingSql {
    pub fn new(provider: AiProvider, model: &str, dimensions: usize) -> Result<Self> {
        let model = model.trim();
        if !is_safe_model_name(model) {
            return Err(Error::Config(format!(
                "ai.embedding_model '{}' contains unsupported characters",
                model
            )));
        }
        if dimensions == 0 {
            return Err(Error::Config("ai.dimensions must be positive".to_string()));
        }
        Ok(Self {
            provider,
            model: model.to_string(),
            dimensions,
        })
    }

    /// Build from `[ai]`; provider and model are both required
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let provider = config
            .provider
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| Error::Config("ai.provider is not configured".to_string()))?
            .parse::<AiProvider>()?;
        let model = config
            .embedding_model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| Error::Config("ai.embedding_model is not configured".to_string()))?;

        Self::new(provider, model, config.resolved_dimensions())
    }

    pub fn provider(&self) -> AiProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// SQL expression embedding the text expression `input`, cast to the
    /// configured vector type.
    ///
    /// `input` is inlined verbatim and must be a column reference or a bind
    /// placeholder, never user text.
    pub fn embed_expr(&self, input: &str) -> String {
        match self.provider {
            AiProvider::Ollama => format!(
                "ai.ollama_embed('{}', {})::vector({})",
                self.model, input, self.dimensions
            ),
            AiProvider::OpenAi => format!(
                "ai.openai_embed('{}', {}, dimensions => {})::vector({})",
                self.model, input, self.dimensions, self.dimensions
            ),
        }
    }
}
