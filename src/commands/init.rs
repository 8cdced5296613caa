//! Init command implementation

use crate::config::{AiConfig, Config, PathsConfig};
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing::info;

/// Provider written into a fresh config
pub const TEMPLATE_PROVIDER: &str = "ollama";
/// Embedding model written into a fresh config
pub const TEMPLATE_MODEL: &str = "nomic-embed-text";
/// Dimensions of [`TEMPLATE_MODEL`]
pub const TEMPLATE_DIMENSIONS: i64 = 768;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
}

/// Write a starter configuration
pub fn cmd_init(options: InitOptions) -> Result<Config> {
    let InitOptions {
        base_dir,
        config_path,
        force,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let config = Config {
        ai: AiConfig {
            provider: Some(TEMPLATE_PROVIDER.to_string()),
            embedding_model: Some(TEMPLATE_MODEL.to_string()),
            dimensions: Some(TEMPLATE_DIMENSIONS),
        },
        paths: PathsConfig {
            base_dir,
            config_file: config_path,
        },
        ..Default::default()
    };

    config.validate()?;
    config.save()?;
    info!("Created config at {:?}", config.paths.config_file);

    Ok(config)
}

/// Print next steps after init
pub fn print_init_summary(config: &Config) {
    println!("✓ papersift initialized at {:?}", config.paths.base_dir);
    println!("\nConfiguration: {:?}", config.paths.config_file);
    println!("\nNext steps:");
    println!("  1. Point database.url at a PostgreSQL with pgvector and pgai");
    println!("  2. papersift db init                  # Create tables and indexes");
    println!("  3. papersift index 2107.05580         # Index papers by id");
    println!("  4. papersift search \"graph networks\"  # Search the index");
}
