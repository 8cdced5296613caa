//! CLI commands implementation

pub mod db;
pub mod index;
pub mod init;
pub mod pdf;
pub mod search;

pub use db::*;
pub use index::*;
pub use init::*;
pub use pdf::*;
pub use search::*;

use crate::config::Config;
use crate::error::Result;
use crate::resilience::ResiliencePolicy;
use std::sync::Arc;

/// Build a named resilience policy from `[resilience]`
pub fn build_policy(config: &Config, name: &str) -> Result<Arc<ResiliencePolicy>> {
    Ok(Arc::new(ResiliencePolicy::new(
        name,
        config.resilience_options(),
    )?))
}
