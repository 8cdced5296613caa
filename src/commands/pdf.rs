//! PDF download command

use crate::catalog::CatalogClient;
use crate::error::{Error, Result};
use futures::StreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A downloaded PDF
#[derive(Debug, Clone, Serialize)]
pub struct PdfDownload {
    pub catalog_id: String,
    pub title: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// `<id>.pdf` with old-style `/` separators replaced
pub fn default_pdf_file_name(catalog_id: &str) -> String {
    format!("{}.pdf", catalog_id.replace('/', "_"))
}

/// Resolve a paper and write its PDF to `output`, or to `<id>.pdf` in the
/// current directory. A partial file is removed when the download fails.
pub async fn cmd_pdf(
    catalog: &dyn CatalogClient,
    id: &str,
    output: Option<PathBuf>,
    cancel: &CancellationToken,
) -> Result<PdfDownload> {
    let (paper, mut body) = catalog.fetch_paper_with_pdf(id, cancel.clone()).await?;
    let path = output.unwrap_or_else(|| PathBuf::from(default_pdf_file_name(&paper.id)));

    info!(catalog_id = %paper.id, "Downloading PDF to {:?}", path);

    let mut file = tokio::fs::File::create(&path).await?;
    let mut bytes = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                remove_partial(&path).await;
                return Err(e);
            }
        };
        file.write_all(&chunk).await?;
        bytes += chunk.len() as u64;
    }
    file.flush().await?;

    if cancel.is_cancelled() {
        drop(file);
        remove_partial(&path).await;
        return Err(Error::Cancelled);
    }

    Ok(PdfDownload {
        catalog_id: paper.id,
        title: paper.title,
        path,
        bytes,
    })
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Could not remove partial download {:?}: {}", path, e);
    }
}

pub fn print_pdf_download(download: &PdfDownload) {
    println!("✓ {}: {}", download.catalog_id, download.title);
    println!("  Saved {} bytes to {}", download.bytes, download.path.display());
}
