//! arXiv catalog client
//!
//! This module provides:
//! - Paginated, rate-limited metadata retrieval as a lazy stream of papers
//! - Atom feed parsing into normalized `Paper` records
//! - Streaming PDF downloads
//! - arXiv identifier helpers

mod atom;
mod ids;

pub use atom::parse_feed;
pub use ids::*;

use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::models::Paper;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Lazy sequence of papers; an `Err` item is always the last one
pub type PaperStream = BoxStream<'static, Result<Paper>>;

/// PDF body as a sequence of byte chunks
pub type PdfStream = BoxStream<'static, Result<Bytes>>;

/// Source of paper metadata and PDFs
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Stream papers for `ids`, `page_size` entries per request.
    ///
    /// The producer runs at most one page ahead of the consumer. An id list
    /// that is empty after normalization yields an empty stream without any
    /// request.
    fn fetch_papers(
        &self,
        ids: &[String],
        page_size: usize,
        cancel: CancellationToken,
    ) -> PaperStream;

    /// Start downloading the PDF at `uri`
    async fn download_pdf(&self, uri: &Url, cancel: CancellationToken) -> Result<PdfStream>;

    /// Resolve one paper and open its PDF
    async fn fetch_paper_with_pdf(
        &self,
        id: &str,
        cancel: CancellationToken,
    ) -> Result<(Paper, PdfStream)> {
        // Stop paging once the first entry is in
        let lookup = cancel.child_token();
        let mut papers = self.fetch_papers(&[id.to_string()], 1, lookup.clone());
        let first = papers.next().await;
        lookup.cancel();
        drop(papers);

        let paper = match first {
            Some(result) => result?,
            None => return Err(Error::PaperNotFound(id.to_string())),
        };

        let uri = paper
            .pdf_uri
            .clone()
            .ok_or_else(|| Error::PdfUnavailable(paper.id.clone()))?;
        let pdf = self.download_pdf(&uri, cancel).await?;
        Ok((paper, pdf))
    }
}

/// HTTP client for the arXiv export API
#[derive(Clone)]
pub struct ArxivClient {
    client: Client,
    query_url: Url,
    page_delay: Duration,
}

impl ArxivClient {
    /// Create a new client
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let query_url = Url::parse(&base)?.join("query")?;

        Ok(Self {
            client,
            query_url,
            page_delay: config.page_delay(),
        })
    }

    fn page_url(&self, id_list: &str, start: usize, page_size: usize) -> Url {
        let mut url = self.query_url.clone();
        url.query_pairs_mut()
            .append_pair("id_list", id_list)
            .append_pair("start", &start.to_string())
            .append_pair("max_results", &page_size.to_string());
        url
    }

    async fn fetch_page(&self, url: &Url) -> Result<Vec<Paper>> {
        let fetch_failed = |source: reqwest::Error| Error::CatalogFetchFailed {
            url: url.to_string(),
            source,
        };

        debug!("Fetching: {}", url);
        let body = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(fetch_failed)?
            .text()
            .await
            .map_err(fetch_failed)?;

        parse_feed(&body)
    }

    /// Producer loop: one request per page until an empty page, an error,
    /// cancellation, or a dropped consumer.
    async fn produce_pages(
        self,
        id_list: String,
        page_size: usize,
        cancel: CancellationToken,
        tx: mpsc::Sender<Result<Paper>>,
    ) {
        let mut start = 0;

        loop {
            if cancel.is_cancelled() {
                debug!("Catalog fetch cancelled at offset {}", start);
                return;
            }

            let url = self.page_url(&id_list, start, page_size);
            let page = tokio::select! {
                _ = cancel.cancelled() => return,
                page = self.fetch_page(&url) => page,
            };

            let papers = match page {
                Ok(papers) => papers,
                Err(e) => {
                    warn!("Catalog page at offset {} failed: {}", start, e);
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            if papers.is_empty() {
                debug!("Empty page at offset {}, done", start);
                return;
            }

            info!("Fetched {} papers at offset {}", papers.len(), start);
            for paper in papers {
                if tx.send(Ok(paper)).await.is_err() {
                    debug!("Paper stream dropped by consumer");
                    return;
                }
            }

            start += page_size;

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Catalog fetch cancelled during page delay");
                    return;
                }
                _ = tokio::time::sleep(self.page_delay) => {}
            }
        }
    }
}

#[async_trait]
impl CatalogClient for ArxivClient {
    fn fetch_papers(
        &self,
        ids: &[String],
        page_size: usize,
        cancel: CancellationToken,
    ) -> PaperStream {
        let ids = normalize_ids(ids);
        if ids.is_empty() {
            debug!("No valid ids to fetch");
            return stream::empty().boxed();
        }

        let page_size = page_size.max(1);
        let (tx, rx) = mpsc::channel(page_size);
        let producer = self.clone();
        tokio::spawn(producer.produce_pages(ids.join(","), page_size, cancel, tx));

        ReceiverStream::new(rx).boxed()
    }

    async fn download_pdf(&self, uri: &Url, cancel: CancellationToken) -> Result<PdfStream> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let uri_text = uri.to_string();
        let download_failed = |source: reqwest::Error| Error::PdfDownloadFailed {
            uri: uri.to_string(),
            source,
        };

        debug!("Downloading PDF: {}", uri);
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = self.client.get(uri.clone()).send() => response,
        };
        let response = response
            .and_then(|r| r.error_for_status())
            .map_err(download_failed)?;

        let body = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|source| Error::PdfDownloadFailed {
                    uri: uri_text.clone(),
                    source,
                })
            })
            .take_until(async move { cancel.cancelled().await });

        Ok(body.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(id: &str, pdf_base: Option<&str>) -> String {
        let link = pdf_base
            .map(|base| format!(r#"<link title="pdf" href="{}/pdf/{}" rel="related"/>"#, base, id))
            .unwrap_or_default();
        format!(
            r#"<entry><id>http://arxiv.org/abs/{id}</id><published>2021-01-01T00:00:00Z</published><title>Paper {id}</title><summary>About {id}</summary><author><name>A. Author</name></author>{link}<category term="cs.LG"/></entry>"#
        )
    }

    fn feed(entries: &[String]) -> String {
        format!(
            r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom">{}</feed>"#,
            entries.concat()
        )
    }

    fn client_for(server: &MockServer) -> ArxivClient {
        let config = CatalogConfig {
            base_url: format!("{}/api", server.uri()),
            page_delay_ms: 0,
            timeout_secs: 5,
            ..Default::default()
        };
        ArxivClient::new(&config).expect("client should build")
    }

    async fn mount_page(server: &MockServer, start: &str, body: String) {
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("start", start))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "application/atom+xml"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_pagination_stops_on_empty_page() {
        let server = MockServer::start().await;
        mount_page(&server, "0", feed(&[entry("2101.00001v1", None), entry("2101.00002v1", None)])).await;
        mount_page(&server, "2", feed(&[entry("2101.00003v2", None)])).await;
        mount_page(&server, "4", feed(&[])).await;

        let client = client_for(&server);
        let ids = vec![
            "2101.00001".to_string(),
            "2101.00002".to_string(),
            "2101.00003".to_string(),
        ];
        let papers: Vec<_> = client
            .fetch_papers(&ids, 2, CancellationToken::new())
            .collect()
            .await;

        let ids: Vec<String> = papers.into_iter().map(|p| p.unwrap().id).collect();
        assert_eq!(ids, vec!["2101.00001v1", "2101.00002v1", "2101.00003v2"]);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        let first = requests[0].url.query_pairs().find(|(k, _)| k == "id_list").unwrap().1.into_owned();
        assert_eq!(first, "2101.00001,2101.00002,2101.00003");
    }

    #[tokio::test]
    async fn test_empty_ids_make_no_request() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        let ids = vec!["  ".to_string(), "not-an-id".to_string()];
        let papers: Vec<_> = client
            .fetch_papers(&ids, 10, CancellationToken::new())
            .collect()
            .await;

        assert!(papers.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_http_error_ends_stream_with_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut papers = client.fetch_papers(&["2101.00001".to_string()], 10, CancellationToken::new());

        let first = papers.next().await.expect("one error item");
        assert!(matches!(first, Err(Error::CatalogFetchFailed { .. })));
        assert!(papers.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_token_yields_nothing() {
        let server = MockServer::start().await;
        mount_page(&server, "0", feed(&[entry("2101.00001v1", None)])).await;

        let client = client_for(&server);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let papers: Vec<_> = client
            .fetch_papers(&["2101.00001".to_string()], 10, cancel)
            .collect()
            .await;
        assert!(papers.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_page_delay_stops_paging() {
        let server = MockServer::start().await;
        mount_page(&server, "0", feed(&[entry("2101.00001v1", None)])).await;
        mount_page(&server, "1", feed(&[entry("2101.00002v1", None)])).await;

        let config = CatalogConfig {
            base_url: format!("{}/api", server.uri()),
            page_delay_ms: 60_000,
            timeout_secs: 5,
            ..Default::default()
        };
        let client = ArxivClient::new(&config).unwrap();

        let cancel = CancellationToken::new();
        let ids = vec!["2101.00001".to_string(), "2101.00002".to_string()];
        let mut papers = client.fetch_papers(&ids, 1, cancel.clone());

        assert_eq!(papers.next().await.unwrap().unwrap().id, "2101.00001v1");
        cancel.cancel();
        assert!(papers.next().await.is_none());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_paper_with_pdf() {
        let server = MockServer::start().await;
        mount_page(&server, "0", feed(&[entry("2107.05580v1", Some(&server.uri()))])).await;
        Mock::given(method("GET"))
            .and(path("/pdf/2107.05580v1"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4 body".to_vec(), "application/pdf"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let (paper, pdf) = client
            .fetch_paper_with_pdf("arXiv:2107.05580", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(paper.id, "2107.05580v1");

        let chunks: Vec<Bytes> = pdf.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.concat(), b"%PDF-1.4 body".to_vec());
    }

    #[tokio::test]
    async fn test_fetch_paper_with_pdf_stops_paging() {
        let server = MockServer::start().await;
        mount_page(&server, "0", feed(&[entry("2107.05580v1", Some(&server.uri()))])).await;
        mount_page(&server, "1", feed(&[])).await;
        Mock::given(method("GET"))
            .and(path("/pdf/2107.05580v1"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF".to_vec(), "application/pdf"))
            .mount(&server)
            .await;

        let config = CatalogConfig {
            base_url: format!("{}/api", server.uri()),
            page_delay_ms: 200,
            timeout_secs: 5,
            ..Default::default()
        };
        let client = ArxivClient::new(&config).unwrap();
        let (_, pdf) = client
            .fetch_paper_with_pdf("2107.05580", CancellationToken::new())
            .await
            .unwrap();
        let _: Vec<_> = pdf.collect().await;

        tokio::time::sleep(Duration::from_millis(500)).await;
        let queries = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.url.path() == "/api/query")
            .count();
        assert_eq!(queries, 1);
    }

    #[tokio::test]
    async fn test_malformed_page_ends_stream_with_parse_error() {
        let server = MockServer::start().await;
        mount_page(&server, "0", feed(&[entry("2101.00001v1", None)])).await;
        mount_page(&server, "1", "<feed><entry>".to_string()).await;
        mount_page(&server, "2", feed(&[entry("2101.00003v1", None)])).await;

        let client = client_for(&server);
        let ids = vec![
            "2101.00001".to_string(),
            "2101.00002".to_string(),
            "2101.00003".to_string(),
        ];
        let mut papers = client.fetch_papers(&ids, 1, CancellationToken::new());

        assert_eq!(papers.next().await.unwrap().unwrap().id, "2101.00001v1");
        let second = papers.next().await.expect("parse error item");
        assert!(matches!(second, Err(Error::CatalogParse(_))));
        assert!(papers.next().await.is_none());
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_paper_without_pdf_link() {
        let server = MockServer::start().await;
        mount_page(&server, "0", feed(&[entry("2101.00001v1", None)])).await;

        let client = client_for(&server);
        let result = client
            .fetch_paper_with_pdf("2101.00001", CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::PdfUnavailable(id)) if id == "2101.00001v1"));
    }

    #[tokio::test]
    async fn test_unknown_paper() {
        let server = MockServer::start().await;
        mount_page(&server, "0", feed(&[])).await;

        let client = client_for(&server);
        let result = client
            .fetch_paper_with_pdf("2101.99999", CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::PaperNotFound(_))));
    }

    #[tokio::test]
    async fn test_pdf_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pdf/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let uri = Url::parse(&format!("{}/pdf/missing", server.uri())).unwrap();
        let result = client.download_pdf(&uri, CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::PdfDownloadFailed { .. })));
    }
}
