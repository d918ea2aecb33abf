//! Web source
//!
//! Polls a single URL (typically a plain-text IOC list) with a cheap HEAD
//! probe before the full GET. The checkpoint is `last-modified;etag`, or
//! whichever of the two the server provides.

use async_trait::async_trait;
use ingest_core::{Checkpoint, Extractor};
use reqwest::Url;
use tracing::{debug, info};

use crate::transport::{HttpRequest, HttpResponse, SharedTransport};
use crate::{Source, SourceError, SourceOutput};

/// Outcome of the freshness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Unchanged,
    Changed,
}

/// Source polling one web resource
pub struct WebSource {
    url: String,
    include_nonobfuscated: bool,
    extractor: Extractor,
    transport: SharedTransport,
}

impl WebSource {
    pub fn new(name: &str, url: &str, transport: SharedTransport) -> Result<Self, SourceError> {
        Url::parse(url).map_err(|e| SourceError::InvalidUrl(format!("{}: {}", url, e)))?;

        Ok(Self {
            url: url.to_string(),
            include_nonobfuscated: true,
            extractor: Extractor::new(name),
            transport,
        })
    }

    /// Web lists are usually plain, so non-obfuscated URLs are kept by default
    pub fn with_include_nonobfuscated(mut self, include: bool) -> Self {
        self.include_nonobfuscated = include;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn probe(&self, saved_state: Option<&Checkpoint>) -> Result<Probe, SourceError> {
        let Some(saved) = saved_state else {
            return Ok(Probe::Changed);
        };

        let mut request = HttpRequest::head(&self.url);
        let (last_modified, etag) = saved.markers();
        if let Some(last_modified) = last_modified {
            request = request.header("If-Modified-Since", last_modified);
        }
        if let Some(etag) = etag {
            request = request.header("If-None-Match", etag);
        }

        let response = self.transport.send(request).await?;

        match response.status {
            304 => Ok(Probe::Unchanged),
            // HEAD not supported, fall back to a full fetch
            405 | 501 => Ok(Probe::Changed),
            _ if response.is_success() => {
                // servers ignoring conditional headers still expose their markers
                if freshness_checkpoint(&response).as_ref() == Some(saved) {
                    Ok(Probe::Unchanged)
                } else {
                    Ok(Probe::Changed)
                }
            }
            _ => Ok(Probe::Changed),
        }
    }

    async fn fetch(&self) -> Result<SourceOutput, SourceError> {
        let response = self.transport.send(HttpRequest::get(&self.url)).await?;

        if !response.is_success() {
            return Err(SourceError::Status {
                url: self.url.clone(),
                status: response.status,
            });
        }

        let checkpoint = freshness_checkpoint(&response);
        let artifacts =
            self.extractor
                .process_element(&response.body, &self.url, self.include_nonobfuscated);

        Ok(SourceOutput {
            checkpoint,
            artifacts,
        })
    }
}

/// Build a checkpoint from a response's `Last-Modified` and `ETag` headers
fn freshness_checkpoint(response: &HttpResponse) -> Option<Checkpoint> {
    Checkpoint::from_markers(response.header("last-modified"), response.header("etag"))
}

#[async_trait]
impl Source for WebSource {
    fn name(&self) -> &str {
        self.extractor.source_name()
    }

    fn kind(&self) -> &str {
        "web"
    }

    async fn run(&self, saved_state: Option<Checkpoint>) -> Result<SourceOutput, SourceError> {
        match self.probe(saved_state.as_ref()).await? {
            Probe::Unchanged => {
                debug!("{} unchanged since {:?}", self.url, saved_state);
                Ok(SourceOutput::unchanged(saved_state))
            }
            Probe::Changed => {
                let output = self.fetch().await?;
                info!(
                    "Fetched {} ({} artifacts, checkpoint {:?})",
                    self.url,
                    output.artifacts.len(),
                    output.checkpoint
                );
                Ok(output)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpMethod, HttpTransport};
    use ingest_core::ArtifactType;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const URL: &str = "http://example.mock/list.txt";

    /// Transport answering from canned responses per method
    #[derive(Default)]
    struct MockTransport {
        responses: HashMap<HttpMethod, HttpResponse>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl MockTransport {
        fn respond(mut self, method: HttpMethod, response: HttpResponse) -> Self {
            self.responses.insert(method, response);
            self
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SourceError> {
            let method = request.method;
            self.requests.lock().unwrap().push(request);
            self.responses
                .get(&method)
                .cloned()
                .ok_or_else(|| SourceError::Status {
                    url: URL.to_string(),
                    status: 599,
                })
        }
    }

    fn source(transport: MockTransport) -> (WebSource, Arc<MockTransport>) {
        let transport = Arc::new(transport);
        let source = WebSource::new("myweb", URL, transport.clone()).unwrap();
        (source, transport)
    }

    fn list_response() -> HttpResponse {
        HttpResponse::new(200).with_body("http://example.com/test")
    }

    #[tokio::test]
    async fn test_run_with_200() {
        let (web, _) = source(
            MockTransport::default()
                .respond(HttpMethod::Head, HttpResponse::new(200))
                .respond(
                    HttpMethod::Get,
                    list_response()
                        .with_header("Last-Modified", "test")
                        .with_header("Etag", "\"test\""),
                ),
        );

        let output = web.run(None).await.unwrap();
        let values: Vec<String> = output.artifacts.iter().map(|a| a.to_string()).collect();
        assert!(values.contains(&"http://example.com/test".to_string()));
        assert_eq!(output.checkpoint, Some(Checkpoint::new("test;\"test\"")));
    }

    #[tokio::test]
    async fn test_run_with_304() {
        let (web, transport) = source(
            MockTransport::default().respond(HttpMethod::Head, HttpResponse::new(304)),
        );

        let saved = Checkpoint::new("test;\"test\"");
        let output = web.run(Some(saved.clone())).await.unwrap();
        assert!(output.artifacts.is_empty());
        assert_eq!(output.checkpoint, Some(saved));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Head);
        assert!(requests[0]
            .headers
            .contains(&("If-Modified-Since".to_string(), "test".to_string())));
        assert!(requests[0]
            .headers
            .contains(&("If-None-Match".to_string(), "\"test\"".to_string())));
    }

    #[tokio::test]
    async fn test_run_with_200_and_no_etag() {
        let (web, _) = source(
            MockTransport::default()
                .respond(HttpMethod::Head, HttpResponse::new(200))
                .respond(HttpMethod::Get, list_response().with_header("Last-Modified", "test")),
        );

        let output = web.run(None).await.unwrap();
        assert!(output
            .artifacts
            .iter()
            .any(|a| a.value() == "http://example.com/test"));
        assert_eq!(output.checkpoint, Some(Checkpoint::new("test")));
    }

    #[tokio::test]
    async fn test_run_without_markers_returns_no_checkpoint() {
        let (web, _) = source(MockTransport::default().respond(HttpMethod::Get, list_response()));
        let output = web.run(None).await.unwrap();
        assert!(output.checkpoint.is_none());
        assert_eq!(
            output.artifacts.last().map(|a| a.artifact_type()),
            Some(ArtifactType::Task)
        );
    }

    #[tokio::test]
    async fn test_unchanged_polling_is_idempotent() {
        let (web, transport) = source(
            MockTransport::default().respond(HttpMethod::Head, HttpResponse::new(304)),
        );

        let first = web.run(Some(Checkpoint::new("test"))).await.unwrap();
        let second = web.run(first.checkpoint.clone()).await.unwrap();
        assert_eq!(first, second);
        assert!(second.artifacts.is_empty());
        assert_eq!(second.checkpoint, Some(Checkpoint::new("test")));
        assert!(transport
            .requests()
            .iter()
            .all(|r| r.method == HttpMethod::Head));
    }

    #[tokio::test]
    async fn test_head_markers_matching_checkpoint_skip_fetch() {
        let (web, transport) = source(
            MockTransport::default().respond(
                HttpMethod::Head,
                HttpResponse::new(200)
                    .with_header("Last-Modified", "test")
                    .with_header("ETag", "\"test\""),
            ),
        );

        let output = web.run(Some(Checkpoint::new("test;\"test\""))).await.unwrap();
        assert!(output.artifacts.is_empty());
        assert_eq!(output.checkpoint, Some(Checkpoint::new("test;\"test\"")));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_changed_resource_is_fetched() {
        let (web, _) = source(
            MockTransport::default()
                .respond(
                    HttpMethod::Head,
                    HttpResponse::new(200).with_header("Last-Modified", "new"),
                )
                .respond(HttpMethod::Get, list_response().with_header("Last-Modified", "new")),
        );

        let output = web.run(Some(Checkpoint::new("old"))).await.unwrap();
        assert_eq!(output.checkpoint, Some(Checkpoint::new("new")));
        assert!(!output.artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_head_not_allowed_falls_back_to_get() {
        let (web, transport) = source(
            MockTransport::default()
                .respond(HttpMethod::Head, HttpResponse::new(405))
                .respond(HttpMethod::Get, list_response().with_header("ETag", "\"v2\"")),
        );

        let output = web.run(Some(Checkpoint::new("\"v1\""))).await.unwrap();
        assert_eq!(output.checkpoint, Some(Checkpoint::new("\"v2\"")));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_error_status_is_reported() {
        let (web, _) = source(
            MockTransport::default().respond(HttpMethod::Get, HttpResponse::new(500)),
        );

        let result = web.run(None).await;
        assert!(matches!(result, Err(SourceError::Status { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_probe_failure_is_reported() {
        let (web, _) = source(MockTransport::default());
        assert!(web.run(Some(Checkpoint::new("test"))).await.is_err());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let transport: SharedTransport = Arc::new(MockTransport::default());
        assert!(matches!(
            WebSource::new("bad", "not a url", transport),
            Err(SourceError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_source_identity() {
        let (web, _) = source(MockTransport::default());
        assert_eq!(web.name(), "myweb");
        assert_eq!(web.kind(), "web");
        assert_eq!(web.url(), URL);
    }
}
