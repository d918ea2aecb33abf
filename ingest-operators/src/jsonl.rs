//! JSON lines operator
//!
//! Appends every accepted artifact as one JSON object per line, to a file or
//! to stdout. Each record carries the artifact's SHA-256 fingerprint so
//! downstream consumers can de-duplicate across polls.

use async_trait::async_trait;
use ingest_core::Artifact;
use serde::Serialize;
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::{ArtifactFilter, Operator, OperatorError};

#[derive(Serialize)]
struct Record<'a> {
    fingerprint: String,
    #[serde(flatten)]
    artifact: &'a Artifact,
}

type Sink = Box<dyn AsyncWrite + Send + Unpin>;

/// Operator writing artifacts as JSON lines
pub struct JsonLinesOperator {
    name: String,
    sink: Mutex<Sink>,
    filter: ArtifactFilter,
}

impl JsonLinesOperator {
    pub fn new(name: &str, sink: Sink) -> Self {
        Self {
            name: name.to_string(),
            sink: Mutex::new(sink),
            filter: ArtifactFilter::new(),
        }
    }

    pub fn stdout(name: &str) -> Self {
        Self::new(name, Box::new(tokio::io::stdout()))
    }

    /// Append to `path`, creating it if needed
    pub async fn append_to(name: &str, path: impl AsRef<Path>) -> Result<Self, OperatorError> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::new(name, Box::new(file)))
    }

    pub fn with_filter(mut self, filter: ArtifactFilter) -> Self {
        self.filter = filter;
        self
    }
}

#[async_trait]
impl Operator for JsonLinesOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "jsonl"
    }

    fn filter(&self) -> &ArtifactFilter {
        &self.filter
    }

    async fn handle_artifact(&self, artifact: &Artifact) -> Result<(), OperatorError> {
        let record = Record {
            fingerprint: artifact.fingerprint(),
            artifact,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut sink = self.sink.lock().await;
        sink.write_all(&line).await?;
        sink.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_core::{ArtifactType, Provenance};
    use serde_json::Value;

    fn artifact(kind: ArtifactType, value: &str) -> Artifact {
        Artifact::new(kind, value, Provenance::new("myweb", "http://example.mock/", "ctx"))
    }

    #[tokio::test]
    async fn test_writes_one_line_per_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifacts.jsonl");

        let operator = JsonLinesOperator::append_to("out", &path).await.unwrap();
        let batch = vec![
            artifact(ArtifactType::Domain, "evil.com"),
            artifact(ArtifactType::Hash, "d41d8cd98f00b204e9800998ecf8427e"),
        ];
        let stats = operator.process(&batch).await;
        assert_eq!(stats.handled, 2);

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<Value> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["artifact_type"], "domain");
        assert_eq!(lines[0]["value"], "evil.com");
        assert_eq!(lines[0]["source_name"], "myweb");
        assert_eq!(lines[0]["fingerprint"], batch[0].fingerprint());
        assert_eq!(lines[1]["artifact_type"], "hash");
    }

    #[tokio::test]
    async fn test_appends_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifacts.jsonl");

        for _ in 0..2 {
            let operator = JsonLinesOperator::append_to("out", &path).await.unwrap();
            operator
                .handle_artifact(&artifact(ArtifactType::Url, "hxxp://evil[.]com"))
                .await
                .unwrap();
        }

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_filter_applies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifacts.jsonl");

        let operator = JsonLinesOperator::append_to("out", &path)
            .await
            .unwrap()
            .with_filter(ArtifactFilter::new().with_types([ArtifactType::Task]));
        let stats = operator
            .process(&[artifact(ArtifactType::Domain, "evil.com")])
            .await;
        assert_eq!(stats.filtered, 1);

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(written.is_empty());
    }
}
