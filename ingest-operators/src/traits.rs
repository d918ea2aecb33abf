//! Common traits for operators

use async_trait::async_trait;
use ingest_core::Artifact;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ArtifactFilter;

/// Errors from operator actions
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid filter pattern: {0}")]
    Filter(#[from] regex::Error),
}

/// Counters for one batch of artifacts handed to an operator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub handled: usize,
    pub filtered: usize,
    pub failed: usize,
}

/// Common interface for all operators.
///
/// `handle_artifact` performs the per-kind external action. Kinds an
/// operator has no action for are a no-op, not an error.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Unique operator name
    fn name(&self) -> &str;

    /// Integration type name
    fn kind(&self) -> &str;

    /// Which artifacts this operator accepts
    fn filter(&self) -> &ArtifactFilter;

    /// Perform the external action for one artifact
    async fn handle_artifact(&self, artifact: &Artifact) -> Result<(), OperatorError>;

    /// Handle artifacts in order. Filtered artifacts are skipped; a failed
    /// artifact is logged and does not stop the rest.
    async fn process(&self, artifacts: &[Artifact]) -> DispatchStats {
        let mut stats = DispatchStats::default();

        for artifact in artifacts {
            if !self.filter().accepts(artifact) {
                stats.filtered += 1;
                continue;
            }

            match self.handle_artifact(artifact).await {
                Ok(()) => stats.handled += 1,
                Err(e) => {
                    warn!(
                        "Operator {} failed on {} {}: {}",
                        self.name(),
                        artifact.artifact_type(),
                        artifact.value(),
                        e
                    );
                    stats.failed += 1;
                }
            }
        }

        debug!("Operator {} processed batch: {:?}", self.name(), stats);
        stats
    }
}
