//! Common traits for source connectors

use async_trait::async_trait;
use ingest_core::{Artifact, Checkpoint};
use thiserror::Error;

/// Errors from source polling
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Result of one successful poll
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceOutput {
    /// Checkpoint to hand back on the next poll
    pub checkpoint: Option<Checkpoint>,
    /// Artifacts found since the previous checkpoint
    pub artifacts: Vec<Artifact>,
}

impl SourceOutput {
    /// Nothing changed: hand the saved checkpoint back, emit nothing
    pub fn unchanged(saved_state: Option<Checkpoint>) -> Self {
        Self {
            checkpoint: saved_state,
            artifacts: Vec::new(),
        }
    }
}

/// Common interface for all source connectors.
///
/// `run` is self-contained: apart from the checkpoint it is handed, a source
/// keeps no state between polls. On error the caller keeps its previous
/// checkpoint; sources never retry internally.
#[async_trait]
pub trait Source: Send + Sync {
    /// Unique source name, used as provenance and checkpoint key
    fn name(&self) -> &str;

    /// Connector type name
    fn kind(&self) -> &str;

    /// Poll the source, resuming from `saved_state` when possible
    async fn run(&self, saved_state: Option<Checkpoint>) -> Result<SourceOutput, SourceError>;
}
