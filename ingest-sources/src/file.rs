//! Local file source
//!
//! Reads a text file from disk. The modification time is the cheap probe;
//! the checkpoint is the RFC 3339 mtime. Platforms without modification
//! times always re-read the file and checkpoint its SHA-256 digest.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use ingest_core::{Checkpoint, Extractor};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{Source, SourceError, SourceOutput};

/// Source polling one local file
pub struct FileSource {
    path: PathBuf,
    include_nonobfuscated: bool,
    extractor: Extractor,
}

impl FileSource {
    pub fn new(name: &str, path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            include_nonobfuscated: false,
            extractor: Extractor::new(name),
        }
    }

    pub fn with_include_nonobfuscated(mut self, include: bool) -> Self {
        self.include_nonobfuscated = include;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reference_link(&self) -> String {
        let absolute = std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone());
        format!("file://{}", absolute.display())
    }

    async fn modified(&self) -> Result<Option<Checkpoint>, SourceError> {
        let metadata = tokio::fs::metadata(&self.path).await?;
        Ok(metadata.modified().ok().map(|mtime| {
            let mtime: DateTime<Utc> = mtime.into();
            Checkpoint::new(mtime.to_rfc3339_opts(SecondsFormat::Nanos, true))
        }))
    }
}

#[async_trait]
impl Source for FileSource {
    fn name(&self) -> &str {
        self.extractor.source_name()
    }

    fn kind(&self) -> &str {
        "file"
    }

    async fn run(&self, saved_state: Option<Checkpoint>) -> Result<SourceOutput, SourceError> {
        let modified = self.modified().await?;

        if modified.is_some() && modified == saved_state {
            debug!("{} unchanged since {:?}", self.path.display(), saved_state);
            return Ok(SourceOutput::unchanged(saved_state));
        }

        let bytes = tokio::fs::read(&self.path).await?;
        let content = String::from_utf8_lossy(&bytes);

        let checkpoint = modified.or_else(|| {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            Some(Checkpoint::new(format!("{:x}", hasher.finalize())))
        });

        let artifacts = self.extractor.process_element(
            &content,
            &self.reference_link(),
            self.include_nonobfuscated,
        );

        info!(
            "Read {} ({} artifacts)",
            self.path.display(),
            artifacts.len()
        );

        Ok(SourceOutput {
            checkpoint,
            artifacts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_core::ArtifactType;
    use std::io::Write;

    fn notes_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_first_run_reads_file() {
        let file = notes_file("beacon to hxxp://evil[.]com/gate and 45.33.32.156");
        let source = FileSource::new("notes", file.path());

        let output = source.run(None).await.unwrap();
        assert!(output.checkpoint.is_some());
        let kinds: Vec<ArtifactType> = output.artifacts.iter().map(|a| a.artifact_type()).collect();
        assert_eq!(
            kinds,
            vec![
                ArtifactType::Url,
                ArtifactType::Domain,
                ArtifactType::IpAddress,
                ArtifactType::Task
            ]
        );
        assert!(output.artifacts[0].reference_link().starts_with("file://"));
    }

    #[tokio::test]
    async fn test_unchanged_file_is_skipped() {
        let file = notes_file("8.8.8.8");
        let source = FileSource::new("notes", file.path());

        let first = source.run(None).await.unwrap();
        let second = source.run(first.checkpoint.clone()).await.unwrap();
        assert!(second.artifacts.is_empty());
        assert_eq!(second.checkpoint, first.checkpoint);

        let third = source.run(second.checkpoint.clone()).await.unwrap();
        assert_eq!(third, second);
    }

    #[tokio::test]
    async fn test_stale_checkpoint_rereads() {
        let file = notes_file("8.8.8.8");
        let source = FileSource::new("notes", file.path());

        let output = source
            .run(Some(Checkpoint::new("1970-01-01T00:00:00Z")))
            .await
            .unwrap();
        assert_eq!(output.artifacts.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let source = FileSource::new("notes", "/nonexistent/ioc-ingest/notes.txt");
        assert!(matches!(
            source.run(None).await,
            Err(SourceError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_include_nonobfuscated() {
        let file = notes_file("http://example.com/test");
        let strict = FileSource::new("notes", file.path());
        let lenient = FileSource::new("notes", file.path()).with_include_nonobfuscated(true);

        assert_eq!(strict.run(None).await.unwrap().artifacts.len(), 1);
        assert_eq!(lenient.run(None).await.unwrap().artifacts.len(), 3);
    }
}
