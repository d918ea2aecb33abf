//! Extraction engine
//!
//! Turns one piece of raw content into the ordered artifact list for it:
//! URL/Domain pairs, IP addresses, YARA signatures, hashes and finally one
//! manual follow-up task.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::recognize::{self, PatternRecognizer, Recognizer};
use crate::{Artifact, ArtifactType, Provenance, SYSTEM_NAME};

/// Maximum number of characters of content kept as `reference_text`
pub const TRUNCATE_LENGTH: usize = 140;

/// Marker appended to truncated reference text
pub const TRUNCATION_MARKER: &str = "...";

/// Recognizer output containing this character is a truncation artifact
const ELLIPSIS: char = '\u{2026}';

/// Truncate content to [`TRUNCATE_LENGTH`] characters, marking truncation
pub fn reference_text(content: &str) -> String {
    match content.char_indices().nth(TRUNCATE_LENGTH) {
        Some((cut, _)) => format!("{}{}", &content[..cut], TRUNCATION_MARKER),
        None => content.to_string(),
    }
}

/// Extraction engine bound to one source name
#[derive(Clone)]
pub struct Extractor {
    source_name: String,
    recognizer: Arc<dyn Recognizer>,
}

impl Extractor {
    /// Create an extractor using the built-in pattern recognizer
    pub fn new(source_name: &str) -> Self {
        Self::with_recognizer(source_name, Arc::new(PatternRecognizer))
    }

    pub fn with_recognizer(source_name: &str, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            source_name: source_name.to_string(),
            recognizer,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Extract artifacts from `content` found at `reference_link`.
    ///
    /// URLs that are not defanged are only kept when `include_nonobfuscated`
    /// is set. The returned list always ends with exactly one task artifact.
    pub fn process_element(
        &self,
        content: &str,
        reference_link: &str,
        include_nonobfuscated: bool,
    ) -> Vec<Artifact> {
        let provenance = Provenance::new(&self.source_name, reference_link, &reference_text(content));
        let reference_host = recognize::netloc_host(reference_link);

        let mut batch = Batch::default();

        // URLs and their domains
        for url in self.recognizer.extract_urls(content) {
            if url.contains(ELLIPSIS) {
                trace!("Skipping truncated URL match: {}", url);
                continue;
            }

            let artifact = Artifact::new(ArtifactType::Url, &url, provenance.clone());
            let domain = artifact.domain();

            if domain.is_some() && domain == reference_host {
                debug!("Skipping self-referencing URL {} from {}", url, reference_link);
                continue;
            }

            if !(artifact.is_obfuscated() || include_nonobfuscated) {
                trace!("Skipping non-obfuscated URL: {}", url);
                continue;
            }

            let is_domain = artifact.is_domain();
            batch.push(artifact);

            if is_domain {
                if let Some(domain) = domain {
                    batch.push(Artifact::new(ArtifactType::Domain, &domain, provenance.clone()));
                }
            }
        }

        // IP addresses
        for ip in self.recognizer.extract_ips(content) {
            let artifact = Artifact::new(ArtifactType::IpAddress, &ip, provenance.clone());
            match artifact.ip_address() {
                None => trace!("Skipping invalid IP candidate: {}", ip),
                Some(addr) if recognize::is_private_or_loopback(&addr) => {
                    trace!("Skipping private or loopback IP: {}", ip)
                }
                Some(_) => batch.push(artifact),
            }
        }

        // YARA rules
        for rule in self.recognizer.extract_yara_rules(content) {
            batch.push(Artifact::new(ArtifactType::YaraSignature, &rule, provenance.clone()));
        }

        // Hashes
        for hash in self.recognizer.extract_hashes(content) {
            batch.push(Artifact::new(ArtifactType::Hash, &hash, provenance.clone()));
        }

        // Manual task
        let title = format!("Manual Task: {}", reference_link);
        let description = format!(
            "URL: {}\nTask autogenerated by {} from source: {}",
            reference_link, SYSTEM_NAME, self.source_name
        );
        batch.push(Artifact::new(
            ArtifactType::Task,
            &title,
            Provenance::new(&self.source_name, reference_link, &description),
        ));

        debug!(
            "Extracted {} artifacts from {} ({})",
            batch.artifacts.len(),
            reference_link,
            self.source_name
        );

        batch.artifacts
    }
}

/// Ordered artifacts with per-call de-duplication of (kind, value)
#[derive(Default)]
struct Batch {
    artifacts: Vec<Artifact>,
    seen: HashSet<(ArtifactType, String)>,
}

impl Batch {
    fn push(&mut self, artifact: Artifact) {
        if self.seen.insert((artifact.artifact_type(), artifact.value().to_string())) {
            self.artifacts.push(artifact);
        }
    }
}
