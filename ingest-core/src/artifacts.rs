//! Artifacts extracted from threat-intelligence content
//!
//! An artifact is one recognized (or synthesized) indicator together with
//! its provenance:
//! - URLs and the domains derived from them
//! - IP addresses
//! - Cryptographic hashes
//! - YARA signatures
//! - Manual follow-up tasks

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

use crate::recognize;

/// Kinds of artifacts. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    /// URL, possibly defanged
    Url,
    /// Domain taken from a URL's host
    Domain,
    /// IPv4 or IPv6 address
    IpAddress,
    /// MD5, SHA1, SHA256 or SHA512 digest
    Hash,
    /// YARA rule body
    YaraSignature,
    /// Synthesized "investigate this reference" task
    Task,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 6] = [
        ArtifactType::Url,
        ArtifactType::Domain,
        ArtifactType::IpAddress,
        ArtifactType::Hash,
        ArtifactType::YaraSignature,
        ArtifactType::Task,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Url => "url",
            ArtifactType::Domain => "domain",
            ArtifactType::IpAddress => "ip_address",
            ArtifactType::Hash => "hash",
            ArtifactType::YaraSignature => "yara_signature",
            ArtifactType::Task => "task",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown artifact type name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown artifact type: {0}")]
pub struct UnknownArtifactType(pub String);

impl FromStr for ArtifactType {
    type Err = UnknownArtifactType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "url" => Ok(ArtifactType::Url),
            "domain" => Ok(ArtifactType::Domain),
            "ip_address" | "ipaddress" | "ip" => Ok(ArtifactType::IpAddress),
            "hash" => Ok(ArtifactType::Hash),
            "yara_signature" | "yarasignature" | "yara" => Ok(ArtifactType::YaraSignature),
            "task" => Ok(ArtifactType::Task),
            _ => Err(UnknownArtifactType(s.to_string())),
        }
    }
}

/// Where an artifact came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Name of the source that produced the artifact
    pub source_name: String,
    /// Link identifying where the artifact was found
    pub reference_link: String,
    /// Truncated surrounding content, or a task description
    pub reference_text: String,
}

impl Provenance {
    pub fn new(source_name: &str, reference_link: &str, reference_text: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            reference_link: reference_link.to_string(),
            reference_text: reference_text.to_string(),
        }
    }
}

/// An immutable indicator record with provenance.
///
/// Fields are private; kind-specific capabilities are exposed as methods
/// that answer `false`/`None` for kinds they do not apply to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    artifact_type: ArtifactType,
    value: String,
    #[serde(flatten)]
    provenance: Provenance,
}

impl Artifact {
    pub fn new(artifact_type: ArtifactType, value: &str, provenance: Provenance) -> Self {
        Self {
            artifact_type,
            value: value.to_string(),
            provenance,
        }
    }

    pub fn artifact_type(&self) -> ArtifactType {
        self.artifact_type
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn source_name(&self) -> &str {
        &self.provenance.source_name
    }

    pub fn reference_link(&self) -> &str {
        &self.provenance.reference_link
    }

    pub fn reference_text(&self) -> &str {
        &self.provenance.reference_text
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// True for URLs whose raw form was defanged (`hxxp`, `[.]`, ...)
    pub fn is_obfuscated(&self) -> bool {
        self.artifact_type == ArtifactType::Url && recognize::is_obfuscated(&self.value)
    }

    /// Host of a URL, or the value itself for a domain
    pub fn domain(&self) -> Option<String> {
        match self.artifact_type {
            ArtifactType::Url => recognize::url_host(&self.value),
            ArtifactType::Domain => Some(self.value.to_ascii_lowercase()),
            _ => None,
        }
    }

    /// True when a URL's host looks like a domain name rather than an IP
    pub fn is_domain(&self) -> bool {
        match self.artifact_type {
            ArtifactType::Url => self
                .domain()
                .is_some_and(|host| recognize::looks_like_domain(&host)),
            ArtifactType::Domain => true,
            _ => false,
        }
    }

    /// Parsed address of an IP artifact; `None` when the value is not a valid IP
    pub fn ip_address(&self) -> Option<IpAddr> {
        match self.artifact_type {
            ArtifactType::IpAddress => recognize::parse_ip(&self.value),
            _ => None,
        }
    }

    /// True for valid IP artifacts in a private, loopback or otherwise
    /// non-routable range
    pub fn is_private_ip(&self) -> bool {
        self.ip_address().is_some_and(|ip| recognize::is_private_or_loopback(&ip))
    }

    /// Stable SHA-256 fingerprint of kind and value
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.artifact_type.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(self.value.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance() -> Provenance {
        Provenance::new("test-source", "http://example.mock/list.txt", "context")
    }

    #[test]
    fn test_display_is_value() {
        let artifact = Artifact::new(ArtifactType::Url, "http://example.com/test", provenance());
        assert_eq!(artifact.to_string(), "http://example.com/test");
        assert_eq!(artifact.source_name(), "test-source");
        assert_eq!(artifact.reference_link(), "http://example.mock/list.txt");
    }

    #[test]
    fn test_url_capabilities() {
        let plain = Artifact::new(ArtifactType::Url, "http://example.com/test", provenance());
        assert!(!plain.is_obfuscated());
        assert_eq!(plain.domain().as_deref(), Some("example.com"));
        assert!(plain.is_domain());

        let defanged = Artifact::new(ArtifactType::Url, "hxxp://evil[.]com/payload", provenance());
        assert!(defanged.is_obfuscated());
        assert_eq!(defanged.domain().as_deref(), Some("evil.com"));

        let by_ip = Artifact::new(ArtifactType::Url, "http://8.8.8.8/x", provenance());
        assert!(!by_ip.is_domain());
    }

    #[test]
    fn test_ip_capabilities() {
        let public = Artifact::new(ArtifactType::IpAddress, "123.123.123.123", provenance());
        assert!(public.ip_address().is_some());
        assert!(!public.is_private_ip());

        let private = Artifact::new(ArtifactType::IpAddress, "192.168.1.1", provenance());
        assert!(private.is_private_ip());

        let invalid = Artifact::new(ArtifactType::IpAddress, "999.1.1.1", provenance());
        assert!(invalid.ip_address().is_none());
        assert!(!invalid.is_private_ip());
    }

    #[test]
    fn test_capabilities_do_not_apply_to_other_kinds() {
        let hash = Artifact::new(ArtifactType::Hash, "d41d8cd98f00b204e9800998ecf8427e", provenance());
        assert!(!hash.is_obfuscated());
        assert!(hash.domain().is_none());
        assert!(hash.ip_address().is_none());
    }

    #[test]
    fn test_artifact_type_from_str() {
        assert_eq!("ip_address".parse::<ArtifactType>(), Ok(ArtifactType::IpAddress));
        assert_eq!("YARA-Signature".parse::<ArtifactType>(), Ok(ArtifactType::YaraSignature));
        let err = "email".parse::<ArtifactType>().unwrap_err();
        assert_eq!(err, UnknownArtifactType("email".to_string()));
        assert_eq!(err.to_string(), "unknown artifact type: email");
        for kind in ArtifactType::ALL {
            assert_eq!(kind.as_str().parse::<ArtifactType>(), Ok(kind));
        }
    }

    #[test]
    fn test_fingerprint_depends_on_kind_and_value() {
        let url = Artifact::new(ArtifactType::Url, "example.com", provenance());
        let domain = Artifact::new(ArtifactType::Domain, "example.com", provenance());
        assert_ne!(url.fingerprint(), domain.fingerprint());
        assert_eq!(url.fingerprint().len(), 64);
    }

    #[test]
    fn test_serialized_shape() {
        let artifact = Artifact::new(ArtifactType::IpAddress, "8.8.8.8", provenance());
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["artifact_type"], "ip_address");
        assert_eq!(json["value"], "8.8.8.8");
        assert_eq!(json["source_name"], "test-source");
    }
}
