//! Artifact filtering
//!
//! Operators only see artifacts that pass their filter:
//! - artifact kinds the operator is interested in
//! - source names matching one of the allowed patterns
//! - a value condition, either a regex or one of the URL predicates
//!   `is_obfuscated` / `is_domain` / `is_ip`

use ingest_core::{Artifact, ArtifactType};
use regex::Regex;
use std::collections::HashSet;

use crate::OperatorError;

#[derive(Debug, Clone)]
enum ValueCondition {
    Pattern(Regex),
    IsObfuscated,
    IsDomain,
    IsIp,
}

impl ValueCondition {
    fn parse(filter: &str) -> Result<Self, OperatorError> {
        Ok(match filter {
            "is_obfuscated" => ValueCondition::IsObfuscated,
            "is_domain" => ValueCondition::IsDomain,
            "is_ip" => ValueCondition::IsIp,
            pattern => ValueCondition::Pattern(Regex::new(pattern)?),
        })
    }

    fn matches(&self, artifact: &Artifact) -> bool {
        match self {
            ValueCondition::Pattern(re) => re.is_match(artifact.value()),
            ValueCondition::IsObfuscated => artifact.is_obfuscated(),
            ValueCondition::IsDomain => artifact.is_domain(),
            ValueCondition::IsIp => match artifact.artifact_type() {
                ArtifactType::IpAddress => artifact.ip_address().is_some(),
                ArtifactType::Url => artifact
                    .domain()
                    .is_some_and(|host| ingest_core::recognize::parse_ip(&host).is_some()),
                _ => false,
            },
        }
    }
}

/// Accept-everything by default; each restriction narrows it
#[derive(Debug, Clone, Default)]
pub struct ArtifactFilter {
    artifact_types: Option<HashSet<ArtifactType>>,
    allowed_sources: Vec<Regex>,
    condition: Option<ValueCondition>,
}

impl ArtifactFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept these kinds
    pub fn with_types(mut self, types: impl IntoIterator<Item = ArtifactType>) -> Self {
        self.artifact_types = Some(types.into_iter().collect());
        self
    }

    /// Only accept artifacts whose source name matches one of `patterns`
    pub fn with_allowed_sources<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self, OperatorError> {
        self.allowed_sources = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    /// Only accept artifacts whose value satisfies `filter`
    pub fn with_condition(mut self, filter: &str) -> Result<Self, OperatorError> {
        self.condition = Some(ValueCondition::parse(filter)?);
        Ok(self)
    }

    pub fn accepts(&self, artifact: &Artifact) -> bool {
        if let Some(types) = &self.artifact_types {
            if !types.contains(&artifact.artifact_type()) {
                return false;
            }
        }

        if !self.allowed_sources.is_empty()
            && !self
                .allowed_sources
                .iter()
                .any(|re| re.is_match(artifact.source_name()))
        {
            return false;
        }

        self.condition
            .as_ref()
            .map_or(true, |condition| condition.matches(artifact))
    }
}
