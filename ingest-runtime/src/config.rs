//! Pipeline configuration
//!
//! A TOML file names the sources to poll and the operators to feed:
//!
//! ```toml
//! [general]
//! interval_secs = 300
//! state_path = "ingest-state.json"
//!
//! [[sources]]
//! name = "myweb"
//! module = "web"
//! url = "http://example.mock/list.txt"
//!
//! [[operators]]
//! name = "out"
//! module = "jsonl"
//! ```

use reqwest::Url;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use ingest_core::ArtifactType;
use ingest_operators::{
    ArtifactFilter, HttpThreatKbApi, JsonLinesOperator, Operator, OperatorError, ThreatKbOperator,
};
use ingest_sources::{FileSource, HttpConfig, SharedTransport, Source, SourceError, WebSource};

use crate::pipeline::Pipeline;
use crate::state::{CheckpointStore, JsonFileStore, MemoryStore, StateError};

pub const TOKEN_ENV: &str = "THREATKB_TOKEN";
pub const SECRET_KEY_ENV: &str = "THREATKB_SECRET_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Operator(#[from] OperatorError),

    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Seconds between polls
    pub interval_secs: u64,
    /// Checkpoint file; in-memory checkpoints when absent
    pub state_path: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            state_path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "module", rename_all = "snake_case")]
pub enum SourceConfig {
    Web {
        name: String,
        url: String,
        #[serde(default = "default_true")]
        include_nonobfuscated: bool,
    },
    File {
        name: String,
        path: PathBuf,
        #[serde(default)]
        include_nonobfuscated: bool,
    },
}

impl SourceConfig {
    pub fn name(&self) -> &str {
        match self {
            SourceConfig::Web { name, .. } | SourceConfig::File { name, .. } => name,
        }
    }

    pub fn build(&self, transport: &SharedTransport) -> Result<Box<dyn Source>, ConfigError> {
        Ok(match self {
            SourceConfig::Web {
                name,
                url,
                include_nonobfuscated,
            } => Box::new(
                WebSource::new(name, url, transport.clone())?
                    .with_include_nonobfuscated(*include_nonobfuscated),
            ),
            SourceConfig::File {
                name,
                path,
                include_nonobfuscated,
            } => Box::new(
                FileSource::new(name, path).with_include_nonobfuscated(*include_nonobfuscated),
            ),
        })
    }
}

/// Restrictions shared by every operator
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterConfig {
    /// Artifact kinds to accept; the operator's defaults when absent
    #[serde(default)]
    pub artifact_types: Option<Vec<String>>,
    /// Source-name patterns; any source when empty
    #[serde(default)]
    pub allowed_sources: Vec<String>,
    /// Value regex, or `is_obfuscated` / `is_domain` / `is_ip`
    #[serde(default)]
    pub filter: Option<String>,
}

impl FilterConfig {
    fn artifact_types(&self) -> Result<Option<Vec<ArtifactType>>, ConfigError> {
        self.artifact_types
            .as_ref()
            .map(|types| {
                types
                    .iter()
                    .map(|t| t.parse().map_err(|e| ConfigError::Invalid(format!("{}", e))))
                    .collect()
            })
            .transpose()
    }

    /// Narrow `base` with the configured restrictions
    pub fn apply(&self, mut base: ArtifactFilter) -> Result<ArtifactFilter, ConfigError> {
        if let Some(types) = self.artifact_types()? {
            base = base.with_types(types);
        }
        if !self.allowed_sources.is_empty() {
            base = base.with_allowed_sources(&self.allowed_sources)?;
        }
        if let Some(filter) = &self.filter {
            base = base.with_condition(filter)?;
        }
        Ok(base)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "module", rename_all = "snake_case")]
pub enum OperatorConfig {
    Threatkb {
        name: String,
        url: String,
        token: Option<String>,
        secret_key: Option<String>,
        state: Option<String>,
        #[serde(flatten)]
        filter: FilterConfig,
    },
    Jsonl {
        name: String,
        /// Output file; stdout when absent
        path: Option<PathBuf>,
        #[serde(flatten)]
        filter: FilterConfig,
    },
}

/// Value from the file, falling back to the environment
fn secret(value: &Option<String>, field: &str, env: &str, operator: &str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.clone()),
        _ => std::env::var(env).map_err(|_| {
            ConfigError::Invalid(format!("operator {} needs {} (or set {})", operator, field, env))
        }),
    }
}

impl OperatorConfig {
    pub fn name(&self) -> &str {
        match self {
            OperatorConfig::Threatkb { name, .. } | OperatorConfig::Jsonl { name, .. } => name,
        }
    }

    fn filter(&self) -> &FilterConfig {
        match self {
            OperatorConfig::Threatkb { filter, .. } | OperatorConfig::Jsonl { filter, .. } => filter,
        }
    }

    pub async fn build(&self) -> Result<Box<dyn Operator>, ConfigError> {
        Ok(match self {
            OperatorConfig::Threatkb {
                name,
                url,
                token,
                secret_key,
                state,
                filter,
            } => {
                let token = secret(token, "token", TOKEN_ENV, name)?;
                let secret_key = secret(secret_key, "secret_key", SECRET_KEY_ENV, name)?;
                let api = Arc::new(HttpThreatKbApi::new(url, &token, &secret_key)?);

                let mut operator = ThreatKbOperator::new(name, api);
                if let Some(state) = state {
                    operator = operator.with_state(state);
                }
                let narrowed = filter.apply(operator.filter().clone())?;
                Box::new(operator.with_filter(narrowed))
            }
            OperatorConfig::Jsonl { name, path, filter } => {
                let operator = match path {
                    Some(path) => JsonLinesOperator::append_to(name, path).await?,
                    None => JsonLinesOperator::stdout(name),
                };
                let narrowed = filter.apply(ArtifactFilter::new())?;
                Box::new(operator.with_filter(narrowed))
            }
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub http: HttpConfig,
    pub sources: Vec<SourceConfig>,
    pub operators: Vec<OperatorConfig>,
}

impl Config {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check names, URLs and filter patterns without touching the network
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.interval_secs == 0 {
            return Err(ConfigError::Invalid("interval_secs must be positive".into()));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            let name = source.name();
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("source with empty name".into()));
            }
            if !seen.insert(name) {
                return Err(ConfigError::Invalid(format!("duplicate source name {}", name)));
            }
            if let SourceConfig::Web { url, .. } = source {
                parse_url(url)?;
            }
        }

        let mut seen = HashSet::new();
        for operator in &self.operators {
            let name = operator.name();
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("operator with empty name".into()));
            }
            if !seen.insert(name) {
                return Err(ConfigError::Invalid(format!("duplicate operator name {}", name)));
            }
            if let OperatorConfig::Threatkb { url, .. } = operator {
                parse_url(url)?;
            }
            operator.filter().apply(ArtifactFilter::new())?;
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.general.interval_secs)
    }

    pub fn build_sources(&self, transport: &SharedTransport) -> Result<Vec<Box<dyn Source>>, ConfigError> {
        self.sources.iter().map(|s| s.build(transport)).collect()
    }

    pub async fn build_operators(&self) -> Result<Vec<Box<dyn Operator>>, ConfigError> {
        let mut operators = Vec::with_capacity(self.operators.len());
        for operator in &self.operators {
            operators.push(operator.build().await?);
        }
        Ok(operators)
    }

    pub fn open_store(&self) -> Result<Box<dyn CheckpointStore>, ConfigError> {
        Ok(match &self.general.state_path {
            Some(path) => {
                info!("Checkpoints persisted to {}", path.display());
                Box::new(JsonFileStore::open(path)?)
            }
            None => Box::new(MemoryStore::new()),
        })
    }

    /// Assemble a ready-to-run pipeline
    pub async fn build_pipeline(&self, transport: &SharedTransport) -> Result<Pipeline, ConfigError> {
        let mut pipeline = Pipeline::new(self.open_store()?).with_interval(self.interval());
        for source in self.build_sources(transport)? {
            pipeline.add_source(source);
        }
        for operator in self.build_operators().await? {
            pipeline.add_operator(operator);
        }
        Ok(pipeline)
    }
}

fn parse_url(url: &str) -> Result<(), ConfigError> {
    Url::parse(url)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid(format!("invalid URL {}: {}", url, e)))
}
