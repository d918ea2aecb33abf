//! ThreatKB operator
//!
//! Creates ThreatKB records from artifacts:
//! - Domain → C2 DNS record (`c2dns`)
//! - IPAddress → C2 IP record (`c2ips`)
//! - YARASignature → signature import (`import`)
//!
//! Other kinds are ignored.

use async_trait::async_trait;
use ingest_core::{Artifact, ArtifactType};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::{ArtifactFilter, Operator, OperatorError};

/// Default state assigned to created records
pub const DEFAULT_STATE: &str = "Imported";

/// The slice of the ThreatKB API the operator needs
#[async_trait]
pub trait ThreatKbApi: Send + Sync {
    async fn create(&self, endpoint: &str, body: Value) -> Result<(), OperatorError>;
}

pub type SharedThreatKbApi = Arc<dyn ThreatKbApi>;

/// ThreatKB REST client authenticating with token and secret key
pub struct HttpThreatKbApi {
    client: Client,
    base_url: String,
    token: String,
    secret_key: String,
}

impl HttpThreatKbApi {
    pub fn new(base_url: &str, token: &str, secret_key: &str) -> Result<Self, OperatorError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/ThreatKB/{}", self.base_url, endpoint)
    }
}

#[async_trait]
impl ThreatKbApi for HttpThreatKbApi {
    async fn create(&self, endpoint: &str, body: Value) -> Result<(), OperatorError> {
        let response = self
            .client
            .post(self.endpoint_url(endpoint))
            .query(&[("token", &self.token), ("secret_key", &self.secret_key)])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OperatorError::Api(format!(
                "{} returned {}: {}",
                endpoint, status, text
            )));
        }

        Ok(())
    }
}

/// Operator creating ThreatKB records
pub struct ThreatKbOperator {
    name: String,
    api: SharedThreatKbApi,
    state: String,
    filter: ArtifactFilter,
}

impl ThreatKbOperator {
    pub fn new(name: &str, api: SharedThreatKbApi) -> Self {
        Self {
            name: name.to_string(),
            api,
            state: DEFAULT_STATE.to_string(),
            filter: ArtifactFilter::new().with_types([
                ArtifactType::Domain,
                ArtifactType::IpAddress,
                ArtifactType::YaraSignature,
            ]),
        }
    }

    pub fn with_state(mut self, state: &str) -> Self {
        self.state = state.to_string();
        self
    }

    pub fn with_filter(mut self, filter: ArtifactFilter) -> Self {
        self.filter = filter;
        self
    }

    fn domain_record(&self, artifact: &Artifact) -> Value {
        json!({
            "domain_name": artifact.value(),
            "match_type": "exact",
            "expiration_type": "no-expiration",
            "state": self.state,
            "description": artifact.reference_text(),
            "references": artifact.reference_link(),
            "tags": [artifact.source_name()],
        })
    }

    fn ip_record(&self, artifact: &Artifact) -> Value {
        json!({
            "ip": artifact.value(),
            "expiration_type": "no-expiration",
            "state": self.state,
            "description": artifact.reference_text(),
            "references": artifact.reference_link(),
            "tags": [artifact.source_name()],
        })
    }

    fn import_record(&self, artifact: &Artifact) -> Value {
        json!({
            "import_text": artifact.value(),
            "autocommit": 1,
            "shared_state": self.state,
            "shared_reference": artifact.reference_link(),
        })
    }
}

#[async_trait]
impl Operator for ThreatKbOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "threatkb"
    }

    fn filter(&self) -> &ArtifactFilter {
        &self.filter
    }

    async fn handle_artifact(&self, artifact: &Artifact) -> Result<(), OperatorError> {
        let (endpoint, body) = match artifact.artifact_type() {
            ArtifactType::Domain => ("c2dns", self.domain_record(artifact)),
            ArtifactType::IpAddress => ("c2ips", self.ip_record(artifact)),
            ArtifactType::YaraSignature => ("import", self.import_record(artifact)),
            other => {
                debug!("ThreatKB {} has no action for {} artifacts", self.name, other);
                return Ok(());
            }
        };

        self.api.create(endpoint, body).await?;
        info!("ThreatKB {}: created {} record for {}", self.name, endpoint, artifact.value());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_core::Provenance;
    use std::sync::Mutex;

    /// Records every create call; fails on values listed in `fail_on`
    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<(String, Value)>>,
        fail_on: Vec<String>,
    }

    impl RecordingApi {
        fn endpoints(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(e, _)| e.clone()).collect()
        }
    }

    #[async_trait]
    impl ThreatKbApi for RecordingApi {
        async fn create(&self, endpoint: &str, body: Value) -> Result<(), OperatorError> {
            let serialized = body.to_string();
            if self.fail_on.iter().any(|v| serialized.contains(v.as_str())) {
                return Err(OperatorError::Api("boom".to_string()));
            }
            self.calls.lock().unwrap().push((endpoint.to_string(), body));
            Ok(())
        }
    }

    fn artifact(kind: ArtifactType, value: &str) -> Artifact {
        Artifact::new(kind, value, Provenance::new("", "", ""))
    }

    fn operator() -> (ThreatKbOperator, Arc<RecordingApi>) {
        let api = Arc::new(RecordingApi::default());
        (ThreatKbOperator::new("kb", api.clone()), api)
    }

    #[tokio::test]
    async fn test_handle_domain_creates_domain() {
        let (kb, api) = operator();
        kb.handle_artifact(&artifact(ArtifactType::Domain, "test.com")).await.unwrap();
        assert_eq!(api.endpoints(), vec!["c2dns"]);
        let calls = api.calls.lock().unwrap();
        assert_eq!(calls[0].1["domain_name"], "test.com");
        assert_eq!(calls[0].1["state"], DEFAULT_STATE);
    }

    #[tokio::test]
    async fn test_handle_ipaddress_creates_ipaddress() {
        let (kb, api) = operator();
        kb.handle_artifact(&artifact(ArtifactType::IpAddress, "123.123.123.123")).await.unwrap();
        assert_eq!(api.endpoints(), vec!["c2ips"]);
    }

    #[tokio::test]
    async fn test_handle_yarasignature_creates_yarasignature() {
        let (kb, api) = operator();
        kb.handle_artifact(&artifact(ArtifactType::YaraSignature, "test")).await.unwrap();
        assert_eq!(api.endpoints(), vec!["import"]);
    }

    #[tokio::test]
    async fn test_unhandled_kinds_are_noops() {
        let (kb, api) = operator();
        for kind in [ArtifactType::Url, ArtifactType::Hash, ArtifactType::Task] {
            assert!(kb.handle_artifact(&artifact(kind, "x")).await.is_ok());
        }
        assert!(api.endpoints().is_empty());
    }

    #[tokio::test]
    async fn test_process_filters_and_isolates_failures() {
        let api = Arc::new(RecordingApi {
            fail_on: vec!["bad.com".to_string()],
            ..Default::default()
        });
        let kb = ThreatKbOperator::new("kb", api.clone()).with_state("Draft");

        let batch = vec![
            artifact(ArtifactType::Url, "http://bad.com/"),
            artifact(ArtifactType::Domain, "bad.com"),
            artifact(ArtifactType::Domain, "good.com"),
            artifact(ArtifactType::IpAddress, "45.33.32.156"),
            artifact(ArtifactType::Task, "Manual Task: x"),
        ];

        let stats = kb.process(&batch).await;
        assert_eq!(stats.handled, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.filtered, 2);
        assert_eq!(api.endpoints(), vec!["c2dns", "c2ips"]);
        assert_eq!(api.calls.lock().unwrap()[0].1["state"], "Draft");
    }

    #[test]
    fn test_endpoint_url() {
        let api = HttpThreatKbApi::new("https://kb.example/", "t", "s").unwrap();
        assert_eq!(api.endpoint_url("c2dns"), "https://kb.example/ThreatKB/c2dns");
    }
}
