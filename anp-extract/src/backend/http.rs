//! Client HTTP du backend d'analyse

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    AnalyticsBackend, ClassSum, FeatureRequest, GroupedSumRequest, RawReply, ReduceRequest,
    SampleRequest,
};
use crate::error::BackendError;

/// Configuration du client
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".into(),
            token: None,
            timeout: Duration::from_secs(120),
        }
    }
}

impl BackendConfig {
    /// Charge la configuration depuis les variables d'environnement
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("ANALYTICS_URL").unwrap_or(defaults.url),
            token: std::env::var("ANALYTICS_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout: std::env::var("ANALYTICS_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

#[derive(Deserialize)]
struct ReduceReply {
    #[serde(default)]
    values: Map<String, Value>,
}

#[derive(Deserialize)]
struct SampleReply {
    values: Vec<Value>,
}

#[derive(Deserialize)]
struct FeaturesReply {
    #[serde(default)]
    features: Vec<FeatureReply>,
}

#[derive(Deserialize)]
struct FeatureReply {
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Deserialize)]
struct GroupsReply {
    #[serde(default)]
    groups: Vec<ClassSum>,
}

#[derive(Deserialize)]
struct ErrorReply {
    error: String,
}

/// Backend joint en JSON sur HTTP, authentifié par jeton
pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, BackendError> {
        let url = format!("{}{}", self.config.url.trim_end_matches('/'), path);
        debug!(url = %url, "Backend request");

        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status, &text));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    fn map_transport(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.config.timeout)
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

/// Classe une réponse non-2xx; le message du serveur est conservé
fn map_status(status: StatusCode, body: &str) -> BackendError {
    let message = serde_json::from_str::<ErrorReply>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.trim().to_string());

    if status == StatusCode::BAD_REQUEST && message.to_lowercase().contains("geometry") {
        return BackendError::InvalidGeometry(message);
    }

    BackendError::Status {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl AnalyticsBackend for HttpBackend {
    async fn reduce_region(&self, request: &ReduceRequest) -> Result<RawReply, BackendError> {
        let reply: ReduceReply = self.post("/reduce", request).await?;
        Ok(reply.values)
    }

    async fn sample_points(&self, request: &SampleRequest) -> Result<Vec<Value>, BackendError> {
        let reply: SampleReply = self.post("/sample", request).await?;
        if reply.values.len() != request.points.len() {
            return Err(BackendError::Decode(format!(
                "expected {} sampled values, got {}",
                request.points.len(),
                reply.values.len()
            )));
        }
        Ok(reply.values)
    }

    async fn intersecting_features(
        &self,
        request: &FeatureRequest,
    ) -> Result<Vec<Map<String, Value>>, BackendError> {
        let reply: FeaturesReply = self.post("/features", request).await?;
        Ok(reply.features.into_iter().map(|f| f.properties).collect())
    }

    async fn grouped_sum(&self, request: &GroupedSumRequest) -> Result<Vec<ClassSum>, BackendError> {
        let reply: GroupsReply = self.post("/grouped-sum", request).await?;
        Ok(reply.groups)
    }
}
