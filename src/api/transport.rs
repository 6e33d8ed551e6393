//! Network collaborator: issues backend requests.
//!
//! Requests are spawned as soon as they are issued, so a request is already
//! in flight by the time anyone decides whether its result is needed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::BackendConfig;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned status {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Request task aborted: {0}")]
    Aborted(String),
}

/// HTTP method of a backend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
}

/// A backend request: query params for GET, JSON body for POST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub path: String,
    pub method: Method,
    pub payload: Value,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>, params: Value) -> Self {
        Self {
            path: path.into(),
            method: Method::Get,
            payload: params,
        }
    }

    pub fn post(path: impl Into<String>, data: Value) -> Self {
        Self {
            path: path.into(),
            method: Method::Post,
            payload: data,
        }
    }
}

/// Response envelope every backend endpoint answers with: `{ "data": { "result": T } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub data: EnvelopeData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeData {
    #[serde(default)]
    pub result: Value,
}

impl Envelope {
    pub fn new(result: Value) -> Self {
        Self {
            data: EnvelopeData { result },
        }
    }

    /// The payload carried by the envelope.
    pub fn into_result(self) -> Value {
        self.data.result
    }
}

/// Something that can carry an [`ApiRequest`] to the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Envelope, NetworkError>;
}

/// A request that has been issued but not yet awaited.
///
/// Dropping it detaches the request: it still runs to completion, its result
/// is discarded.
pub struct PendingRequest {
    handle: JoinHandle<Result<Envelope, NetworkError>>,
}

impl PendingRequest {
    /// Wait for the response.
    pub async fn wait(self) -> Result<Envelope, NetworkError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(NetworkError::Aborted(e.to_string())),
        }
    }
}

/// Start a request on the runtime and hand back its pending result.
pub fn issue(transport: &Arc<dyn Transport>, request: ApiRequest) -> PendingRequest {
    let transport = Arc::clone(transport);
    debug!(path = %request.path, method = ?request.method, "Issuing request");
    let handle = tokio::spawn(async move { transport.send(request).await });
    PendingRequest { handle }
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &BackendConfig) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Envelope, NetworkError> {
        let url = self.url(&request.path);
        let builder = match request.method {
            Method::Get => match &request.payload {
                Value::Object(params) if !params.is_empty() => self.client.get(&url).query(params),
                _ => self.client.get(&url),
            },
            Method::Post => self.client.post(&url).json(&request.payload),
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        let envelope = serde_json::from_value(body)
            .map_err(|e| NetworkError::Malformed(e.to_string()))?;

        debug!(url = %url, status = status.as_u16(), "Response received");
        Ok(envelope)
    }
}
