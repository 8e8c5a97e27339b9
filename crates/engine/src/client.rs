//! HTTP client for the automation service's public REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::assembler::InstanceDocument;
use crate::ports::{AutomationService, CreatedCredential, CreatedWorkflow, CredentialCreate, UpstreamError};

const API_KEY_HEADER: &str = "X-N8N-API-KEY";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_LIMIT: usize = 300;

/// Where the automation service lives and how to authenticate.
#[derive(Clone)]
pub struct ServiceConfig {
    /// Base URL without the `/api/v1` suffix.
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`AutomationService`] over HTTP.
pub struct HttpAutomationService {
    http: Client,
    config: ServiceConfig,
}

impl HttpAutomationService {
    pub fn new(config: ServiceConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UpstreamError::new(None, format!("failed to create HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/api/v1{}", self.config.base_url, path);
        self.http
            .request(method, url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .header("Accept", "application/json")
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response, UpstreamError> {
        let response = builder
            .send()
            .await
            .map_err(|e| UpstreamError::new(e.status().map(|s| s.as_u16()), format!("{what}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::new(
                Some(status.as_u16()),
                body.chars().take(ERROR_BODY_LIMIT).collect::<String>(),
            ));
        }
        Ok(response)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, UpstreamError> {
        let response = self.send(self.request(Method::POST, path).json(body), path).await?;
        response
            .json()
            .await
            .map_err(|e| UpstreamError::new(None, format!("unreadable response from {path}: {e}")))
    }
}

#[async_trait]
impl AutomationService for HttpAutomationService {
    async fn create_credential(&self, request: &CredentialCreate) -> Result<CreatedCredential, UpstreamError> {
        debug!("creating {} credential '{}'", request.kind, request.name);
        self.post("/credentials", request).await
    }

    async fn delete_credential(&self, credential_id: &str) -> Result<(), UpstreamError> {
        let path = format!("/credentials/{credential_id}");
        self.send(self.request(Method::DELETE, &path), &path).await?;
        Ok(())
    }

    async fn create_workflow(&self, document: &InstanceDocument) -> Result<CreatedWorkflow, UpstreamError> {
        debug!("creating workflow '{}' with {} node(s)", document.name, document.nodes.len());
        self.post("/workflows", document).await
    }
}
