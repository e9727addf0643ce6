//! Minimal typed access to the pod API: read a pod, patch its status subresource.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::error::{ApiError, ConfigError};

pub const STRATEGIC_MERGE_PATCH_CONTENT_TYPE: &str = "application/strategic-merge-patch+json";

#[async_trait]
pub trait PodClient: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Value, ApiError>;

    async fn patch_pod_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct KubeClientConfig {
    /// Overrides in-cluster discovery when set.
    pub api_url: Option<String>,
    pub token_path: String,
    pub ca_path: String,
    pub request_timeout: Duration,
}

/// Pod client talking to the apiserver over HTTPS with a bearer token.
#[derive(Clone)]
pub struct KubeClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl KubeClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        ca_pem: Option<&[u8]>,
        request_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder().timeout(request_timeout);
        if let Some(pem) = ca_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| ConfigError::Client(format!("invalid CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build a client from the service-account mount, or from `api_url` if set.
    pub fn in_cluster(config: &KubeClientConfig) -> Result<Self, ConfigError> {
        let base_url = match &config.api_url {
            Some(url) => url.clone(),
            None => in_cluster_url()?,
        };

        // Missing files are fine when pointing at a local or proxied apiserver
        let token = std::fs::read_to_string(&config.token_path)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let ca_pem = std::fs::read(&config.ca_path).ok();

        if token.is_none() && config.api_url.is_none() {
            return Err(ConfigError::Client(format!(
                "no service account token at {}",
                config.token_path
            )));
        }

        Self::new(&base_url, token, ca_pem.as_deref(), config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn pod_url(&self, namespace: &str, name: &str) -> String {
        format!(
            "{}/api/v1/namespaces/{namespace}/pods/{name}",
            self.base_url
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }
}

fn in_cluster_url() -> Result<String, ConfigError> {
    let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
        ConfigError::Client("KUBERNETES_SERVICE_HOST is not set and no API URL given".to_string())
    })?;
    let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
    if host.contains(':') {
        Ok(format!("https://[{host}]:{port}"))
    } else {
        Ok(format!("https://{host}:{port}"))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl PodClient for KubeClient {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Value, ApiError> {
        let request = self.authorize(self.http.get(self.pod_url(namespace, name)));
        let response = check_status(request.send().await?).await?;
        Ok(response.json::<Value>().await?)
    }

    async fn patch_pod_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), ApiError> {
        let url = format!("{}/status", self.pod_url(namespace, name));
        let request = self
            .authorize(self.http.patch(url))
            .header(CONTENT_TYPE, STRATEGIC_MERGE_PATCH_CONTENT_TYPE)
            .body(serde_json::to_vec(patch)?);
        check_status(request.send().await?).await?;
        Ok(())
    }
}
