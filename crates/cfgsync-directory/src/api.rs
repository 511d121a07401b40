//! Live directory backed by the control plane's REST API.
//!
//! Every lookup is a synchronous round trip. Tenants are custom resources
//! served under `/apis/{group}/{version}`; secrets are core resources under
//! `/api/v1` with base64-encoded `data` values.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use cfgsync_core::{DirectoryError, ObjectMeta, ResourceDirectory, SecretRecord, TenantRecord, Tier};

/// Longest response body excerpt kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Configuration for [`ApiDirectory`].
#[derive(Debug, Clone)]
pub struct ApiDirectoryConfig {
    /// Control plane base URL, e.g. `https://kubernetes.default.svc`.
    pub base_url: String,
    /// Static bearer token. Takes precedence over `token_file`.
    pub token: Option<String>,
    /// File holding a bearer token; re-read on every call so rotated
    /// tokens are picked up.
    pub token_file: Option<PathBuf>,
    /// Extra PEM CA bundle to trust.
    pub ca_file: Option<PathBuf>,
    /// API group of the tenant resource.
    pub tenant_group: String,
    /// API version of the tenant resource.
    pub tenant_version: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for ApiDirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://kubernetes.default.svc".to_string(),
            token: None,
            token_file: None,
            ca_file: None,
            tenant_group: "minio.min.io".to_string(),
            tenant_version: "v2".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ApiDirectoryConfig {
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Wire shape of a secret.
#[derive(Debug, Deserialize)]
struct SecretWire {
    metadata: ObjectMeta,
    #[serde(default)]
    data: BTreeMap<String, String>,
    #[serde(default, rename = "stringData")]
    string_data: BTreeMap<String, String>,
}

impl SecretWire {
    fn into_record(self, namespace: &str) -> Result<SecretRecord, DirectoryError> {
        let mut record = SecretRecord::new(namespace, self.metadata.name);
        for (key, encoded) in self.data {
            let decoded = STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                DirectoryError::decode(format!("secret key {key:?} is not valid base64: {e}"))
            })?;
            record.data.insert(key, decoded);
        }
        for (key, value) in self.string_data {
            record.data.insert(key, value.into_bytes());
        }
        Ok(record)
    }
}

/// Live, authoritative directory.
#[derive(Debug, Clone)]
pub struct ApiDirectory {
    http: reqwest::Client,
    config: ApiDirectoryConfig,
}

impl ApiDirectory {
    /// Builds the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Unavailable` if the CA bundle cannot be read
    /// or the client cannot be constructed.
    pub fn new(mut config: ApiDirectoryConfig) -> Result<Self, DirectoryError> {
        config.base_url = config.base_url.trim_end_matches('/').to_string();

        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);
        if let Some(ca_file) = &config.ca_file {
            let pem = std::fs::read(ca_file).map_err(|e| {
                DirectoryError::unavailable(format!("read CA bundle {}: {e}", ca_file.display()))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| DirectoryError::unavailable(format!("parse CA bundle: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder
            .build()
            .map_err(|e| DirectoryError::unavailable(format!("build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    fn tenant_url(&self, namespace: &str, name: &str) -> String {
        format!(
            "{}/apis/{}/{}/namespaces/{namespace}/tenants/{name}",
            self.config.base_url, self.config.tenant_group, self.config.tenant_version
        )
    }

    fn secret_url(&self, namespace: &str, name: &str) -> String {
        format!(
            "{}/api/v1/namespaces/{namespace}/secrets/{name}",
            self.config.base_url
        )
    }

    async fn bearer_token(&self) -> Result<Option<String>, DirectoryError> {
        if let Some(token) = &self.config.token {
            return Ok(Some(token.clone()));
        }
        let Some(path) = &self.config.token_file else {
            return Ok(None);
        };
        let token = tokio::fs::read_to_string(path).await.map_err(|e| {
            DirectoryError::unavailable(format!("read token file {}: {e}", path.display()))
        })?;
        Ok(Some(token.trim().to_string()))
    }

    /// GETs `url`, mapping 404 to `None`.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, DirectoryError> {
        let mut req = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = self.bearer_token().await? {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                DirectoryError::transport(format!("request to {url} timed out"))
            } else {
                DirectoryError::transport(format!("request to {url} failed: {e}"))
            }
        })?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(url, "resource not found");
            return Ok(None);
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| DirectoryError::transport(format!("read body from {url}: {e}")))?;
        if !status.is_success() {
            let mut excerpt = String::from_utf8_lossy(&body).into_owned();
            if excerpt.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !excerpt.is_char_boundary(cut) {
                    cut -= 1;
                }
                excerpt.truncate(cut);
            }
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body: excerpt,
            });
        }

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| DirectoryError::decode(format!("{url}: {e}")))
    }
}

#[async_trait]
impl ResourceDirectory for ApiDirectory {
    fn tier(&self) -> Tier {
        Tier::Live
    }

    async fn get_tenant(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<TenantRecord>, DirectoryError> {
        let url = self.tenant_url(namespace, name);
        let tenant: Option<TenantRecord> = self.get_json(&url).await?;
        Ok(tenant.map(|mut t| {
            if t.metadata.namespace.is_empty() {
                t.metadata.namespace = namespace.to_string();
            }
            t
        }))
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SecretRecord>, DirectoryError> {
        let url = self.secret_url(namespace, name);
        let wire: Option<SecretWire> = self.get_json(&url).await?;
        wire.map(|w| w.into_record(namespace)).transpose()
    }
}
