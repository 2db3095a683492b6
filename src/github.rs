use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::error::UploadError;
use crate::imaging::EncodedImage;

pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("lumina-interior/", env!("CARGO_PKG_VERSION"));

/// `owner/name` repository identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RepoIdentifier(String);

impl RepoIdentifier {
    pub fn parse(raw: &str) -> Result<Self, UploadError> {
        let raw = raw.trim();
        match raw.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => Ok(Self(raw.to_string())),
            _ => Err(UploadError::InvalidRepository(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for RepoIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Session-scoped upload credentials. Never serialized; the token is redacted
/// from `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct RepoCredentials {
    pub token: String,
    pub repository: RepoIdentifier,
}

impl fmt::Debug for RepoCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoCredentials").field("token", &"***").field("repository", &self.repository).finish()
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub credentials: RepoCredentials,
    pub path: String,
    pub message: String,
    pub image: EncodedImage,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadReceipt {
    pub repository: RepoIdentifier,
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

#[async_trait]
pub trait RepositoryUploader: Send + Sync {
    async fn put_file(&self, request: &UploadRequest) -> Result<UploadReceipt, UploadError>;
}

pub struct GitHubClient {
    client: Client,
    base_url: String,
}

impl GitHubClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    fn contents_url(&self, repository: &RepoIdentifier, path: &str) -> String {
        format!("{}/repos/{}/contents/{}", self.base_url, repository, path.trim_start_matches('/'))
    }
}

#[derive(Debug, Deserialize, Default)]
struct ProviderError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PutResponse {
    #[serde(default)]
    content: Option<PutContent>,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    #[serde(default)]
    html_url: Option<String>,
}

#[async_trait]
impl RepositoryUploader for GitHubClient {
    async fn put_file(&self, request: &UploadRequest) -> Result<UploadReceipt, UploadError> {
        let url = self.contents_url(&request.credentials.repository, &request.path);
        info!("🐙 Uploading {} ({} bytes) to {}", request.path, request.image.len(), request.credentials.repository);

        // The contents API wants bare base64, no data: prefix.
        let body = json!({
            "message": request.message,
            "content": request.image.to_base64(),
        });

        let response = self.client
            .put(&url)
            .bearer_auth(&request.credentials.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(&body)
            .send()
            .await
            .map_err(|e| UploadError::Http(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| UploadError::Http(e.to_string()))?;
        if !status.is_success() {
            let message = serde_json::from_str::<ProviderError>(&text)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| "Failed to upload to GitHub".to_string());
            error!("❌ GitHub rejected upload ({}): {}", status, message);
            return Err(UploadError::Rejected { status: status.as_u16(), message });
        }

        let html_url = serde_json::from_str::<PutResponse>(&text).ok().and_then(|r| r.content).and_then(|c| c.html_url);
        info!("✅ Uploaded {} to {}", request.path, request.credentials.repository);
        Ok(UploadReceipt {
            repository: request.credentials.repository.clone(),
            path: request.path.clone(),
            message: request.message.clone(),
            html_url,
        })
    }
}
