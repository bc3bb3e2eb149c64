//! reqwest-backed portal client

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::models::{JobStartResponse, JobStatusResponse, Query, TileDetailResponse};
use super::{PortalApi, PortalError, Result};
use crate::config::{FetchConfig, PortalConfig};

/// HTTP client configuration for one portal and product
#[derive(Debug, Clone)]
pub struct HttpPortalConfig {
    pub base_url: String,
    pub detail_path: String,
    pub job_path: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
    pub verify_tls: bool,
}

impl Default for HttpPortalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://geodaten.schleswig-holstein.de/gaialight-sh/_apps/dladownload/"
                .to_string(),
            detail_path: "_ajax/details.php".to_string(),
            job_path: "multi.php".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            download_timeout: Duration::from_secs(300),
            verify_tls: true,
        }
    }
}

impl HttpPortalConfig {
    /// Client settings for one product run; `verify_tls` is already resolved per product
    pub fn from_settings(portal: &PortalConfig, fetch: &FetchConfig, verify_tls: bool) -> Self {
        Self {
            base_url: portal.base_url.clone(),
            detail_path: portal.detail_path.clone(),
            job_path: portal.job_path.clone(),
            connect_timeout: portal.connect_timeout(),
            request_timeout: portal.request_timeout(),
            download_timeout: Duration::from_secs(fetch.request_timeout_secs),
            verify_tls,
        }
    }
}

/// Portal client over HTTP(S)
pub struct HttpPortal {
    client: Client,
    base: Url,
    detail_url: Url,
    job_url: Url,
    download_timeout: Duration,
}

impl HttpPortal {
    pub fn new(config: HttpPortalConfig) -> Result<Self> {
        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        let base = Url::parse(&base_url)
            .map_err(|e| PortalError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        let detail_url = base
            .join(&config.detail_path)
            .map_err(|e| PortalError::InvalidUrl(format!("{}: {}", config.detail_path, e)))?;
        let job_url = base
            .join(&config.job_path)
            .map_err(|e| PortalError::InvalidUrl(format!("{}: {}", config.job_path, e)))?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| PortalError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base,
            detail_url,
            job_url,
            download_timeout: config.download_timeout,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        query: &[(&'static str, String)],
        user_agent: &str,
    ) -> Result<T> {
        debug!(url = %url, ?query, "Portal request");

        let response = self
            .client
            .get(url.clone())
            .query(query)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, user_agent)
            .send()
            .await
            .map_err(map_request_error)?;

        let body = read_body(response).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(PortalError::EmptyBody);
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

/// Cache-busting parameter appended to job-start and job-status requests
fn timestamp_param() -> (&'static str, String) {
    ("_", chrono::Utc::now().timestamp().to_string())
}

fn map_request_error(e: reqwest::Error) -> PortalError {
    if e.is_timeout() {
        PortalError::Timeout
    } else {
        PortalError::Transport(e.to_string())
    }
}

async fn read_body(response: Response) -> Result<Bytes> {
    let status = response.status();
    if !status.is_success() {
        return Err(PortalError::Status {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        });
    }

    response.bytes().await.map_err(map_request_error)
}

#[async_trait]
impl PortalApi for HttpPortal {
    async fn tile_detail(&self, query: &Query, user_agent: &str) -> Result<TileDetailResponse> {
        self.get_json(&self.detail_url, query, user_agent).await
    }

    async fn start_job(&self, query: &Query, user_agent: &str) -> Result<JobStartResponse> {
        let mut query = query.clone();
        query.push(timestamp_param());
        self.get_json(&self.job_url, &query, user_agent).await
    }

    async fn job_status(&self, job_id: &str, user_agent: &str) -> Result<JobStatusResponse> {
        let query = vec![
            ("action", "status".to_string()),
            ("job", job_id.to_string()),
            timestamp_param(),
        ];
        self.get_json(&self.job_url, &query, user_agent).await
    }

    async fn download(&self, url: &str) -> Result<Bytes> {
        // Relative download links resolve against the portal base
        let url = self
            .base
            .join(url)
            .map_err(|e| PortalError::InvalidUrl(format!("{}: {}", url, e)))?;

        debug!(url = %url, "Downloading archive");

        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(map_request_error)?;

        let bytes = read_body(response).await?;
        debug!(size = bytes.len(), "Archive downloaded");
        Ok(bytes)
    }
}
