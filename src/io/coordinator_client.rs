//! HTTP client for the coordinator API
//!
//! One pooled `reqwest::Client` per process. Every call carries a timeout;
//! nothing here retries, callers simply try again on their next tick.

use crate::domain::wire::{
    AckReply, EnrollRequest, HistoryEntry, ModeReply, RenameRequest, ScanReply, ScanRequest,
    SetModeReply, SetModeRequest, UserEntry,
};
use crate::domain::Mode;
use crate::infra::config::Config;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("coordinator unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("coordinator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected reply: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The slice of the API a device depends on
#[async_trait]
pub trait CoordinatorApi: Send + Sync {
    async fn fetch_mode(&self) -> Result<Mode, ClientError>;
    async fn scan(&self, req: &ScanRequest) -> Result<ScanReply, ClientError>;
}

pub struct HttpCoordinatorClient {
    base_url: String,
    client: reqwest::Client,
    mode_timeout: Duration,
}

impl HttpCoordinatorClient {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        mode_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(request_timeout).http1_only().build()?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client, mode_timeout })
    }

    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Self::new(
            config.coordinator_url(),
            Duration::from_millis(config.request_timeout_ms()),
            Duration::from_millis(config.mode_timeout_ms()),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status { status: status.as_u16(), body });
        }
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn enroll(&self, req: &EnrollRequest) -> Result<AckReply, ClientError> {
        let response = self.client.post(self.url("/enroll")).json(req).send().await?;
        Self::decode(response).await
    }

    pub async fn set_mode(&self, mode: &str) -> Result<SetModeReply, ClientError> {
        let req = SetModeRequest { mode: mode.to_string() };
        let response = self.client.post(self.url("/mode")).json(&req).send().await?;
        Self::decode(response).await
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>, ClientError> {
        let response = self.client.get(self.url("/history")).send().await?;
        Self::decode(response).await
    }

    pub async fn users(&self) -> Result<Vec<UserEntry>, ClientError> {
        let response = self.client.get(self.url("/users")).send().await?;
        Self::decode(response).await
    }

    pub async fn rename(&self, req: &RenameRequest) -> Result<AckReply, ClientError> {
        let response = self.client.post(self.url("/rename")).json(req).send().await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl CoordinatorApi for HttpCoordinatorClient {
    async fn fetch_mode(&self) -> Result<Mode, ClientError> {
        let response =
            self.client.get(self.url("/mode")).timeout(self.mode_timeout).send().await?;
        let reply: ModeReply = Self::decode(response).await?;
        Ok(reply.mode)
    }

    /// Error statuses that still carry a scan reply are passed through as replies
    async fn scan(&self, req: &ScanRequest) -> Result<ScanReply, ClientError> {
        let response = self.client.post(self.url("/scan")).json(req).send().await?;
        let status = response.status();
        let body = response.text().await?;
        scan_reply(status.as_u16(), body)
    }
}

fn scan_reply(status: u16, body: String) -> Result<ScanReply, ClientError> {
    if (200..300).contains(&status) {
        return Ok(serde_json::from_str(&body)?);
    }
    serde_json::from_str(&body).map_err(|_| ClientError::Status { status, body })
}
