//! Launcher client metadata from the realm's web API.
//!
//! Unlike the status monitor this path has no fallback: every failure goes
//! back to the caller.

use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum ClientInfoError {
    #[error("client info request returned HTTP {0}")]
    Status(u16),

    #[error("client info request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

pub struct ClientInfoClient {
    http: reqwest::Client,
    base_url: String,
}

impl ClientInfoClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientInfoError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// `{base_url}/client/info`
    pub fn endpoint(&self) -> String {
        format!("{}/client/info", self.base_url.trim_end_matches('/'))
    }

    /// Fetch the client info document. Anything but 200 is an error.
    pub async fn fetch(&self) -> Result<Value, ClientInfoError> {
        let url = self.endpoint();
        self.fetch_from(&url)
            .await
            .inspect(|_| debug!(%url, "client info fetched"))
            .inspect_err(|e| error!(%url, error = %e, "error getting client info"))
    }

    async fn fetch_from(&self, url: &str) -> Result<Value, ClientInfoError> {
        let response = self.http.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(ClientInfoError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }
}
