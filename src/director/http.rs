//! HTTP client for the flow director service.

use super::{DirectorError, FlowDirector};
use crate::config::Topology;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
struct RegistrationBody<'a> {
    address: &'a str,
}

/// Talks to the director at `POST /controlpeers` and `GET /flows`
#[derive(Debug)]
pub struct HttpFlowDirector {
    base_url: String,
    client: reqwest::Client,
    retry_delay: Duration,
    closed: AtomicBool,
}

impl HttpFlowDirector {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        retry_delay: Duration,
    ) -> Result<Self, DirectorError> {
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|_| DirectorError::InvalidUrl(base_url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DirectorError::InvalidUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DirectorError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retry_delay,
            closed: AtomicBool::new(false),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// One registration attempt. `Ok(None)` means retry.
    async fn try_register(&self, address: &str) -> Result<Option<()>, DirectorError> {
        let response = self
            .client
            .post(self.endpoint("controlpeers"))
            .json(&RegistrationBody { address })
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Director unreachable: {}", e);
                return Ok(None);
            }
        };

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(Some(())),
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                Err(DirectorError::Registration(body))
            }
            StatusCode::CONFLICT => Err(DirectorError::AddressConflict(address.to_string())),
            status => {
                tracing::warn!("Director answered registration with {}", status);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl FlowDirector for HttpFlowDirector {
    async fn register(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DirectorError> {
        let mut attempt = 0u32;
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(DirectorError::Closed);
            }
            attempt += 1;

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(DirectorError::Cancelled),
                outcome = self.try_register(address) => outcome?,
            };
            if outcome.is_some() {
                tracing::info!(
                    "Registered control peer {} with director {}",
                    address,
                    self.base_url
                );
                return Ok(());
            }

            tracing::debug!(
                "Registration attempt {} failed, retrying in {:?}",
                attempt,
                self.retry_delay
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(DirectorError::Cancelled),
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        }
    }

    async fn get_flow_config(&self) -> Topology {
        if self.closed.load(Ordering::SeqCst) {
            return Topology::default();
        }

        let response = match self.client.get(self.endpoint("flows")).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Failed to fetch flows from director: {}", e);
                return Topology::default();
            }
        };

        if response.status() != StatusCode::OK {
            tracing::error!("Director answered GET /flows with {}", response.status());
            return Topology::default();
        }

        match response.json::<Topology>().await {
            Ok(topology) => topology,
            Err(e) => {
                tracing::error!("Director sent an unreadable topology: {}", e);
                Topology::default()
            }
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Closed director client for {}", self.base_url);
        }
    }
}
