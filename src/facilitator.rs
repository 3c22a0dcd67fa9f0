//! HTTP client for the facilitator service.
//!
//! The facilitator is a trusted network peer exposing `/verify`, `/settle`,
//! `/contracts`, `/supported` and `/health`. Both payer (pre-flight verify,
//! proxy contract discovery) and payee (settlement) talk to it through this
//! client. Every call runs under the retry policy and a hard per-request
//! timeout; timeout expiry aborts the in-flight request and surfaces as the
//! distinct, retryable [`X402Error::FacilitatorTimeout`].

use crate::errors::{Result, X402Error};
use crate::network::DEFAULT_FACILITATOR;
use crate::retry::RetryPolicy;
use crate::types::{
    ContractsResponse, FacilitatorRequest, SettlementResult, SupportedResponse, VerifyResponse,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for a facilitator's HTTP API.
#[derive(Debug, Clone)]
pub struct FacilitatorClient {
    base_url: Url,
    http: Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl FacilitatorClient {
    /// Creates a client for the facilitator at `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            http: Client::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        })
    }

    /// Creates a client for the default facilitator.
    pub fn default_facilitator() -> Result<Self> {
        Self::new(DEFAULT_FACILITATOR)
    }

    /// Sets the hard per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy for transient failures.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The facilitator base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `POST /verify`: checks a payment payload without settling it.
    pub async fn verify(&self, request: &FacilitatorRequest) -> Result<VerifyResponse> {
        self.post_json("verify", request).await
    }

    /// `POST /settle`: verifies and settles a payment on-chain.
    ///
    /// A non-2xx response with an `{error}` body becomes
    /// [`X402Error::SettlementFailed`]; transport failures keep their
    /// retryable classification.
    pub async fn settle(&self, request: &FacilitatorRequest) -> Result<SettlementResult> {
        let url = self.join("settle")?;
        self.retry
            .execute_default(|| {
                let url = url.clone();
                async move {
                    let response = self
                        .send(self.http.post(url).json(request), "settle")
                        .await?;

                    if response.status().is_success() {
                        return Ok(response.json::<SettlementResult>().await?);
                    }

                    // Surface 5xx as retryable transport errors, everything
                    // else as a settlement rejection. error_for_status_ref
                    // always errors here, so the `?` exits the branch.
                    if response.status().is_server_error() {
                        response.error_for_status_ref()?;
                    }

                    let body: serde_json::Value =
                        response.json().await.unwrap_or_default();
                    let reason = body
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("facilitator rejected settlement")
                        .to_string();
                    warn!(%reason, "settlement rejected by facilitator");
                    Err(X402Error::SettlementFailed { reason })
                }
            })
            .await
    }

    /// `GET /contracts`: network id → deployed settlement contract.
    pub async fn contracts(&self) -> Result<ContractsResponse> {
        self.get_json("contracts").await
    }

    /// `GET /supported`: supported (scheme, network) combinations.
    pub async fn supported(&self) -> Result<SupportedResponse> {
        self.get_json("supported").await
    }

    /// `GET /health`: whether the facilitator is reachable and healthy.
    pub async fn health(&self) -> Result<bool> {
        let url = self.join("health")?;
        let response = self.send(self.http.get(url), "health").await?;
        Ok(response.status().is_success())
    }

    fn join(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    // Runs one request under the hard timeout; expiry aborts the in-flight
    // call (the future holding the connection is dropped).
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<reqwest::Response> {
        match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(endpoint, timeout = ?self.timeout, "facilitator request timed out");
                Err(X402Error::FacilitatorTimeout {
                    endpoint: endpoint.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.join(path)?;
        self.retry
            .execute_default(|| {
                let url = url.clone();
                async move {
                    let response = self
                        .send(self.http.post(url).json(body), path)
                        .await?
                        .error_for_status()?;
                    debug!(endpoint = path, "facilitator call succeeded");
                    Ok(response.json::<T>().await?)
                }
            })
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.join(path)?;
        self.retry
            .execute_default(|| {
                let url = url.clone();
                async move {
                    let response = self
                        .send(self.http.get(url), path)
                        .await?
                        .error_for_status()?;
                    Ok(response.json::<T>().await?)
                }
            })
            .await
    }
}
