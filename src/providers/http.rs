//! HTTP provider clients
//!
//! JSON-over-HTTP adapters for the verification services. One client per
//! provider base URL; the same client type serves every interface.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{
    AmlProvider, AnomalyScorer, KycProvider, ProviderError, ProviderResult, SanctionsProvider,
    WhitelistProvider,
};
use crate::domain::{AmlResult, AnomalyResult, KycResult, SanctionsResult, WhitelistResult};

#[derive(Debug, Serialize)]
struct PartiesBody<'a> {
    from: &'a str,
    to: &'a str,
}

#[derive(Debug, Serialize)]
struct AnomalyBody<'a> {
    address: &'a str,
    amount: String,
}

/// HTTP client bound to one provider
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
    base_url: String,
}

impl HttpProvider {
    /// Create a client with a transport-level timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> ProviderResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::debug!(url = %url, status = %status, "Provider returned error status");
            return Err(classify_status(status, detail));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("invalid response body: {}", e)))
    }
}

fn map_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Unavailable(err.to_string())
    }
}

/// 4xx is an explicit rejection, everything else is treated as transient
fn classify_status(status: StatusCode, detail: String) -> ProviderError {
    let message = if detail.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, detail)
    };

    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        ProviderError::Timeout
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::Unavailable(message)
    } else if status.is_client_error() {
        ProviderError::Rejected(message)
    } else {
        ProviderError::Unavailable(message)
    }
}

#[async_trait]
impl KycProvider for HttpProvider {
    async fn verify(&self, from: &str, to: &str) -> ProviderResult<KycResult> {
        self.post_json("verify", &PartiesBody { from, to }).await
    }
}

#[async_trait]
impl AmlProvider for HttpProvider {
    async fn screen(&self, from: &str, to: &str) -> ProviderResult<AmlResult> {
        self.post_json("screen", &PartiesBody { from, to }).await
    }
}

#[async_trait]
impl SanctionsProvider for HttpProvider {
    async fn check(&self, from: &str, to: &str) -> ProviderResult<SanctionsResult> {
        self.post_json("check", &PartiesBody { from, to }).await
    }
}

#[async_trait]
impl WhitelistProvider for HttpProvider {
    async fn check(&self, from: &str, to: &str) -> ProviderResult<WhitelistResult> {
        self.post_json("check", &PartiesBody { from, to }).await
    }
}

#[async_trait]
impl AnomalyScorer for HttpProvider {
    async fn score(&self, address: &str, amount: Decimal) -> ProviderResult<AnomalyResult> {
        let body = AnomalyBody {
            address,
            amount: amount.to_string(),
        };
        self.post_json("score", &body).await
    }
}
