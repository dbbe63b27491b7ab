//! HTTP client for the broker-copy provider.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::models::{CopierPatch, RiskType};

use super::gateway::{CopyGateway, CopyLink, RemoteAccount, RemoteError};
use super::types::{AccountData, ApiEnvelope, CopierData, CreateCopierRequest};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the provider's copier and account endpoints.
///
/// Every request carries basic auth; every reply is decoded as the
/// provider's `{status, data, message}` envelope regardless of the HTTP
/// status line. Transport failures and undecodable bodies surface as
/// `Unavailable`, non-success envelope statuses as `Rejected`.
pub struct ProviderClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl ProviderClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    /// Create with a custom base URL (for testing).
    pub fn with_base_url(base_url: &str, api_key: &str, api_secret: &str) -> Result<Self> {
        let config = ProviderConfig {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        };
        Self::new(&config)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<ApiEnvelope<T>, RemoteError> {
        let response = request
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .send()
            .await
            .map_err(|e| RemoteError::unavailable(format!("provider unreachable: {}", e)))?;

        response
            .json::<ApiEnvelope<T>>()
            .await
            .map_err(|e| RemoteError::unavailable(format!("invalid provider response: {}", e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<ApiEnvelope<T>, RemoteError> {
        debug!(url = %url, "Provider GET");
        self.send(self.client.get(url)).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<ApiEnvelope<T>, RemoteError> {
        debug!(url = %url, "Provider POST");
        self.send(self.client.post(url).json(body)).await
    }

    async fn patch_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<ApiEnvelope<T>, RemoteError> {
        debug!(url = %url, "Provider PATCH");
        self.send(self.client.patch(url).json(body)).await
    }

    async fn delete_json(&self, url: &str) -> Result<(), RemoteError> {
        debug!(url = %url, "Provider DELETE");
        let envelope: ApiEnvelope<serde_json::Value> = self.send(self.client.delete(url)).await?;
        if envelope.is_success() {
            Ok(())
        } else {
            Err(RemoteError::rejected(envelope.message))
        }
    }
}

#[async_trait]
impl CopyGateway for ProviderClient {
    async fn create_copy_link(
        &self,
        lead_remote_id: &str,
        follower_remote_id: &str,
        risk_type: RiskType,
        risk_value: Decimal,
    ) -> Result<CopyLink, RemoteError> {
        let url = format!("{}/copiers", self.base_url);
        let body = CreateCopierRequest {
            lead_id: lead_remote_id.to_string(),
            follower_id: follower_remote_id.to_string(),
            risk_type,
            risk_value,
        };

        let envelope: ApiEnvelope<CopierData> = self.post_json(&url, &body).await?;
        envelope.into_result().map(CopyLink::from)
    }

    async fn update_copy_link(
        &self,
        remote_copier_id: &str,
        patch: &CopierPatch,
    ) -> Result<CopyLink, RemoteError> {
        let url = format!("{}/copiers/{}", self.base_url, remote_copier_id);

        let envelope: ApiEnvelope<CopierData> = self.patch_json(&url, patch).await?;
        envelope.into_result().map(CopyLink::from)
    }

    async fn delete_copy_link(&self, remote_copier_id: &str) -> Result<(), RemoteError> {
        let url = format!("{}/copiers/{}", self.base_url, remote_copier_id);
        self.delete_json(&url).await
    }

    async fn get_copy_link(&self, remote_copier_id: &str) -> Result<CopyLink, RemoteError> {
        let url = format!("{}/copiers/{}", self.base_url, remote_copier_id);

        let envelope: ApiEnvelope<CopierData> = self.get_json(&url).await?;
        envelope.into_result().map(CopyLink::from)
    }

    async fn get_account(&self, remote_account_id: &str) -> Result<RemoteAccount, RemoteError> {
        let url = format!("{}/accounts/{}", self.base_url, remote_account_id);

        let envelope: ApiEnvelope<AccountData> = self.get_json(&url).await?;
        envelope.into_result().map(RemoteAccount::from)
    }

    async fn delete_account(&self, remote_account_id: &str) -> Result<(), RemoteError> {
        let url = format!("{}/accounts/{}", self.base_url, remote_account_id);
        self.delete_json(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ProviderClient::with_base_url("https://copy.example.com/api/", "k", "s").unwrap();
        assert_eq!(client.base_url, "https://copy.example.com/api");
    }
}
