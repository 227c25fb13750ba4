//! HTTP clients for the upload pipeline's remote collaborators.
//!
//! Provides a minimal client with configurable auth (Bearer token or X-API-Key)
//! plus the three endpoint clients the pipeline consumes: signed credential
//! issuance, the direct object-store upload and the batch commit. Every
//! failure is classified into a [`TransferError`] so the retry controller can
//! tell transient from terminal failures.

pub mod commit;
pub mod credentials;
pub mod transfer;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shutter_core::{TransferError, UploadConfig};
use std::time::Duration;

pub use commit::{idempotency_key, HttpRecordCommitter};
pub use credentials::HttpCredentialSource;
pub use transfer::HttpTransferEngine;

/// Authentication strategy for the API.
#[derive(Clone, Debug)]
pub enum Auth {
    /// `Authorization: Bearer {token}`
    Bearer(String),
    /// `X-API-Key: {key}`
    XApiKey(String),
    None,
}

/// HTTP client for the backend API with configurable auth.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    prefix: String,
    auth: Auth,
}

impl ApiClient {
    pub fn new(base_url: &str, api_version: &str, auth: Auth, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            prefix: format!("/api/{}", api_version),
            auth,
        })
    }

    /// Client for the configured API. A bearer token wins over an API key.
    pub fn from_config(config: &UploadConfig) -> Result<Self> {
        let auth = match (&config.api_token, &config.api_key) {
            (Some(token), _) => Auth::Bearer(token.clone()),
            (None, Some(key)) => Auth::XApiKey(key.clone()),
            (None, None) => Auth::None,
        };
        Self::new(
            &config.api_url,
            &config.api_version,
            auth,
            config.transfer_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// API version prefix (e.g. "/api/v0").
    pub fn api_prefix(&self) -> &str {
        &self.prefix
    }

    /// Absolute URL for a path below the API prefix.
    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.prefix, path)
    }

    pub fn has_credentials(&self) -> bool {
        !matches!(self.auth, Auth::None)
    }

    fn apply_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::Bearer(token) => request.header("Authorization", format!("Bearer {}", token)),
            Auth::XApiKey(key) => request.header("X-API-Key", key.as_str()),
            Auth::None => request,
        }
    }

    /// Authenticated POST builder for a path below the API prefix.
    pub fn post(&self, path: &str) -> RequestBuilder {
        self.apply_auth(self.client.post(self.build_url(path)))
    }

    /// Raw client for custom requests.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Map a transport-level reqwest failure into the transfer taxonomy.
pub fn classify_reqwest_error(err: &reqwest::Error) -> TransferError {
    if err.is_timeout() {
        TransferError::Timeout
    } else {
        TransferError::Network(err.to_string())
    }
}

/// Send a request, classifying transport failures.
pub async fn send(request: RequestBuilder) -> Result<Response, TransferError> {
    request
        .send()
        .await
        .map_err(|e| classify_reqwest_error(&e))
}

/// Turn a non-success response into a categorized error, keeping the body as
/// the message.
pub async fn error_for_status(response: Response) -> Result<Response, TransferError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(TransferError::from_status(status.as_u16(), error_text))
}

/// Parse a JSON body; a 2xx with an unreadable body counts as a server fault.
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, TransferError> {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| classify_reqwest_error(&e))?;
    serde_json::from_str(&text).map_err(|e| TransferError::Server {
        status,
        message: format!("Failed to parse response as JSON: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_uses_prefix() {
        let client = ApiClient::new(
            "http://localhost:3000/",
            "v1",
            Auth::None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.api_prefix(), "/api/v1");
        assert_eq!(
            client.build_url("/uploads/signatures"),
            "http://localhost:3000/api/v1/uploads/signatures"
        );
        assert!(!client.has_credentials());
    }

    #[test]
    fn test_from_config_uses_bearer_token() {
        let config = UploadConfig {
            api_token: Some("secret".into()),
            ..UploadConfig::default()
        };
        let client = ApiClient::from_config(&config).unwrap();
        assert!(client.has_credentials());
        assert_eq!(client.base_url(), "http://localhost:3000");
    }

    #[tokio::test]
    async fn test_from_config_sends_api_key_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v0/ping")
            .match_header("x-api-key", "key-1")
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(204)
            .create_async()
            .await;

        let config = UploadConfig {
            api_url: server.url(),
            api_key: Some("key-1".into()),
            ..UploadConfig::default()
        };
        let client = ApiClient::from_config(&config).unwrap();
        assert!(client.has_credentials());

        let response = client.post("/ping").send().await.unwrap();
        assert_eq!(response.status().as_u16(), 204);
        mock.assert_async().await;
    }
}
