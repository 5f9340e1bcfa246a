//! The token endpoint: one URL, `POST` to generate a token pair from an API
//! key, `PUT` to mint a new access token from a refresh token.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest_middleware::ClientWithMiddleware;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sift_common::ScopeSet;

use crate::error::ClientError;
use crate::http::send_json;

/// Header carrying the API key on generation requests.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Body of a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub scopes: ScopeSet,
    /// Desired access token lifetime in milliseconds
    pub access_expiry: u64,
    /// Desired refresh token lifetime in milliseconds
    pub refresh_expiry: u64,
}

/// Response to a generation request. Lifetimes are relative, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedTokens {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub access_token_expiry: u64,
    pub refresh_token_expiry: u64,
}

/// Response to a refresh request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedToken {
    pub access_token: SecretString,
}

/// The two exchanges the session manager performs.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchanges the API key for a new access/refresh token pair.
    async fn generate(
        &self,
        api_key: &SecretString,
        request: &TokenRequest,
    ) -> Result<GeneratedTokens, ClientError>;

    /// Exchanges a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &SecretString) -> Result<RefreshedToken, ClientError>;
}

/// [`TokenEndpoint`] over HTTP.
#[derive(Clone)]
pub struct HttpTokenEndpoint {
    client: ClientWithMiddleware,
    url: String,
}

impl std::fmt::Debug for HttpTokenEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTokenEndpoint")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl HttpTokenEndpoint {
    pub fn new(client: ClientWithMiddleware, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn generate(
        &self,
        api_key: &SecretString,
        request: &TokenRequest,
    ) -> Result<GeneratedTokens, ClientError> {
        log::debug!("Requesting token pair for scopes [{}]", request.scopes);

        let builder = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, api_key.expose_secret())
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(request)?);

        send_json(builder, "Token generation").await
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<RefreshedToken, ClientError> {
        log::debug!("Refreshing access token");

        let builder = self.client.put(&self.url).header(
            AUTHORIZATION,
            format!("Bearer {}", refresh_token.expose_secret()),
        );

        send_json(builder, "Token refresh").await
    }
}
