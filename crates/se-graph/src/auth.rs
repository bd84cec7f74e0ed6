//! OAuth2 client-credentials token cache for Microsoft Graph.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use se_core::{DirectoryError, DirectoryResult, GraphConfig};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

/// Caches one application token and refreshes it shortly before expiry.
pub struct TokenCache {
    http_client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cached_token: RwLock<Option<CachedToken>>,
    grace_period: Duration,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    pub fn new(http_client: reqwest::Client, config: &GraphConfig) -> DirectoryResult<Self> {
        if !config.is_complete() {
            return Err(DirectoryError::Config(
                "graph tenant_id, client_id and client_secret are required".to_string(),
            ));
        }

        Ok(Self {
            http_client,
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                config.authority_endpoint.trim_end_matches('/'),
                config.tenant_id
            ),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: format!("{}/.default", config.graph_endpoint.trim_end_matches('/')),
            cached_token: RwLock::new(None),
            grace_period: Duration::minutes(5),
        })
    }

    /// Gets a valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> DirectoryResult<String> {
        {
            let cache = self.cached_token.read().await;
            if let Some(ref token) = *cache {
                if !token.is_expired(self.grace_period) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut cache = self.cached_token.write().await;
        // another task may have refreshed while we waited for the write lock
        if let Some(ref token) = *cache {
            if !token.is_expired(self.grace_period) {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Refreshing access token");
        let token = self.acquire_token().await?;
        let access_token = token.access_token.clone();
        *cache = Some(token);
        Ok(access_token)
    }

    #[instrument(skip(self), fields(token_url = %self.token_url))]
    async fn acquire_token(&self) -> DirectoryResult<CachedToken> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Auth(format!(
                "Token request failed with status {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| DirectoryError::Auth(format!("Failed to parse token response: {}", e)))?;

        let expires_at = Utc::now() + Duration::seconds(token_response.expires_in);
        debug!(
            "Acquired new token, expires at {}",
            expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at,
        })
    }

    /// Drop the cached token so the next call fetches a fresh one
    pub async fn invalidate(&self) {
        *self.cached_token.write().await = None;
    }
}
