//! Microsoft Graph HTTP client with token injection, retry and paging.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use se_core::{DirectoryError, DirectoryResult, GraphConfig};

use crate::auth::TokenCache;
use crate::models::{ODataError, ODataPage};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Microsoft Graph API client.
#[derive(Debug)]
pub struct GraphClient {
    http_client: reqwest::Client,
    token_cache: TokenCache,
    base_url: Url,
    max_retries: u32,
    base_delay: Duration,
}

impl GraphClient {
    /// Build a client from explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Config`] when credentials are missing or the
    /// endpoint is not a valid URL.
    pub fn new(config: &GraphConfig) -> DirectoryResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DirectoryError::Config(format!("Failed to create HTTP client: {e}")))?;

        let base = format!(
            "{}/{}/",
            config.graph_endpoint.trim_end_matches('/'),
            config.api_version.trim_matches('/')
        );
        let base_url = Url::parse(&base)
            .map_err(|e| DirectoryError::Config(format!("Invalid graph endpoint {base}: {e}")))?;

        Ok(Self {
            token_cache: TokenCache::new(http_client.clone(), config)?,
            http_client,
            base_url,
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(1),
        })
    }

    /// Override the first back-off delay (doubles on each retry)
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Build `{base}/{segments...}` with each segment percent-encoded
    pub fn url(&self, segments: &[&str]) -> DirectoryResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DirectoryError::Config(format!("Graph endpoint {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET a JSON document
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        headers: &[(&'static str, &'static str)],
    ) -> DirectoryResult<T> {
        let response = self.send_with_retry(url, headers).await?;
        response
            .json()
            .await
            .map_err(|e| DirectoryError::Decode(format!("Invalid JSON from Graph: {e}")))
    }

    /// GET a plain-text body
    pub async fn get_text(
        &self,
        url: Url,
        headers: &[(&'static str, &'static str)],
    ) -> DirectoryResult<String> {
        let response = self.send_with_retry(url, headers).await?;
        response
            .text()
            .await
            .map_err(|e| DirectoryError::Decode(format!("Unreadable Graph response: {e}")))
    }

    /// Follow `@odata.nextLink` until `limit` items were collected or pages run out
    pub async fn get_paged<T: DeserializeOwned>(
        &self,
        first: Url,
        headers: &[(&'static str, &'static str)],
        limit: usize,
    ) -> DirectoryResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next.take() {
            let page: ODataPage<T> = self.get_json(url, headers).await?;
            let remaining = limit.saturating_sub(items.len());
            items.extend(page.value.into_iter().take(remaining));

            if items.len() >= limit {
                break;
            }
            next = match page.next_link {
                Some(link) => Some(Url::parse(&link).map_err(|e| {
                    DirectoryError::Decode(format!("Invalid nextLink {link}: {e}"))
                })?),
                None => None,
            };
        }

        debug!("Collected {} items", items.len());
        Ok(items)
    }

    #[instrument(skip(self, url, headers), fields(path = %url.path()))]
    async fn send_with_retry(
        &self,
        url: Url,
        headers: &[(&'static str, &'static str)],
    ) -> DirectoryResult<reqwest::Response> {
        let extra_headers = header_map(headers)?;
        let mut retries = 0u32;
        let mut delay = self.base_delay;
        let mut refreshed_token = false;

        loop {
            let token = self.token_cache.get_token().await?;

            let response = self
                .http_client
                .get(url.clone())
                .bearer_auth(&token)
                .headers(extra_headers.clone())
                .send()
                .await
                .map_err(|e| DirectoryError::Unavailable(format!("Graph request failed: {e}")))?;

            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::UNAUTHORIZED && !refreshed_token {
                debug!("Graph rejected token, refreshing");
                self.token_cache.invalidate().await;
                refreshed_token = true;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if retries >= self.max_retries {
                    return Err(DirectoryError::Throttled(format!(
                        "still throttled after {} retries",
                        retries
                    )));
                }
                let wait = retry_after(response.headers()).unwrap_or(delay);
                retries += 1;
                warn!(
                    "Throttled by Graph, retry {}/{} after {:?}",
                    retries, self.max_retries, wait
                );
                tokio::time::sleep(wait).await;
                delay *= 2;
                continue;
            }

            if matches!(
                status,
                StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
            ) {
                if retries >= self.max_retries {
                    return Err(DirectoryError::Unavailable(format!(
                        "Graph returned {} after {} retries",
                        status, retries
                    )));
                }
                retries += 1;
                warn!(
                    "Transient error {}, retry {}/{} after {:?}",
                    status, retries, self.max_retries, delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(error_from_body(status, body));
        }
    }
}

fn header_map(headers: &[(&'static str, &'static str)]) -> DirectoryResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let value = HeaderValue::from_str(value)
            .map_err(|e| DirectoryError::Config(format!("Invalid header {name}: {e}")))?;
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| DirectoryError::Config(format!("Invalid header name {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn error_from_body(status: StatusCode, body: String) -> DirectoryError {
    let (code, message) = match serde_json::from_str::<ODataError>(&body) {
        Ok(odata) => (odata.error.code, odata.error.message),
        Err(_) => (status.to_string(), body),
    };

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return DirectoryError::Auth(format!("{code}: {message}"));
    }
    DirectoryError::Api { code, message }
}
