//! HTTP gateway for the Trakt.tv API.
//!
//! [`TraktClient`] wraps `reqwest::Client` and provides a typed method per
//! endpoint. Responses are deserialized into the records in
//! [`types`](crate::types); the tool layer handles formatting for the AI
//! agent.
//!
//! ## Authentication
//!
//! Every request carries the `trakt-api-version` and `trakt-api-key`
//! headers. When an access token is configured, a Bearer `Authorization`
//! header is added as well.
//!
//! ## Error handling
//!
//! Non-2xx responses become [`ClientError::Api`] carrying only the status
//! code, HTTP method, and request path. The response body is dropped: Trakt
//! error bodies can echo request data, including tokens, and must not leak
//! into logs or user-facing messages.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

use crate::config::Config;
use crate::types::{
    DeviceCode, Episode, HistoryItem, Movie, SearchResult, Show, SyncResponse, Token, WatchedItem,
};

/// Production API endpoint.
pub const BASE_URL: &str = "https://api.trakt.tv";

const API_VERSION: &str = "2";

/// HTTP client for the Trakt API.
pub struct TraktClient {
    http: reqwest::Client,
    base_url: String,
    config: Config,
}

impl TraktClient {
    /// Create a client against the production endpoint.
    pub fn new(config: Config) -> Self {
        Self::with_base_url(config, BASE_URL)
    }

    /// Create a client against a custom endpoint (tests point this at a mock).
    pub fn with_base_url(config: Config, base_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        // Strip trailing slash for consistent URL construction
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            config,
        }
    }

    /// True when an API client id is present.
    pub fn is_configured(&self) -> bool {
        !self.config.client_id.is_empty()
    }

    /// True when an OAuth access token is present.
    pub fn is_authenticated(&self) -> bool {
        !self.config.access_token.is_empty()
    }

    /// `GET /search/{type}` - search shows and/or movies by free text.
    ///
    /// `kind` filters to "show" or "movie"; `None` (or empty) searches both.
    /// Results come back ranked by relevance score, highest first.
    pub async fn search(
        &self,
        query: &str,
        kind: Option<&str>,
    ) -> Result<Vec<SearchResult>, ClientError> {
        let kind = kind.filter(|k| !k.is_empty()).unwrap_or("show,movie");
        let path = format!("/search/{kind}");
        self.get(&path, &[("query", query.to_string())]).await
    }

    /// `GET /sync/history[/{type}]` - the user's watch history, newest first.
    pub async fn get_history(
        &self,
        kind: Option<&str>,
        limit: u32,
    ) -> Result<Vec<HistoryItem>, ClientError> {
        let path = match kind.filter(|k| !k.is_empty()) {
            Some(k) => format!("/sync/history/{k}"),
            None => "/sync/history".to_string(),
        };
        let mut query = Vec::new();
        if limit > 0 {
            query.push(("limit", limit.to_string()));
        }
        self.get(&path, &query).await
    }

    /// `POST /sync/history` - mark items as watched.
    pub async fn add_to_history(&self, item: &WatchedItem) -> Result<SyncResponse, ClientError> {
        self.post("/sync/history", item).await
    }

    /// `POST /sync/history/remove` - remove items from watch history.
    pub async fn remove_from_history(
        &self,
        item: &WatchedItem,
    ) -> Result<SyncResponse, ClientError> {
        self.post("/sync/history/remove", item).await
    }

    /// `GET /shows/{id}` - a single show by Trakt id or slug.
    pub async fn get_show(&self, id: &str) -> Result<Show, ClientError> {
        self.get(&format!("/shows/{id}"), &[]).await
    }

    /// `GET /movies/{id}` - a single movie by Trakt id or slug.
    pub async fn get_movie(&self, id: &str) -> Result<Movie, ClientError> {
        self.get(&format!("/movies/{id}"), &[]).await
    }

    /// `GET /shows/{id}/seasons/{season}/episodes/{episode}` - one episode.
    pub async fn get_episode(
        &self,
        show_id: &str,
        season: u32,
        episode: u32,
    ) -> Result<Episode, ClientError> {
        self.get(
            &format!("/shows/{show_id}/seasons/{season}/episodes/{episode}"),
            &[],
        )
        .await
    }

    /// `POST /oauth/device/code` - start the OAuth device flow.
    pub async fn get_device_code(&self) -> Result<DeviceCode, ClientError> {
        let body = json!({ "client_id": self.config.client_id });
        self.post("/oauth/device/code", &body).await
    }

    /// `POST /oauth/device/token` - poll for a token after the user authorizes.
    pub async fn poll_for_token(&self, device_code: &str) -> Result<Token, ClientError> {
        let body = json!({
            "code": device_code,
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
        });
        self.post("/oauth/device/token", &body).await
    }

    // HTTP helpers

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let mut request = self.http.get(format!("{}{}", self.base_url, path));
        if !query.is_empty() {
            request = request.query(query);
        }
        self.execute(request, "GET", path).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        self.execute(request, "POST", path).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        method: &'static str,
        path: &str,
    ) -> Result<T, ClientError> {
        let mut request = request
            .header("Content-Type", "application/json")
            .header("trakt-api-version", API_VERSION)
            .header("trakt-api-key", &self.config.client_id);
        if !self.config.access_token.is_empty() {
            request = request.bearer_auth(&self.config.access_token);
        }

        debug!(method, path, "trakt request");

        let response = request.send().await.map_err(ClientError::Request)?;
        let status = response.status().as_u16();

        if status >= 400 {
            error!(status, method, path, "trakt API error");
            // Sanitized error: the response body may echo sensitive request data
            return Err(ClientError::Api {
                status,
                method,
                path: path.to_string(),
            });
        }

        let body = response.text().await.map_err(ClientError::Request)?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// Errors returned by [`TraktClient`] methods.
#[derive(Debug)]
pub enum ClientError {
    /// HTTP transport failure (DNS, connection refused, timeout, etc.).
    Request(reqwest::Error),
    /// The API returned a non-2xx status. The response body is dropped.
    Api {
        status: u16,
        method: &'static str,
        path: String,
    },
    /// The response body was not the expected JSON shape.
    Decode(String),
}

impl ClientError {
    /// True for HTTP 401/403 responses.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ClientError::Api { status: 401 | 403, .. })
    }

    /// True for HTTP 429 responses.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClientError::Api { status: 429, .. })
    }

    /// True for HTTP 404 responses.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api { status: 404, .. })
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Request(e) => write!(f, "HTTP request failed: {e}"),
            ClientError::Api {
                status,
                method,
                path,
            } => {
                write!(f, "trakt API error: {method} {path} returned status {status}")
            }
            ClientError::Decode(msg) => write!(f, "invalid JSON from trakt: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Request(e) => Some(e),
            _ => None,
        }
    }
}
