//! HTTP client for the layout sync server.
//!
//! Endpoints:
//! - `GET /health` (no auth)
//! - `GET /v1/layouts`, `POST /v1/layouts`
//! - `GET /v1/layouts/{id}`, `PUT /v1/layouts/{id}`, `DELETE /v1/layouts/{id}`
//!
//! `PUT` and `DELETE` accept an `if_unmodified_since` precondition (body
//! field and query parameter respectively); the server answers 412 when the
//! stored layout changed after it.
//!
//! Requests authenticate with `Authorization: Bearer <api key>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{RemoteError, RemoteLayout, RemoteLayoutStore};
use crate::layout::{Layout, LayoutId};

/// Timeout for a single request to the server.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for the reachability probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Body of `POST /v1/layouts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLayoutRequest {
    pub id: LayoutId,
    pub name: String,
    pub data: serde_json::Value,
}

/// Body of `PUT /v1/layouts/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLayoutRequest {
    pub name: String,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

/// Query string of `DELETE /v1/layouts/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteLayoutQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

/// Remote layout store backed by the layout sync server.
#[derive(Debug, Clone)]
pub struct HttpRemoteLayoutStore {
    server_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpRemoteLayoutStore {
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            server_url: server_url.into(),
            api_key: api_key.into(),
            client,
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Builds an HTTP URL for the given path, accepting bare hosts and
    /// `ws://`/`wss://` style server URLs.
    pub fn build_http_url(&self, path: &str) -> String {
        build_http_url(&self.server_url, path)
    }

    fn layout_url(&self, id: LayoutId) -> String {
        self.build_http_url(&format!("/v1/layouts/{}", id))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, RemoteError> {
        request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))
    }
}

fn build_http_url(server_url: &str, path: &str) -> String {
    let base = server_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else if let Some(rest) = base.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if base.starts_with("http://") || base.starts_with("https://") {
        base.to_string()
    } else {
        format!("http://{}", base)
    };
    format!("{}{}", base, path)
}

/// Maps a non-success response to a [`RemoteError`].
async fn error_for(response: Response, id: Option<LayoutId>) -> RemoteError {
    let status = response.status();
    match (status, id) {
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => RemoteError::Unauthorized,
        (StatusCode::NOT_FOUND, Some(id)) => RemoteError::NotFound(id),
        (StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT, Some(id)) => {
            RemoteError::PreconditionFailed(id)
        }
        _ => RemoteError::Server {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        },
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    response
        .json()
        .await
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

#[async_trait]
impl RemoteLayoutStore for HttpRemoteLayoutStore {
    async fn list(&self) -> Result<Vec<RemoteLayout>, RemoteError> {
        let response = self
            .send(self.client.get(self.build_http_url("/v1/layouts")))
            .await?;
        if !response.status().is_success() {
            return Err(error_for(response, None).await);
        }
        decode(response).await
    }

    async fn get(&self, id: LayoutId) -> Result<Option<RemoteLayout>, RemoteError> {
        let response = self.send(self.client.get(self.layout_url(id))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_for(response, Some(id)).await);
        }
        decode(response).await.map(Some)
    }

    async fn create(&self, layout: &Layout) -> Result<RemoteLayout, RemoteError> {
        let body = CreateLayoutRequest {
            id: layout.id,
            name: layout.name.clone(),
            data: layout.data.clone(),
        };
        let response = self
            .send(
                self.client
                    .post(self.build_http_url("/v1/layouts"))
                    .json(&body),
            )
            .await?;
        if !response.status().is_success() {
            return Err(error_for(response, Some(layout.id)).await);
        }
        decode(response).await
    }

    async fn update(
        &self,
        layout: &Layout,
        if_unmodified_since: Option<DateTime<Utc>>,
    ) -> Result<RemoteLayout, RemoteError> {
        let body = UpdateLayoutRequest {
            name: layout.name.clone(),
            data: layout.data.clone(),
            if_unmodified_since,
        };
        let response = self
            .send(self.client.put(self.layout_url(layout.id)).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(error_for(response, Some(layout.id)).await);
        }
        decode(response).await
    }

    async fn delete(
        &self,
        id: LayoutId,
        if_unmodified_since: Option<DateTime<Utc>>,
    ) -> Result<bool, RemoteError> {
        let query = DeleteLayoutQuery {
            if_unmodified_since,
        };
        let response = self
            .send(self.client.delete(self.layout_url(id)).query(&query))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(error_for(response, Some(id)).await),
        }
    }
}

/// Returns true if the server's health endpoint answers successfully.
pub async fn check_server(server_url: &str) -> bool {
    let client = match reqwest::Client::builder().timeout(HEALTH_TIMEOUT).build() {
        Ok(c) => c,
        Err(_) => return false,
    };

    match client.get(build_http_url(server_url, "/health")).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            tracing::debug!("Health check against {} failed: {}", server_url, e);
            false
        }
    }
}
