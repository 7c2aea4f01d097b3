//! Client for the backing item/user store.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use thiserror::Error;

use super::record::{Draft, Entity, Record, RecordId};

/// Errors from a backing-store call.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Base URL or path could not be turned into a request URL
    #[error("Invalid store URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Transport failure (connect, timeout, body read)
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Store answered with a non-success status
    #[error("Store returned {status} for {url}")]
    Status { url: String, status: u16 },

    /// Response body was not the expected JSON shape
    #[error("Malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// Failure reported by a non-HTTP store implementation
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Source of truth for items and users.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// List all records, or those matching `query` when given.
    async fn list(&self, entity: Entity, query: Option<&str>) -> Result<Vec<Record>, StoreError>;

    async fn create(&self, entity: Entity, draft: &Draft) -> Result<Record, StoreError>;

    async fn delete(&self, entity: Entity, id: &RecordId) -> Result<(), StoreError>;
}

/// Timeouts applied to every store request.
#[derive(Debug, Clone, Copy)]
pub struct StoreTimeouts {
    pub request: Duration,
    pub connect: Duration,
}

impl Default for StoreTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(10),
            connect: Duration::from_secs(5),
        }
    }
}

/// REST store: `GET /{entity}[?q=]`, `POST /{entity}`, `DELETE /{entity}/{id}`.
pub struct HttpStore {
    client: Client,
    base_url: Url,
}

impl HttpStore {
    pub fn new(base_url: &str, timeouts: StoreTimeouts) -> Result<Self, StoreError> {
        // Url::join drops the last path segment unless it ends with '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).map_err(|e| StoreError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(timeouts.request)
            .connect_timeout(timeouts.connect)
            .build()
            .map_err(|e| StoreError::Transport {
                url: base_url.to_string(),
                source: e,
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Request URL for `segments` under the base path. Each segment is
    /// percent-encoded whole, so ids can't escape their collection.
    fn url(&self, segments: &[&str], query: Option<&str>) -> Result<Url, StoreError> {
        let invalid = |reason: &str| StoreError::InvalidUrl {
            url: format!("{}{}", self.base_url, segments.join("/")),
            reason: reason.to_string(),
        };
        if segments.iter().any(|s| matches!(*s, "" | "." | "..")) {
            return Err(invalid("empty or relative path segment"));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| invalid("base URL cannot have a path"))?
            .pop_if_empty()
            .extend(segments);
        if let Some(q) = query {
            url.query_pairs_mut().append_pair("q", q);
        }
        Ok(url)
    }

    async fn send(&self, url: &Url, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let response = builder.send().await.map_err(|e| StoreError::Transport {
            url: url.to_string(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %url, status = status.as_u16(), "Store request rejected");
            return Err(StoreError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        url: &Url,
        response: reqwest::Response,
    ) -> Result<T, StoreError> {
        let bytes = response.bytes().await.map_err(|e| StoreError::Transport {
            url: url.to_string(),
            source: e,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl BackingStore for HttpStore {
    async fn list(&self, entity: Entity, query: Option<&str>) -> Result<Vec<Record>, StoreError> {
        let url = self.url(&[entity.path()], query)?;
        tracing::debug!(%entity, url = %url, "Listing records");
        let response = self.send(&url, self.client.get(url.clone())).await?;
        Self::decode(&url, response).await
    }

    async fn create(&self, entity: Entity, draft: &Draft) -> Result<Record, StoreError> {
        let url = self.url(&[entity.path()], None)?;
        tracing::debug!(%entity, name = %draft.name, "Creating record");
        let response = self
            .send(&url, self.client.post(url.clone()).json(draft))
            .await?;
        Self::decode(&url, response).await
    }

    async fn delete(&self, entity: Entity, id: &RecordId) -> Result<(), StoreError> {
        let id_segment = id.to_string();
        let url = self.url(&[entity.path(), &id_segment], None)?;
        tracing::debug!(%entity, %id, "Deleting record");
        // Body is ignored; stores answer with the deleted record, `{}` or 204
        self.send(&url, self.client.delete(url.clone())).await?;
        Ok(())
    }
}
