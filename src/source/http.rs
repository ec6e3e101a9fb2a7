//! JSON profile gateway over HTTP.
//!
//! | Call | Request |
//! |---|---|
//! | profile attributes | `GET {base}/profiles/{entity}` |
//! | media collection | `GET {base}/profiles/{entity}/{category}` |
//! | profile archive | `GET {base}/profiles/{entity}/archive` |
//!
//! Media bytes are fetched from the absolute URL carried by each entry and
//! written atomically under the entity's category directory.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{Category, MediaEntry, MediaSet, MediaSink, ProfileAttributes, ProfileSource};
use crate::config::GatewayConfig;
use crate::error::{DownloadError, FetchError, WatchError};
use crate::store::StateStore;
use crate::store::fs::write_atomic;

/// Longest error body excerpt kept in a [`FetchError::Status`].
const MAX_ERROR_BODY: usize = 200;

/// Client for the profile gateway. Implements both collaborator traits and
/// is shared by every entity's monitor.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    store: StateStore,
}

impl HttpGateway {
    /// Build a gateway client. Media is stored under `store`'s layout.
    pub fn new(config: &GatewayConfig, store: StateStore) -> crate::error::Result<Self> {
        reqwest::Url::parse(&config.base_url).map_err(|e| {
            WatchError::Config(format!("invalid gateway URL {:?}: {e}", config.base_url))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("profilewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WatchError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            token: config.token.clone().filter(|t| !t.is_empty()),
            store,
        })
    }

    fn profile_url(&self, entity: &str, suffix: Option<&str>) -> String {
        let entity = urlencoding::encode(entity);
        match suffix {
            Some(suffix) => format!("{}/profiles/{entity}/{suffix}", self.base_url),
            None => format!("{}/profiles/{entity}", self.base_url),
        }
    }

    /// The session token is only sent to URLs under the gateway base URL;
    /// media hosts named in entries get a plain request.
    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) if self.is_gateway_url(url) => request.bearer_auth(token),
            _ => request,
        }
    }

    fn is_gateway_url(&self, url: &str) -> bool {
        url.strip_prefix(self.base_url.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
    }

    async fn get_bytes(&self, url: &str) -> Result<bytes::Bytes, FetchError> {
        let response = self.get(url).send().await.map_err(network_error)?;
        let response = check_status(response).await?;
        response.bytes().await.map_err(network_error)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let body = self.get_bytes(url).await?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode(format!("{url}: {e}")))
    }

    fn media_path(&self, entity: &str, entry: &MediaEntry, category: Category) -> PathBuf {
        self.store.category_dir(entity, category).join(format!(
            "{}.{}",
            file_stem(&entry.media_id),
            entry.file_extension()
        ))
    }
}

#[async_trait]
impl ProfileSource for HttpGateway {
    async fn fetch_profile_attributes(
        &self,
        entity: &str,
    ) -> Result<ProfileAttributes, FetchError> {
        self.get_json(&self.profile_url(entity, None)).await
    }

    async fn fetch_media_collection(
        &self,
        entity: &str,
        category: Category,
    ) -> Result<Vec<MediaSet>, FetchError> {
        self.get_json(&self.profile_url(entity, Some(category.as_str())))
            .await
    }
}

#[async_trait]
impl MediaSink for HttpGateway {
    async fn download_item(
        &self,
        entity: &str,
        entry: &MediaEntry,
        category: Category,
    ) -> Result<(), DownloadError> {
        let url = entry.download_url();
        let bytes = self
            .get_bytes(url)
            .await
            .map_err(|e| DownloadError::Transfer {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;

        let path = self.media_path(entity, entry, category);
        write_atomic(&path, &bytes).map_err(|source| DownloadError::Store {
            path: path.clone(),
            source,
        })?;
        debug!(entity, %category, media_id = %entry.media_id, bytes = bytes.len(), "media stored");
        Ok(())
    }

    async fn download_full_profile_snapshot(&self, entity: &str) -> Result<(), DownloadError> {
        let url = self.profile_url(entity, Some("archive"));
        let bytes = self
            .get_bytes(&url)
            .await
            .map_err(|e| DownloadError::Transfer {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let path = self.store.profile_dir(entity).join("archive.json");
        write_atomic(&path, &bytes).map_err(|source| DownloadError::Store {
            path: path.clone(),
            source,
        })?;
        debug!(entity, bytes = bytes.len(), "profile archive stored");
        Ok(())
    }
}

fn network_error(err: reqwest::Error) -> FetchError {
    if err.is_decode() {
        FetchError::Decode(err.to_string())
    } else {
        FetchError::Network(err.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after_secs = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok());
    let body = response.text().await.unwrap_or_default();
    Err(map_status(status, retry_after_secs, &body))
}

/// Map a non-success status to a [`FetchError`].
fn map_status(status: StatusCode, retry_after_secs: Option<u64>, body: &str) -> FetchError {
    let message: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Auth(if message.is_empty() {
            status.to_string()
        } else {
            message
        }),
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited { retry_after_secs },
        StatusCode::NOT_FOUND => FetchError::NotFound(message),
        _ => FetchError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

/// Media ids become file names; keep them to a safe alphabet.
fn file_stem(media_id: &str) -> String {
    media_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
