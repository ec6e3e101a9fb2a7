//! Remote collaborators consumed by the monitor core.
//!
//! The core never talks to the network itself. It calls a [`ProfileSource`]
//! for profile attributes and media collections, and a [`MediaSink`] to
//! download media entries. [`http::HttpGateway`] implements both against a
//! JSON profile gateway; tests use in-memory fakes.

pub mod http;
pub mod types;

use async_trait::async_trait;

use crate::error::{DownloadError, FetchError};
pub use types::{Account, Category, Identified, MediaEntry, MediaSet, ProfileAttributes};

/// Read side of the remote service.
///
/// Implementations are shared across entities and must be safe for concurrent
/// use.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Scalar attributes plus follower/following lists of one profile.
    async fn fetch_profile_attributes(&self, entity: &str)
    -> Result<ProfileAttributes, FetchError>;

    /// Current media sets of one category, in remote order.
    async fn fetch_media_collection(
        &self,
        entity: &str,
        category: Category,
    ) -> Result<Vec<MediaSet>, FetchError>;
}

/// Side-effecting download target for media.
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Download one media entry into the category's storage.
    async fn download_item(
        &self,
        entity: &str,
        entry: &MediaEntry,
        category: Category,
    ) -> Result<(), DownloadError>;

    /// Archive the whole profile. Best effort.
    async fn download_full_profile_snapshot(&self, entity: &str) -> Result<(), DownloadError>;
}
