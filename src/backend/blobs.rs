//! Blob storage contract and path conventions.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::model::{UnixTimeMs, UserId};
use crate::AppResult;

/// Storage path of one blob, e.g. `cases/{owner}/{uniqueName}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobPath(String);

impl BlobPath {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlobPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle returned by an upload; resolve it for the durable URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobHandle(String);

impl BlobHandle {
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Collision-resistant blob name: the original file name with whitespace
/// collapsed to underscores plus a millisecond-timestamp suffix.
#[must_use]
pub fn unique_blob_name(file_name: &str, now: UnixTimeMs) -> String {
    let cleaned = file_name.split_whitespace().collect::<Vec<_>>().join("_");
    format!("{cleaned}-{}", now.as_millis())
}

/// Path for one case photo, namespaced by the reporting owner.
#[must_use]
pub fn case_photo_path(owner: &UserId, file_name: &str, now: UnixTimeMs) -> BlobPath {
    BlobPath::new(format!("cases/{owner}/{}", unique_blob_name(file_name, now)))
}

/// Path for a user avatar.
#[must_use]
pub fn avatar_path(uid: &UserId, now: UnixTimeMs) -> BlobPath {
    BlobPath::new(format!("avatars/{uid}/avatar_{}", now.as_millis()))
}

/// Blob storage operations: upload bytes, then resolve the handle into a
/// durable public URL.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    async fn upload(&self, path: &BlobPath, bytes: Bytes) -> AppResult<BlobHandle>;

    async fn resolve_url(&self, handle: &BlobHandle) -> AppResult<Url>;
}
