//! Domain model for the Reunite reporting app.
//!
//! Field names serialize in camelCase because that is how the documents are
//! stored on the platform; decoding a live snapshot and decoding a one-shot
//! get must agree byte for byte.

use serde::{Deserialize, Serialize};

use crate::sync::Identified;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub String);

impl CaseId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub String);

impl CommentId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an authenticated principal, stable per identity. Distinct
/// from the profile document it keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Explicit timestamp unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        Self(crate::get_current_time_ms())
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0 / 1000
    }
}

/// A missing-person report. Immutable after creation; there is no edit path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: CaseId,
    pub title: String,
    pub description: String,
    pub reporter_id: UserId,
    pub reporter_name: String,
    /// Server-assigned; absent while a snapshot is still settling.
    #[serde(default)]
    pub created_at: Option<UnixTimeMs>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
}

impl Identified for Case {
    fn identity(&self) -> &str {
        self.id.as_str()
    }
}

/// A reply attached to exactly one case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub author_name: String,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<UnixTimeMs>,
}

impl Identified for Comment {
    fn identity(&self) -> &str {
        self.id.as_str()
    }
}

/// One profile document per authenticated identity, keyed by its uid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: UserId,
    pub email: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<UnixTimeMs>,
}

impl Identified for UserProfile {
    fn identity(&self) -> &str {
        self.uid.as_str()
    }
}

/// Creation payload for a case; id, timestamp and photo list are filled in
/// by the write path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCase {
    pub title: String,
    pub description: String,
    pub reporter_id: UserId,
    pub reporter_name: String,
}

/// Creation payload for a comment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub author_name: String,
    pub content: String,
}

/// Partial profile update. Only the two recognized fields exist; anything
/// left as `None` is never written, so the stored value survives untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn username(name: impl Into<String>) -> Self {
        Self {
            username: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn avatar(url: impl Into<String>) -> Self {
        Self {
            avatar_url: Some(url.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.username.is_none() && self.avatar_url.is_none()
    }
}
