#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod db;
pub mod model;
pub mod session;
pub mod submit;
pub mod sync;

use serde::{Deserialize, Serialize};

pub use backend::{
    AuthBackend, BlobBackend, BlobHandle, BlobPath, Collection, Document, DocumentBackend,
    Identity, IdentityState, MemoryBackend, Order,
};
pub use db::{Database, DocSnapshots, Snapshots};
pub use model::{
    Case, CaseId, Comment, CommentId, NewCase, NewComment, ProfileUpdate, UnixTimeMs, UserId,
    UserProfile,
};
pub use session::{Session, SessionState};
pub use submit::{CaseSubmission, PendingFile, SubmitProgress};
pub use sync::{Identified, LiveList, Subscription};

/// Client-side cap on photos attached to a single case. Not enforced by the
/// backend; every write path in this crate checks it before submitting.
pub const MAX_CASE_PHOTOS: usize = 5;

/// Fixed catalog of numbered default avatars.
pub const AVATAR_HOST: &str = "https://avatar.iran.liara.run/public";
pub const AVATAR_CATALOG_MIN: u32 = 1;
pub const AVATAR_CATALOG_MAX: u32 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Authentication,
    Validation,
    NotFound,
    Upload,
    Persistence,
    Subscription,
    Internal,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Authentication => "AUTH_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Upload => "UPLOAD_ERROR",
            Self::Persistence => "PERSISTENCE_ERROR",
            Self::Subscription => "SUBSCRIPTION_ERROR",
            Self::Internal => "INTERNAL_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }
}

/// Application-level error carried across every fallible operation.
///
/// There is no automatic retry anywhere in this crate: every failure is
/// terminal for the current user action and requires an explicit
/// re-submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub internal_message: Option<String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            internal_message: None,
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Short generic text suitable for direct display. Internal detail never
    /// leaks through here.
    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network => {
                "Unable to connect. Please check your internet connection and try again.".into()
            }
            ErrorKind::Authentication => "Invalid email or password.".into(),
            ErrorKind::Validation => self.message.clone(),
            ErrorKind::NotFound => "The requested case could not be found.".into(),
            ErrorKind::Upload | ErrorKind::Persistence => {
                "Failed to post case. Please try again.".into()
            }
            ErrorKind::Subscription => "Live updates are unavailable right now.".into(),
            ErrorKind::Internal | ErrorKind::Unknown => {
                "An unexpected error occurred. Please try again.".into()
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

/// Client-side validation failures, surfaced verbatim to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("username is required")]
    UsernameRequired,
    #[error("email and password are required")]
    CredentialsRequired,
    #[error("title and description are required")]
    TitleAndDescriptionRequired,
    #[error("a case can carry at most {max} photos")]
    TooManyPhotos { max: usize },
    #[error("a submission is already in progress")]
    SubmissionInFlight,
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        Self::new(ErrorKind::Validation, e.to_string())
    }
}

#[must_use]
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Relative display for a server-assigned timestamp, e.g. `3m ago`.
#[must_use]
pub fn format_time_ago(timestamp_ms: u64, now_ms: u64) -> String {
    if timestamp_ms > now_ms {
        // server clocks can run slightly ahead of the client
        return "just now".into();
    }

    let diff_secs = now_ms.saturating_sub(timestamp_ms) / 1000;
    if diff_secs < 5 {
        return "just now".into();
    }
    if diff_secs < 60 {
        return format!("{diff_secs}s ago");
    }

    let diff_mins = diff_secs / 60;
    if diff_mins < 60 {
        return format!("{diff_mins}m ago");
    }

    let diff_hours = diff_mins / 60;
    if diff_hours < 24 {
        return format!("{diff_hours}h ago");
    }

    let diff_days = diff_hours / 24;
    if diff_days < 7 {
        return format!("{diff_days}d ago");
    }
    if diff_days < 30 {
        return format!("{}w ago", diff_days / 7);
    }
    if diff_days < 365 {
        return format!("{}mo ago", diff_days / 30);
    }

    format!("{}y ago", diff_days / 365)
}

/// Display string for a possibly-unresolved creation timestamp.
///
/// A live snapshot can be delivered before the server has assigned the
/// timestamp; the fallback covers that window.
#[must_use]
pub fn format_created_at(created_at: Option<model::UnixTimeMs>, now: model::UnixTimeMs) -> String {
    match created_at {
        Some(ts) => format_time_ago(ts.as_millis(), now.as_millis()),
        None => "just now".into(),
    }
}

/// URL of the numbered avatar at `index` in the fixed catalog.
#[must_use]
pub fn avatar_url(index: u32) -> String {
    format!("{AVATAR_HOST}/{index}")
}

/// Uniformly selected default avatar, assigned at signup.
#[must_use]
pub fn default_avatar_url() -> String {
    use rand::Rng;
    let index = rand::thread_rng().gen_range(AVATAR_CATALOG_MIN..=AVATAR_CATALOG_MAX);
    avatar_url(index)
}

/// Whether `url` points into the fixed default-avatar catalog.
#[must_use]
pub fn is_catalog_avatar(url: &str) -> bool {
    url.strip_prefix(AVATAR_HOST)
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|index| index.parse::<u32>().ok())
        .is_some_and(|index| (AVATAR_CATALOG_MIN..=AVATAR_CATALOG_MAX).contains(&index))
}
