//! Identity provider contract.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::model::UserId;
use crate::AppResult;

/// The authenticated principal as the platform reports it. Distinct from the
/// application-level profile document keyed by the same uid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: UserId,
    pub email: String,
}

/// Current state of the identity-change stream.
///
/// `Unknown` covers the window between subscribing and the platform's first
/// notification; consumers treat it as "still loading", not as signed out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum IdentityState {
    #[default]
    Unknown,
    SignedOut,
    SignedIn(Identity),
}

impl IdentityState {
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        match self {
            Self::SignedIn(identity) => Some(identity),
            Self::Unknown | Self::SignedOut => None,
        }
    }

    /// Whether the first notification has arrived.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

pub type IdentityWatch = watch::Receiver<IdentityState>;

/// Identity provider operations consumed by the session layer.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Authenticate an existing identity. Fails with an authentication error
    /// on bad credentials; success is also announced on the identity stream.
    async fn sign_in(&self, email: &str, password: &SecretString) -> AppResult<Identity>;

    /// Create a new identity. Fails with an authentication error when the
    /// email is already registered.
    async fn register(&self, email: &str, password: &SecretString) -> AppResult<Identity>;

    /// Designate signed-out. Announced on the identity stream.
    async fn sign_out(&self) -> AppResult<()>;

    /// Subscribe to identity changes. The stream always holds the current
    /// state; changes are observed through the watch channel.
    fn identity_changes(&self) -> IdentityWatch;
}
