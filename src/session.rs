//! Auth session: the current identity and its profile document as
//! observable state, plus login/signup/logout.
//!
//! A session is an explicitly constructed object, not ambient global state.
//! It owns one background task holding exactly one identity-stream
//! subscription and at most one profile-document subscription; the profile
//! subscription is always cancelled before a replacement is established, or
//! cancelled with no replacement when the identity goes away.

use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::backend::{AuthBackend, Identity, IdentityState, IdentityWatch};
use crate::db::{Database, DocSnapshots};
use crate::default_avatar_url;
use crate::model::UserProfile;
use crate::AppResult;

/// Observable session state.
///
/// `loading` is true until the first identity notification has been
/// processed, whether or not an identity is present, then permanently false.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionState {
    pub loading: bool,
    pub identity: Option<Identity>,
    pub profile: Option<UserProfile>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            loading: true,
            identity: None,
            profile: None,
        }
    }
}

impl SessionState {
    #[must_use]
    pub const fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }
}

/// Handle to one running session. Dropping it (or calling [`Session::close`])
/// tears down the background task and with it both subscriptions.
pub struct Session {
    auth: Arc<dyn AuthBackend>,
    db: Database,
    state_rx: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl Session {
    /// Start a session over the given identity provider and database.
    #[must_use]
    pub fn start(auth: Arc<dyn AuthBackend>, db: Database) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        let identity_rx = auth.identity_changes();
        let task = tokio::spawn(run(identity_rx, db.clone(), state_tx));
        Self {
            auth,
            db,
            state_rx,
            task,
        }
    }

    /// Current state, as of the latest processed notification.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Watch state changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Authenticate. On success the session state updates asynchronously via
    /// the identity stream; the error for bad credentials carries a generic
    /// user-facing message.
    pub async fn login(&self, email: &str, password: &SecretString) -> AppResult<()> {
        self.auth.sign_in(email, password).await?;
        Ok(())
    }

    /// Register a new identity, then create its profile document with a
    /// pseudo-randomly selected default avatar.
    ///
    /// When profile creation fails after registration succeeded, the
    /// identity is left without a profile document; there is no retry or
    /// rollback here.
    pub async fn signup(
        &self,
        email: &str,
        password: &SecretString,
        username: &str,
    ) -> AppResult<()> {
        let identity = self.auth.register(email, password).await?;
        let avatar = default_avatar_url();
        self.db
            .create_user_profile(&identity.uid, email, username, &avatar)
            .await
    }

    /// Clear the authenticated identity. The background task tears the
    /// profile subscription down when the sign-out notification arrives.
    pub async fn logout(&self) -> AppResult<()> {
        self.auth.sign_out().await
    }

    /// Tear the session down. Safe to call more than once.
    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum Step {
    Identity(IdentityState),
    IdentityStreamClosed,
    Profile(Option<UserProfile>),
}

async fn run(
    mut identity_rx: IdentityWatch,
    db: Database,
    state_tx: watch::Sender<SessionState>,
) {
    let mut profile_sub: Option<DocSnapshots<UserProfile>> = None;

    // the stream may already hold a processed state, e.g. when the session
    // starts after login
    let initial = identity_rx.borrow_and_update().clone();
    apply_identity(&db, &state_tx, &mut profile_sub, initial);

    loop {
        let step = tokio::select! {
            changed = identity_rx.changed() => match changed {
                Ok(()) => Step::Identity(identity_rx.borrow_and_update().clone()),
                Err(_) => Step::IdentityStreamClosed,
            },
            profile = next_profile(&mut profile_sub) => Step::Profile(profile),
        };

        match step {
            Step::Identity(state) => {
                apply_identity(&db, &state_tx, &mut profile_sub, state);
            }
            Step::IdentityStreamClosed => {
                debug!("identity stream closed, session task ending");
                break;
            }
            Step::Profile(Some(profile)) => {
                debug!(uid = %profile.uid, "profile snapshot applied");
                state_tx.send_modify(|s| s.profile = Some(profile));
            }
            Step::Profile(None) => {
                // profile subscription ended without a replacement
                profile_sub = None;
            }
        }
    }
}

fn apply_identity(
    db: &Database,
    state_tx: &watch::Sender<SessionState>,
    profile_sub: &mut Option<DocSnapshots<UserProfile>>,
    state: IdentityState,
) {
    // the previous profile subscription is always cancelled before any
    // replacement is established
    if let Some(sub) = profile_sub.take() {
        sub.unsubscribe();
    }

    match state {
        IdentityState::Unknown => {
            // nothing processed yet; stay loading
        }
        IdentityState::SignedOut => {
            debug!("identity absent");
            state_tx.send_modify(|s| {
                s.loading = false;
                s.identity = None;
                s.profile = None;
            });
        }
        IdentityState::SignedIn(identity) => {
            debug!(uid = %identity.uid, "identity present");
            *profile_sub = Some(db.listen_user_profile(&identity.uid));
            state_tx.send_modify(|s| {
                s.loading = false;
                s.identity = Some(identity);
                s.profile = None;
            });
        }
    }
}

async fn next_profile(sub: &mut Option<DocSnapshots<UserProfile>>) -> Option<UserProfile> {
    match sub {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}
