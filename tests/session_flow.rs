use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::watch;
use tokio::time::timeout;

use reunite_core::{
    is_catalog_avatar, Database, MemoryBackend, ProfileUpdate, Session, SessionState,
};

fn setup() -> (Arc<MemoryBackend>, Database, Session) {
    let backend = Arc::new(MemoryBackend::new());
    let db = Database::new(backend.clone());
    let session = Session::start(backend.clone(), db.clone());
    (backend, db, session)
}

fn pw() -> SecretString {
    SecretString::new("hunter2".into())
}

async fn wait_for(
    rx: &mut watch::Receiver<SessionState>,
    pred: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("session state change timed out")
        .expect("session state stream closed")
        .clone()
}

#[tokio::test]
async fn loading_clears_after_first_identity_notification() {
    let (backend, _db, session) = setup();
    assert!(session.state().loading);

    backend.connect();
    let mut rx = session.watch();
    let state = wait_for(&mut rx, |s| !s.loading).await;
    assert!(state.identity.is_none());
    assert!(state.profile.is_none());
}

#[tokio::test]
async fn signup_creates_profile_with_catalog_avatar() {
    let (backend, _db, session) = setup();
    backend.connect();

    session.signup("a@x.com", &pw(), "alice").await.unwrap();

    let mut rx = session.watch();
    let state = wait_for(&mut rx, |s| s.profile.is_some()).await;

    let identity = state.identity.unwrap();
    let profile = state.profile.unwrap();
    assert_eq!(profile.uid, identity.uid);
    assert_eq!(profile.email, "a@x.com");
    assert_eq!(profile.username, "alice");
    assert!(is_catalog_avatar(profile.avatar_url.as_deref().unwrap()));
    assert!(profile.created_at.is_some());
}

#[tokio::test]
async fn login_after_logout_restores_the_same_profile() {
    let (backend, _db, session) = setup();
    backend.connect();

    session.signup("a@x.com", &pw(), "alice").await.unwrap();
    let mut rx = session.watch();
    let first = wait_for(&mut rx, |s| s.profile.is_some()).await;
    let first_profile = first.profile.unwrap();

    session.logout().await.unwrap();
    wait_for(&mut rx, |s| !s.loading && s.identity.is_none() && s.profile.is_none()).await;

    session.login("a@x.com", &pw()).await.unwrap();
    let again = wait_for(&mut rx, |s| s.profile.is_some()).await;
    let again_profile = again.profile.unwrap();

    assert_eq!(again_profile.uid, first_profile.uid);
    assert_eq!(again_profile.username, "alice");
    assert_eq!(again_profile.avatar_url, first_profile.avatar_url);
}

#[tokio::test]
async fn bad_credentials_surface_a_generic_message() {
    let (backend, _db, session) = setup();
    backend.connect();

    let err = session.login("ghost@x.com", &pw()).await.unwrap_err();
    assert_eq!(err.user_facing_message(), "Invalid email or password.");
}

#[tokio::test]
async fn username_update_never_touches_the_avatar() {
    let (backend, db, session) = setup();
    backend.connect();

    session.signup("a@x.com", &pw(), "alice").await.unwrap();
    let mut rx = session.watch();
    let state = wait_for(&mut rx, |s| s.profile.is_some()).await;
    let profile = state.profile.unwrap();
    let original_avatar = profile.avatar_url.clone();

    db.update_user_profile(&profile.uid, ProfileUpdate::username("carol"))
        .await
        .unwrap();

    let state = wait_for(&mut rx, |s| {
        s.profile.as_ref().is_some_and(|p| p.username == "carol")
    })
    .await;
    assert_eq!(state.profile.unwrap().avatar_url, original_avatar);
}

#[tokio::test]
async fn profile_subscription_swaps_with_the_identity() {
    let (backend, db, session) = setup();
    backend.connect();

    session.signup("a@x.com", &pw(), "alice").await.unwrap();
    let mut rx = session.watch();
    let alice = wait_for(&mut rx, |s| s.profile.is_some()).await;
    let alice_uid = alice.profile.unwrap().uid;

    session.logout().await.unwrap();
    wait_for(&mut rx, |s| s.identity.is_none() && s.profile.is_none()).await;

    session.signup("b@x.com", &pw(), "bob").await.unwrap();
    let bob = wait_for(&mut rx, |s| {
        s.profile.as_ref().is_some_and(|p| p.username == "bob")
    })
    .await;
    let bob_uid = bob.profile.unwrap().uid;
    assert_ne!(bob_uid, alice_uid);

    // a write to the previous identity's profile must not leak into the
    // session: that subscription was cancelled on the identity change
    db.update_user_profile(&alice_uid, ProfileUpdate::username("intruder"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let current = session.state();
    assert_eq!(current.profile.unwrap().uid, bob_uid);
}

#[tokio::test]
async fn closed_session_stops_reacting() {
    let (backend, _db, session) = setup();
    backend.connect();
    let mut rx = session.watch();
    wait_for(&mut rx, |s| !s.loading).await;

    session.close();
    tokio::time::sleep(Duration::from_millis(20)).await;

    session.signup("a@x.com", &pw(), "alice").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(session.state().identity.is_none());
}
