//! Typed data access over the document store.
//!
//! Thin wrappers, but the contracts matter: ordering is fixed per
//! collection, absence is a value, and a merge-update only ever touches the
//! fields it names.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::warn;

use crate::backend::{Collection, Document, DocumentBackend, Order};
use crate::model::{
    Case, CaseId, Comment, CommentId, NewCase, NewComment, ProfileUpdate, UserId, UserProfile,
};
use crate::sync::Subscription;
use crate::{AppError, AppResult, ErrorKind, ValidationError, MAX_CASE_PHOTOS};

/// Typed handle to the application's collections.
#[derive(Clone)]
pub struct Database {
    docs: Arc<dyn DocumentBackend>,
}

impl Database {
    #[must_use]
    pub fn new(docs: Arc<dyn DocumentBackend>) -> Self {
        Self { docs }
    }

    /// Create a new case. `photo_urls` may be empty; the server assigns the
    /// creation timestamp and the identifier.
    pub async fn create_case(
        &self,
        case: NewCase,
        photo_urls: Vec<String>,
    ) -> AppResult<CaseId> {
        if photo_urls.len() > MAX_CASE_PHOTOS {
            return Err(ValidationError::TooManyPhotos {
                max: MAX_CASE_PHOTOS,
            }
            .into());
        }
        let mut data = encode(&case)?;
        if let Some(map) = data.as_object_mut() {
            map.insert("photoUrls".into(), json!(photo_urls));
        }
        let id = self.docs.insert(&Collection::Cases, data).await?;
        Ok(CaseId::new(id))
    }

    /// One-shot fetch; `None` for an unknown identifier, never an error.
    pub async fn get_case(&self, id: &CaseId) -> AppResult<Option<Case>> {
        match self.docs.get(&Collection::Cases, id.as_str()).await? {
            Some(doc) => doc.decode().map(Some),
            None => Ok(None),
        }
    }

    /// Live feed of all cases, newest first.
    #[must_use]
    pub fn listen_cases(&self) -> Snapshots<Case> {
        Snapshots::new(self.docs.subscribe(&Collection::Cases, Order::CreatedAtDesc))
    }

    /// Add a comment under one case.
    pub async fn create_comment(
        &self,
        case_id: &CaseId,
        comment: NewComment,
    ) -> AppResult<CommentId> {
        let collection = Collection::Comments {
            case_id: case_id.clone(),
        };
        let id = self.docs.insert(&collection, encode(&comment)?).await?;
        Ok(CommentId::new(id))
    }

    /// Live thread of one case's comments, oldest first.
    #[must_use]
    pub fn listen_comments(&self, case_id: &CaseId) -> Snapshots<Comment> {
        let collection = Collection::Comments {
            case_id: case_id.clone(),
        };
        Snapshots::new(self.docs.subscribe(&collection, Order::CreatedAtAsc))
    }

    /// Create the profile document for a freshly registered identity.
    pub async fn create_user_profile(
        &self,
        uid: &UserId,
        email: &str,
        username: &str,
        avatar_url: &str,
    ) -> AppResult<()> {
        if username.trim().is_empty() {
            return Err(ValidationError::UsernameRequired.into());
        }
        let data = json!({
            "uid": uid,
            "email": email,
            "username": username,
            "avatarUrl": avatar_url,
        });
        self.docs.set(&Collection::Users, uid.as_str(), data).await
    }

    pub async fn get_user_profile(&self, uid: &UserId) -> AppResult<Option<UserProfile>> {
        match self.docs.get(&Collection::Users, uid.as_str()).await? {
            Some(doc) => doc.decode().map(Some),
            None => Ok(None),
        }
    }

    /// Live subscription to one profile document. Delivery begins as soon as
    /// the document exists.
    #[must_use]
    pub fn listen_user_profile(&self, uid: &UserId) -> DocSnapshots<UserProfile> {
        DocSnapshots::new(self.docs.subscribe_doc(&Collection::Users, uid.as_str()))
    }

    /// Merge only the supplied fields into the profile; anything unset in
    /// `update` survives untouched. An empty update is a no-op.
    pub async fn update_user_profile(
        &self,
        uid: &UserId,
        update: ProfileUpdate,
    ) -> AppResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        if let Some(username) = &update.username {
            if username.trim().is_empty() {
                return Err(ValidationError::UsernameRequired.into());
            }
        }
        let patch = encode(&update)?;
        self.docs
            .merge(&Collection::Users, uid.as_str(), patch)
            .await
    }
}

fn encode<T: serde::Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|e| {
        AppError::new(ErrorKind::Internal, "payload failed to encode")
            .with_internal(e.to_string())
    })
}

/// Typed snapshot stream over a live query. A document that fails to decode
/// is skipped with a warning; one bad write must not kill the feed.
pub struct Snapshots<T> {
    inner: Subscription<Vec<Document>>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Snapshots<T> {
    fn new(inner: Subscription<Vec<Document>>) -> Self {
        Self {
            inner,
            _entity: PhantomData,
        }
    }

    /// Next full snapshot, decoded; `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<Vec<T>> {
        let docs = self.inner.recv().await?;
        Some(
            docs.iter()
                .filter_map(|doc| match doc.decode::<T>() {
                    Ok(entity) => Some(entity),
                    Err(e) => {
                        warn!(id = %doc.id, error = %e, "skipping undecodable document");
                        None
                    }
                })
                .collect(),
        )
    }

    /// Release the subscription. Idempotent; dropping has the same effect.
    pub fn unsubscribe(&self) {
        self.inner.unsubscribe();
    }
}

/// Typed snapshot stream over a single document.
pub struct DocSnapshots<T> {
    inner: Subscription<Document>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> DocSnapshots<T> {
    fn new(inner: Subscription<Document>) -> Self {
        Self {
            inner,
            _entity: PhantomData,
        }
    }

    /// Next state of the document; `None` once unsubscribed. Undecodable
    /// writes are skipped.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let doc = self.inner.recv().await?;
            match doc.decode::<T>() {
                Ok(entity) => return Some(entity),
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "skipping undecodable document");
                }
            }
        }
    }

    pub fn unsubscribe(&self) {
        self.inner.unsubscribe();
    }
}
