//! In-memory implementation of the platform contracts.
//!
//! Behaves like the hosted platform as far as this crate can observe it:
//! strictly monotonic server timestamps, immediate initial snapshots, live
//! fan-out on every write, duplicate-email and bad-credential rejection.
//! Backs the test suite and any offline demo wiring.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::backend::auth::{AuthBackend, Identity, IdentityState, IdentityWatch};
use crate::backend::blobs::{BlobBackend, BlobHandle, BlobPath};
use crate::backend::docs::{Collection, Document, DocumentBackend, Order};
use crate::model::UserId;
use crate::sync::{self, SnapshotSender, Subscription};
use crate::{get_current_time_ms, AppError, AppResult, ErrorKind, ValidationError};

struct Account {
    uid: UserId,
    password: String,
}

#[derive(Clone)]
struct StoredDoc {
    id: String,
    data: Value,
}

impl StoredDoc {
    fn to_document(&self) -> Document {
        Document::new(self.id.clone(), self.data.clone())
    }

    fn created_at_ms(&self) -> u64 {
        self.data
            .get("createdAt")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

struct QueryListener {
    path: String,
    order: Order,
    tx: SnapshotSender<Vec<Document>>,
}

struct DocListener {
    path: String,
    id: String,
    tx: SnapshotSender<Document>,
}

struct State {
    accounts: HashMap<String, Account>,
    current: Option<Identity>,
    collections: HashMap<String, Vec<StoredDoc>>,
    query_listeners: Vec<QueryListener>,
    doc_listeners: Vec<DocListener>,
    blobs: HashMap<String, Bytes>,
    clock: u64,
}

impl State {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

pub struct MemoryBackend {
    state: Mutex<State>,
    identity_tx: watch::Sender<IdentityState>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        let (identity_tx, _) = watch::channel(IdentityState::Unknown);
        Self {
            state: Mutex::new(State {
                accounts: HashMap::new(),
                current: None,
                collections: HashMap::new(),
                query_listeners: Vec::new(),
                doc_listeners: Vec::new(),
                blobs: HashMap::new(),
                clock: get_current_time_ms(),
            }),
            identity_tx,
        }
    }

    /// Deliver the platform's initial identity notification. Until this is
    /// called the stream stays at `Unknown` and sessions report loading.
    pub fn connect(&self) {
        let current = self.locked().current.clone();
        self.publish_identity(match current {
            Some(identity) => IdentityState::SignedIn(identity),
            None => IdentityState::SignedOut,
        });
    }

    fn locked(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_identity(&self, state: IdentityState) {
        self.identity_tx.send_replace(state);
    }

    fn ordered_snapshot(docs: &[StoredDoc], order: Order) -> Vec<Document> {
        let mut docs: Vec<&StoredDoc> = docs.iter().collect();
        match order {
            Order::CreatedAtAsc => docs.sort_by(|a, b| a.created_at_ms().cmp(&b.created_at_ms())),
            Order::CreatedAtDesc => docs.sort_by(|a, b| b.created_at_ms().cmp(&a.created_at_ms())),
        }
        docs.into_iter().map(StoredDoc::to_document).collect()
    }

    /// Fan one write out to every live listener on the touched collection
    /// and document. Cancelled listeners are forgotten on the way.
    fn notify(state: &mut State, path: &str, id: &str) {
        state.query_listeners.retain(|l| !l.tx.is_cancelled());
        state.doc_listeners.retain(|l| !l.tx.is_cancelled());

        let docs: &[StoredDoc] = state.collections.get(path).map_or(&[], Vec::as_slice);
        for listener in state.query_listeners.iter().filter(|l| l.path == path) {
            listener.tx.deliver(Self::ordered_snapshot(docs, listener.order));
        }

        if let Some(doc) = docs.iter().find(|d| d.id == id) {
            for listener in state
                .doc_listeners
                .iter()
                .filter(|l| l.path == path && l.id == id)
            {
                listener.tx.deliver(doc.to_document());
            }
        }
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn sign_in(&self, email: &str, password: &SecretString) -> AppResult<Identity> {
        let identity = {
            let mut state = self.locked();
            let account = state.accounts.get(email).ok_or_else(|| {
                AppError::new(ErrorKind::Authentication, "no account for email")
            })?;
            if account.password != password.expose_secret().as_str() {
                return Err(AppError::new(ErrorKind::Authentication, "wrong password"));
            }
            let identity = Identity {
                uid: account.uid.clone(),
                email: email.to_owned(),
            };
            state.current = Some(identity.clone());
            identity
        };
        debug!(email, "signed in");
        self.publish_identity(IdentityState::SignedIn(identity.clone()));
        Ok(identity)
    }

    async fn register(&self, email: &str, password: &SecretString) -> AppResult<Identity> {
        if email.is_empty() || password.expose_secret().is_empty() {
            return Err(ValidationError::CredentialsRequired.into());
        }
        let identity = {
            let mut state = self.locked();
            if state.accounts.contains_key(email) {
                return Err(AppError::new(
                    ErrorKind::Authentication,
                    "email already registered",
                ));
            }
            let uid = UserId::new(Uuid::new_v4().to_string());
            state.accounts.insert(
                email.to_owned(),
                Account {
                    uid: uid.clone(),
                    password: password.expose_secret().clone(),
                },
            );
            let identity = Identity {
                uid,
                email: email.to_owned(),
            };
            state.current = Some(identity.clone());
            identity
        };
        debug!(email, "registered new identity");
        self.publish_identity(IdentityState::SignedIn(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> AppResult<()> {
        self.locked().current = None;
        debug!("signed out");
        self.publish_identity(IdentityState::SignedOut);
        Ok(())
    }

    fn identity_changes(&self) -> IdentityWatch {
        self.identity_tx.subscribe()
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn insert(&self, collection: &Collection, mut data: Value) -> AppResult<String> {
        let path = collection.path();
        let id = Uuid::new_v4().to_string();
        let mut state = self.locked();
        let created_at = state.tick();
        if let Some(map) = data.as_object_mut() {
            map.insert("createdAt".into(), Value::from(created_at));
        }
        state
            .collections
            .entry(path.clone())
            .or_default()
            .push(StoredDoc {
                id: id.clone(),
                data,
            });
        debug!(collection = %path, id, "inserted document");
        Self::notify(&mut state, &path, &id);
        Ok(id)
    }

    async fn set(&self, collection: &Collection, id: &str, mut data: Value) -> AppResult<()> {
        let path = collection.path();
        let mut state = self.locked();
        let created_at = state.tick();
        if let Some(map) = data.as_object_mut() {
            map.entry("createdAt").or_insert_with(|| Value::from(created_at));
        }
        let docs = state.collections.entry(path.clone()).or_default();
        match docs.iter_mut().find(|d| d.id == id) {
            Some(existing) => existing.data = data,
            None => docs.push(StoredDoc {
                id: id.to_owned(),
                data,
            }),
        }
        debug!(collection = %path, id, "set document");
        Self::notify(&mut state, &path, id);
        Ok(())
    }

    async fn merge(&self, collection: &Collection, id: &str, patch: Value) -> AppResult<()> {
        let path = collection.path();
        let mut state = self.locked();
        let doc = state
            .collections
            .get_mut(&path)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| {
                AppError::new(ErrorKind::Persistence, "cannot update a missing document")
            })?;
        if let (Some(target), Some(fields)) = (doc.data.as_object_mut(), patch.as_object()) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        debug!(collection = %path, id, "merged document fields");
        Self::notify(&mut state, &path, id);
        Ok(())
    }

    async fn get(&self, collection: &Collection, id: &str) -> AppResult<Option<Document>> {
        let path = collection.path();
        let state = self.locked();
        Ok(state
            .collections
            .get(&path)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .map(StoredDoc::to_document))
    }

    fn subscribe(&self, collection: &Collection, order: Order) -> Subscription<Vec<Document>> {
        let path = collection.path();
        let (tx, subscription) = sync::channel();
        let mut state = self.locked();
        let docs: &[StoredDoc] = state.collections.get(&path).map_or(&[], Vec::as_slice);
        tx.deliver(Self::ordered_snapshot(docs, order));
        state.query_listeners.push(QueryListener { path, order, tx });
        subscription
    }

    fn subscribe_doc(&self, collection: &Collection, id: &str) -> Subscription<Document> {
        let path = collection.path();
        let (tx, subscription) = sync::channel();
        let mut state = self.locked();
        if let Some(doc) = state
            .collections
            .get(&path)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
        {
            tx.deliver(doc.to_document());
        }
        state.doc_listeners.push(DocListener {
            path,
            id: id.to_owned(),
            tx,
        });
        subscription
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    async fn upload(&self, path: &BlobPath, bytes: Bytes) -> AppResult<BlobHandle> {
        let mut state = self.locked();
        state.blobs.insert(path.as_str().to_owned(), bytes);
        debug!(path = %path, "stored blob");
        Ok(BlobHandle::new(path.as_str()))
    }

    async fn resolve_url(&self, handle: &BlobHandle) -> AppResult<Url> {
        let state = self.locked();
        if !state.blobs.contains_key(handle.as_str()) {
            return Err(AppError::new(ErrorKind::NotFound, "unknown blob handle"));
        }
        Url::parse(&format!("memory://blobs/{}", handle.as_str())).map_err(|e| {
            AppError::new(ErrorKind::Internal, "blob handle is not a valid path")
                .with_internal(e.to_string())
        })
    }
}
