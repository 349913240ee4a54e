//! Document store contract: schemaless JSON documents in ordered
//! collections with live-query subscriptions.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::model::CaseId;
use crate::sync::Subscription;
use crate::{AppError, AppResult, ErrorKind};

/// The three logical collections this application stores.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    Cases,
    Comments { case_id: CaseId },
    Users,
}

impl Collection {
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Cases => "cases".into(),
            Self::Comments { case_id } => format!("cases/{case_id}/comments"),
            Self::Users => "users".into(),
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// Ordering of a live query, always over the server-assigned creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Order {
    CreatedAtAsc,
    CreatedAtDesc,
}

/// One stored document: its key plus the raw JSON data. The creation
/// timestamp lives inside `data` under `createdAt`.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    #[must_use]
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Server-assigned creation time in milliseconds, if already resolved.
    #[must_use]
    pub fn created_at_ms(&self) -> Option<u64> {
        self.data.get("createdAt").and_then(Value::as_u64)
    }

    /// Decode into a typed entity, injecting the document key as `id`.
    pub fn decode<T: DeserializeOwned>(&self) -> AppResult<T> {
        let mut data = self.data.clone();
        if let Some(map) = data.as_object_mut() {
            map.insert("id".into(), Value::String(self.id.clone()));
        }
        serde_json::from_value(data).map_err(|e| {
            AppError::new(ErrorKind::Internal, "stored document failed to decode")
                .with_internal(e.to_string())
        })
    }
}

/// Document store operations consumed by the data access layer.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Insert a new document under a generated key. The store assigns the
    /// `createdAt` server timestamp, monotonically non-decreasing across
    /// inserts; a document key is never reused.
    async fn insert(&self, collection: &Collection, data: Value) -> AppResult<String>;

    /// Write a document at a caller-chosen key, replacing any previous
    /// content. `createdAt` is assigned when the payload lacks it.
    async fn set(&self, collection: &Collection, id: &str, data: Value) -> AppResult<()>;

    /// Merge the supplied fields into an existing document; fields not in
    /// `patch` are left untouched. Fails when the document does not exist.
    async fn merge(&self, collection: &Collection, id: &str, patch: Value) -> AppResult<()>;

    /// One-shot fetch. Absence is a value, never an error.
    async fn get(&self, collection: &Collection, id: &str) -> AppResult<Option<Document>>;

    /// Live query over a whole collection. Delivers the full ordered result
    /// set immediately and again after every change, until unsubscribed.
    fn subscribe(&self, collection: &Collection, order: Order) -> Subscription<Vec<Document>>;

    /// Live subscription to a single document. Delivers the current content
    /// immediately when the document exists, then on every write. A document
    /// created after subscribing is delivered as well.
    fn subscribe_doc(&self, collection: &Collection, id: &str) -> Subscription<Document>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Case;
    use serde_json::json;

    #[test]
    fn collection_paths() {
        assert_eq!(Collection::Cases.path(), "cases");
        assert_eq!(Collection::Users.path(), "users");
        assert_eq!(
            Collection::Comments {
                case_id: CaseId::new("c1")
            }
            .path(),
            "cases/c1/comments"
        );
    }

    #[test]
    fn decode_injects_document_key() {
        let doc = Document::new(
            "c1",
            json!({
                "title": "T",
                "description": "D",
                "reporterId": "u1",
                "reporterName": "alice",
                "createdAt": 7,
                "photoUrls": [],
            }),
        );
        assert_eq!(doc.created_at_ms(), Some(7));

        let case: Case = doc.decode().unwrap();
        assert_eq!(case.id, CaseId::new("c1"));
        assert_eq!(case.title, "T");
    }

    #[test]
    fn decode_failure_is_internal() {
        let doc = Document::new("c1", json!({ "title": 17 }));
        let err = doc.decode::<Case>().unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::Internal);
    }
}
