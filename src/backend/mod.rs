//! Client contracts of the hosted backend platform.
//!
//! The real platform (identity provider, document store with live queries,
//! blob storage) lives out of process; this crate only ever talks to it
//! through these traits. [`MemoryBackend`] implements all three in process
//! and backs the test suite.

mod auth;
mod blobs;
mod docs;
mod memory;

pub use self::auth::{AuthBackend, Identity, IdentityState, IdentityWatch};
pub use self::blobs::{avatar_path, case_photo_path, unique_blob_name, BlobBackend, BlobHandle, BlobPath};
pub use self::docs::{Collection, Document, DocumentBackend, Order};
pub use self::memory::MemoryBackend;
