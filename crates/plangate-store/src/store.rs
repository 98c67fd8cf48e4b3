//! The `DocumentStore` trait -- the seam between the gateway and a backend.
//!
//! Backends implement a small hierarchical document model: documents live in
//! collections addressed by slash-separated paths, and any document may own
//! nested sub-collections. The trait is object-safe so the gateway can hold
//! an `Arc<dyn DocumentStore>` regardless of backend.

use async_trait::async_trait;
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::models::{CollectionPath, Document, DocumentRef, WriteFields};

/// Length of store-generated document ids.
pub const GENERATED_ID_LEN: usize = 20;

/// Errors raised by document store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document {0} not found")]
    NotFound(String),

    #[error("invalid document id {0:?}")]
    InvalidId(String),

    #[error("could not allocate a document id in {0}")]
    IdAllocation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Hierarchical key-document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs (e.g. "postgres").
    fn name(&self) -> &str;

    /// Fetch a document, or `None` if it does not exist.
    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError>;

    /// Insert a new document with a store-generated id.
    async fn create(
        &self,
        collection: &CollectionPath,
        fields: &WriteFields,
    ) -> Result<DocumentRef, StoreError>;

    /// Overwrite the named fields of an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] when the document does not exist.
    async fn update(&self, doc: &DocumentRef, fields: &WriteFields) -> Result<(), StoreError>;

    /// Merge-patch: union `fields` into the document, creating it if absent.
    ///
    /// Payload fields overwrite existing ones; fields not named in the
    /// payload are left untouched.
    async fn set_merge(&self, doc: &DocumentRef, fields: &WriteFields) -> Result<(), StoreError>;

    /// Delete a document. Deleting a missing document is not an error.
    ///
    /// Sub-collections are not touched.
    async fn delete(&self, doc: &DocumentRef) -> Result<(), StoreError>;

    /// Every document directly inside `collection`, oldest first.
    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>, StoreError>;
}

// Compile-time assertion: DocumentStore must be usable as `dyn DocumentStore`.
const _: () = {
    fn _assert_object_safe(_: &dyn DocumentStore) {}
};

/// Generate a random document id of [`GENERATED_ID_LEN`] ASCII alphanumerics.
pub fn generate_document_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_ID_LEN)
        .map(char::from)
        .collect()
}

/// Reject ids that are empty or would alter the collection hierarchy.
pub fn validate_document_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() || id.contains('/') {
        return Err(StoreError::InvalidId(id.to_owned()));
    }
    Ok(())
}
