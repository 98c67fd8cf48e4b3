//! Hierarchical document storage for plangate.
//!
//! [`store::DocumentStore`] is the backend-neutral interface; [`postgres`]
//! and [`memory`] provide the two implementations.

pub mod memory;
pub mod models;
pub mod pool;
pub mod postgres;
pub mod store;
pub mod target;

pub use models::{CollectionPath, Document, DocumentRef, FieldValue, WriteFields, WriteValue};
pub use store::{DocumentStore, StoreError};
pub use target::{DbTarget, DbTargetError};
