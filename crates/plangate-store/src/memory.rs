//! In-process document store.
//!
//! Backs `plangate serve --store memory` for local development and the
//! gateway's unit tests. Contents are lost when the process exits.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::models::{CollectionPath, Document, DocumentRef, ResolvedWrite, WriteFields};
use crate::store::{DocumentStore, StoreError, generate_document_id, validate_document_id};

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    values: Map<String, Value>,
    timestamps: BTreeMap<String, DateTime<Utc>>,
}

impl Entry {
    /// Apply a resolved write on top of the current fields.
    fn apply(&mut self, write: ResolvedWrite) {
        for (name, value) in write.values {
            self.timestamps.remove(&name);
            self.values.insert(name, value);
        }
        for (name, ts) in write.timestamps {
            self.values.remove(&name);
            self.timestamps.insert(name, ts);
        }
    }

    fn snapshot(&self, id: &str) -> Document {
        Document::from_parts(id, self.values.clone(), self.timestamps.clone())
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    last_tick: Option<DateTime<Utc>>,
    docs: BTreeMap<DocumentRef, Entry>,
}

impl Inner {
    /// The store clock. Strictly increasing so successive writes are ordered
    /// even when the wall clock has coarse resolution.
    fn tick(&mut self) -> DateTime<Utc> {
        let wall = Utc::now();
        let now = match self.last_tick {
            Some(last) if wall <= last => last + Duration::microseconds(1),
            _ => wall,
        };
        self.last_tick = Some(now);
        now
    }

    fn insert(&mut self, doc: DocumentRef, write: ResolvedWrite) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let mut entry = Entry {
            seq,
            values: Map::new(),
            timestamps: BTreeMap::new(),
        };
        entry.apply(write);
        self.docs.insert(doc, entry);
    }
}

/// A [`DocumentStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents across all collections.
    pub async fn len(&self) -> usize {
        self.inner.read().await.docs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        validate_document_id(&doc.id)?;
        let inner = self.inner.read().await;
        Ok(inner.docs.get(doc).map(|entry| entry.snapshot(&doc.id)))
    }

    async fn create(
        &self,
        collection: &CollectionPath,
        fields: &WriteFields,
    ) -> Result<DocumentRef, StoreError> {
        let mut inner = self.inner.write().await;
        let doc = loop {
            let candidate = collection.doc(generate_document_id());
            if !inner.docs.contains_key(&candidate) {
                break candidate;
            }
        };
        let now = inner.tick();
        inner.insert(doc.clone(), fields.resolve(now));
        Ok(doc)
    }

    async fn update(&self, doc: &DocumentRef, fields: &WriteFields) -> Result<(), StoreError> {
        validate_document_id(&doc.id)?;
        let mut inner = self.inner.write().await;
        let now = inner.tick();
        let entry = inner
            .docs
            .get_mut(doc)
            .ok_or_else(|| StoreError::NotFound(doc.to_string()))?;
        entry.apply(fields.resolve(now));
        Ok(())
    }

    async fn set_merge(&self, doc: &DocumentRef, fields: &WriteFields) -> Result<(), StoreError> {
        validate_document_id(&doc.id)?;
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let now = inner.tick();
        let write = fields.resolve(now);
        match inner.docs.get_mut(doc) {
            Some(entry) => entry.apply(write),
            None => inner.insert(doc.clone(), write),
        }
        Ok(())
    }

    async fn delete(&self, doc: &DocumentRef) -> Result<(), StoreError> {
        validate_document_id(&doc.id)?;
        self.inner.write().await.docs.remove(doc);
        Ok(())
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>, StoreError> {
        let inner = self.inner.read().await;
        let mut entries: Vec<(&DocumentRef, &Entry)> = inner
            .docs
            .iter()
            .filter(|(doc, _)| &doc.collection == collection)
            .collect();
        entries.sort_by_key(|(_, entry)| entry.seq);
        Ok(entries
            .into_iter()
            .map(|(doc, entry)| entry.snapshot(&doc.id))
            .collect())
    }
}
