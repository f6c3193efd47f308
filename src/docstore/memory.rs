use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{merge_into, new_document_id, Document, DocumentStore, Query, StoredDocument};
use crate::{Error, Result};

type Collections = HashMap<String, BTreeMap<String, Document>>;

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<Collections>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>> {
        self.collections
            .lock()
            .map_err(|_| Error::Document("memory document store poisoned".to_string()))
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        Ok(self
            .lock()?
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| StoredDocument {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    fn query(&self, collection: &str, query: &Query) -> Result<Vec<StoredDocument>> {
        let guard = self.lock()?;
        let Some(docs) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(query.apply(docs.iter().map(|(id, data)| StoredDocument {
            id: id.clone(),
            data: data.clone(),
        })))
    }

    fn set(&self, collection: &str, id: &str, data: Document) -> Result<()> {
        self.lock()?
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    fn add(&self, collection: &str, data: Document) -> Result<String> {
        let id = new_document_id();
        self.set(collection, &id, data)?;
        Ok(id)
    }

    fn update(&self, collection: &str, id: &str, partial: Document) -> Result<()> {
        let mut guard = self.lock()?;
        let docs = guard.entry(collection.to_string()).or_default();
        merge_into(docs, collection, id, partial)
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        if let Some(docs) = self.lock()?.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }
}
