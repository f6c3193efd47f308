//! Document store: named collections of JSON documents keyed by id.
//!
//! Used for game results and per-user settings. `MemoryDocumentStore` backs
//! tests and ephemeral runs, `FileDocumentStore` keeps one JSON file per
//! collection.

pub mod file;
pub mod game_results;
pub mod memory;
pub mod query;
pub mod settings;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

pub use file::FileDocumentStore;
pub use game_results::{
    average_score, DeviceInfo, GameResult, GameResults, StageChoice, TopScore,
};
pub use memory::MemoryDocumentStore;
pub use query::{Direction, Filter, FilterOp, Query};
pub use settings::{Theme, UserSettings, UserSettingsRepo};

pub type Document = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

impl StoredDocument {
    /// Deserialize the document with its id merged in as `id`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        let mut data = self.data;
        data.insert("id".to_string(), Value::String(self.id));
        Ok(serde_json::from_value(Value::Object(data))?)
    }
}

/// Serialize a record into document fields, dropping its `id`.
pub fn encode<T: Serialize>(record: &T) -> Result<Document> {
    match serde_json::to_value(record)? {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(Error::Document(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

pub trait DocumentStore: Send + Sync {
    fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>>;
    fn query(&self, collection: &str, query: &Query) -> Result<Vec<StoredDocument>>;
    /// Create or replace the document with the given id.
    fn set(&self, collection: &str, id: &str, data: Document) -> Result<()>;
    /// Insert under a new generated id and return it.
    fn add(&self, collection: &str, data: Document) -> Result<String>;
    /// Shallow-merge `partial` into an existing document.
    fn update(&self, collection: &str, id: &str, partial: Document) -> Result<()>;
    fn delete(&self, collection: &str, id: &str) -> Result<()>;
}

pub(crate) fn new_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Shared `update` semantics over an in-memory collection.
pub(crate) fn merge_into(
    docs: &mut std::collections::BTreeMap<String, Document>,
    collection: &str,
    id: &str,
    partial: Document,
) -> Result<()> {
    let existing = docs
        .get_mut(id)
        .ok_or_else(|| Error::NotFound(format!("document {}/{}", collection, id)))?;
    existing.extend(partial);
    Ok(())
}
