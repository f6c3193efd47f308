//! One JSON file per collection under a base directory, each access done
//! under an `fs2` file lock.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use super::{merge_into, new_document_id, Document, DocumentStore, Query, StoredDocument};
use crate::{Error, Result};

type Collection = BTreeMap<String, Document>;

#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    dir: PathBuf,
}

impl FileDocumentStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn collection_path(&self, collection: &str) -> Result<PathBuf> {
        let valid = !collection.is_empty()
            && collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(Error::InvalidArgument(format!(
                "Invalid collection name '{}'",
                collection
            )));
        }
        Ok(self.dir.join(format!("{}.json", collection)))
    }

    fn parse(content: &str) -> Result<Collection> {
        if content.trim().is_empty() {
            return Ok(Collection::new());
        }
        Ok(serde_json::from_str(content)?)
    }

    fn read(&self, collection: &str) -> Result<Collection> {
        let path = self.collection_path(collection)?;
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Collection::new()),
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()
            .map_err(|e| Error::Document(format!("Failed to lock {}: {}", path.display(), e)))?;
        let mut content = String::new();
        let read = file.read_to_string(&mut content);
        let _ = file.unlock();
        read?;
        Self::parse(&content)
    }

    fn modify<T, F>(&self, collection: &str, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Collection) -> Result<T>,
    {
        let path = self.collection_path(collection)?;
        fs::create_dir_all(&self.dir)?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.lock_exclusive()
            .map_err(|e| Error::Document(format!("Failed to lock {}: {}", path.display(), e)))?;

        let result = (|| -> Result<T> {
            let mut content = String::new();
            file.read_to_string(&mut content)?;
            let mut docs = Self::parse(&content)?;

            let value = apply(&mut docs)?;

            let serialized = serde_json::to_string_pretty(&docs)?;
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(serialized.as_bytes())?;
            file.flush()?;
            Ok(value)
        })();

        let _ = file.unlock();
        result
    }
}

impl DocumentStore for FileDocumentStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        Ok(self
            .read(collection)?
            .remove(id)
            .map(|data| StoredDocument {
                id: id.to_string(),
                data,
            }))
    }

    fn query(&self, collection: &str, query: &Query) -> Result<Vec<StoredDocument>> {
        let docs = self.read(collection)?;
        Ok(query.apply(
            docs.into_iter()
                .map(|(id, data)| StoredDocument { id, data }),
        ))
    }

    fn set(&self, collection: &str, id: &str, data: Document) -> Result<()> {
        self.modify(collection, |docs| {
            docs.insert(id.to_string(), data);
            Ok(())
        })
    }

    fn add(&self, collection: &str, data: Document) -> Result<String> {
        self.modify(collection, |docs| {
            let id = new_document_id();
            docs.insert(id.clone(), data);
            Ok(id)
        })
    }

    fn update(&self, collection: &str, id: &str, partial: Document) -> Result<()> {
        self.modify(collection, |docs| merge_into(docs, collection, id, partial))
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.modify(collection, |docs| {
            docs.remove(id);
            Ok(())
        })
    }
}
