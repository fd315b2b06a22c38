//! Minimal JSON document storage: named collections of documents keyed by
//! string id.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::StoreError;

/// Selects documents by id prefix and/or top-level field equality.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub id_prefix: Option<String>,
    pub equals: Vec<(String, Value)>,
}

impl Filter {
    pub fn id_prefix(prefix: impl Into<String>) -> Self {
        Self {
            id_prefix: Some(prefix.into()),
            equals: Vec::new(),
        }
    }

    pub fn field_eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.equals.push((field.into(), value));
        self
    }

    fn matches_id(&self, id: &str) -> bool {
        self.id_prefix.as_deref().is_none_or(|p| id.starts_with(p))
    }

    pub fn matches(&self, id: &str, doc: &Value) -> bool {
        self.matches_id(id)
            && self
                .equals
                .iter()
                .all(|(field, value)| doc.get(field) == Some(value))
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts or replaces the document.
    async fn upsert(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError>;

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Matching documents, ordered by id.
    async fn find_by_filter(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<(String, Value)>, StoreError>;

    /// Returns whether a document was removed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;
}

fn check_id(id: &str) -> Result<(), StoreError> {
    let ok = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

/// One pretty-printed JSON file per document at
/// `<root>/<collection>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn doc_path(&self, collection: &str, id: &str) -> Result<PathBuf, StoreError> {
        check_id(collection)?;
        check_id(id)?;
        Ok(self.root.join(collection).join(format!("{}.json", id)))
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn upsert(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError> {
        let path = self.doc_path(collection, id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(doc)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let path = self.doc_path(collection, id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_filter(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        check_id(collection)?;
        let dir = self.root.join(collection);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if !filter.matches_id(&id) {
                continue;
            }
            let bytes = fs::read(&path).await?;
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(doc) if filter.matches(&id, &doc) => out.push((id, doc)),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable document"),
            }
        }

        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let path = self.doc_path(collection, id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError> {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc.clone());
        Ok(())
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn find_by_filter(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(id, doc)| filter.matches(id, doc))
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .collections
            .write()
            .await
            .get_mut(collection)
            .is_some_and(|docs| docs.remove(id).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn exercise(store: &dyn DocumentStore) {
        store.upsert("sets", "alpha--set-001", &json!({"status": "success"})).await.unwrap();
        store.upsert("sets", "alpha--set-002", &json!({"status": "failed"})).await.unwrap();
        store.upsert("sets", "beta--set-001", &json!({"status": "failed"})).await.unwrap();

        let doc = store.find_by_id("sets", "alpha--set-002").await.unwrap().unwrap();
        assert_eq!(doc["status"], "failed");
        assert!(store.find_by_id("sets", "gamma--set-001").await.unwrap().is_none());

        let alpha = store.find_by_filter("sets", &Filter::id_prefix("alpha--")).await.unwrap();
        let ids: Vec<&str> = alpha.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["alpha--set-001", "alpha--set-002"]);

        let failed = store
            .find_by_filter("sets", &Filter::default().field_eq("status", json!("failed")))
            .await
            .unwrap();
        assert_eq!(failed.len(), 2);

        store.upsert("sets", "alpha--set-002", &json!({"status": "success"})).await.unwrap();
        let doc = store.find_by_id("sets", "alpha--set-002").await.unwrap().unwrap();
        assert_eq!(doc["status"], "success");

        assert!(store.delete("sets", "alpha--set-001").await.unwrap());
        assert!(!store.delete("sets", "alpha--set-001").await.unwrap());
        assert!(store.find_by_filter("nothing", &Filter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_store_crud() {
        exercise(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn file_store_crud() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FileStore::new(dir.path())).await;
        assert!(dir.path().join("sets/beta--set-001.json").is_file());
        assert!(!dir.path().join("sets/alpha--set-002.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        for bad in ["../escape", "a/b", "", ".hidden"] {
            let err = store.upsert("jobs", bad, &json!({})).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidId(_)));
        }
    }

    #[tokio::test]
    async fn file_store_reports_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("jobs")).unwrap();
        std::fs::write(dir.path().join("jobs/broken.json"), "{not json").unwrap();

        assert!(matches!(
            store.find_by_id("jobs", "broken").await,
            Err(StoreError::Encoding(_))
        ));
        assert!(store.find_by_filter("jobs", &Filter::default()).await.unwrap().is_empty());
    }
}
