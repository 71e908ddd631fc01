use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    error::{FlowError, Result},
    models::{Document, Patient},
    seed,
};

pub const PATIENTS_KEY: &str = "medical_patients";
pub const UPLOADS_KEY: &str = "medical_uploads";

/// Trait for a flat key-value store holding whole JSON collections
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Persistence port of the review queue. Each collection is loaded and
/// saved as a whole.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load_patients(&self) -> Result<Vec<Patient>>;
    async fn save_patients(&self, patients: &[Patient]) -> Result<()>;
    async fn load_documents(&self) -> Result<Vec<Document>>;
    async fn save_documents(&self, documents: &[Document]) -> Result<()>;
}

/// In-memory implementation of KeyValueStore
#[derive(Clone, Default)]
pub struct InMemoryKeyValueStore {
    entries: Arc<DashMap<String, Value>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).map(|entry| entry.clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// File-backed KeyValueStore: one pretty-printed JSON file per key
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(FlowError::StorageError(format!("invalid key '{}'", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write next to the target and rename so readers never see half a file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&value)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// RecordStore on top of any KeyValueStore. Missing collections are seeded
/// with the demo data and written back on first load.
#[derive(Clone)]
pub struct KeyValueRecordStore {
    store: Arc<dyn KeyValueStore>,
}

impl KeyValueRecordStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryKeyValueStore::new()))
    }

    async fn load_or_seed<T>(&self, key: &str, seed: impl FnOnce() -> Vec<T>) -> Result<Vec<T>>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        if let Some(value) = self.store.get(key).await? {
            return Ok(serde_json::from_value(value)?);
        }

        let seeded = seed();
        info!("Seeding '{}' with {} demo entries", key, seeded.len());
        self.store.set(key, serde_json::to_value(&seeded)?).await?;
        Ok(seeded)
    }
}

#[async_trait]
impl RecordStore for KeyValueRecordStore {
    async fn load_patients(&self) -> Result<Vec<Patient>> {
        self.load_or_seed(PATIENTS_KEY, seed::patients).await
    }

    async fn save_patients(&self, patients: &[Patient]) -> Result<()> {
        self.store
            .set(PATIENTS_KEY, serde_json::to_value(patients)?)
            .await
    }

    async fn load_documents(&self) -> Result<Vec<Document>> {
        self.load_or_seed(UPLOADS_KEY, seed::uploads).await
    }

    async fn save_documents(&self, documents: &[Document]) -> Result<()> {
        self.store
            .set(UPLOADS_KEY, serde_json::to_value(documents)?)
            .await
    }
}
