//! JSON-file-backed credential store
//!
//! The whole store is one JSON object of string values. Every write goes to a
//! temporary sibling first and is renamed over the original, so a crash never
//! leaves a half-written file behind. Writers are serialized by an async
//! mutex; the parsed map is cached after the first read.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use unimoghub_common::{CommonError, CommonResult};
use unimoghub_core::CredentialStore;

type Entries = BTreeMap<String, String>;

/// Credential store persisted to a JSON file
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    cache: Mutex<Option<Entries>>,
}

impl FileCredentialStore {
    /// Store backed by `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), cache: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> CommonResult<Entries> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Credential file missing, starting empty");
                return Ok(Entries::new());
            }
            Err(err) => return Err(CommonError::persistence_op("read", err.to_string())),
        };

        if raw.trim().is_empty() {
            return Ok(Entries::new());
        }

        serde_json::from_str(&raw).map_err(|err| {
            warn!(path = %self.path.display(), error = %err, "Credential file is corrupt");
            CommonError::serialization_format("json", err.to_string())
        })
    }

    async fn write_entries(&self, entries: &Entries) -> CommonResult<()> {
        let data = serde_json::to_vec_pretty(entries)
            .map_err(|err| CommonError::serialization_format("json", err.to_string()))?;
        let temp_path = self.path.with_extension("tmp");

        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| CommonError::persistence_op("create_dir", err.to_string()))?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .await
            .map_err(|err| CommonError::persistence_op("open", err.to_string()))?;
        file.write_all(&data).await.map_err(|err| CommonError::persistence_op("write", err.to_string()))?;
        file.sync_all().await.map_err(|err| CommonError::persistence_op("sync", err.to_string()))?;
        drop(file);

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|err| CommonError::persistence_op("rename", err.to_string()))?;

        debug!(path = %self.path.display(), entries = entries.len(), "Credential file written");
        Ok(())
    }

    /// Apply `change` to the entries and persist the result
    async fn update<F>(&self, change: F) -> CommonResult<()>
    where
        F: FnOnce(&mut Entries) -> bool + Send,
    {
        let mut cache = self.cache.lock().await;
        let mut entries = match cache.take() {
            Some(entries) => entries,
            None => self.read_entries().await?,
        };

        let changed = change(&mut entries);
        let written = if changed { self.write_entries(&entries).await } else { Ok(()) };
        if written.is_ok() {
            *cache = Some(entries);
        }
        written
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: &str) -> CommonResult<Option<String>> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_entries().await?);
        }
        Ok(cache.as_ref().and_then(|entries| entries.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: &str) -> CommonResult<()> {
        self.update(|entries| {
            let previous = entries.insert(key.to_string(), value.to_string());
            previous.as_deref() != Some(value)
        })
        .await
    }

    async fn remove(&self, key: &str) -> CommonResult<()> {
        self.update(|entries| entries.remove(key).is_some()).await
    }

    async fn keys(&self) -> CommonResult<Vec<String>> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_entries().await?);
        }
        Ok(cache.as_ref().map(|entries| entries.keys().cloned().collect()).unwrap_or_default())
    }
}
