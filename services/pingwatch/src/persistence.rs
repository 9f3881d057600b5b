//! Durable storage for URL statuses

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::status::UrlStatus;
use crate::PingwatchError;

/// Abstraction over the durable state representation for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait StatePersistence: Send + Sync {
    /// Read every stored status. A missing store yields an empty map.
    async fn load(&self) -> crate::Result<HashMap<String, UrlStatus>>;

    /// Replace the stored statuses with `statuses`
    async fn save(&self, statuses: &HashMap<String, UrlStatus>) -> crate::Result<()>;
}

/// Statuses kept as one JSON object keyed by URL
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl StatePersistence for JsonFilePersistence {
    async fn load(&self) -> crate::Result<HashMap<String, UrlStatus>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("State file does not exist: {:?}", self.path);
                return Ok(HashMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        let entries: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&content)?;

        let mut statuses = HashMap::with_capacity(entries.len());
        for (url, mut value) in entries {
            // The key is the identity; older records may omit the url field
            if let Some(object) = value.as_object_mut() {
                object
                    .entry("url")
                    .or_insert_with(|| serde_json::Value::String(url.clone()));
            }
            match serde_json::from_value::<UrlStatus>(value) {
                Ok(mut status) => {
                    status.url = url.clone();
                    statuses.insert(url, status);
                }
                Err(e) => tracing::warn!("Skipping malformed state entry for {}: {}", url, e),
            }
        }

        tracing::info!("Loaded state for {} URLs from {:?}", statuses.len(), self.path);
        Ok(statuses)
    }

    async fn save(&self, statuses: &HashMap<String, UrlStatus>) -> crate::Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        let ordered: BTreeMap<&String, &UrlStatus> = statuses.iter().collect();
        let json = serde_json::to_vec_pretty(&ordered)?;

        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            PingwatchError::Persistence(format!(
                "Replacing {:?} with {:?}: {}",
                self.path, temp, e
            ))
        })?;

        tracing::debug!("Saved state for {} URLs", statuses.len());
        Ok(())
    }
}
