use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, warn};

use crate::models::approval::{AdminRecord, ApprovedIdentity, PendingRequest};
use crate::repositories::approval_repo::{ApprovalStore, Collection};

#[derive(Debug, Clone)]
pub struct StorePaths {
    pub pending: PathBuf,
    pub approved: PathBuf,
    pub admins: PathBuf,
}

impl StorePaths {
    pub fn validate(&self) -> Result<()> {
        for collection in Collection::ALL {
            if self.get(collection).as_os_str().is_empty() {
                bail!("{} file path is not set", collection.label());
            }
        }
        Ok(())
    }

    fn get(&self, collection: Collection) -> &Path {
        match collection {
            Collection::Pending => &self.pending,
            Collection::Approved => &self.approved,
            Collection::Admins => &self.admins,
        }
    }
}

/// Keeps each collection as a pretty-printed JSON array in its own file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    paths: StorePaths,
}

impl JsonFileStore {
    pub fn new(paths: StorePaths) -> Self {
        Self { paths }
    }

    /// Creates missing collection files as empty lists.
    pub async fn materialize(&self) -> Result<()> {
        for collection in Collection::ALL {
            self.ensure_exists(collection).await?;
        }
        Ok(())
    }

    async fn ensure_exists(&self, collection: Collection) -> Result<bool> {
        let path = self.paths.get(collection);
        let exists = fs::try_exists(path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        if exists {
            return Ok(false);
        }

        write_replacing(path, b"[]").await?;
        warn!(
            "{} not found, created new file with empty list",
            path.display()
        );
        Ok(true)
    }

    async fn read_collection<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>> {
        if self.ensure_exists(collection).await? {
            return Ok(Vec::new());
        }

        let path = self.paths.get(collection);
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        // A corrupt file is an error: treating it as empty would wipe it on the next save.
        let records: Vec<T> = serde_json::from_str(&raw).with_context(|| {
            format!(
                "Expected a JSON list of {} in {}",
                collection.label(),
                path.display()
            )
        })?;
        debug!("Loaded {} {} from {}", records.len(), collection.label(), path.display());
        Ok(records)
    }

    async fn write_collection<T: Serialize + Sync>(
        &self,
        collection: Collection,
        records: &[T],
    ) -> Result<()> {
        let path = self.paths.get(collection);
        let body = serde_json::to_vec_pretty(records)
            .with_context(|| format!("Failed to encode {}", collection.label()))?;
        write_replacing(path, &body).await
    }
}

async fn write_replacing(path: &Path, body: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, body)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl ApprovalStore for JsonFileStore {
    async fn load_pending(&self) -> Result<Vec<PendingRequest>> {
        self.read_collection(Collection::Pending).await
    }

    async fn save_pending(&self, requests: &[PendingRequest]) -> Result<()> {
        self.write_collection(Collection::Pending, requests).await
    }

    async fn load_approved(&self) -> Result<Vec<ApprovedIdentity>> {
        self.read_collection(Collection::Approved).await
    }

    async fn save_approved(&self, users: &[ApprovedIdentity]) -> Result<()> {
        self.write_collection(Collection::Approved, users).await
    }

    async fn load_admins(&self) -> Result<Vec<AdminRecord>> {
        self.read_collection(Collection::Admins).await
    }

    async fn save_admins(&self, admins: &[AdminRecord]) -> Result<()> {
        self.write_collection(Collection::Admins, admins).await
    }
}
