pub mod models;
pub mod repositories;

pub use repositories::approval_repo::{ApprovalStore, Collection};
pub use repositories::json_store::{JsonFileStore, StorePaths};
pub use repositories::memory_store::MemoryStore;

use anyhow::{Context, Result};

/// Opens the JSON-file store and makes sure every collection file exists.
pub async fn open(paths: StorePaths) -> Result<JsonFileStore> {
    paths.validate()?;
    let store = JsonFileStore::new(paths);
    store
        .materialize()
        .await
        .context("Failed to prepare approval storage")?;
    Ok(store)
}
