use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::approval::{AdminRecord, ApprovedIdentity, PendingRequest};
use crate::repositories::approval_repo::ApprovalStore;

#[derive(Debug, Default)]
struct Collections {
    pending: Vec<PendingRequest>,
    approved: Vec<ApprovedIdentity>,
    admins: Vec<AdminRecord>,
}

/// Process-local store, used by tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_admins(admins: impl IntoIterator<Item = i64>) -> Self {
        let collections = Collections {
            admins: admins.into_iter().map(AdminRecord::new).collect(),
            ..Collections::default()
        };
        Self {
            inner: Arc::new(RwLock::new(collections)),
        }
    }
}

#[async_trait]
impl ApprovalStore for MemoryStore {
    async fn load_pending(&self) -> Result<Vec<PendingRequest>> {
        Ok(self.inner.read().await.pending.clone())
    }

    async fn save_pending(&self, requests: &[PendingRequest]) -> Result<()> {
        self.inner.write().await.pending = requests.to_vec();
        Ok(())
    }

    async fn load_approved(&self) -> Result<Vec<ApprovedIdentity>> {
        Ok(self.inner.read().await.approved.clone())
    }

    async fn save_approved(&self, users: &[ApprovedIdentity]) -> Result<()> {
        self.inner.write().await.approved = users.to_vec();
        Ok(())
    }

    async fn load_admins(&self) -> Result<Vec<AdminRecord>> {
        Ok(self.inner.read().await.admins.clone())
    }

    async fn save_admins(&self, admins: &[AdminRecord]) -> Result<()> {
        self.inner.write().await.admins = admins.to_vec();
        Ok(())
    }
}
