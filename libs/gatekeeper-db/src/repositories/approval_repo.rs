use anyhow::Result;
use async_trait::async_trait;

use crate::models::approval::{AdminRecord, ApprovedIdentity, PendingRequest};

/// The three record collections behind the approval workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Pending,
    Approved,
    Admins,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Self::Pending, Self::Approved, Self::Admins];

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "approval requests",
            Self::Approved => "approved users",
            Self::Admins => "administrators",
        }
    }
}

/// Whole-collection load/replace storage.
///
/// Loading a collection that does not exist yet yields an empty list. Saving
/// replaces the stored collection entirely; there is no incremental update and
/// no isolation between concurrent writers.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn load_pending(&self) -> Result<Vec<PendingRequest>>;
    async fn save_pending(&self, requests: &[PendingRequest]) -> Result<()>;

    async fn load_approved(&self) -> Result<Vec<ApprovedIdentity>>;
    async fn save_approved(&self, users: &[ApprovedIdentity]) -> Result<()>;

    async fn load_admins(&self) -> Result<Vec<AdminRecord>>;
    async fn save_admins(&self, admins: &[AdminRecord]) -> Result<()>;
}
