use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access request waiting for an administrator decision.
///
/// Field names on disk stay `user_id` / `username` so existing request files
/// keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    #[serde(rename = "user_id")]
    pub requester_id: i64,
    #[serde(rename = "username", default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<DateTime<Utc>>,
}

impl PendingRequest {
    pub fn new(requester_id: i64, display_name: impl Into<String>) -> Self {
        Self {
            requester_id,
            display_name: display_name.into(),
            requested_at: Some(Utc::now()),
        }
    }
}

/// Requester that went through approval and has a panel client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedIdentity {
    #[serde(rename = "user_id")]
    pub requester_id: i64,
    #[serde(rename = "username", default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<i64>,
}

impl ApprovedIdentity {
    pub fn promote(request: PendingRequest, admin_id: i64) -> Self {
        Self {
            requester_id: request.requester_id,
            display_name: request.display_name,
            approved_at: Some(Utc::now()),
            approved_by: Some(admin_id),
        }
    }
}

/// Administrator entry. Older admin files hold bare ids, newer ones
/// `{"user_id": ..}` objects; both load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AdminEntry")]
pub struct AdminRecord {
    pub user_id: i64,
}

impl AdminRecord {
    pub fn new(user_id: i64) -> Self {
        Self { user_id }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AdminEntry {
    Record { user_id: i64 },
    Bare(i64),
}

impl From<AdminEntry> for AdminRecord {
    fn from(entry: AdminEntry) -> Self {
        match entry {
            AdminEntry::Record { user_id } | AdminEntry::Bare(user_id) => Self { user_id },
        }
    }
}
