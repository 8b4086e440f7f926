use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::PanelConfig;
use crate::models::inbound::{
    locate_client, AddClientRequest, PanelResponse, RegisteredClient, RoutingEntry,
};
use crate::services::approval_service::ClientRegistrar;
use crate::vless::ConnectionDescriptor;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("panel login failed: {0}")]
    Auth(String),
    #[error("panel request failed: {0}")]
    Fetch(String),
    #[error("panel transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("panel rejected the request: {0}")]
    Rejected(String),
    #[error("panel has no inbounds")]
    NoRoutingEntries,
    #[error("no panel client is tagged with requester id {0}")]
    NotFound(i64),
}

/// Logged-in connection to the panel. Each provisioning operation opens its own.
pub struct PanelSession {
    http: Client,
}

/// Client for the 3X-UI panel API.
#[derive(Clone)]
pub struct PanelClient {
    base_url: String,
    login: String,
    password: String,
    verify_tls: bool,
    timeout: Duration,
    host: String,
}

impl PanelClient {
    pub fn new(config: &PanelConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            login: config.login.clone(),
            password: config.password.clone(),
            verify_tls: config.verify_tls,
            timeout: config.timeout(),
            host: config.host()?,
        })
    }

    /// Host name put into connection links.
    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn authenticate(&self) -> Result<PanelSession, PanelError> {
        let http = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(!self.verify_tls)
            .timeout(self.timeout)
            .build()
            .map_err(|e| PanelError::Auth(e.to_string()))?;

        let resp = http
            .post(self.url("/login"))
            .form(&[
                ("username", self.login.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PanelError::Auth(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PanelError::Auth(format!("login returned {}", status)));
        }

        // Bad credentials come back as 200 with `"success": false`.
        let body = resp
            .text()
            .await
            .map_err(|e| PanelError::Auth(e.to_string()))?;
        if let Ok(reply) = serde_json::from_str::<PanelResponse<Value>>(&body) {
            if reply.success == Some(false) {
                return Err(PanelError::Auth(
                    reply.msg.unwrap_or_else(|| "credentials rejected".to_string()),
                ));
            }
        }

        info!("Authenticated successfully");
        Ok(PanelSession { http })
    }

    pub async fn list_routing_entries(
        &self,
        session: &PanelSession,
    ) -> Result<Vec<RoutingEntry>, PanelError> {
        let resp = session
            .http
            .get(self.url("/panel/api/inbounds/list"))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PanelError::Fetch(format!("inbound list returned {}", status)));
        }

        let reply: PanelResponse<Vec<RoutingEntry>> = resp
            .json()
            .await
            .map_err(|e| PanelError::Fetch(format!("malformed inbound list: {}", e)))?;
        if reply.success == Some(false) {
            return Err(PanelError::Fetch(reply.msg.unwrap_or_default()));
        }

        let entries = reply.obj.unwrap_or_default();
        info!("Found {} active inbounds", entries.len());
        Ok(entries)
    }

    /// Adds the requester as a client of the panel's first inbound.
    ///
    /// Never fails loudly: every problem is logged and reported as `false`.
    pub async fn register_client(&self, requester_id: i64, display_name: &str) -> bool {
        match self.try_register_client(requester_id, display_name).await {
            Ok(inbound_id) => {
                info!(
                    "User with id={} has been registered in inbound id={}",
                    requester_id, inbound_id
                );
                true
            }
            Err(e) => {
                error!("Registering user with id={} failed: {}", requester_id, e);
                false
            }
        }
    }

    async fn try_register_client(
        &self,
        requester_id: i64,
        display_name: &str,
    ) -> Result<i64, PanelError> {
        let session = self.authenticate().await?;
        let entries = self.list_routing_entries(&session).await?;

        // TODO: let operators pick the inbound instead of taking whatever the panel lists first.
        let entry = entries.first().ok_or(PanelError::NoRoutingEntries)?;
        info!(
            "Registering user with id={} to inbound with id={}",
            requester_id, entry.id
        );

        let client = RegisteredClient::for_requester(requester_id, display_name);
        let payload = AddClientRequest::new(entry.id, &client)
            .map_err(|e| PanelError::Fetch(format!("failed to encode client: {}", e)))?;

        let resp = session
            .http
            .post(self.url("/panel/api/inbounds/addClient"))
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PanelError::Fetch(format!("addClient returned {}", status)));
        }

        let reply: PanelResponse<Value> = resp
            .json()
            .await
            .map_err(|e| PanelError::Fetch(format!("malformed addClient reply: {}", e)))?;
        if reply.success != Some(true) {
            return Err(PanelError::Rejected(reply.msg.unwrap_or_default()));
        }

        Ok(entry.id)
    }

    /// Connection link for the client tagged with `requester_id`.
    pub async fn get_connection_descriptor(
        &self,
        requester_id: i64,
    ) -> Result<ConnectionDescriptor, PanelError> {
        let session = self.authenticate().await?;
        let entries = self.list_routing_entries(&session).await?;

        let tag = requester_id.to_string();
        match locate_client(&entries, &tag) {
            Some((entry, client)) => Ok(ConnectionDescriptor::build(entry, &client, &self.host)),
            None => {
                warn!("User with id={} not found", requester_id);
                Err(PanelError::NotFound(requester_id))
            }
        }
    }
}

#[async_trait]
impl ClientRegistrar for PanelClient {
    async fn register_client(&self, requester_id: i64, display_name: &str) -> bool {
        PanelClient::register_client(self, requester_id, display_name).await
    }
}
