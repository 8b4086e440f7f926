//! VLESS connection links built from 3X-UI inbounds.

use std::fmt;

use crate::models::inbound::{RegisteredClient, RoutingEntry};

pub mod reality;

pub use reality::SecurityParameters;

/// A ready-to-import connection link.
///
/// Rendering through `Display` is deterministic: the same inbound, client and
/// host always produce the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub protocol: String,
    pub client_id: String,
    pub host: String,
    pub port: u16,
    /// Raw (unencoded) values, in link order.
    pub query_parameters: Vec<(&'static str, String)>,
    /// Raw (unencoded) fragment.
    pub fragment: String,
}

impl ConnectionDescriptor {
    /// `host` is the public panel host name, not anything taken from the inbound.
    pub fn build(entry: &RoutingEntry, client: &RegisteredClient, host: &str) -> Self {
        let security = SecurityParameters::extract(entry);

        let mut query_parameters = vec![
            ("type", security.transport),
            ("security", security.security),
            ("pbk", security.public_key),
            ("fp", security.fingerprint),
            ("sni", security.sni),
            ("sid", security.short_id),
            ("spx", security.spider_x),
        ];
        if !client.flow.is_empty() {
            query_parameters.push(("flow", client.flow.clone()));
        }

        Self {
            protocol: entry.protocol.clone(),
            client_id: client.id.clone(),
            host: host.to_string(),
            port: entry.port,
            query_parameters,
            fragment: format!("{}-{}", entry.remark, client.email),
        }
    }

    pub fn query(&self) -> String {
        self.query_parameters
            .iter()
            .map(|(key, value)| format!("{}={}", key, encode_query_value(value)))
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn to_uri(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}@{}:{}?{}#{}",
            self.protocol,
            self.client_id,
            self.host,
            self.port,
            self.query(),
            urlencoding::encode(&self.fragment)
        )
    }
}

// Query values use `+` for spaces; the fragment keeps `%20`.
fn encode_query_value(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}
