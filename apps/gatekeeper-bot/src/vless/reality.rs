use serde_json::Value;
use tracing::debug;

use crate::models::inbound::{decode_flexible, Document, RoutingEntry};

pub const REALITY: &str = "reality";

/// Transport and Reality parameters pulled out of an inbound's stream settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityParameters {
    pub transport: String,
    pub security: String,
    pub public_key: String,
    pub fingerprint: String,
    pub sni: String,
    pub short_id: String,
    pub spider_x: String,
}

impl SecurityParameters {
    pub fn extract(entry: &RoutingEntry) -> Self {
        let stream = entry.stream_document();
        let transport = non_empty(str_field(&stream, "network")).unwrap_or_else(|| "tcp".into());
        let security = non_empty(str_field(&stream, "security")).unwrap_or_else(|| "none".into());

        if security != REALITY {
            debug!(
                "Inbound id={} uses security '{}', only reality parameters are extracted",
                entry.id, security
            );
            return Self {
                transport,
                security,
                ..Self::default()
            };
        }

        let reality = sub_document(&stream, "realitySettings");
        let nested = sub_document(&reality, "settings");

        let sni = first_str(&reality, "serverNames")
            .or_else(|| non_empty(str_field(&nested, "serverName")))
            .unwrap_or_default();

        Self {
            transport,
            security,
            public_key: str_field(&nested, "publicKey"),
            fingerprint: str_field(&nested, "fingerprint"),
            sni,
            short_id: first_str(&reality, "shortIds").unwrap_or_default(),
            spider_x: str_field(&nested, "spiderX"),
        }
    }
}

fn sub_document(parent: &Document, key: &str) -> Document {
    parent
        .get(key)
        .map(|value| decode_flexible(value, key))
        .unwrap_or_default()
}

fn str_field(doc: &Document, key: &str) -> String {
    doc.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// First element of a string list, if the list has one.
fn first_str(doc: &Document, key: &str) -> Option<String> {
    doc.get(key)
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
