use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

/// A decoded JSON object from the panel's inbound configuration.
pub type Document = Map<String, Value>;

/// Flow every client registered by the bot is pinned to.
pub const VISION_FLOW: &str = "xtls-rprx-vision";

/// Envelope the 3X-UI API wraps every answer in.
#[derive(Debug, Deserialize)]
pub struct PanelResponse<T> {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub obj: Option<T>,
}

/// Panel listener ("inbound"), read-only from the bot's side.
///
/// `settings` and `streamSettings` are kept raw: depending on the panel
/// version they arrive as objects or as JSON-encoded strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub protocol: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub port: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub remark: String,
    #[serde(default)]
    pub settings: Value,
    #[serde(default)]
    pub stream_settings: Value,
}

impl RoutingEntry {
    pub fn settings_document(&self) -> Document {
        decode_flexible(&self.settings, "settings")
    }

    pub fn stream_document(&self) -> Document {
        decode_flexible(&self.stream_settings, "streamSettings")
    }

    /// Clients listed in `settings.clients`. Entries that do not look like a
    /// client are skipped with a warning.
    pub fn clients(&self) -> Vec<RegisteredClient> {
        let settings = self.settings_document();
        let Some(Value::Array(raw)) = settings.get("clients") else {
            return Vec::new();
        };

        raw.iter()
            .filter_map(|value| match serde_json::from_value(value.clone()) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!("Skipping malformed client in inbound id={}: {}", self.id, e);
                    None
                }
            })
            .collect()
    }

    pub fn find_client(&self, requester_tag: &str) -> Option<RegisteredClient> {
        self.clients()
            .into_iter()
            .find(|client| client.requester_tag == requester_tag)
    }
}

/// First inbound (in panel order) holding a client tagged with `requester_tag`.
pub fn locate_client<'a>(
    entries: &'a [RoutingEntry],
    requester_tag: &str,
) -> Option<(&'a RoutingEntry, RegisteredClient)> {
    entries
        .iter()
        .find_map(|entry| entry.find_client(requester_tag).map(|client| (entry, client)))
}

/// Client record inside an inbound's `settings.clients`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredClient {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(rename = "tgId", default, deserialize_with = "tag_from_string_or_number")]
    pub requester_tag: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub flow: String,
    #[serde(rename = "enable", default = "enabled")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub limit_ip: i64,
    #[serde(rename = "totalGB", default, deserialize_with = "null_as_default")]
    pub total_gb: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub expiry_time: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sub_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comment: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reset: i64,
}

impl RegisteredClient {
    /// Unlimited, enabled client keyed by the requester's id.
    pub fn for_requester(requester_id: i64, display_name: &str) -> Self {
        Self {
            id: requester_id.to_string(),
            email: display_name.to_string(),
            requester_tag: requester_id.to_string(),
            flow: VISION_FLOW.to_string(),
            enabled: true,
            limit_ip: 0,
            total_gb: 0,
            expiry_time: 0,
            sub_id: String::new(),
            comment: String::new(),
            reset: 0,
        }
    }
}

/// Body of `POST /panel/api/inbounds/addClient`.
#[derive(Debug, Serialize)]
pub struct AddClientRequest {
    pub id: i64,
    /// JSON-encoded `{"clients": [...]}`; the panel expects a string here.
    pub settings: String,
}

impl AddClientRequest {
    pub fn new(inbound_id: i64, client: &RegisteredClient) -> serde_json::Result<Self> {
        Ok(Self {
            id: inbound_id,
            settings: serde_json::to_string(&json!({ "clients": [client] }))?,
        })
    }
}

/// Turns a sub-document that may be an object, a JSON-encoded string or
/// missing into an object. Anything undecodable becomes an empty document.
pub fn decode_flexible(value: &Value, label: &str) -> Document {
    match value {
        Value::Object(map) => map.clone(),
        Value::Null => Document::new(),
        Value::String(raw) if raw.trim().is_empty() => Document::new(),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                warn!("{} decoded to {}, expected an object", label, kind(&other));
                Document::new()
            }
            Err(e) => {
                warn!("Failed to parse {}: {}", label, e);
                Document::new()
            }
        },
        other => {
            warn!("{} is {}, expected an object", label, kind(other));
            Document::new()
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn enabled() -> bool {
    true
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Panels store tgId as a string or as an integer depending on version.
fn tag_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(tag) => tag,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}
