use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

const MAX_SESSION_ID_LENGTH: u64 = 128;
const MAX_MESSAGE_LENGTH: u64 = 4000;

/// Coarse location resolved from a visitor's network address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoLocation {
    /// ISO 3166-1 alpha-2 country code.
    pub country: Option<String>,
    /// First-level subdivision (ISO code when known).
    pub region: Option<String>,
    pub city: Option<String>,
    /// IANA zone of the resolved location.
    pub timezone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Device and browser metadata as declared by the client.
///
/// Every field is untrusted and stored as-is; none of them feeds server-side
/// normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub browser: Option<String>,
    pub platform: Option<String>,
    pub language: Option<String>,
    pub user_agent: Option<String>,
    pub screen_resolution: Option<String>,
    pub timezone: Option<String>,
    pub cookies_enabled: Option<bool>,
    pub referer: Option<String>,
}

/// One enriched page-load record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: Uuid,
    pub ip: Option<String>,
    pub geo: Option<GeoLocation>,
    #[serde(flatten)]
    pub device: DeviceInfo,
    pub browser_label: String,
    pub os_label: String,
    pub recorded_at: DateTime<Utc>,
    /// RFC 3339 rendering of `recorded_at` in the server's configured zone.
    pub recorded_at_local: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub message: String,
    pub ip: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub recorded_at_local: String,
}

/// Aggregate of everything recorded under one client-chosen session token.
///
/// `visits` and `messages` are in store arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub visits: Vec<Visit>,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a single upsert-append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReceipt {
    pub record_id: Uuid,
    /// True when this append created the session.
    pub session_created: bool,
}

/// Visit submission. Only `session_id` is checked; device fields are
/// best-effort telemetry, so a value of the wrong JSON type is coerced or
/// dropped instead of failing the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordVisitPayload {
    #[validate(length(max = MAX_SESSION_ID_LENGTH))]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub browser: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub platform: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub language: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub user_agent: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub screen_resolution: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub timezone: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub cookies_enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub referer: Option<String>,
}

impl RecordVisitPayload {
    pub fn device(&self) -> DeviceInfo {
        DeviceInfo {
            browser: self.browser.clone(),
            platform: self.platform.clone(),
            language: self.language.clone(),
            user_agent: self.user_agent.clone(),
            screen_resolution: self.screen_resolution.clone(),
            timezone: self.timezone.clone(),
            cookies_enabled: self.cookies_enabled,
            referer: self.referer.clone(),
        }
    }
}

/// Strings pass through; numbers and booleans keep their JSON text; anything
/// else is dropped.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::Number(n) => match n.as_u64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordChatMessagePayload {
    #[validate(length(max = MAX_SESSION_ID_LENGTH))]
    pub session_id: Option<String>,
    #[validate(length(max = MAX_MESSAGE_LENGTH))]
    pub message: Option<String>,
}

/// Acknowledgement returned by both ingest endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    /// Identifier of the stored visit or chat message.
    pub id: Uuid,
    pub session_id: String,
    pub session_created: bool,
}
