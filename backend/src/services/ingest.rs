//! Validation, enrichment and storage of visitor submissions.

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::{
    error::validation_messages,
    models::{AppendReceipt, ChatMessage, RecordChatMessagePayload, RecordVisitPayload, Visit},
    repositories::{SessionStore, StoreError},
    services::{agent::AgentParser, geo::GeoResolver},
    utils::time::TimeNormalizer,
};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The caller sent something unusable; retrying the same input won't help.
    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn SessionStore>,
    geo: Arc<dyn GeoResolver>,
    agents: AgentParser,
    clock: TimeNormalizer,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        geo: Arc<dyn GeoResolver>,
        clock: TimeNormalizer,
    ) -> Self {
        Self {
            store,
            geo,
            agents: AgentParser::new(),
            clock,
        }
    }

    pub async fn record_visit(
        &self,
        payload: RecordVisitPayload,
        client_ip: Option<String>,
    ) -> Result<(String, AppendReceipt), IngestError> {
        payload
            .validate()
            .map_err(|e| IngestError::Validation(validation_messages(&e)))?;
        let session_id = non_blank(payload.session_id.as_deref())
            .ok_or_else(|| IngestError::Validation(vec![required_message("session_id")]))?
            .to_string();

        let device = payload.device();
        let geo = client_ip.as_deref().and_then(|ip| self.geo.resolve(ip));
        if geo.is_none() {
            tracing::debug!(session_id = %session_id, ip = ?client_ip, "no geolocation for visit");
        }
        let labels = self
            .agents
            .parse(device.user_agent.as_deref().unwrap_or_default());
        let stamp = self.clock.stamp();

        let visit = Visit {
            id: Uuid::new_v4(),
            ip: client_ip,
            geo,
            device,
            browser_label: labels.browser_label,
            os_label: labels.os_label,
            recorded_at: stamp.utc,
            recorded_at_local: stamp.local,
        };

        let receipt = self.store.append_visit(&session_id, visit).await?;
        tracing::info!(
            session_id = %session_id,
            visit_id = %receipt.record_id,
            session_created = receipt.session_created,
            "visit recorded"
        );
        Ok((session_id, receipt))
    }

    pub async fn record_chat_message(
        &self,
        payload: RecordChatMessagePayload,
        client_ip: Option<String>,
    ) -> Result<(String, AppendReceipt), IngestError> {
        payload
            .validate()
            .map_err(|e| IngestError::Validation(validation_messages(&e)))?;
        let (session_id, text) = match (
            non_blank(payload.session_id.as_deref()),
            non_empty(payload.message.as_deref()),
        ) {
            (Some(session_id), Some(text)) => (session_id.to_string(), text),
            (session_id, text) => {
                let mut missing = Vec::new();
                if session_id.is_none() {
                    missing.push(required_message("session_id"));
                }
                if text.is_none() {
                    missing.push(required_message("message"));
                }
                return Err(IngestError::Validation(missing));
            }
        };
        let stamp = self.clock.stamp();

        let message = ChatMessage {
            id: Uuid::new_v4(),
            message: text.to_string(),
            ip: client_ip,
            recorded_at: stamp.utc,
            recorded_at_local: stamp.local,
        };

        let receipt = self.store.append_chat_message(&session_id, message).await?;
        tracing::info!(
            session_id = %session_id,
            message_id = %receipt.record_id,
            session_created = receipt.session_created,
            "chat message recorded"
        );
        Ok((session_id, receipt))
    }
}

/// Returns the value unless it is absent or blank. The value itself is kept
/// untrimmed.
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Message text only has to be non-empty; whitespace is content.
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn required_message(field: &str) -> String {
    format!("{}: required", field)
}
