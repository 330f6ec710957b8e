#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::{
    handlers::health::HealthResponse,
    models::{
        DeviceInfo, GeoLocation, IngestResponse, RecordChatMessagePayload, RecordVisitPayload,
    },
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(record_visit_doc, record_chat_message_doc, health_doc),
    components(schemas(
        RecordVisitPayload,
        RecordChatMessagePayload,
        IngestResponse,
        DeviceInfo,
        GeoLocation,
        HealthResponse
    )),
    tags(
        (name = "Ingest", description = "Visitor telemetry and chat message ingestion"),
        (name = "Ops", description = "Operational probes")
    )
)]
pub struct ApiDoc;

#[utoipa::path(
    post,
    path = "/api/visitor-info",
    request_body = RecordVisitPayload,
    responses(
        (status = 200, description = "Visit appended to the session", body = IngestResponse),
        (status = 400, description = "Missing sessionId or malformed body"),
        (status = 503, description = "Session storage unavailable, safe to retry")
    ),
    tag = "Ingest"
)]
fn record_visit_doc() {}

#[utoipa::path(
    post,
    path = "/api/chat-message",
    request_body = RecordChatMessagePayload,
    responses(
        (status = 200, description = "Message appended to the session", body = IngestResponse),
        (status = 400, description = "Missing sessionId or message"),
        (status = 503, description = "Session storage unavailable, safe to retry")
    ),
    tag = "Ingest"
)]
fn record_chat_message_doc() {}

#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "Ops"
)]
fn health_doc() {}
