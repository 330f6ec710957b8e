use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::{
    error::AppError,
    models::{IngestResponse, RecordChatMessagePayload, RecordVisitPayload},
    state::AppState,
    utils::client_ip::ClientIp,
};

pub async fn record_visit(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    payload: Result<Json<RecordVisitPayload>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let Json(payload) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let (session_id, receipt) = state.ingest.record_visit(payload, client_ip).await?;

    Ok(Json(IngestResponse {
        id: receipt.record_id,
        session_id,
        session_created: receipt.session_created,
    }))
}

pub async fn record_chat_message(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    payload: Result<Json<RecordChatMessagePayload>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let Json(payload) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let (session_id, receipt) = state
        .ingest
        .record_chat_message(payload, client_ip)
        .await?;

    Ok(Json(IngestResponse {
        id: receipt.record_id,
        session_id,
        session_created: receipt.session_created,
    }))
}
