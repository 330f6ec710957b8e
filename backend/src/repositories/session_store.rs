//! Durable per-session aggregate storage.
//!
//! Both append operations are a single upsert-append: the session row is
//! created if absent and the new record is attached in one indivisible step.
//! Concurrent first writes for the same session therefore converge on one
//! session and keep every record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use crate::models::{AppendReceipt, ChatMessage, DeviceInfo, GeoLocation, Session, Visit};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session storage unavailable: {0}")]
    StorageUnavailable(#[source] BoxError),
}

impl StoreError {
    pub fn unavailable(err: impl Into<BoxError>) -> Self {
        StoreError::StorageUnavailable(err.into())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::unavailable(err)
    }
}

/// Repository trait for session aggregates.
///
/// Use `MockSessionStore` in tests to script storage failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates the session with this visit, or appends it to the existing one.
    async fn append_visit(&self, session_id: &str, visit: Visit)
        -> Result<AppendReceipt, StoreError>;

    /// Creates the session with this message, or appends it to the existing one.
    async fn append_chat_message(
        &self,
        session_id: &str,
        message: ChatMessage,
    ) -> Result<AppendReceipt, StoreError>;

    /// Reads one aggregate with both histories in arrival order.
    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// `xmax = 0` holds only for a tuple this statement inserted, which is how the
// upsert reports whether it created the session.
const UPSERT_SESSION_CTE: &str = r#"
    WITH upserted AS (
        INSERT INTO visitor_sessions (session_id, created_at, updated_at)
        VALUES ($1, $2, $2)
        ON CONFLICT (session_id) DO UPDATE
            SET updated_at = GREATEST(visitor_sessions.updated_at, EXCLUDED.updated_at)
        RETURNING session_id, (xmax = 0) AS session_created
    )"#;

const VISIT_COLUMNS: &str = "id, ip, geo, browser, platform, language, user_agent, \
     browser_label, os_label, screen_resolution, timezone, cookies_enabled, referer, \
     recorded_at, recorded_at_local";

const MESSAGE_COLUMNS: &str = "id, message, ip, recorded_at, recorded_at_local";

#[derive(Debug, FromRow)]
struct SessionRow {
    session_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct VisitRow {
    id: Uuid,
    ip: Option<String>,
    geo: Option<Json<GeoLocation>>,
    browser: Option<String>,
    platform: Option<String>,
    language: Option<String>,
    user_agent: Option<String>,
    browser_label: String,
    os_label: String,
    screen_resolution: Option<String>,
    timezone: Option<String>,
    cookies_enabled: Option<bool>,
    referer: Option<String>,
    recorded_at: DateTime<Utc>,
    recorded_at_local: String,
}

impl From<VisitRow> for Visit {
    fn from(row: VisitRow) -> Self {
        Visit {
            id: row.id,
            ip: row.ip,
            geo: row.geo.map(|Json(geo)| geo),
            device: DeviceInfo {
                browser: row.browser,
                platform: row.platform,
                language: row.language,
                user_agent: row.user_agent,
                screen_resolution: row.screen_resolution,
                timezone: row.timezone,
                cookies_enabled: row.cookies_enabled,
                referer: row.referer,
            },
            browser_label: row.browser_label,
            os_label: row.os_label,
            recorded_at: row.recorded_at,
            recorded_at_local: row.recorded_at_local,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    message: String,
    ip: Option<String>,
    recorded_at: DateTime<Utc>,
    recorded_at_local: String,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        ChatMessage {
            id: row.id,
            message: row.message,
            ip: row.ip,
            recorded_at: row.recorded_at,
            recorded_at_local: row.recorded_at_local,
        }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn append_visit(
        &self,
        session_id: &str,
        visit: Visit,
    ) -> Result<AppendReceipt, StoreError> {
        let query = format!(
            "{} , inserted AS (
                INSERT INTO session_visits (session_id, {})
                SELECT upserted.session_id, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
                       $14, $15, $2, $16
                FROM upserted
                RETURNING id
            )
            SELECT inserted.id, upserted.session_created FROM inserted, upserted",
            UPSERT_SESSION_CTE, VISIT_COLUMNS
        );

        let (record_id, session_created): (Uuid, bool) = sqlx::query_as(&query)
            .bind(session_id)
            .bind(visit.recorded_at)
            .bind(visit.id)
            .bind(&visit.ip)
            .bind(visit.geo.as_ref().map(Json))
            .bind(&visit.device.browser)
            .bind(&visit.device.platform)
            .bind(&visit.device.language)
            .bind(&visit.device.user_agent)
            .bind(&visit.browser_label)
            .bind(&visit.os_label)
            .bind(&visit.device.screen_resolution)
            .bind(&visit.device.timezone)
            .bind(visit.device.cookies_enabled)
            .bind(&visit.device.referer)
            .bind(&visit.recorded_at_local)
            .fetch_one(&self.pool)
            .await?;

        Ok(AppendReceipt {
            record_id,
            session_created,
        })
    }

    async fn append_chat_message(
        &self,
        session_id: &str,
        message: ChatMessage,
    ) -> Result<AppendReceipt, StoreError> {
        let query = format!(
            "{} , inserted AS (
                INSERT INTO session_chat_messages (session_id, {})
                SELECT upserted.session_id, $3, $4, $5, $2, $6
                FROM upserted
                RETURNING id
            )
            SELECT inserted.id, upserted.session_created FROM inserted, upserted",
            UPSERT_SESSION_CTE, MESSAGE_COLUMNS
        );

        let (record_id, session_created): (Uuid, bool) = sqlx::query_as(&query)
            .bind(session_id)
            .bind(message.recorded_at)
            .bind(message.id)
            .bind(&message.message)
            .bind(&message.ip)
            .bind(&message.recorded_at_local)
            .fetch_one(&self.pool)
            .await?;

        Ok(AppendReceipt {
            record_id,
            session_created,
        })
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        // One snapshot for all three reads so the histories match the header.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let Some(header) = sqlx::query_as::<_, SessionRow>(
            "SELECT session_id, created_at, updated_at FROM visitor_sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            tx.commit().await?;
            return Ok(None);
        };

        let visits = sqlx::query_as::<_, VisitRow>(&format!(
            "SELECT {} FROM session_visits WHERE session_id = $1 ORDER BY seq ASC",
            VISIT_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(&mut *tx)
        .await?;

        let messages = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {} FROM session_chat_messages WHERE session_id = $1 ORDER BY seq ASC",
            MESSAGE_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(Session {
            session_id: header.session_id,
            visits: visits.into_iter().map(Visit::from).collect(),
            messages: messages.into_iter().map(ChatMessage::from).collect(),
            created_at: header.created_at,
            updated_at: header.updated_at,
        }))
    }
}
