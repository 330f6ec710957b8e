//! Ephemeral session store for local runs without Postgres.
//!
//! Each append is one critical section over the session map, which gives the
//! same upsert-append guarantees as the durable store for a single process.
//! Nothing survives a restart.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{AppendReceipt, ChatMessage, Session, Visit};
use crate::repositories::session_store::{SessionStore, StoreError};

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Session>>, StoreError> {
        self.sessions
            .lock()
            .map_err(|_| StoreError::unavailable("in-memory session map poisoned"))
    }

    /// Applies `push` to the session, creating it first when absent.
    fn upsert_with<F>(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
        push: F,
    ) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.lock()?;
        let mut created = false;
        let session = sessions.entry(session_id.to_string()).or_insert_with(|| {
            created = true;
            Session {
                session_id: session_id.to_string(),
                visits: Vec::new(),
                messages: Vec::new(),
                created_at: at,
                updated_at: at,
            }
        });
        session.updated_at = session.updated_at.max(at);
        push(session);
        Ok(created)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append_visit(
        &self,
        session_id: &str,
        visit: Visit,
    ) -> Result<AppendReceipt, StoreError> {
        let record_id = visit.id;
        let session_created =
            self.upsert_with(session_id, visit.recorded_at, |session| {
                session.visits.push(visit)
            })?;
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
        let record_id = message.id;
        let session_created =
            self.upsert_with(session_id, message.recorded_at, |session| {
                session.messages.push(message)
            })?;
        Ok(AppendReceipt {
            record_id,
            session_created,
        })
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.lock()?.get(session_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceInfo;
    use std::sync::Arc;
    use uuid::Uuid;

    fn visit(label: &str) -> Visit {
        Visit {
            id: Uuid::new_v4(),
            ip: None,
            geo: None,
            device: DeviceInfo {
                browser: Some(label.to_string()),
                ..Default::default()
            },
            browser_label: "Unknown".into(),
            os_label: "Unknown".into(),
            recorded_at: Utc::now(),
            recorded_at_local: String::new(),
        }
    }

    fn message(text: &str) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            message: text.to_string(),
            ip: None,
            recorded_at: Utc::now(),
            recorded_at_local: String::new(),
        }
    }

    #[tokio::test]
    async fn first_append_creates_and_later_appends_extend() {
        let store = InMemorySessionStore::new();

        let first = store.append_visit("s1", visit("a")).await.unwrap();
        let second = store.append_visit("s1", visit("b")).await.unwrap();

        assert!(first.session_created);
        assert!(!second.session_created);

        let session = store.load_session("s1").await.unwrap().expect("session");
        let browsers: Vec<_> = session
            .visits
            .iter()
            .map(|v| v.device.browser.clone().unwrap())
            .collect();
        assert_eq!(browsers, vec!["a", "b"]);
        assert!(session.messages.is_empty());
    }

    #[tokio::test]
    async fn chat_message_creates_session_without_visits() {
        let store = InMemorySessionStore::new();

        let receipt = store.append_chat_message("s2", message("hi")).await.unwrap();

        assert!(receipt.session_created);
        let session = store.load_session("s2").await.unwrap().expect("session");
        assert!(session.visits.is_empty());
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].message, "hi");
    }

    #[tokio::test]
    async fn load_missing_session_is_none() {
        let store = InMemorySessionStore::new();
        assert!(store.load_session("nope").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mixed_appends_converge_on_one_session() {
        let store = Arc::new(InMemorySessionStore::new());
        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    store.append_visit("shared", visit("v")).await
                } else {
                    store.append_chat_message("shared", message("m")).await
                }
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().session_created {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(store.session_count().unwrap(), 1);
        let session = store.load_session("shared").await.unwrap().unwrap();
        assert_eq!(session.visits.len(), 32);
        assert_eq!(session.messages.len(), 32);
    }
}
