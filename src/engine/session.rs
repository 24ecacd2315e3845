//! Per-user session state and its store.
//!
//! Sessions are transient: they exist only while a flow is in progress and
//! are lost on restart by design. The store is a trait so a durable backend
//! can be swapped in without touching the engine's transition logic.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Where a user currently is in the conversation.
///
/// Serializable so a durable session store can persist it as-is.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlowState {
    /// No active flow; menu interactions only.
    #[default]
    Idle,
    /// Consent question asked, answer pending.
    AwaitingConsent,
    /// Walking through a form.
    InForm {
        form_id: String,
        /// Index of the next unanswered question; `0 <= cursor <= len`.
        cursor: usize,
        /// Question text → raw answer, in question order.
        answers: Vec<(String, String)>,
    },
    /// Operator armed a broadcast; the next message is the payload.
    AwaitingBroadcast,
}

/// Session storage seam.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current state for a user; `Idle` when none is stored.
    async fn get(&self, user_id: &str) -> FlowState;

    /// Replace a user's state.
    async fn set(&self, user_id: &str, state: FlowState);

    /// Drop a user's state, returning them to `Idle`.
    async fn clear(&self, user_id: &str);
}

/// In-memory session store — one process lifetime, no persistence.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, FlowState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: &str) -> FlowState {
        self.sessions
            .lock()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn set(&self, user_id: &str, state: FlowState) {
        self.sessions
            .lock()
            .await
            .insert(user_id.to_string(), state);
    }

    async fn clear(&self, user_id: &str) {
        self.sessions.lock().await.remove(user_id);
    }
}
