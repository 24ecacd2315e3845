//! `RecordStore` trait — async interface for user/consent persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;

/// A persisted user record.
#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub user_id: String,
    /// Human-readable handle, empty when the user has none.
    pub handle: String,
    pub consent_given: bool,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Backend-agnostic store of user records.
///
/// A record exists for every user who has ever sent a message. Consent is
/// only ever changed through `set_consent` — upserts never touch it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a user with defaults, or refresh `handle` and `last_seen` on
    /// an existing row. Must be atomic per row.
    async fn upsert_user(&self, user_id: &str, handle: &str) -> Result<(), StoreError>;

    /// Explicitly set the consent flag.
    async fn set_consent(&self, user_id: &str, granted: bool) -> Result<(), StoreError>;

    /// Current consent flag; false for unknown users.
    async fn consent(&self, user_id: &str) -> Result<bool, StoreError>;

    /// Fetch a full record.
    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Point-in-time snapshot of all consented user ids.
    async fn consented_user_ids(&self) -> Result<Vec<String>, StoreError>;
}
