//! libSQL backend — async `RecordStore` implementation.
//!
//! Supports local file and in-memory databases; the upsert preserves the
//! consent flag by never listing it in the conflict update.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::migrations;
use crate::store::traits::{RecordStore, UserRecord};

/// libSQL record store backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Record store opened");

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn row_to_user(row: &libsql::Row) -> Result<UserRecord, libsql::Error> {
    let user_id: String = row.get(0)?;
    let handle: String = row.get(1)?;
    let consent: i64 = row.get(2)?;
    let first_seen: String = row.get(3)?;
    let last_seen: String = row.get(4)?;

    Ok(UserRecord {
        user_id,
        handle,
        consent_given: consent == 1,
        first_seen: parse_datetime(&first_seen),
        last_seen: parse_datetime(&last_seen),
    })
}

const USER_COLUMNS: &str = "user_id, handle, consent, first_seen, last_seen";

#[async_trait]
impl RecordStore for LibSqlStore {
    async fn upsert_user(&self, user_id: &str, handle: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        // The conflict clause deliberately leaves `consent` and `first_seen`
        // untouched.
        self.conn()
            .execute(
                "INSERT INTO users (user_id, handle, consent, first_seen, last_seen)
                 VALUES (?1, ?2, 0, ?3, ?3)
                 ON CONFLICT (user_id) DO UPDATE SET
                     handle = excluded.handle,
                     last_seen = excluded.last_seen",
                params![user_id, handle, now],
            )
            .await
            .map_err(|e| StoreError::Query(format!("upsert_user: {e}")))?;

        debug!(user_id = user_id, "User upserted");
        Ok(())
    }

    async fn set_consent(&self, user_id: &str, granted: bool) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE users SET consent = ?1 WHERE user_id = ?2",
                params![if granted { 1i64 } else { 0i64 }, user_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("set_consent: {e}")))?;
        Ok(())
    }

    async fn consent(&self, user_id: &str) -> Result<bool, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT consent FROM users WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("consent: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("consent: {e}")))?;

        match row {
            Some(row) => {
                let flag: i64 = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("consent: {e}")))?;
                Ok(flag == 1)
            }
            None => Ok(false),
        }
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_user: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_user: {e}")))?;

        match row {
            Some(row) => {
                let user =
                    row_to_user(&row).map_err(|e| StoreError::Query(format!("get_user: {e}")))?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn consented_user_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut rows = self
            .conn()
            .query("SELECT user_id FROM users WHERE consent = 1", ())
            .await
            .map_err(|e| StoreError::Query(format!("consented_user_ids: {e}")))?;

        let mut ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("consented_user_ids: {e}")))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| StoreError::Query(format!("consented_user_ids: {e}")))?;
            ids.push(id);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> LibSqlStore {
        LibSqlStore::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn unknown_user_has_no_consent() {
        let store = store().await;
        assert!(!store.consent("nobody").await.unwrap());
        assert!(store.get_user("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_creates_with_defaults() {
        let store = store().await;
        store.upsert_user("1", "alice").await.unwrap();

        let user = store.get_user("1").await.unwrap().unwrap();
        assert_eq!(user.user_id, "1");
        assert_eq!(user.handle, "alice");
        assert!(!user.consent_given);
        assert_eq!(user.first_seen, user.last_seen);
    }

    #[tokio::test]
    async fn upsert_preserves_consent_and_first_seen() {
        let store = store().await;
        store.upsert_user("1", "alice").await.unwrap();
        store.set_consent("1", true).await.unwrap();

        let before = store.get_user("1").await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.upsert_user("1", "alice_renamed").await.unwrap();

        let after = store.get_user("1").await.unwrap().unwrap();
        assert!(after.consent_given, "upsert must not reset consent");
        assert_eq!(after.handle, "alice_renamed");
        assert_eq!(after.first_seen, before.first_seen);
        assert!(after.last_seen >= before.last_seen);
    }

    #[tokio::test]
    async fn consent_can_be_granted_and_revoked() {
        let store = store().await;
        store.upsert_user("1", "alice").await.unwrap();
        assert!(!store.consent("1").await.unwrap());

        store.set_consent("1", true).await.unwrap();
        assert!(store.consent("1").await.unwrap());

        store.set_consent("1", false).await.unwrap();
        assert!(!store.consent("1").await.unwrap());
    }

    #[tokio::test]
    async fn consented_snapshot_only_lists_consenting_users() {
        let store = store().await;
        for (id, handle) in [("1", "a"), ("2", "b"), ("3", "c")] {
            store.upsert_user(id, handle).await.unwrap();
        }
        store.set_consent("1", true).await.unwrap();
        store.set_consent("3", true).await.unwrap();

        let mut ids = store.consented_user_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn consented_snapshot_empty_store() {
        let store = store().await;
        assert!(store.consented_user_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("formbot.db");

        {
            let store = LibSqlStore::new_local(&path).await.unwrap();
            store.upsert_user("1", "alice").await.unwrap();
            store.set_consent("1", true).await.unwrap();
        }

        // Reopen: consent survives the process lifetime, unlike sessions.
        let store = LibSqlStore::new_local(&path).await.unwrap();
        assert!(store.consent("1").await.unwrap());
    }
}
