//! Broadcast dispatcher — operator fan-out to all consented users.
//!
//! Runs outside the per-user state machine: the engine arms and produces a
//! payload, the dispatcher snapshots the consented audience and drives the
//! sends. Per-recipient failures are counted, never retried, and never
//! abort the run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ChannelError, StoreError};
use crate::store::RecordStore;

/// Outbound sends addressed by user id rather than by reply.
#[async_trait]
pub trait DirectSender: Send + Sync {
    async fn send_text(&self, user_id: &str, text: &str) -> Result<(), ChannelError>;

    async fn send_photo(
        &self,
        user_id: &str,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;
}

/// What an operator asked to fan out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPayload {
    /// Message text, or photo caption when an attachment is present.
    pub text: String,
    pub photo_file_id: Option<String>,
}

impl BroadcastPayload {
    /// True when there is anything to deliver at all.
    pub fn has_content(&self) -> bool {
        self.photo_file_id.is_some() || !self.text.is_empty()
    }
}

/// Outcome of one broadcast run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Size of the audience snapshot.
    pub recipients: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Fan-out loop over the consented audience.
pub struct BroadcastDispatcher {
    records: Arc<dyn RecordStore>,
    sender: Arc<dyn DirectSender>,
    delay: Duration,
}

impl BroadcastDispatcher {
    pub fn new(
        records: Arc<dyn RecordStore>,
        sender: Arc<dyn DirectSender>,
        delay: Duration,
    ) -> Self {
        Self {
            records,
            sender,
            delay,
        }
    }

    /// Run one broadcast. The audience is a point-in-time snapshot; users
    /// who consent mid-run are not added.
    pub async fn dispatch(&self, payload: &BroadcastPayload) -> Result<BroadcastReport, StoreError> {
        let recipients = self.records.consented_user_ids().await?;
        let run_id = Uuid::new_v4();

        info!(
            run_id = %run_id,
            recipients = recipients.len(),
            has_photo = payload.photo_file_id.is_some(),
            "Broadcast started"
        );

        let mut sent = 0usize;
        let mut failed = 0usize;

        for user_id in &recipients {
            let result = match &payload.photo_file_id {
                Some(file_id) => {
                    let caption = (!payload.text.is_empty()).then_some(payload.text.as_str());
                    self.sender.send_photo(user_id, file_id, caption).await
                }
                None => {
                    if payload.text.is_empty() {
                        // Nothing to send: skipped, counted as neither
                        // success nor failure.
                        continue;
                    }
                    self.sender.send_text(user_id, &payload.text).await
                }
            };

            match result {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(run_id = %run_id, user_id = %user_id, error = %e, "Broadcast send failed");
                    failed += 1;
                }
            }

            tokio::time::sleep(self.delay).await;
        }

        info!(run_id = %run_id, sent, failed, "Broadcast finished");

        Ok(BroadcastReport {
            recipients: recipients.len(),
            sent,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use tokio::sync::Mutex;

    use super::*;
    use crate::store::LibSqlStore;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Sent {
        Text(String, String),
        Photo(String, String, Option<String>),
    }

    #[derive(Default)]
    struct FakeSender {
        sends: Mutex<Vec<Sent>>,
        fail_for: HashSet<String>,
    }

    impl FakeSender {
        fn failing_for(user_ids: &[&str]) -> Self {
            Self {
                sends: Mutex::new(Vec::new()),
                fail_for: user_ids.iter().map(|s| s.to_string()).collect(),
            }
        }

        async fn sent(&self) -> Vec<Sent> {
            self.sends.lock().await.clone()
        }
    }

    #[async_trait]
    impl DirectSender for FakeSender {
        async fn send_text(&self, user_id: &str, text: &str) -> Result<(), ChannelError> {
            if self.fail_for.contains(user_id) {
                return Err(ChannelError::SendFailed {
                    name: "fake".into(),
                    reason: "blocked by recipient".into(),
                });
            }
            self.sends
                .lock()
                .await
                .push(Sent::Text(user_id.into(), text.into()));
            Ok(())
        }

        async fn send_photo(
            &self,
            user_id: &str,
            file_id: &str,
            caption: Option<&str>,
        ) -> Result<(), ChannelError> {
            if self.fail_for.contains(user_id) {
                return Err(ChannelError::SendFailed {
                    name: "fake".into(),
                    reason: "blocked by recipient".into(),
                });
            }
            self.sends.lock().await.push(Sent::Photo(
                user_id.into(),
                file_id.into(),
                caption.map(String::from),
            ));
            Ok(())
        }
    }

    async fn records_with_consented(user_ids: &[&str]) -> Arc<LibSqlStore> {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        for id in user_ids {
            store.upsert_user(id, "handle").await.unwrap();
            store.set_consent(id, true).await.unwrap();
        }
        store
    }

    fn dispatcher(records: Arc<LibSqlStore>, sender: Arc<FakeSender>) -> BroadcastDispatcher {
        BroadcastDispatcher::new(records, sender, Duration::ZERO)
    }

    fn text_payload(text: &str) -> BroadcastPayload {
        BroadcastPayload {
            text: text.into(),
            photo_file_id: None,
        }
    }

    #[tokio::test]
    async fn zero_consented_users_terminates_with_zero_counts() {
        let records = records_with_consented(&[]).await;
        let sender = Arc::new(FakeSender::default());
        let report = dispatcher(records, Arc::clone(&sender))
            .dispatch(&text_payload("hi"))
            .await
            .unwrap();

        assert_eq!(
            report,
            BroadcastReport {
                recipients: 0,
                sent: 0,
                failed: 0
            }
        );
        assert!(sender.sent().await.is_empty());
    }

    #[tokio::test]
    async fn failure_for_one_recipient_does_not_affect_others() {
        let records = records_with_consented(&["1", "2", "3"]).await;
        let sender = Arc::new(FakeSender::failing_for(&["2"]));
        let report = dispatcher(records, Arc::clone(&sender))
            .dispatch(&text_payload("hello"))
            .await
            .unwrap();

        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, 1);

        let sent = sender.sent().await;
        assert!(sent.contains(&Sent::Text("1".into(), "hello".into())));
        assert!(sent.contains(&Sent::Text("3".into(), "hello".into())));
        assert_eq!(sent.len(), 2);
    }

    #[tokio::test]
    async fn empty_payload_skips_everyone() {
        let records = records_with_consented(&["1", "2", "3"]).await;
        let sender = Arc::new(FakeSender::default());
        let report = dispatcher(records, Arc::clone(&sender))
            .dispatch(&text_payload(""))
            .await
            .unwrap();

        assert_eq!(report.recipients, 3);
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 0);
        assert!(sender.sent().await.is_empty());
    }

    #[tokio::test]
    async fn photo_payload_sends_photo_with_caption() {
        let records = records_with_consented(&["1"]).await;
        let sender = Arc::new(FakeSender::default());
        let payload = BroadcastPayload {
            text: "caption".into(),
            photo_file_id: Some("file-1".into()),
        };
        let report = dispatcher(records, Arc::clone(&sender))
            .dispatch(&payload)
            .await
            .unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(
            sender.sent().await,
            vec![Sent::Photo(
                "1".into(),
                "file-1".into(),
                Some("caption".into())
            )]
        );
    }

    #[tokio::test]
    async fn photo_without_caption_sends_none() {
        let records = records_with_consented(&["1"]).await;
        let sender = Arc::new(FakeSender::default());
        let payload = BroadcastPayload {
            text: String::new(),
            photo_file_id: Some("file-1".into()),
        };
        dispatcher(records, Arc::clone(&sender))
            .dispatch(&payload)
            .await
            .unwrap();

        assert_eq!(
            sender.sent().await,
            vec![Sent::Photo("1".into(), "file-1".into(), None)]
        );
    }

    #[test]
    fn payload_content_check() {
        assert!(!text_payload("").has_content());
        assert!(text_payload("x").has_content());
        assert!(
            BroadcastPayload {
                text: String::new(),
                photo_file_id: Some("f".into())
            }
            .has_content()
        );
    }
}
