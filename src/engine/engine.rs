//! Conversation engine — the per-user state machine.
//!
//! Every inbound message is dispatched on the pair (current flow state,
//! message kind). Commands are recognized in every state, ahead of answer
//! capture, so `/cancel` mid-form cancels instead of being recorded.
//!
//! The run loop feeds messages to `handle_message` one at a time, which
//! serializes all session mutation; nothing here holds a cross-user lock
//! across an await.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::broadcast::BroadcastPayload;
use crate::catalog::{FormCatalog, FormDef, META_HEADERS};
use crate::channels::{IncomingMessage, OutgoingResponse};
use crate::engine::session::{FlowState, SessionStore};
use crate::error::EngineError;
use crate::sink::{SubmissionRow, TabularSink};
use crate::store::RecordStore;
use crate::texts;

/// What an inbound message is, before state dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageKind {
    Start,
    Help,
    Cancel,
    Broadcast,
    Text,
}

fn classify(content: &str) -> MessageKind {
    match content.trim() {
        "/start" => MessageKind::Start,
        "/help" => MessageKind::Help,
        "/cancel" => MessageKind::Cancel,
        "/broadcast" => MessageKind::Broadcast,
        t if t == texts::HELP_LABEL => MessageKind::Help,
        _ => MessageKind::Text,
    }
}

/// Result of one conversation turn.
#[derive(Default)]
pub struct TurnOutput {
    /// Replies to send back to the user, in order.
    pub replies: Vec<OutgoingResponse>,
    /// A broadcast payload armed by an operator, to be dispatched by the
    /// caller outside the state machine.
    pub broadcast: Option<BroadcastPayload>,
}

impl TurnOutput {
    fn replies(replies: Vec<OutgoingResponse>) -> Self {
        Self {
            replies,
            broadcast: None,
        }
    }

    fn reply(response: OutgoingResponse) -> Self {
        Self::replies(vec![response])
    }
}

/// The conversation engine.
pub struct ConversationEngine {
    catalog: Arc<FormCatalog>,
    records: Arc<dyn RecordStore>,
    sink: Arc<dyn TabularSink>,
    sessions: Arc<dyn SessionStore>,
    admin_ids: Vec<String>,
}

impl ConversationEngine {
    pub fn new(
        catalog: Arc<FormCatalog>,
        records: Arc<dyn RecordStore>,
        sink: Arc<dyn TabularSink>,
        sessions: Arc<dyn SessionStore>,
        admin_ids: Vec<String>,
    ) -> Self {
        Self {
            catalog,
            records,
            sink,
            sessions,
            admin_ids,
        }
    }

    fn is_admin(&self, user_id: &str) -> bool {
        self.admin_ids.iter().any(|id| id == user_id)
    }

    /// Process one inbound message and produce the replies for it.
    pub async fn handle_message(&self, msg: &IncomingMessage) -> Result<TurnOutput, EngineError> {
        // Every contact upserts the user record; consent is untouched.
        self.records.upsert_user(&msg.user_id, &msg.handle).await?;

        let state = self.sessions.get(&msg.user_id).await;
        let kind = classify(&msg.content);

        let output = match (state, kind) {
            // Commands are recognized in every state, ahead of any capture.
            (_, MessageKind::Broadcast) if self.is_admin(&msg.user_id) => {
                self.arm_broadcast(msg).await
            }
            (_, MessageKind::Start) => self.handle_start(msg).await?,
            (_, MessageKind::Help) => TurnOutput::reply(
                OutgoingResponse::text(texts::help_text(&self.catalog))
                    .with_keyboard(texts::main_menu_rows(&self.catalog)),
            ),
            (FlowState::AwaitingBroadcast, MessageKind::Cancel) => {
                self.sessions.clear(&msg.user_id).await;
                TurnOutput::reply(
                    OutgoingResponse::text(texts::BROADCAST_CANCELLED)
                        .with_keyboard(texts::main_menu_rows(&self.catalog)),
                )
            }
            (FlowState::InForm { .. } | FlowState::AwaitingConsent, MessageKind::Cancel) => {
                self.sessions.clear(&msg.user_id).await;
                TurnOutput::reply(
                    OutgoingResponse::text(texts::CANCELLED)
                        .with_keyboard(texts::main_menu_rows(&self.catalog)),
                )
            }
            (FlowState::Idle, MessageKind::Cancel) => TurnOutput::reply(
                OutgoingResponse::text(texts::NOTHING_TO_CANCEL)
                    .with_keyboard(texts::main_menu_rows(&self.catalog)),
            ),

            // Armed broadcast: the next operator message is the payload.
            (FlowState::AwaitingBroadcast, _) => self.fire_broadcast(msg).await,

            // Consent gate.
            (FlowState::AwaitingConsent, _) => self.handle_consent_answer(msg).await?,

            // Active form: any remaining text is the current answer.
            (
                FlowState::InForm {
                    form_id,
                    cursor,
                    answers,
                },
                _,
            ) => self.handle_form_answer(msg, form_id, cursor, answers).await?,

            // No session.
            (FlowState::Idle, _) => self.handle_idle_text(msg).await?,
        };

        Ok(output)
    }

    // ── Transitions ─────────────────────────────────────────────────

    async fn handle_start(&self, msg: &IncomingMessage) -> Result<TurnOutput, EngineError> {
        if !self.records.consent(&msg.user_id).await? {
            self.sessions
                .set(&msg.user_id, FlowState::AwaitingConsent)
                .await;
            return Ok(TurnOutput::reply(
                OutgoingResponse::text(texts::CONSENT_PROMPT)
                    .with_one_time_keyboard(texts::consent_rows()),
            ));
        }

        self.sessions.clear(&msg.user_id).await;
        Ok(TurnOutput::reply(
            OutgoingResponse::text(texts::greeting(display_name(msg)))
                .with_keyboard(texts::main_menu_rows(&self.catalog)),
        ))
    }

    async fn handle_consent_answer(
        &self,
        msg: &IncomingMessage,
    ) -> Result<TurnOutput, EngineError> {
        let answer = msg.content.trim();

        if texts::is_yes(answer) {
            self.records.set_consent(&msg.user_id, true).await?;
            self.sessions.clear(&msg.user_id).await;
            info!(user_id = %msg.user_id, "Consent granted");
            return Ok(TurnOutput::reply(
                OutgoingResponse::text(texts::CONSENT_THANKS)
                    .with_keyboard(texts::main_menu_rows(&self.catalog)),
            ));
        }

        if texts::is_no(answer) {
            self.records.set_consent(&msg.user_id, false).await?;
            info!(user_id = %msg.user_id, "Consent declined");
            return Ok(TurnOutput::reply(
                OutgoingResponse::text(texts::CONSENT_REFUSED)
                    .with_one_time_keyboard(texts::consent_rows()),
            ));
        }

        // Unrecognized answer: re-prompt, no state change.
        Ok(TurnOutput::reply(
            OutgoingResponse::text(texts::CONSENT_REPROMPT)
                .with_one_time_keyboard(texts::consent_rows()),
        ))
    }

    async fn handle_idle_text(&self, msg: &IncomingMessage) -> Result<TurnOutput, EngineError> {
        if !self.records.consent(&msg.user_id).await? {
            self.sessions
                .set(&msg.user_id, FlowState::AwaitingConsent)
                .await;
            return Ok(TurnOutput::reply(
                OutgoingResponse::text(texts::CONSENT_PROMPT)
                    .with_one_time_keyboard(texts::consent_rows()),
            ));
        }

        if let Some(form) = self.catalog.by_menu_label(msg.content.trim()) {
            return Ok(self.start_form(msg, form).await);
        }

        // Not a menu option: nudge back to the menu.
        Ok(TurnOutput::reply(
            OutgoingResponse::text(texts::MENU_PROMPT)
                .with_keyboard(texts::main_menu_rows(&self.catalog)),
        ))
    }

    async fn start_form(&self, msg: &IncomingMessage, form: &FormDef) -> TurnOutput {
        self.sessions
            .set(
                &msg.user_id,
                FlowState::InForm {
                    form_id: form.id.to_string(),
                    cursor: 0,
                    answers: Vec::new(),
                },
            )
            .await;

        info!(user_id = %msg.user_id, form_id = form.id, "Form started");

        TurnOutput::replies(vec![
            OutgoingResponse::text(texts::form_intro(form.title, form.questions.len()))
                .remove_keyboard(),
            OutgoingResponse::text(form.questions[0].clone()),
        ])
    }

    async fn handle_form_answer(
        &self,
        msg: &IncomingMessage,
        form_id: String,
        cursor: usize,
        mut answers: Vec<(String, String)>,
    ) -> Result<TurnOutput, EngineError> {
        // A static catalog cannot lose a form mid-session; if it does, the
        // process state is corrupt and this turn cannot recover.
        let form = self
            .catalog
            .get(&form_id)
            .ok_or(EngineError::UnknownForm { form_id })?;

        if cursor < form.questions.len() {
            answers.push((
                form.questions[cursor].clone(),
                msg.content.trim().to_string(),
            ));
        }
        let cursor = cursor + 1;

        if cursor < form.questions.len() {
            let question = form.questions[cursor].clone();
            self.sessions
                .set(
                    &msg.user_id,
                    FlowState::InForm {
                        form_id: form.id.to_string(),
                        cursor,
                        answers,
                    },
                )
                .await;
            return Ok(TurnOutput::reply(OutgoingResponse::text(question)));
        }

        Ok(self.submit_form(msg, form, answers).await)
    }

    /// Build the submission row and hand it to the sink. The session is
    /// cleared whether or not the append succeeds; a failure costs the
    /// collected answers (no automatic retry).
    async fn submit_form(
        &self,
        msg: &IncomingMessage,
        form: &FormDef,
        answers: Vec<(String, String)>,
    ) -> TurnOutput {
        let mut row = SubmissionRow::new();
        row.insert(META_HEADERS[0], Utc::now().to_rfc3339());
        row.insert(META_HEADERS[1], msg.user_id.clone());
        // Users without an account handle still get a readable column.
        let handle = if msg.handle.is_empty() {
            display_name(msg)
        } else {
            msg.handle.as_str()
        };
        row.insert(META_HEADERS[2], handle);
        for (question, answer) in answers {
            row.insert(question, answer);
        }

        self.sessions.clear(&msg.user_id).await;

        let mut replies = vec![OutgoingResponse::text(texts::SAVING).remove_keyboard()];
        let headers = form.headers();
        match self.sink.append_row(form.title, &headers, &row).await {
            Ok(()) => {
                info!(user_id = %msg.user_id, form_id = form.id, "Submission saved");
                replies.push(
                    OutgoingResponse::text(texts::SAVED)
                        .with_keyboard(texts::main_menu_rows(&self.catalog)),
                );
            }
            Err(e) => {
                error!(user_id = %msg.user_id, form_id = form.id, error = %e, "Submission failed");
                replies.push(
                    OutgoingResponse::text(texts::SAVE_FAILED)
                        .with_keyboard(texts::main_menu_rows(&self.catalog)),
                );
            }
        }

        TurnOutput::replies(replies)
    }

    // ── Broadcast arm/fire ──────────────────────────────────────────

    async fn arm_broadcast(&self, msg: &IncomingMessage) -> TurnOutput {
        self.sessions
            .set(&msg.user_id, FlowState::AwaitingBroadcast)
            .await;
        info!(operator = %msg.user_id, "Broadcast armed");
        TurnOutput::reply(OutgoingResponse::text(texts::BROADCAST_PROMPT).remove_keyboard())
    }

    async fn fire_broadcast(&self, msg: &IncomingMessage) -> TurnOutput {
        self.sessions.clear(&msg.user_id).await;

        if !self.is_admin(&msg.user_id) {
            // A stale broadcast session for a demoted operator.
            warn!(user_id = %msg.user_id, "Broadcast fire from non-operator ignored");
            return TurnOutput::default();
        }

        TurnOutput {
            replies: Vec::new(),
            broadcast: Some(BroadcastPayload {
                text: msg.content.trim().to_string(),
                photo_file_id: msg.attachment.as_ref().map(|a| a.file_id.clone()),
            }),
        }
    }
}

/// Name used in greetings; handle as fallback for transports without one.
fn display_name(msg: &IncomingMessage) -> &str {
    if !msg.user_name.is_empty() {
        &msg.user_name
    } else if !msg.handle.is_empty() {
        &msg.handle
    } else {
        "friend"
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::engine::session::InMemorySessionStore;
    use crate::error::SinkError;
    use crate::sink::MemorySink;
    use crate::store::LibSqlStore;

    fn test_catalog() -> FormCatalog {
        FormCatalog::with_forms(vec![FormDef {
            id: "trio",
            title: "Trio form",
            menu_label: "Trio",
            questions: vec!["Q1".into(), "Q2".into(), "Q3".into()],
        }])
    }

    struct Harness {
        engine: ConversationEngine,
        sink: Arc<MemorySink>,
        records: Arc<LibSqlStore>,
    }

    async fn harness() -> Harness {
        harness_with_admins(&["900"]).await
    }

    async fn harness_with_admins(admins: &[&str]) -> Harness {
        let catalog = Arc::new(test_catalog());
        let records = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let sink = Arc::new(MemorySink::new());
        sink.ensure_table("Trio form", &catalog.get("trio").unwrap().headers())
            .await
            .unwrap();

        let engine = ConversationEngine::new(
            Arc::clone(&catalog),
            Arc::clone(&records) as Arc<dyn RecordStore>,
            Arc::clone(&sink) as Arc<dyn TabularSink>,
            Arc::new(InMemorySessionStore::new()),
            admins.iter().map(|s| s.to_string()).collect(),
        );

        Harness {
            engine,
            sink,
            records,
        }
    }

    fn msg(user_id: &str, text: &str) -> IncomingMessage {
        IncomingMessage::new("telegram", user_id, text)
            .with_handle("handle")
            .with_user_name("Name")
    }

    async fn send(h: &Harness, user_id: &str, text: &str) -> TurnOutput {
        h.engine.handle_message(&msg(user_id, text)).await.unwrap()
    }

    async fn consent(h: &Harness, user_id: &str) {
        send(h, user_id, "/start").await;
        send(h, user_id, "yes").await;
    }

    // ── Consent flow ────────────────────────────────────────────────

    #[tokio::test]
    async fn first_contact_asks_for_consent() {
        let h = harness().await;
        let out = send(&h, "1", "/start").await;
        assert_eq!(out.replies.len(), 1);
        assert!(out.replies[0].content.contains("consent"));
        assert!(!h.records.consent("1").await.unwrap());
    }

    #[tokio::test]
    async fn affirmative_answer_grants_consent() {
        let h = harness().await;
        send(&h, "1", "/start").await;
        let out = send(&h, "1", "YES").await;
        assert!(h.records.consent("1").await.unwrap());
        assert!(out.replies[0].content.contains("Thank you"));
    }

    #[tokio::test]
    async fn negative_answer_revokes_and_reprompts() {
        let h = harness().await;
        send(&h, "1", "/start").await;
        let out = send(&h, "1", "no").await;
        assert!(!h.records.consent("1").await.unwrap());
        assert!(out.replies[0].content.contains("can't continue"));

        // Still awaiting consent: yes now succeeds.
        send(&h, "1", "yes").await;
        assert!(h.records.consent("1").await.unwrap());
    }

    #[tokio::test]
    async fn unrecognized_consent_answer_reprompts_without_change() {
        let h = harness().await;
        send(&h, "1", "/start").await;
        let out = send(&h, "1", "what is this").await;
        assert!(out.replies[0].content.contains("buttons"));
        assert!(!h.records.consent("1").await.unwrap());
    }

    #[tokio::test]
    async fn menu_access_without_consent_routes_to_consent() {
        let h = harness().await;
        let out = send(&h, "1", "Trio").await;
        assert!(out.replies[0].content.contains("consent"));
        assert!(h.sink.rows("Trio form").await.len() == 1); // header only
    }

    // ── Form flow ───────────────────────────────────────────────────

    #[tokio::test]
    async fn complete_form_appends_one_row_in_question_order() {
        let h = harness().await;
        consent(&h, "1").await;

        let out = send(&h, "1", "Trio").await;
        assert_eq!(out.replies.len(), 2);
        assert_eq!(out.replies[1].content, "Q1");

        assert_eq!(send(&h, "1", "A").await.replies[0].content, "Q2");
        assert_eq!(send(&h, "1", "B").await.replies[0].content, "Q3");
        let done = send(&h, "1", "C").await;
        assert!(done.replies.last().unwrap().content.contains("saved"));

        let rows = h.sink.rows("Trio form").await;
        assert_eq!(rows.len(), 2, "header plus exactly one data row");
        let row = &rows[1];
        assert!(!row[0].is_empty(), "timestamp populated");
        assert_eq!(row[1], "1");
        assert_eq!(row[2], "handle");
        assert_eq!(&row[3..], &["A", "B", "C"]);
    }

    #[tokio::test]
    async fn answers_are_trimmed_but_stored_verbatim() {
        let h = harness().await;
        consent(&h, "1").await;
        send(&h, "1", "Trio").await;
        send(&h, "1", "  padded answer  ").await;
        send(&h, "1", "").await;
        send(&h, "1", "last").await;

        let rows = h.sink.rows("Trio form").await;
        assert_eq!(&rows[1][3..], &["padded answer", "", "last"]);
    }

    #[tokio::test]
    async fn cancel_at_any_cursor_discards_answers() {
        for answered in 0..3 {
            let h = harness().await;
            consent(&h, "1").await;
            send(&h, "1", "Trio").await;
            for i in 0..answered {
                send(&h, "1", &format!("answer {i}")).await;
            }

            let out = send(&h, "1", "/cancel").await;
            assert!(out.replies[0].content.contains("cancelled"));
            assert_eq!(h.sink.rows("Trio form").await.len(), 1, "no row appended");

            // A fresh selection starts over at the first question.
            let restart = send(&h, "1", "Trio").await;
            assert_eq!(restart.replies[1].content, "Q1");
        }
    }

    #[tokio::test]
    async fn cancel_without_session_is_a_notice() {
        let h = harness().await;
        consent(&h, "1").await;
        let out = send(&h, "1", "/cancel").await;
        assert!(out.replies[0].content.contains("No questionnaire"));
    }

    #[tokio::test]
    async fn unknown_text_with_no_session_reprompts_menu() {
        let h = harness().await;
        consent(&h, "1").await;
        let out = send(&h, "1", "hello?").await;
        assert!(out.replies[0].content.contains("menu"));
    }

    #[tokio::test]
    async fn help_mid_form_is_not_recorded_as_answer() {
        let h = harness().await;
        consent(&h, "1").await;
        send(&h, "1", "Trio").await;
        send(&h, "1", "/help").await;
        send(&h, "1", "A").await;
        send(&h, "1", "B").await;
        send(&h, "1", "C").await;

        let rows = h.sink.rows("Trio form").await;
        assert_eq!(&rows[1][3..], &["A", "B", "C"]);
    }

    #[tokio::test]
    async fn concurrent_users_have_independent_sessions() {
        let h = harness().await;
        consent(&h, "1").await;
        consent(&h, "2").await;

        send(&h, "1", "Trio").await;
        send(&h, "2", "Trio").await;
        send(&h, "1", "A1").await;
        send(&h, "2", "A2").await;
        send(&h, "1", "B1").await;
        send(&h, "2", "B2").await;
        send(&h, "1", "C1").await;
        send(&h, "2", "C2").await;

        let rows = h.sink.rows("Trio form").await;
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[1][3..], &["A1", "B1", "C1"]);
        assert_eq!(&rows[2][3..], &["A2", "B2", "C2"]);
    }

    // ── Submission failure ──────────────────────────────────────────

    struct FailingSink;

    #[async_trait]
    impl TabularSink for FailingSink {
        async fn ensure_table(&self, _: &str, _: &[String]) -> Result<(), SinkError> {
            Ok(())
        }

        async fn append_row(
            &self,
            _: &str,
            _: &[String],
            _: &SubmissionRow,
        ) -> Result<(), SinkError> {
            Err(SinkError::Request("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn submission_failure_notifies_and_clears_session() {
        let records = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let engine = ConversationEngine::new(
            Arc::new(test_catalog()),
            Arc::clone(&records) as Arc<dyn RecordStore>,
            Arc::new(FailingSink),
            Arc::new(InMemorySessionStore::new()),
            vec![],
        );

        let h = Harness {
            engine,
            sink: Arc::new(MemorySink::new()),
            records,
        };
        consent(&h, "1").await;
        send(&h, "1", "Trio").await;
        send(&h, "1", "A").await;
        send(&h, "1", "B").await;
        let out = send(&h, "1", "C").await;
        assert!(out.replies.last().unwrap().content.contains("wrong"));

        // Session was cleared: next text is a menu re-prompt, not an answer.
        let next = send(&h, "1", "D").await;
        assert!(next.replies[0].content.contains("menu"));
    }

    // ── Broadcast arm/fire ──────────────────────────────────────────

    #[tokio::test]
    async fn operator_arm_then_fire_produces_payload() {
        let h = harness().await;
        consent(&h, "900").await;

        let armed = send(&h, "900", "/broadcast").await;
        assert!(armed.replies[0].content.contains("Broadcast mode"));

        let fired = send(&h, "900", "hello everyone").await;
        assert!(fired.replies.is_empty());
        let payload = fired.broadcast.unwrap();
        assert_eq!(payload.text, "hello everyone");
        assert!(payload.photo_file_id.is_none());
    }

    #[tokio::test]
    async fn operator_fire_with_photo_attachment() {
        let h = harness().await;
        send(&h, "900", "/broadcast").await;

        let message = msg("900", "caption text").with_attachment(crate::channels::Attachment {
            file_id: "photo-9".into(),
        });
        let fired = h.engine.handle_message(&message).await.unwrap();
        let payload = fired.broadcast.unwrap();
        assert_eq!(payload.text, "caption text");
        assert_eq!(payload.photo_file_id.as_deref(), Some("photo-9"));
    }

    #[tokio::test]
    async fn operator_cancel_disarms_broadcast() {
        let h = harness().await;
        send(&h, "900", "/broadcast").await;
        let out = send(&h, "900", "/cancel").await;
        assert!(out.replies[0].content.contains("Broadcast cancelled"));

        // Next message is a normal turn, not a broadcast payload.
        consent(&h, "900").await;
        let next = send(&h, "900", "hello").await;
        assert!(next.broadcast.is_none());
    }

    #[tokio::test]
    async fn non_operator_broadcast_is_not_armed() {
        let h = harness().await;
        consent(&h, "1").await;
        let out = send(&h, "1", "/broadcast").await;
        assert!(out.broadcast.is_none());
        // Falls through to the menu re-prompt path.
        assert!(out.replies[0].content.contains("menu"));
    }

    // ── Record keeping ──────────────────────────────────────────────

    #[tokio::test]
    async fn every_contact_upserts_the_user_record() {
        let h = harness().await;
        send(&h, "1", "anything").await;
        let user = h.records.get_user("1").await.unwrap().unwrap();
        assert_eq!(user.handle, "handle");
        assert!(!user.consent_given);
    }
}
