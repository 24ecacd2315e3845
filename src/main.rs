use std::sync::Arc;

use futures::StreamExt;

use formbot::broadcast::{BroadcastDispatcher, DirectSender};
use formbot::catalog::FormCatalog;
use formbot::channels::{Channel, ChannelManager, CliChannel, OutgoingResponse, TelegramChannel};
use formbot::config::AppConfig;
use formbot::engine::{ConversationEngine, InMemorySessionStore};
use formbot::sink::{SheetsSink, TabularSink};
use formbot::store::{LibSqlStore, RecordStore};
use formbot::texts;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("🏕 formbot v{}", env!("CARGO_PKG_VERSION"));

    // ── Record store ─────────────────────────────────────────────────
    let db_path = std::path::Path::new(&config.db_path);
    let store: Arc<LibSqlStore> =
        Arc::new(LibSqlStore::new_local(db_path).await.unwrap_or_else(|e| {
            eprintln!("Error: Failed to open record store at {}: {e}", config.db_path);
            std::process::exit(1);
        }));
    eprintln!("   Record store: {}", config.db_path);

    // ── Form catalog ─────────────────────────────────────────────────
    let catalog = Arc::new(FormCatalog::new());
    eprintln!("   Forms: {}", catalog.forms().count());

    // ── Tabular sink: one worksheet per form, reconciled up front ───
    let sink: Arc<SheetsSink> = Arc::new(SheetsSink::new(
        config.sheets_id.clone(),
        config.sheets_token.clone(),
    ));
    for form in catalog.forms() {
        if let Err(e) = sink.ensure_table(form.title, &form.headers()).await {
            eprintln!("Error: Sink reconciliation failed for {:?}: {e}", form.title);
            std::process::exit(1);
        }
    }
    eprintln!("   Sink: spreadsheet {}", config.sheets_id);

    // ── Transport ────────────────────────────────────────────────────
    let telegram = Arc::new(TelegramChannel::new(config.telegram_token.clone()));

    let mut channels = ChannelManager::new();
    channels.add(Arc::new(CliChannel::new()) as Arc<dyn Channel>);
    channels.add(Arc::clone(&telegram) as Arc<dyn Channel>);
    if let Err(e) = channels.health_check_all().await {
        eprintln!("Error: Channel health check failed: {e}");
        std::process::exit(1);
    }
    eprintln!("   Channels: cli, telegram");

    eprintln!(
        "   Admins: {}",
        if config.admin_ids.is_empty() {
            "none (broadcast disabled)".to_string()
        } else {
            config.admin_ids.join(", ")
        }
    );

    // ── Engine + dispatcher ──────────────────────────────────────────
    let engine = ConversationEngine::new(
        Arc::clone(&catalog),
        Arc::clone(&store) as Arc<dyn RecordStore>,
        Arc::clone(&sink) as Arc<dyn TabularSink>,
        Arc::new(InMemorySessionStore::new()),
        config.admin_ids.clone(),
    );
    let dispatcher = BroadcastDispatcher::new(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        Arc::clone(&telegram) as Arc<dyn DirectSender>,
        config.broadcast_delay,
    );

    // ── Main loop ────────────────────────────────────────────────────
    let mut messages = channels.start_all().await?;
    tracing::info!("formbot ready and listening");

    loop {
        let message = tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down...");
                break;
            }
            msg = messages.next() => {
                match msg {
                    Some(m) => m,
                    None => {
                        tracing::info!("All channel streams ended, shutting down...");
                        break;
                    }
                }
            }
        };

        match engine.handle_message(&message).await {
            Ok(output) => {
                for reply in output.replies {
                    if let Err(e) = channels.respond(&message, reply).await {
                        tracing::warn!(user_id = %message.user_id, error = %e, "Failed to send reply");
                    }
                }

                if let Some(payload) = output.broadcast {
                    let reply = match dispatcher.dispatch(&payload).await {
                        Ok(report) if report.recipients == 0 => texts::BROADCAST_EMPTY.to_string(),
                        Ok(report) => {
                            texts::broadcast_report(report.recipients, report.sent, report.failed)
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Broadcast dispatch failed");
                            texts::BROADCAST_FAILED.to_string()
                        }
                    };
                    let _ = channels
                        .respond(
                            &message,
                            OutgoingResponse::text(reply)
                                .with_keyboard(texts::main_menu_rows(&catalog)),
                        )
                        .await;
                }
            }
            Err(e) => {
                tracing::error!(user_id = %message.user_id, error = %e, "Error handling message");
                let _ = channels
                    .respond(&message, OutgoingResponse::text(texts::TURN_FAILED))
                    .await;
            }
        }
    }

    tracing::info!("formbot shutting down...");
    channels.shutdown_all().await?;

    Ok(())
}
