use std::sync::Arc;

use futures::StreamExt;

use intake_bot::channels::{ChatTransport, TelegramChannel};
use intake_bot::config::BotConfig;
use intake_bot::error::{Error, Result};
use intake_bot::intake::{ChatSurface, ConversationRouter, IntakeEngine, SubmissionDispatcher};
use intake_bot::store::{FormStore, LibSqlBackend};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        if matches!(e, Error::Config(_)) {
            eprintln!("  export TELEGRAM_BOT_TOKEN=123456:ABC...");
            eprintln!("  export INTAKE_ADMIN_ID=<operator chat id>");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = BotConfig::from_env()?;

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn FormStore> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);

    // ── Telegram ─────────────────────────────────────────────────────────
    let telegram = Arc::new(
        TelegramChannel::new(config.bot_token, config.allowed_users)
            .with_poll_timeout(config.poll_timeout),
    );
    let bot_name = telegram.health_check().await?;

    let resumable = store
        .active_forms()
        .await?
        .iter()
        .filter(|(_, state)| state.in_conversation)
        .count();

    eprintln!("📝 Intake Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Bot: @{bot_name}");
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Operator: {}", config.admin_chat_id);
    if resumable > 0 {
        eprintln!("   Resumable conversations: {resumable}");
    }

    // ── Intake pipeline ──────────────────────────────────────────────────
    let transport: Arc<dyn ChatTransport> = telegram.clone();
    let surface = ChatSurface::new(transport);
    let dispatcher = SubmissionDispatcher::new(surface.clone(), config.admin_chat_id);
    let engine = IntakeEngine::new(store, surface, dispatcher)
        .with_delete_user_messages(config.delete_user_messages);
    let router = ConversationRouter::new(Arc::new(engine));

    let mut updates = telegram.start();
    loop {
        tokio::select! {
            update = updates.next() => {
                let Some(update) = update else {
                    tracing::warn!("Update stream ended");
                    break;
                };
                router.submit(update).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    router.wait_idle().await;

    // Otherwise the last batch is fetched again on the next start.
    if let Err(e) = telegram.confirm_delivered().await {
        tracing::warn!("Could not confirm handled updates: {e}");
    }
    Ok(())
}
