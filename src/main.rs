use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use birthday_bot::activation::{ActivationRouteState, activation_routes};
use birthday_bot::auth::AuthService;
use birthday_bot::channels::{Channel, CliChannel, TelegramChannel};
use birthday_bot::config::BotConfig;
use birthday_bot::conversation::{ConversationEngine, InMemoryStateStore};
use birthday_bot::directory::HttpDirectory;
use birthday_bot::dispatcher::Dispatcher;
use birthday_bot::notify::SmtpNotifier;
use birthday_bot::reminders::ReminderService;
use birthday_bot::store::{IdentityStore, LibSqlBackend};
use birthday_bot::subscribe::SubscriptionService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing; the guard flushes the file writer on exit.
    let _log_guard = init_tracing();

    let config = BotConfig::from_env().context("Invalid configuration")?;

    eprintln!("🎂 Birthday Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Activation: http://{}/v1/auth", config.http_addr);
    eprintln!("   Directory: {}", config.directory_url);

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn IdentityStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Services ─────────────────────────────────────────────────────────
    let notifier = Arc::new(SmtpNotifier::new(config.mail.clone()));
    let auth = Arc::new(AuthService::new(
        Arc::clone(&store),
        notifier,
        config.public_url.clone(),
        config.redirect_url.clone(),
    ));
    let directory = Arc::new(
        HttpDirectory::new(&config.directory_url).context("Invalid directory URL")?,
    );
    let search = Arc::new(SubscriptionService::new(Arc::clone(&store)));
    let engine = Arc::new(ConversationEngine::new(
        auth.clone(),
        directory,
        search,
        Arc::new(InMemoryStateStore::new()),
    ));

    // ── Activation server ────────────────────────────────────────────────
    let app = activation_routes(ActivationRouteState { auth });
    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("Failed to bind activation server on {}", config.http_addr))?;
    tracing::info!(addr = %config.http_addr, "Activation server started");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Activation server stopped: {e}");
        }
    });

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = match &config.telegram {
        Some(tg) => {
            let telegram = TelegramChannel::new(tg);
            telegram
                .health_check()
                .await
                .context("Telegram bot token rejected")?;
            eprintln!("   Channel: telegram");
            Arc::new(telegram)
        }
        None => {
            eprintln!("   Channel: cli (set TELEGRAM_BOT_TOKEN for Telegram)");
            eprintln!("   Type a message and press Enter. Ctrl+C to exit.\n");
            Arc::new(CliChannel::new())
        }
    };

    // ── Birthday reminders ───────────────────────────────────────────────
    let reminders = Arc::new(ReminderService::new(
        Arc::clone(&store),
        Arc::clone(&channel),
        config.reminders.clone(),
    ));
    let reminder_handle = reminders.spawn();

    // ── Main loop ────────────────────────────────────────────────────────
    let dispatcher = Dispatcher::new(engine, channel, config.max_workers);
    dispatcher.run().await?;

    reminder_handle.abort();
    tracing::info!("Birthday bot stopped");
    Ok(())
}

/// Stderr logging filtered by `RUST_LOG` (default `info`), plus a daily
/// rotated file when `BIRTHDAY_BOT_LOG_DIR` is set.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter());

    match std::env::var("BIRTHDAY_BOT_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "birthday-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            tracing_subscriber::registry().with(stderr).with(file).init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::registry().with(stderr).init();
            None
        }
    }
}
