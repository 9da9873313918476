use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use spl_shield_bot::channels::{Channel, CliChannel, TelegramChannel};
use spl_shield_bot::config::BotConfig;
use spl_shield_bot::dispatcher::Dispatcher;
use spl_shield_bot::gateway::ApiGateway;
use spl_shield_bot::runtime::Runtime;
use spl_shield_bot::session::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional .env beside the binary
    let _ = dotenvy::dotenv();

    let config = BotConfig::from_env()?;

    // Initialize tracing; the guard flushes the file writer on exit.
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "spl-shield-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    eprintln!("🛡️ SPL Shield Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {}", config.api_base_url);
    eprintln!("   Admins: {}", config.admin_ids.len());

    let gateway = Arc::new(ApiGateway::new(
        config.api_base_url.clone(),
        config.request_timeout,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        gateway.clone(),
        SessionStore::new(),
        config.admin_ids.clone(),
    ));

    // Telegram when a bot token is set, otherwise a local REPL
    let channel: Arc<dyn Channel> = match &config.bot_token {
        Some(token) if !token.expose_secret().is_empty() => {
            eprintln!(
                "   Telegram: enabled (allowed: {})",
                if config.allowed_users.iter().any(|u| u == "*") {
                    "everyone".to_string()
                } else {
                    config.allowed_users.join(", ")
                }
            );
            Arc::new(TelegramChannel::new(
                token.clone(),
                config.allowed_users.clone(),
            ))
        }
        _ => {
            eprintln!("   Channel: cli (set BOT_TOKEN for Telegram)");
            eprintln!("   Type /start and press Enter. tier:<name> simulates tier buttons.\n");
            Arc::new(CliChannel::new())
        }
    };

    Runtime::new(
        channel,
        dispatcher,
        gateway,
        config.session_idle_timeout,
    )
    .run()
    .await?;

    Ok(())
}
