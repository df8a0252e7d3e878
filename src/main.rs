//! Alexia Bot - Entry Point
//!
//! Modes:
//! - Default / --telegram / -t: Telegram bot (long polling) + control API
//! - --check-config: print the resolved configuration and exit

use alexia_bot::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");
    let check_mode = args.iter().any(|a| a == "--check-config");

    if help_mode {
        println!("Alexia Bot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: alexia-bot [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --telegram, -t     Run the Telegram bot (default)");
        println!("  --check-config     Print resolved configuration and exit");
        println!("  --help, -h         Show this help");
        println!();
        println!("Environment variables:");
        println!("  TELEGRAM_BOT_TOKEN     Telegram bot token");
        println!("  TELEGRAM_BOT_USERNAME  Bot username");
        println!("  GROK_API_KEY           AI API key (unset = echo replies)");
        println!("  GROK_API_URL           Chat completions endpoint");
        println!("  GROK_MODEL             Model name");
        println!("  HISTORY_WINDOW         Turns kept per chat (default: 20)");
        println!("  ALEXIA_DB_PATH         SQLite database path");
        println!("  CONTROL_ADDR           Control API address (default: 127.0.0.1:8080)");
        println!("  BOT_START_ACTIVE       Process messages right away (default: false)");
        println!("  RUST_LOG               Log filter (default: info)");
        println!("  LOG_FORMAT             'json' for JSON logs");
        return Ok(());
    }

    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(true)
            .init();
    }

    let config = Config::from_env()?;

    if check_mode {
        println!("{:#?}", redacted(&config));
        return Ok(());
    }

    info!("Alexia Telegram Bot v{}", env!("CARGO_PKG_VERSION"));
    alexia_bot::telegram::run_telegram_bot(config).await
}

/// Copy of the config safe to print
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if config.telegram_token.is_some() {
        config.telegram_token = Some("***".to_string());
    }
    if config.ai.api_key.is_some() {
        config.ai.api_key = Some("***".to_string());
    }
    config
}
