use clap::{command, Parser};
use std::{path::PathBuf, sync::Arc};
use tikbot::{
    config::BotConfig,
    platform::{ConsoleClient, PlatformClient},
    TikBot, TikBotError,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Read chat from stdin (`user: message`, `/gift user Rose 3`, ...)
    #[arg(long)]
    console: bool,
}

async fn run(cli: &Cli) -> Result<(), TikBotError> {
    if !cli.config.exists() {
        BotConfig::create_default().save(&cli.config)?;
        println!(
            "Created a default config at {}. Set tiktok.username and run again.",
            cli.config.display()
        );
        return Ok(());
    }

    let config = BotConfig::load(&cli.config)?;
    info!("config loaded.");
    debug!("config: {:?}", config);

    let username = config.tiktok.username.clone();
    let platform: Arc<dyn PlatformClient> = if cli.console {
        Arc::new(ConsoleClient::stdin(&username))
    } else {
        Arc::new(ConsoleClient::from_reader(&username, tokio::io::empty()))
    };

    let bot = TikBot::new(config, platform);
    bot.start().await?;

    println!("TikBot is live for @{}. Press Ctrl+C to shutdown.", username);

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| TikBotError::internal(format!("Failed to wait for Ctrl+C: {}", e)))?;

    println!("Shutdown signal received, performing clean shutdown...");
    bot.stop().await?;

    let stats = bot.get_stats();
    println!(
        "Messages: {}, gifts: {}, followers: {}",
        stats.messages_received, stats.gifts_received, stats.followers_gained
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
