use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wander_bot::azalea_client::AzaleaConnector;
use wander_bot::config::{validate_username, BotConfig};
use wander_bot::dashboard;
use wander_bot::nav_structs::ServerAddress;
use wander_bot::BotClient;

#[derive(Parser)]
#[command(
    name = "wander_bot",
    version,
    about = "Minecraft bot that patrols around a center point"
)]
struct Cli {
    /// JSON settings file; created with defaults if missing.
    #[arg(long, env = "WANDER_BOT_CONFIG", default_value = "config.json")]
    config: PathBuf,
    /// Dashboard address, overrides `http.bind`.
    #[arg(long, env = "WANDER_BOT_BIND")]
    bind: Option<SocketAddr>,
    /// Minecraft server as host or host:port.
    #[arg(long)]
    server: Option<ServerAddress>,
    #[arg(long)]
    username: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wander_bot=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = BotConfig::load_or_create(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(bind) = cli.bind {
        config.http.bind = bind;
    }
    if let Some(server) = cli.server {
        config.server = server;
    }
    if let Some(username) = cli.username {
        validate_username(&username)?;
        config.username = username;
    }

    let listener = dashboard::bind_listener(config.http.bind)
        .with_context(|| format!("binding dashboard to {}", config.http.bind))?;
    let static_dir = config.http.static_dir.clone();
    info!(
        server = %config.server,
        username = %config.username,
        config = %cli.config.display(),
        "starting wander bot"
    );

    let (client, bot) = BotClient::new(AzaleaConnector, config, Some(cli.config));
    let controller = tokio::spawn(client.run());

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("shutdown requested");
    };
    dashboard::serve(listener, bot.clone(), &static_dir, shutdown)
        .await
        .context("dashboard server failed")?;

    bot.shutdown();
    controller.await.context("bot controller panicked")?;
    Ok(())
}
