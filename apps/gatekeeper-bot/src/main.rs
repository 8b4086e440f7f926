use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use gatekeeper_db::ApprovalStore;
use teloxide::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod bot;
mod cli;
mod config;
mod models;
mod panel_client;
mod services;
mod state;
mod vless;

use crate::bot::notifier::TelegramNotifier;
use crate::cli::AdminAction;
use crate::config::BotConfig;
use crate::panel_client::PanelClient;
use crate::services::approval_service::ApprovalService;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "gatekeeper-bot")]
#[command(about = "Telegram bot that gates VPN access behind admin approval", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot (default)
    Serve,
    /// Manage administrator ids
    Admins {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatekeeper_bot=info,gatekeeper_db=info,teloxide=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = BotConfig::load()?;
    let store: Arc<dyn ApprovalStore> = Arc::new(gatekeeper_db::open(config.storage.paths()).await?);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, store).await,
        Commands::Admins { action } => cli::run_admin_action(store.as_ref(), action).await,
    }
}

async fn serve(config: BotConfig, store: Arc<dyn ApprovalStore>) -> Result<()> {
    tracing::info!("Gatekeeper bot starting...");
    tracing::info!("Panel URL: {}", config.panel.api_url);
    if !config.panel.verify_tls {
        tracing::warn!("TLS certificate verification for the panel is disabled");
    }

    let panel = PanelClient::new(&config.panel)?;
    tracing::info!("Connection links point at host {}", panel.host());
    let bot = Bot::new(config.bot_token.clone());
    let notifier = TelegramNotifier::new(bot.clone());
    let approvals = ApprovalService::new(store, Arc::new(panel.clone()), Arc::new(notifier));

    let state = AppState { approvals, panel };

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received");
            let _ = shutdown_tx.send(());
        }
    });

    bot::run_bot(bot, shutdown_rx, state).await;
    tracing::info!("Gatekeeper bot stopped");
    Ok(())
}
