use teloxide::{
    dptree,
    prelude::*,
    types::{BotCommand, BotCommandScope, Recipient, Update},
};
use tracing::{error, info, warn};

pub mod handlers;
pub mod keyboards;
pub mod notifier;

fn user_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "Request VPN access"),
        BotCommand::new("help", "How to use this bot"),
    ]
}

fn admin_commands() -> Vec<BotCommand> {
    let mut commands = user_commands();
    commands.push(BotCommand::new("admin", "Review access requests"));
    commands
}

/// Publishes the user menu globally and the extended menu in each admin chat.
async fn register_commands(bot: &Bot, admins: &[i64]) {
    if let Err(e) = bot
        .set_my_commands(user_commands())
        .scope(BotCommandScope::Default)
        .await
    {
        warn!("Failed to set default commands: {}", e);
    }

    for &admin_id in admins {
        if let Err(e) = bot
            .set_my_commands(admin_commands())
            .scope(BotCommandScope::Chat {
                chat_id: Recipient::Id(ChatId(admin_id)),
            })
            .await
        {
            warn!("Failed to set commands for admin {}: {}", admin_id, e);
        }
    }
}

pub async fn run_bot(
    bot: Bot,
    mut shutdown_signal: tokio::sync::broadcast::Receiver<()>,
    state: crate::AppState,
) {
    info!("Starting bot dispatcher...");

    match bot.get_me().await {
        Ok(me) => {
            let username = me.username.clone().unwrap_or("unknown".into());
            info!("Bot connected as: @{}", username);
        }
        Err(e) => {
            error!("Bot failed to connect to Telegram: {}", e);
            return;
        }
    }

    match state.approvals.administrators().await {
        Ok(admins) => {
            if admins.is_empty() {
                warn!("No administrators configured; requests cannot be approved");
            }
            register_commands(&bot, &admins).await;
        }
        Err(e) => error!("Failed to load administrators: {:#}", e),
    }

    let message_handler = Update::filter_message().endpoint(handlers::command::message_handler);
    let callback_handler =
        Update::filter_callback_query().endpoint(handlers::callback::callback_handler);

    let mut dispatcher = Dispatcher::builder(
        bot,
        dptree::entry().branch(message_handler).branch(callback_handler),
    )
    .dependencies(dptree::deps![state])
    .default_handler(|upd: std::sync::Arc<Update>| async move {
        info!("Unhandled update: {:?}", upd.id);
    })
    .build();

    tokio::select! {
        _ = dispatcher.dispatch() => {
            info!("Bot dispatcher exited naturally");
        }
        _ = shutdown_signal.recv() => {
            info!("Bot received shutdown signal, stopping...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_menu_extends_user_menu() {
        let user: Vec<_> = user_commands().into_iter().map(|c| c.command).collect();
        let admin: Vec<_> = admin_commands().into_iter().map(|c| c.command).collect();
        assert!(user.iter().all(|c| admin.contains(c)));
        assert!(admin.contains(&"admin".to_string()));
        assert!(!user.contains(&"admin".to_string()));
    }
}
