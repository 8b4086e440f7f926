use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::html;
use tracing::{error, info, warn};

use crate::bot::keyboards::{pending_overview_keyboard, user_keyboard};
use crate::services::approval_service::SubmitOutcome;
use crate::AppState;

const HELP_TEXT: &str = "Send /start to request VPN access. Once an administrator approves \
you, use the buttons to get your connection link.";

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    match command_name(text) {
        Some("start") => handle_start(&bot, &msg, &state).await,
        Some("admin") => handle_admin(&bot, &msg, &state).await,
        Some("help") => {
            bot.send_message(msg.chat.id, HELP_TEXT).await?;
            Ok(())
        }
        _ => fallback(&bot, &msg).await,
    }
}

/// `/start@my_bot args` -> `start`.
fn command_name(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    Some(name.split('@').next().unwrap_or(name))
}

fn display_name(msg: &Message) -> String {
    msg.from
        .as_ref()
        .map(|u| u.username.clone().unwrap_or_else(|| u.full_name()))
        .unwrap_or_else(|| "[unknown]".to_string())
}

async fn handle_start(bot: &Bot, msg: &Message, state: &AppState) -> Result<(), teloxide::RequestError> {
    let requester_id = msg.chat.id.0;
    let name = display_name(msg);
    info!("Received /start from user_id={}, username={}", requester_id, name);

    match state.approvals.submit_request(requester_id, &name).await {
        Ok(SubmitOutcome::AlreadyApproved) => {
            bot.send_message(msg.chat.id, "✅ You are already registered! Choose an action below:")
                .reply_markup(user_keyboard())
                .await?;
        }
        Ok(SubmitOutcome::AlreadyPending) => {
            bot.send_message(
                msg.chat.id,
                "⌛ Your request has already been received and is awaiting approval.",
            )
            .await?;
        }
        Ok(SubmitOutcome::Created) => {
            bot.send_message(
                msg.chat.id,
                "📝 Your request has been sent to the administrators for review.",
            )
            .await?;
        }
        Err(e) => {
            error!("Failed to submit request for {}: {:#}", requester_id, e);
            bot.send_message(msg.chat.id, "❌ Something went wrong. Please try again later.")
                .await?;
        }
    }
    Ok(())
}

async fn handle_admin(bot: &Bot, msg: &Message, state: &AppState) -> Result<(), teloxide::RequestError> {
    let caller_id = msg.chat.id.0;

    let is_admin = state.approvals.is_admin(caller_id).await.unwrap_or_else(|e| {
        error!("Failed to load administrators: {:#}", e);
        false
    });
    if !is_admin {
        warn!("User {} tried to open the admin panel", caller_id);
        bot.send_message(msg.chat.id, "⛔ Access denied").await?;
        return Ok(());
    }

    let (pending, approved) = match state.approvals.overview().await {
        Ok(collections) => collections,
        Err(e) => {
            error!("Failed to load approval collections: {:#}", e);
            bot.send_message(msg.chat.id, "❌ Could not load requests.").await?;
            return Ok(());
        }
    };

    let mut lines = Vec::new();
    if !pending.is_empty() {
        lines.push("<b>Pending:</b>".to_string());
        for r in &pending {
            lines.push(format!("- {} (ID: {})", html::escape(&r.display_name), r.requester_id));
        }
    }
    if !approved.is_empty() {
        lines.push("<b>Approved:</b>".to_string());
        for a in &approved {
            lines.push(format!("- {} (ID: {})", html::escape(&a.display_name), a.requester_id));
        }
    }
    let text = if lines.is_empty() {
        "No requests".to_string()
    } else {
        lines.join("\n")
    };

    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(pending_overview_keyboard(&pending))
        .await?;
    Ok(())
}

async fn fallback(bot: &Bot, msg: &Message) -> Result<(), teloxide::RequestError> {
    bot.send_message(msg.chat.id, "I don't understand. Send /help for usage.")
        .await?;
    Ok(())
}
