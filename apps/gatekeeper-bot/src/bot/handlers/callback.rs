use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ParseMode};
use teloxide::utils::html;
use tracing::{error, info, warn};

use crate::bot::keyboards::{user_keyboard, Decision, GET_INFO, GET_LINK};
use crate::panel_client::PanelError;
use crate::services::approval_service::{ApproveOutcome, RejectOutcome};
use crate::AppState;

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    info!("Received callback: {:?}", q.data);
    let callback_id = q.id.clone();
    let caller_id = q.from.id.0 as i64;

    let Some(data) = q.data.as_deref() else {
        bot.answer_callback_query(callback_id).await?;
        return Ok(());
    };

    if let Some((decision, requester_id)) = Decision::parse(data) {
        return match decision {
            Decision::Approve => handle_approve(&bot, &q, &state, caller_id, requester_id).await,
            Decision::Reject => handle_reject(&bot, &q, &state, caller_id, requester_id).await,
        };
    }

    match data {
        GET_LINK => handle_get_link(&bot, &q, &state, caller_id).await,
        GET_INFO => handle_get_info(&bot, &q, &state, caller_id).await,
        _ => {
            bot.answer_callback_query(callback_id).await?;
            Ok(())
        }
    }
}

async fn alert(bot: &Bot, q: &CallbackQuery, text: &str) -> Result<(), teloxide::RequestError> {
    bot.answer_callback_query(q.id.clone())
        .text(text)
        .show_alert(true)
        .await?;
    Ok(())
}

async fn handle_approve(
    bot: &Bot,
    q: &CallbackQuery,
    state: &AppState,
    admin_id: i64,
    requester_id: i64,
) -> Result<(), teloxide::RequestError> {
    match state.approvals.approve(admin_id, requester_id).await {
        Ok(ApproveOutcome::Unauthorized) => alert(bot, q, "⛔ Not authorized").await,
        Ok(ApproveOutcome::NotFound) => {
            alert(bot, q, "Request not found or already processed").await
        }
        Ok(ApproveOutcome::RegistrationFailed(_)) => {
            alert(bot, q, "❌ Panel registration failed, try again later").await
        }
        Ok(ApproveOutcome::Approved(identity)) => {
            if let Err(e) = bot
                .send_message(
                    ChatId(identity.requester_id),
                    "✅ Your request has been approved! You are registered.",
                )
                .reply_markup(user_keyboard())
                .await
            {
                warn!("Failed to notify approved user {}: {}", identity.requester_id, e);
            }
            bot.answer_callback_query(q.id.clone())
                .text("User approved")
                .await?;
            Ok(())
        }
        Err(e) => {
            error!("Approving {} failed: {:#}", requester_id, e);
            alert(bot, q, "❌ Storage error, try again later").await
        }
    }
}

async fn handle_reject(
    bot: &Bot,
    q: &CallbackQuery,
    state: &AppState,
    admin_id: i64,
    requester_id: i64,
) -> Result<(), teloxide::RequestError> {
    match state.approvals.reject(admin_id, requester_id).await {
        Ok(RejectOutcome::Unauthorized) => alert(bot, q, "⛔ Not authorized").await,
        Ok(RejectOutcome::NotFound) => {
            alert(bot, q, "Request not found or already processed").await
        }
        Ok(RejectOutcome::Rejected(request)) => {
            if let Err(e) = bot
                .send_message(
                    ChatId(request.requester_id),
                    "❌ Your request was declined by an administrator.",
                )
                .await
            {
                warn!("Failed to notify rejected user {}: {}", request.requester_id, e);
            }
            bot.send_message(
                ChatId(admin_id),
                format!(
                    "🗑️ You declined the request from <b>{}</b> (id={})",
                    html::escape(&request.display_name),
                    request.requester_id
                ),
            )
            .parse_mode(ParseMode::Html)
            .await?;
            bot.answer_callback_query(q.id.clone())
                .text("Request declined")
                .await?;
            Ok(())
        }
        Err(e) => {
            error!("Rejecting {} failed: {:#}", requester_id, e);
            alert(bot, q, "❌ Storage error, try again later").await
        }
    }
}

/// Answers with an alert and returns `false` unless the caller is approved.
async fn ensure_approved(
    bot: &Bot,
    q: &CallbackQuery,
    state: &AppState,
    user_id: i64,
) -> Result<bool, teloxide::RequestError> {
    match state.approvals.is_approved(user_id).await {
        Ok(true) => Ok(true),
        Ok(false) => {
            warn!("User {} requested account data without approval", user_id);
            alert(bot, q, "❌ Access denied: your request has not been approved").await?;
            Ok(false)
        }
        Err(e) => {
            error!("Failed to check approval of {}: {:#}", user_id, e);
            alert(bot, q, "❌ Storage error, try again later").await?;
            Ok(false)
        }
    }
}

async fn handle_get_link(
    bot: &Bot,
    q: &CallbackQuery,
    state: &AppState,
    user_id: i64,
) -> Result<(), teloxide::RequestError> {
    if !ensure_approved(bot, q, state, user_id).await? {
        return Ok(());
    }
    info!("Connection link requested by approved user_id={}", user_id);

    let text = match state.panel.get_connection_descriptor(user_id).await {
        Ok(descriptor) => format!(
            "🔑 Your connection link:\n\n<code>{}</code>",
            html::escape(&descriptor.to_uri())
        ),
        Err(PanelError::NotFound(_)) => "❗ Could not find your connection parameters".to_string(),
        Err(e) => {
            error!("Building connection link for {} failed: {}", user_id, e);
            "❗ The VPN panel is unavailable, try again later".to_string()
        }
    };

    bot.send_message(ChatId(user_id), text)
        .parse_mode(ParseMode::Html)
        .await?;
    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}

async fn handle_get_info(
    bot: &Bot,
    q: &CallbackQuery,
    state: &AppState,
    user_id: i64,
) -> Result<(), teloxide::RequestError> {
    if !ensure_approved(bot, q, state, user_id).await? {
        return Ok(());
    }

    let text = match state.approvals.find_approved(user_id).await {
        Ok(Some(identity)) => {
            let since = identity
                .approved_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            format!(
                "ℹ️ <b>Account</b>\nName: {}\nID: {}\nApproved: {}",
                html::escape(&identity.display_name),
                identity.requester_id,
                since
            )
        }
        Ok(None) => "ℹ️ No account found".to_string(),
        Err(e) => {
            error!("Failed to load account of {}: {:#}", user_id, e);
            "❌ Storage error, try again later".to_string()
        }
    };

    bot.send_message(ChatId(user_id), text)
        .parse_mode(ParseMode::Html)
        .await?;
    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}
