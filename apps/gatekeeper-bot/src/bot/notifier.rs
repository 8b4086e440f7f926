use anyhow::Result;
use async_trait::async_trait;
use gatekeeper_db::models::approval::PendingRequest;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::html;

use crate::bot::keyboards::approval_keyboard;
use crate::services::approval_service::AdminNotifier;

/// Sends new-request notices with approve/reject buttons to admin chats.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl AdminNotifier for TelegramNotifier {
    async fn notify_new_request(&self, admin_id: i64, request: &PendingRequest) -> Result<()> {
        self.bot
            .send_message(
                ChatId(admin_id),
                format!(
                    "🆕 New access request from <b>{}</b> (id={})",
                    html::escape(&request.display_name),
                    request.requester_id
                ),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(approval_keyboard(request.requester_id))
            .await?;
        Ok(())
    }
}
