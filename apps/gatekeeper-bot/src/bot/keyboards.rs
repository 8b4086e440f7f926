use gatekeeper_db::models::approval::PendingRequest;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

pub const GET_LINK: &str = "get_link";
pub const GET_INFO: &str = "get_info";

/// Administrator verdict carried in callback data as `approve:<id>` / `reject:<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn prefix(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn callback_data(self, requester_id: i64) -> String {
        format!("{}:{}", self.prefix(), requester_id)
    }

    pub fn parse(data: &str) -> Option<(Self, i64)> {
        let (prefix, id) = data.split_once(':')?;
        let decision = match prefix {
            "approve" => Self::Approve,
            "reject" => Self::Reject,
            _ => return None,
        };
        Some((decision, id.trim().parse().ok()?))
    }
}

pub fn user_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("🔑 Get connection link", GET_LINK)],
        vec![InlineKeyboardButton::callback("ℹ️ Account info", GET_INFO)],
    ])
}

pub fn approval_keyboard(requester_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "✅ Approve",
            Decision::Approve.callback_data(requester_id),
        )],
        vec![InlineKeyboardButton::callback(
            "❌ Reject",
            Decision::Reject.callback_data(requester_id),
        )],
    ])
}

/// One approve/reject row per pending request.
pub fn pending_overview_keyboard(pending: &[PendingRequest]) -> InlineKeyboardMarkup {
    let rows = pending
        .iter()
        .map(|req| {
            vec![
                InlineKeyboardButton::callback(
                    format!("✅ {}", req.display_name),
                    Decision::Approve.callback_data(req.requester_id),
                ),
                InlineKeyboardButton::callback(
                    format!("❌ {}", req.display_name),
                    Decision::Reject.callback_data(req.requester_id),
                ),
            ]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}
