use crate::panel_client::PanelClient;
use crate::services::approval_service::ApprovalService;

#[derive(Clone)]
pub struct AppState {
    pub approvals: ApprovalService,
    pub panel: PanelClient,
}
