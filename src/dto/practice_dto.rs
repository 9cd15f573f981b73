use crate::services::practice_session_service::NavigationAction;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSessionRequest {
    pub assignment_id: uuid::Uuid,
    /// Falls back to the assignment's own `isTest` flag.
    pub test_mode: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NavigateRequest {
    pub action: NavigationAction,
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CompleteQuestionRequest {
    #[validate(length(min = 1))]
    pub question_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseResponse {
    pub started: bool,
    pub session: crate::services::practice_session_service::SessionSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavigateResponse {
    pub moved: bool,
    pub session: crate::services::practice_session_service::SessionSnapshot,
}
