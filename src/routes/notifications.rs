use axum::{
    extract::State,
    response::{IntoResponse, Json, Response},
    Extension,
};

use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::AppState;

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Response> {
    let toasts = state.toasts.active_for(claims.student_id()?);
    Ok(Json(toasts).into_response())
}
