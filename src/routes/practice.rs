use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::practice_dto::{
    CompleteQuestionRequest, CreateSessionRequest, NavigateRequest, NavigateResponse,
    PhaseResponse,
};
use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::progress::PracticeProgress;
use crate::AppState;

#[axum::debug_handler]
pub async fn create_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Response> {
    payload.validate()?;
    let student_id = claims.student_id()?;

    let assignment = state
        .assignments
        .find(payload.assignment_id)
        .await?
        .ok_or_else(|| Error::NotFound("Assignment not found".to_string()))?;
    if assignment.questions().is_empty() {
        return Err(Error::BadRequest("Assignment has no questions".to_string()));
    }

    let initial: PracticeProgress = state
        .progress
        .load(assignment.id, student_id)
        .await?
        .map(Into::into)
        .unwrap_or_default();
    let is_completed = state
        .submission_repo
        .latest_for(assignment.id, student_id)
        .await?
        .is_some_and(|s| s.is_finished());
    let test_mode = payload.test_mode.unwrap_or_else(|| assignment.is_test());

    let session = state
        .sessions
        .create(assignment, student_id, test_mode, initial, is_completed)
        .await;
    let snapshot = session.lock().await.snapshot();
    Ok((StatusCode::CREATED, Json(snapshot)).into_response())
}

#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let session = state.sessions.get(session_id, claims.student_id()?)?;
    let snapshot = session.lock().await.snapshot();
    Ok(Json(snapshot).into_response())
}

#[axum::debug_handler]
pub async fn start_prep(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let session = state.sessions.get(session_id, claims.student_id()?)?;
    let mut session = session.lock().await;
    let started = session.start_prep();
    Ok(Json(PhaseResponse {
        started,
        session: session.snapshot(),
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn start_recording(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let session = state.sessions.get(session_id, claims.student_id()?)?;
    let mut session = session.lock().await;
    let started = session.start_recording();
    Ok(Json(PhaseResponse {
        started,
        session: session.snapshot(),
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn reset_timers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let session = state.sessions.get(session_id, claims.student_id()?)?;
    let mut session = session.lock().await;
    let started = session.reset_timers();
    Ok(Json(PhaseResponse {
        started,
        session: session.snapshot(),
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn navigate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<NavigateRequest>,
) -> Result<Response> {
    payload.validate()?;
    let session = state.sessions.get(session_id, claims.student_id()?)?;
    let (moved, snapshot) = session.navigate(payload.action, payload.index).await?;
    Ok(Json(NavigateResponse {
        moved,
        session: snapshot,
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn complete_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<CompleteQuestionRequest>,
) -> Result<Response> {
    payload.validate()?;
    let session = state.sessions.get(session_id, claims.student_id()?)?;
    let snapshot = session.complete_question(&payload.question_id).await?;
    Ok(Json(snapshot).into_response())
}

#[axum::debug_handler]
pub async fn close_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    state
        .sessions
        .remove(session_id, claims.student_id()?)
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
