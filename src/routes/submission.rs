use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use uuid::Uuid;

use crate::dto::submission_dto::{
    NewAttemptResponse, SubmitAssignmentRequest, SubmitAssignmentResponse, UploadRecordingRequest,
    UploadRecordingResponse,
};
use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::submission::RecordingEntry;
use crate::AppState;
use validator::Validate;

/// Validates and claims the submission, then finishes it in the background so
/// the client can navigate to the dashboard immediately.
#[axum::debug_handler]
pub async fn submit_assignment(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
    Path(assignment_id): Path<Uuid>,
    Json(payload): Json<SubmitAssignmentRequest>,
) -> Result<Response> {
    let user_id = match claims {
        Some(Extension(claims)) => Some(claims.student_id()?),
        None => None,
    };
    // Anonymous callers are turned away by `begin` before any lookup.
    let assignment = match user_id {
        Some(_) => state.assignments.find(assignment_id).await?,
        None => None,
    };

    let ticket = state.submissions.begin(
        assignment,
        Some(assignment_id),
        user_id,
        payload.into_sources(),
    )?;
    let redirect = ticket.redirect().to_string();

    tokio::spawn(async move {
        let outcome = ticket.run().await;
        tracing::info!(%assignment_id, ?outcome, "Submission workflow finished");
    });

    Ok((StatusCode::ACCEPTED, Json(SubmitAssignmentResponse { redirect })).into_response())
}

/// Saves one uploaded recording on the student's latest submission.
#[axum::debug_handler]
pub async fn upload_recording(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((assignment_id, question_id)): Path<(Uuid, String)>,
    Json(payload): Json<UploadRecordingRequest>,
) -> Result<Json<UploadRecordingResponse>> {
    payload.validate()?;
    let student_id = claims.student_id()?;
    let assignment = state
        .assignments
        .find(assignment_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Assignment {} not found", assignment_id)))?;
    if !assignment.questions().iter().any(|q| q.id == question_id) {
        return Err(Error::NotFound(format!("Question {} not found", question_id)));
    }

    let submission_id = state
        .submissions
        .record_upload(
            assignment_id,
            student_id,
            RecordingEntry {
                question_id,
                audio_url: payload.audio_url,
            },
        )
        .await?;
    Ok(Json(UploadRecordingResponse { submission_id }))
}

/// Starts a new attempt and points the client back at the practice page.
#[axum::debug_handler]
pub async fn start_new_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<Uuid>,
) -> Result<Response> {
    let student_id = claims.student_id()?;
    if state.assignments.find(assignment_id).await?.is_none() {
        return Err(Error::NotFound(format!("Assignment {} not found", assignment_id)));
    }

    let attempt = state
        .submissions
        .start_new_attempt(assignment_id, student_id)
        .await?;
    let body = NewAttemptResponse {
        submission_id: attempt.submission_id,
        attempt: attempt.attempt,
        redirect: format!("/student/assignment/{}/practice", assignment_id),
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}
