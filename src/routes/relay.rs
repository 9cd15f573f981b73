use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};

use crate::dto::relay_dto::{ConnectionDetailsQuery, SubmitAudioRequest, SubmitAudioResponse};
use crate::error::{Error, Result};
use crate::AppState;

/// Accepts a finished recording set and hands it to the scoring backend
/// without waiting for the result.
#[axum::debug_handler]
pub async fn submit_audio(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();
    tracing::debug!(%content_type, body_len = body.len(), "Audio submission received");

    let (submission_id, audio_urls) = if content_type.contains("application/json") {
        let parsed: SubmitAudioRequest = serde_json::from_slice(&body)
            .map_err(|_| Error::BadRequest("Invalid JSON in request".to_string()))?;
        (parsed.submission_id(), parsed.audio_urls())
    } else if content_type.contains("application/x-www-form-urlencoded") {
        parse_form(&body)
    } else {
        tracing::warn!(%content_type, "Unrecognized Content-Type on audio submission");
        return Ok((
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Json(serde_json::json!({ "error": "Unsupported Content-Type" })),
        )
            .into_response());
    };

    let submission_id = submission_id
        .ok_or_else(|| Error::BadRequest("submission_id is required".to_string()))?;
    if audio_urls.is_empty() {
        tracing::warn!(%submission_id, "No audio_urls were parsed");
    }

    state.relay.spawn_forward(submission_id.clone(), audio_urls);

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitAudioResponse {
            status: "accepted",
            message: "Audio submission received and processing started",
            submission_id,
        }),
    )
        .into_response())
}

/// `audio_urls` arrives as one comma-separated field.
fn parse_form(body: &[u8]) -> (Option<String>, Vec<String>) {
    let mut submission_id = None;
    let mut audio_urls = Vec::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        match key.as_ref() {
            "submission_id" if submission_id.is_none() && !value.is_empty() => {
                submission_id = Some(value.into_owned());
            }
            "audio_urls" if audio_urls.is_empty() && !value.is_empty() => {
                audio_urls = value.split(',').map(str::to_string).collect();
            }
            _ => {}
        }
    }
    (submission_id, audio_urls)
}

#[axum::debug_handler]
pub async fn connection_details(
    State(state): State<AppState>,
    Query(query): Query<ConnectionDetailsQuery>,
) -> Result<Response> {
    let Some(tokens) = state.room_tokens.as_ref() else {
        return Err(Error::Config(
            "LIVEKIT_URL, LIVEKIT_API_KEY and LIVEKIT_API_SECRET must be set".to_string(),
        ));
    };
    let details = tokens.connection_details(&query.into())?;
    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(details),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_splits_comma_separated_urls() {
        let (id, urls) = parse_form(b"submission_id=abc&audio_urls=https%3A%2F%2Fa%2F1.webm%2Chttps%3A%2F%2Fa%2F2.webm");
        assert_eq!(id.as_deref(), Some("abc"));
        assert_eq!(urls, vec!["https://a/1.webm", "https://a/2.webm"]);
    }

    #[test]
    fn form_without_id_yields_none() {
        let (id, urls) = parse_form(b"audio_urls=");
        assert!(id.is_none());
        assert!(urls.is_empty());
    }
}
