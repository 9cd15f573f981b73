use crate::services::submission_service::{AudioRecording, RecordingSources};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// A recording as clients send it: either a bare URL or an uploaded blob
/// descriptor.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RecordingPayload {
    Url(String),
    Uploaded {
        #[serde(rename = "uploadedUrl")]
        uploaded_url: String,
    },
    Blob {
        url: String,
    },
}

impl From<RecordingPayload> for AudioRecording {
    fn from(payload: RecordingPayload) -> Self {
        let url = match payload {
            RecordingPayload::Url(url) => url,
            RecordingPayload::Uploaded { uploaded_url } => uploaded_url,
            RecordingPayload::Blob { url } => url,
        };
        AudioRecording { url }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitAssignmentRequest {
    #[serde(default)]
    pub session_recordings: HashMap<usize, RecordingPayload>,
    #[serde(default)]
    pub persisted_recordings: HashMap<usize, RecordingPayload>,
}

impl SubmitAssignmentRequest {
    pub fn into_sources(self) -> RecordingSources {
        fn normalize(map: HashMap<usize, RecordingPayload>) -> HashMap<usize, AudioRecording> {
            map.into_iter()
                .map(|(index, payload)| (index, AudioRecording::from(payload)))
                .filter(|(_, recording)| !recording.url.is_empty())
                .collect()
        }
        RecordingSources {
            session: normalize(self.session_recordings),
            persisted: normalize(self.persisted_recordings),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitAssignmentResponse {
    pub redirect: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UploadRecordingRequest {
    #[validate(url)]
    pub audio_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadRecordingResponse {
    pub submission_id: uuid::Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewAttemptResponse {
    pub submission_id: uuid::Uuid,
    pub attempt: i32,
    pub redirect: String,
}
