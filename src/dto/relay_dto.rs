use crate::services::room_token_service::ScenarioOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetailsQuery {
    pub greeting: Option<String>,
    pub scenario: Option<String>,
    pub scenario_level: Option<String>,
    pub scenario_turns: Option<String>,
    pub conversation_script: Option<String>,
}

impl From<ConnectionDetailsQuery> for ScenarioOptions {
    fn from(q: ConnectionDetailsQuery) -> Self {
        ScenarioOptions {
            greeting: q.greeting,
            scenario: q.scenario,
            level: q.scenario_level,
            turns: q.scenario_turns,
            conversation_script: q.conversation_script,
        }
    }
}

/// JSON body of `POST /api/submit-audio`. The id is taken as-is whether the
/// caller sends a string or a number.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitAudioRequest {
    pub submission_id: Option<serde_json::Value>,
    #[serde(default)]
    pub audio_urls: serde_json::Value,
}

impl SubmitAudioRequest {
    pub fn submission_id(&self) -> Option<String> {
        match self.submission_id.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Non-array values count as no URLs.
    pub fn audio_urls(&self) -> Vec<String> {
        self.audio_urls
            .as_array()
            .map(|urls| {
                urls.iter()
                    .filter_map(|u| u.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitAudioResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub submission_id: String,
}
