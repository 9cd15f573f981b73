use crate::config::LiveKitConfig;
use crate::error::Result;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const TOKEN_TTL_MINUTES: i64 = 15;
const DEFAULT_GREETING: &str = "Hi I am Luna";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    pub room: String,
    pub room_join: bool,
    pub can_publish: bool,
    pub can_publish_data: bool,
    pub can_subscribe: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomClaims {
    pub iss: String,
    pub sub: String,
    pub name: String,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
    pub video: VideoGrant,
}

#[derive(Debug, Clone, Default)]
pub struct ScenarioOptions {
    pub greeting: Option<String>,
    pub scenario: Option<String>,
    pub level: Option<String>,
    pub turns: Option<String>,
    pub conversation_script: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetails {
    pub server_url: String,
    pub room_name: String,
    pub participant_token: String,
    pub participant_name: String,
}

/// Mints short-lived credentials for the realtime voice room.
#[derive(Clone)]
pub struct RoomTokenService {
    livekit: LiveKitConfig,
}

impl RoomTokenService {
    pub fn new(livekit: LiveKitConfig) -> Self {
        Self { livekit }
    }

    pub fn participant_token(&self, identity: &str, name: &str, room: &str) -> Result<String> {
        let now = Utc::now();
        let claims = RoomClaims {
            iss: self.livekit.api_key.clone(),
            sub: identity.to_string(),
            name: name.to_string(),
            nbf: now.timestamp(),
            exp: (now + Duration::minutes(TOKEN_TTL_MINUTES)).timestamp(),
            jti: identity.to_string(),
            video: VideoGrant {
                room: room.to_string(),
                room_join: true,
                can_publish: true,
                can_publish_data: true,
                can_subscribe: true,
            },
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.livekit.api_secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn connection_details(&self, options: &ScenarioOptions) -> Result<ConnectionDetails> {
        let mut rng = rand::thread_rng();
        let participant_name = participant_name(options, rng.gen_range(0..10_000));
        let identity = format!("voice_assistant_user_{}", rng.gen_range(0..10_000));
        let room_name = format!("voice_assistant_room_{}", rng.gen_range(0..10_000));

        if let Some(scenario) = options.scenario.as_deref().filter(|s| !s.is_empty()) {
            tracing::info!(
                scenario,
                level = options.level.as_deref().unwrap_or_default(),
                script_len = options.conversation_script.as_deref().map(str::len).unwrap_or(0),
                "Issuing room token for scenario"
            );
        }

        let participant_token = self.participant_token(&identity, &participant_name, &room_name)?;
        Ok(ConnectionDetails {
            server_url: self.livekit.url.clone(),
            room_name,
            participant_token,
            participant_name,
        })
    }
}

/// Each whitespace run becomes one `_`, leading and trailing runs included.
fn underscore_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_gap = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_gap {
                out.push('_');
            }
            in_gap = true;
        } else {
            out.push(c);
            in_gap = false;
        }
    }
    out
}

/// The voice agent parses its greeting and scenario out of the participant name.
pub fn participant_name(options: &ScenarioOptions, digits: u32) -> String {
    let greeting = options
        .greeting
        .as_deref()
        .filter(|g| !g.is_empty())
        .unwrap_or(DEFAULT_GREETING);
    let greeting = underscore_whitespace(greeting).to_lowercase();

    let mut name = format!("user_{:04}_say_{}", digits, greeting);
    if let Some(scenario) = options.scenario.as_deref().filter(|s| !s.is_empty()) {
        let script = options
            .conversation_script
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| BASE64.encode(s))
            .unwrap_or_default();
        name.push_str(&format!(
            "_scenario_{}_level_{}_turns_{}_script_{}",
            scenario,
            options.level.as_deref().unwrap_or_default(),
            options.turns.as_deref().unwrap_or_default(),
            script
        ));
    }
    name
}
