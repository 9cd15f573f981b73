use crate::utils::time::label_to_seconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assignment {
    pub id: Uuid,
    pub title: String,
    pub questions: sqlx::types::Json<Vec<QuestionCard>>,
    pub metadata: Option<JsonValue>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Assignment {
    pub fn questions(&self) -> &[QuestionCard] {
        &self.questions.0
    }

    pub fn is_test(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("isTest"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCard {
    pub id: String,
    #[serde(rename = "type", default)]
    pub card_type: QuestionCardType,
    pub question: String,
    #[serde(default)]
    pub bullet_points: Option<Vec<String>>,
    #[serde(default)]
    pub speak_aloud: bool,
    #[serde(default)]
    pub time_limit: String,
    #[serde(default)]
    pub prep_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionCardType {
    #[default]
    Normal,
    BulletPoints,
}

impl QuestionCard {
    pub fn prep_seconds(&self) -> u32 {
        label_to_seconds(self.prep_time.as_deref().unwrap_or_default())
    }

    pub fn recording_seconds(&self) -> u32 {
        label_to_seconds(&self.time_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn question_card_reads_camel_case_payload() {
        let card: QuestionCard = serde_json::from_value(json!({
            "id": "q1",
            "type": "bulletPoints",
            "question": "Describe a trip",
            "bulletPoints": ["where", "when"],
            "speakAloud": true,
            "timeLimit": "2:00",
            "prepTime": "0:30"
        }))
        .unwrap();

        assert_eq!(card.card_type, QuestionCardType::BulletPoints);
        assert_eq!(card.prep_seconds(), 30);
        assert_eq!(card.recording_seconds(), 120);
    }

    #[test]
    fn missing_prep_time_uses_default_label() {
        let card: QuestionCard = serde_json::from_value(json!({
            "id": "q2",
            "question": "Why?",
            "timeLimit": "1"
        }))
        .unwrap();
        assert_eq!(card.prep_seconds(), 15);
        assert_eq!(card.recording_seconds(), 60);
    }
}
