use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// What the navigation coordinator persists for one assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeProgress {
    pub current_question_index: usize,
    pub completed_questions: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub assignment_id: Uuid,
    pub student_id: Uuid,
    pub current_question_index: i32,
    pub completed_questions: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}
