use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    InProgress,
    Pending,
    AwaitingReview,
    Graded,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::InProgress => "in_progress",
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::AwaitingReview => "awaiting_review",
            SubmissionStatus::Graded => "graded",
            SubmissionStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SubmissionStatus::InProgress),
            "pending" => Ok(SubmissionStatus::Pending),
            "awaiting_review" => Ok(SubmissionStatus::AwaitingReview),
            "graded" => Ok(SubmissionStatus::Graded),
            "rejected" => Ok(SubmissionStatus::Rejected),
            other => Err(format!("unknown submission status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingEntry {
    pub question_id: String,
    pub audio_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub student_id: Uuid,
    pub status: SubmissionStatus,
    pub recordings: Vec<RecordingEntry>,
    pub attempt: i32,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl Submission {
    /// Anything past `in_progress` counts as a finished attempt.
    pub fn is_finished(&self) -> bool {
        self.status != SubmissionStatus::InProgress
    }
}

/// Row written when a submission is not resumed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSubmission {
    pub assignment_id: Uuid,
    pub student_id: Uuid,
    pub status: SubmissionStatus,
    pub recordings: Vec<RecordingEntry>,
    pub attempt: i32,
    pub submitted_at: DateTime<Utc>,
}
