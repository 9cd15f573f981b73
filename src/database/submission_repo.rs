use crate::error::{Error, Result};
use crate::models::submission::{NewSubmission, RecordingEntry, Submission};
use crate::services::submission_service::SubmissionRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct SubmissionRow {
    id: Uuid,
    assignment_id: Uuid,
    student_id: Uuid,
    status: String,
    recordings: Json<Vec<RecordingEntry>>,
    attempt: i32,
    submitted_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = Error;

    fn try_from(row: SubmissionRow) -> Result<Self> {
        Ok(Submission {
            id: row.id,
            assignment_id: row.assignment_id,
            student_id: row.student_id,
            status: row.status.parse().map_err(Error::Internal)?,
            recordings: row.recordings.0,
            attempt: row.attempt,
            submitted_at: row.submitted_at,
        })
    }
}

#[derive(Clone)]
pub struct PgSubmissionRepository {
    pool: PgPool,
}

impl PgSubmissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionRepository for PgSubmissionRepository {
    async fn latest_for(&self, assignment_id: Uuid, student_id: Uuid) -> Result<Option<Submission>> {
        // DESC sorts NULL first, so an unsubmitted in-progress row wins.
        let row = sqlx::query_as::<_, SubmissionRow>(
            r#"
            SELECT id, assignment_id, student_id, status, recordings, attempt, submitted_at
            FROM submissions
            WHERE assignment_id = $1 AND student_id = $2
            ORDER BY submitted_at DESC
            LIMIT 1
            "#,
        )
        .bind(assignment_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Submission::try_from).transpose()
    }

    async fn insert(&self, submission: NewSubmission) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO submissions (assignment_id, student_id, status, recordings, attempt, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(submission.assignment_id)
        .bind(submission.student_id)
        .bind(submission.status.as_str())
        .bind(Json(&submission.recordings))
        .bind(submission.attempt)
        .bind(submission.submitted_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn mark_pending(
        &self,
        submission_id: Uuid,
        recordings: Vec<RecordingEntry>,
        submitted_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET status = 'pending', recordings = $1, submitted_at = $2
            WHERE id = $3
            "#,
        )
        .bind(Json(&recordings))
        .bind(submitted_at)
        .bind(submission_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Submission {} not found", submission_id)));
        }
        Ok(())
    }
    async fn upsert_recording(&self, submission_id: Uuid, recording: RecordingEntry) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET recordings = COALESCE(
                    (SELECT jsonb_agg(entry)
                     FROM jsonb_array_elements(recordings) AS entry
                     WHERE entry->>'questionId' <> $2),
                    '[]'::jsonb
                ) || jsonb_build_array(jsonb_build_object('questionId', $2::text, 'audioUrl', $3::text)),
                status = 'in_progress'
            WHERE id = $1
            "#,
        )
        .bind(submission_id)
        .bind(&recording.question_id)
        .bind(&recording.audio_url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Submission {} not found", submission_id)));
        }
        Ok(())
    }

    async fn max_attempt(&self, assignment_id: Uuid, student_id: Uuid) -> Result<Option<i32>> {
        let attempt: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(attempt) FROM submissions WHERE assignment_id = $1 AND student_id = $2",
        )
        .bind(assignment_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(attempt)
    }
}
