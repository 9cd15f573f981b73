use crate::error::Result;
use crate::models::progress::{PracticeProgress, ProgressRecord};
use crate::services::navigation_service::ProgressStore;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgProgressStore {
    pool: PgPool,
}

impl PgProgressStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn load(&self, assignment_id: Uuid, student_id: Uuid) -> Result<Option<ProgressRecord>> {
        let row = sqlx::query(
            r#"SELECT current_question_index, completed_questions, updated_at
               FROM assignment_progress
               WHERE assignment_id = $1 AND student_id = $2"#,
        )
        .bind(assignment_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let completed: Json<Vec<String>> = row.try_get("completed_questions")?;
        Ok(Some(ProgressRecord {
            assignment_id,
            student_id,
            current_question_index: row.try_get("current_question_index")?,
            completed_questions: completed.0,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

impl From<ProgressRecord> for PracticeProgress {
    fn from(record: ProgressRecord) -> Self {
        PracticeProgress {
            current_question_index: record.current_question_index.max(0) as usize,
            completed_questions: record.completed_questions.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ProgressStore for PgProgressStore {
    async fn update_progress(
        &self,
        assignment_id: Uuid,
        student_id: Uuid,
        progress: PracticeProgress,
    ) -> Result<()> {
        let completed: Vec<String> = progress.completed_questions.into_iter().collect();
        sqlx::query(
            r#"
            INSERT INTO assignment_progress (assignment_id, student_id, current_question_index, completed_questions, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (assignment_id, student_id) DO UPDATE
            SET current_question_index = EXCLUDED.current_question_index,
                completed_questions = EXCLUDED.completed_questions,
                updated_at = NOW()
            "#,
        )
        .bind(assignment_id)
        .bind(student_id)
        .bind(progress.current_question_index as i32)
        .bind(Json(completed))
        .execute(&self.pool)
        .await?;

        tracing::debug!(%assignment_id, %student_id, "Practice progress saved");
        Ok(())
    }
}
