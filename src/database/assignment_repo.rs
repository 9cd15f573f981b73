use crate::error::Result;
use crate::models::assignment::Assignment;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct AssignmentRepository {
    pool: PgPool,
}

impl AssignmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Assignment>> {
        let assignment = sqlx::query_as::<_, Assignment>(
            r#"SELECT id, title, questions, metadata, created_at FROM assignments WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(assignment)
    }
}
