// Subject database operations
use uuid::Uuid;

use crate::db::common::ExistsRow;
use crate::db::core::DbError;
use crate::db::{
    models::{Subject, SubjectInput},
    Database,
};
use crate::params;

impl Database {
    pub async fn create_subject(&self, input: &SubjectInput) -> Result<Subject, DbError> {
        self.fetch_one(
            "INSERT INTO subjects (id, code, name, room_id, teacher_id, credits, semester)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id, code, name, room_id, teacher_id, credits, semester, created_at, updated_at",
            &params![
                Uuid::new_v4(),
                input.code.trim(),
                input.name.trim(),
                input.room_id,
                input.teacher_id,
                input.credits.unwrap_or(1.0),
                input.semester.trim()
            ],
        )
        .await
    }

    /// Subjects, optionally narrowed to one room and/or one teacher.
    pub async fn list_subjects(
        &self,
        room_id: Option<Uuid>,
        teacher_id: Option<Uuid>,
    ) -> Result<Vec<Subject>, DbError> {
        self.fetch_all(
            "SELECT id, code, name, room_id, teacher_id, credits, semester, created_at, updated_at
             FROM subjects
             WHERE ($1::uuid IS NULL OR room_id = $1)
               AND ($2::uuid IS NULL OR teacher_id = $2)
             ORDER BY semester DESC, code",
            &params![room_id, teacher_id],
        )
        .await
    }

    pub async fn list_teacher_subjects(&self, teacher_id: &Uuid) -> Result<Vec<Subject>, DbError> {
        self.list_subjects(None, Some(*teacher_id)).await
    }

    pub async fn get_subject(&self, id: &Uuid) -> Result<Option<Subject>, DbError> {
        self.fetch_optional(
            "SELECT id, code, name, room_id, teacher_id, credits, semester, created_at, updated_at
             FROM subjects
             WHERE id = $1",
            &params![id],
        )
        .await
    }

    pub async fn update_subject(&self, id: &Uuid, input: &SubjectInput) -> Result<Option<Subject>, DbError> {
        self.fetch_optional(
            "UPDATE subjects
             SET code = $2, name = $3, room_id = $4, teacher_id = $5, credits = $6, semester = $7, updated_at = NOW()
             WHERE id = $1
             RETURNING id, code, name, room_id, teacher_id, credits, semester, created_at, updated_at",
            &params![
                id,
                input.code.trim(),
                input.name.trim(),
                input.room_id,
                input.teacher_id,
                input.credits.unwrap_or(1.0),
                input.semester.trim()
            ],
        )
        .await
    }

    pub async fn delete_subject(&self, id: &Uuid) -> Result<bool, DbError> {
        let deleted = self
            .execute("DELETE FROM subjects WHERE id = $1 RETURNING id", &params![id])
            .await?;
        Ok(deleted > 0)
    }

    pub async fn teacher_teaches_subject(&self, teacher_id: &Uuid, subject_id: &Uuid) -> Result<bool, DbError> {
        let row: ExistsRow = self
            .fetch_one(
                "SELECT EXISTS(SELECT 1 FROM subjects WHERE id = $2 AND teacher_id = $1) AS exists",
                &params![teacher_id, subject_id],
            )
            .await?;
        Ok(row.exists)
    }
}
