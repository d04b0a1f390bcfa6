// Room (homeroom class) database operations
use uuid::Uuid;

use crate::db::core::DbError;
use crate::db::students::PROFILE_SELECT;
use crate::db::{
    models::{Room, RoomInput, StudentProfile},
    Database,
};
use crate::params;

impl Database {
    pub async fn create_room(&self, input: &RoomInput) -> Result<Room, DbError> {
        self.fetch_one(
            "INSERT INTO rooms (id, name, grade_level, academic_year, homeroom_teacher_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, name, grade_level, academic_year, homeroom_teacher_id, created_at, updated_at",
            &params![
                Uuid::new_v4(),
                input.name.trim(),
                input.grade_level.as_deref(),
                input.academic_year.trim(),
                input.homeroom_teacher_id
            ],
        )
        .await
    }

    pub async fn list_rooms(&self) -> Result<Vec<Room>, DbError> {
        self.fetch_all(
            "SELECT id, name, grade_level, academic_year, homeroom_teacher_id, created_at, updated_at
             FROM rooms
             ORDER BY academic_year DESC, name",
            &[],
        )
        .await
    }

    pub async fn get_room(&self, id: &Uuid) -> Result<Option<Room>, DbError> {
        self.fetch_optional(
            "SELECT id, name, grade_level, academic_year, homeroom_teacher_id, created_at, updated_at
             FROM rooms
             WHERE id = $1",
            &params![id],
        )
        .await
    }

    pub async fn update_room(&self, id: &Uuid, input: &RoomInput) -> Result<Option<Room>, DbError> {
        self.fetch_optional(
            "UPDATE rooms
             SET name = $2, grade_level = $3, academic_year = $4, homeroom_teacher_id = $5, updated_at = NOW()
             WHERE id = $1
             RETURNING id, name, grade_level, academic_year, homeroom_teacher_id, created_at, updated_at",
            &params![
                id,
                input.name.trim(),
                input.grade_level.as_deref(),
                input.academic_year.trim(),
                input.homeroom_teacher_id
            ],
        )
        .await
    }

    pub async fn delete_room(&self, id: &Uuid) -> Result<bool, DbError> {
        let deleted = self
            .execute("DELETE FROM rooms WHERE id = $1 RETURNING id", &params![id])
            .await?;
        Ok(deleted > 0)
    }

    pub async fn list_room_students(&self, room_id: &Uuid) -> Result<Vec<StudentProfile>, DbError> {
        let sql = format!("{} WHERE s.room_id = $1 ORDER BY s.student_code", PROFILE_SELECT);
        self.fetch_all(&sql, &params![room_id]).await
    }
}
