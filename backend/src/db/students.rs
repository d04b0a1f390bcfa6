// Student profile database operations
use uuid::Uuid;

use crate::db::common::{tx_fetch_one, tx_fetch_optional, ExistsRow, IdRow};
use crate::db::core::DbError;
use crate::db::{
    models::{StudentProfile, StudentProfileInput},
    Database, PgTx,
};
use crate::params;

pub(crate) const PROFILE_SELECT: &str =
    "SELECT s.user_id, s.student_code, u.email, u.first_name, u.last_name, s.room_id, r.name AS room_name,
            s.birth_date, s.guardian_name, s.guardian_phone, s.address
     FROM students s
     JOIN users u ON u.id = s.user_id
     LEFT JOIN rooms r ON r.id = s.room_id";

impl Database {
    /// Create or replace the profile of a student user.
    pub async fn upsert_student_profile(
        &self,
        user_id: &Uuid,
        input: &StudentProfileInput,
    ) -> Result<StudentProfile, DbError> {
        let user_id = *user_id;
        let input = input.clone();
        let select = format!("{} WHERE s.user_id = $1", PROFILE_SELECT);

        self.core()
            .transaction(move |tx| {
                Box::pin(async move {
                    tx.execute(
                        "INSERT INTO students (user_id, student_code, room_id, birth_date, guardian_name, guardian_phone, address)
                         VALUES ($1, $2, $3, $4, $5, $6, $7)
                         ON CONFLICT (user_id) DO UPDATE
                         SET student_code = EXCLUDED.student_code,
                             room_id = EXCLUDED.room_id,
                             birth_date = EXCLUDED.birth_date,
                             guardian_name = EXCLUDED.guardian_name,
                             guardian_phone = EXCLUDED.guardian_phone,
                             address = EXCLUDED.address,
                             updated_at = NOW()",
                        &params![
                            user_id,
                            input.student_code.trim(),
                            input.room_id,
                            input.birth_date,
                            input.guardian_name,
                            input.guardian_phone,
                            input.address
                        ],
                    )
                    .await?;
                    tx_fetch_one::<StudentProfile>(tx, &select, &params![user_id]).await
                })
            })
            .await
    }

    pub async fn get_student_profile(&self, user_id: &Uuid) -> Result<Option<StudentProfile>, DbError> {
        let sql = format!("{} WHERE s.user_id = $1", PROFILE_SELECT);
        self.fetch_optional(&sql, &params![user_id]).await
    }

    pub async fn get_student_by_code(&self, student_code: &str) -> Result<Option<StudentProfile>, DbError> {
        let sql = format!("{} WHERE s.student_code = $1", PROFILE_SELECT);
        self.fetch_optional(&sql, &params![student_code.trim()]).await
    }

    pub async fn assign_student_room(&self, user_id: &Uuid, room_id: Option<Uuid>) -> Result<bool, DbError> {
        let updated = self
            .fetch_optional::<IdRow>(
                "UPDATE students SET room_id = $2, updated_at = NOW() WHERE user_id = $1 RETURNING user_id AS id",
                &params![user_id, room_id],
            )
            .await?;
        Ok(updated.is_some())
    }

    /// A teacher may see a student they teach or whose homeroom they lead.
    pub async fn teacher_can_access_student(&self, teacher_id: &Uuid, student_id: &Uuid) -> Result<bool, DbError> {
        let row: ExistsRow = self
            .fetch_one(
                "SELECT EXISTS(
                    SELECT 1
                    FROM students s
                    LEFT JOIN rooms r ON r.id = s.room_id
                    WHERE s.user_id = $2
                      AND (r.homeroom_teacher_id = $1
                           OR EXISTS(SELECT 1 FROM subjects sub WHERE sub.room_id = s.room_id AND sub.teacher_id = $1))
                 ) AS exists",
                &params![teacher_id, student_id],
            )
            .await?;
        Ok(row.exists)
    }
}

/// Fail with `22023` unless every student belongs to the room of `subject_id`.
/// Runs inside the caller's transaction, before any row is written.
pub(crate) async fn tx_ensure_in_subject_room(
    tx: &mut PgTx,
    subject_id: Uuid,
    student_ids: impl IntoIterator<Item = Uuid>,
) -> Result<(), DbError> {
    let mut outside = Vec::new();
    for student_id in student_ids {
        let member = tx_fetch_optional::<IdRow>(
            tx,
            "SELECT s.user_id AS id
             FROM students s
             JOIN subjects sub ON sub.room_id = s.room_id
             WHERE sub.id = $1 AND s.user_id = $2",
            &params![subject_id, student_id],
        )
        .await?;
        if member.is_none() && !outside.contains(&student_id) {
            outside.push(student_id);
        }
    }

    if outside.is_empty() {
        return Ok(());
    }
    let ids: Vec<String> = outside.iter().map(Uuid::to_string).collect();
    Err(DbError::Application {
        code: "22023".to_string(),
        message: format!("students not in this subject's room: {}", ids.join(", ")),
    })
}
