// Grade database operations and grade-point computation
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::common::{tx_fetch_optional, IdRow};
use crate::db::students::tx_ensure_in_subject_room;
use crate::db::core::DbError;
use crate::db::{
    models::{Grade, GradeEntry, StudentGrade},
    Database,
};
use crate::params;

/// Grade point for a total score out of 100.
pub fn grade_point(total: f64) -> f64 {
    match total {
        t if t >= 80.0 => 4.0,
        t if t >= 75.0 => 3.5,
        t if t >= 70.0 => 3.0,
        t if t >= 65.0 => 2.5,
        t if t >= 60.0 => 2.0,
        t if t >= 55.0 => 1.5,
        t if t >= 50.0 => 1.0,
        _ => 0.0,
    }
}

/// Sum of the three components, rejecting negative or out-of-range scores.
pub fn total_score(coursework: f64, midterm: f64, final_exam: f64) -> Result<f64, String> {
    for (name, score) in [("coursework", coursework), ("midterm", midterm), ("final_exam", final_exam)] {
        if !score.is_finite() || score < 0.0 {
            return Err(format!("{} must be a non-negative number", name));
        }
    }
    let total = coursework + midterm + final_exam;
    if total > 100.0 {
        return Err(format!("total score {} exceeds 100", total));
    }
    Ok(total)
}

/// Credit-weighted grade point average, or `None` without credits.
pub fn gpa(grades: &[StudentGrade]) -> Option<f64> {
    let credits: f64 = grades.iter().map(|g| g.credits).sum();
    if credits <= 0.0 {
        return None;
    }
    let weighted: f64 = grades.iter().map(|g| g.grade_point * g.credits).sum();
    Some((weighted / credits * 100.0).round() / 100.0)
}

/// One row of an imported score sheet, keyed by student code.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedGrade {
    pub student_code: String,
    pub coursework: f64,
    pub midterm: f64,
    pub final_exam: f64,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ImportOutcome {
    pub imported: usize,
    /// Student codes with no matching student in the subject's room.
    pub unknown_students: Vec<String>,
}

const UPSERT_GRADE: &str = "INSERT INTO grades (id, subject_id, student_id, coursework, midterm, final_exam, total, grade_point, updated_by)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
     ON CONFLICT (subject_id, student_id) DO UPDATE
     SET coursework = EXCLUDED.coursework,
         midterm = EXCLUDED.midterm,
         final_exam = EXCLUDED.final_exam,
         total = EXCLUDED.total,
         grade_point = EXCLUDED.grade_point,
         updated_by = EXCLUDED.updated_by,
         updated_at = NOW()";

impl Database {
    /// Upsert a batch of scores for one subject in a single transaction.
    /// Fails as a whole if any entry is out of range or any student is not in
    /// the subject's room.
    pub async fn upsert_grades(
        &self,
        subject_id: &Uuid,
        updated_by: &Uuid,
        entries: &[GradeEntry],
    ) -> Result<usize, DbError> {
        let subject_id = *subject_id;
        let updated_by = *updated_by;
        let entries = entries.to_vec();

        self.core()
            .transaction(move |tx| {
                Box::pin(async move {
                    tx_ensure_in_subject_room(tx, subject_id, entries.iter().map(|e| e.student_id).collect::<Vec<Uuid>>()).await?;
                    for entry in &entries {
                        let total = total_score(entry.coursework, entry.midterm, entry.final_exam)
                            .map_err(|message| DbError::Application {
                                code: "22003".to_string(),
                                message,
                            })?;
                        tx.execute(
                            UPSERT_GRADE,
                            &params![
                                Uuid::new_v4(),
                                subject_id,
                                entry.student_id,
                                entry.coursework,
                                entry.midterm,
                                entry.final_exam,
                                total,
                                grade_point(total),
                                updated_by
                            ],
                        )
                        .await?;
                    }
                    Ok::<_, DbError>(entries.len())
                })
            })
            .await
    }

    /// Upsert sheet rows by student code. Codes that do not belong to the
    /// subject's room are skipped and reported; everything else commits together.
    pub async fn import_grades(
        &self,
        subject_id: &Uuid,
        updated_by: &Uuid,
        rows: Vec<ImportedGrade>,
    ) -> Result<ImportOutcome, DbError> {
        let subject_id = *subject_id;
        let updated_by = *updated_by;

        self.core()
            .transaction(move |tx| {
                Box::pin(async move {
                    let mut outcome = ImportOutcome::default();
                    for row in &rows {
                        let student = tx_fetch_optional::<IdRow>(
                            tx,
                            "SELECT s.user_id AS id
                             FROM students s
                             JOIN subjects sub ON sub.room_id = s.room_id
                             WHERE sub.id = $1 AND s.student_code = $2",
                            &params![subject_id, row.student_code.as_str()],
                        )
                        .await?;
                        let Some(student) = student else {
                            outcome.unknown_students.push(row.student_code.clone());
                            continue;
                        };
                        let total = total_score(row.coursework, row.midterm, row.final_exam)
                            .map_err(|message| DbError::Application {
                                code: "22003".to_string(),
                                message: format!("{}: {}", row.student_code, message),
                            })?;
                        tx.execute(
                            UPSERT_GRADE,
                            &params![
                                Uuid::new_v4(),
                                subject_id,
                                student.id,
                                row.coursework,
                                row.midterm,
                                row.final_exam,
                                total,
                                grade_point(total),
                                updated_by
                            ],
                        )
                        .await?;
                        outcome.imported += 1;
                    }
                    Ok::<_, DbError>(outcome)
                })
            })
            .await
    }

    pub async fn list_subject_grades(&self, subject_id: &Uuid) -> Result<Vec<Grade>, DbError> {
        self.fetch_all(
            "SELECT g.id, g.subject_id, g.student_id, s.student_code, u.first_name, u.last_name,
                    g.coursework, g.midterm, g.final_exam, g.total, g.grade_point, g.updated_at
             FROM grades g
             JOIN students s ON s.user_id = g.student_id
             JOIN users u ON u.id = g.student_id
             WHERE g.subject_id = $1
             ORDER BY s.student_code",
            &params![subject_id],
        )
        .await
    }

    pub async fn list_student_grades(&self, student_id: &Uuid) -> Result<Vec<StudentGrade>, DbError> {
        self.fetch_all(
            "SELECT sub.id AS subject_id, sub.code AS subject_code, sub.name AS subject_name,
                    sub.credits, sub.semester,
                    g.coursework, g.midterm, g.final_exam, g.total, g.grade_point
             FROM grades g
             JOIN subjects sub ON sub.id = g.subject_id
             WHERE g.student_id = $1
             ORDER BY sub.semester DESC, sub.code",
            &params![student_id],
        )
        .await
    }
}
