// Attendance database operations
use chrono::NaiveDate;
use uuid::Uuid;

use crate::db::core::DbError;
use crate::db::students::tx_ensure_in_subject_room;
use crate::db::{
    models::{AttendanceEntry, AttendanceRecord, AttendanceSummary, RoomAttendanceRow},
    Database,
};
use crate::params;

impl Database {
    /// Record one class session. Every entry is upserted inside a single
    /// transaction, so either the whole roll call lands or none of it does.
    /// Students outside the subject's room reject the whole batch.
    pub async fn record_attendance(
        &self,
        subject_id: &Uuid,
        date: NaiveDate,
        recorded_by: &Uuid,
        entries: &[AttendanceEntry],
    ) -> Result<usize, DbError> {
        let subject_id = *subject_id;
        let recorded_by = *recorded_by;
        let entries = entries.to_vec();

        self.core()
            .transaction(move |tx| {
                Box::pin(async move {
                    tx_ensure_in_subject_room(tx, subject_id, entries.iter().map(|e| e.student_id).collect::<Vec<Uuid>>()).await?;
                    for entry in &entries {
                        tx.execute(
                            "INSERT INTO attendance (id, subject_id, student_id, date, status, note, recorded_by)
                             VALUES ($1, $2, $3, $4, $5::attendance_status, $6, $7)
                             ON CONFLICT (subject_id, student_id, date) DO UPDATE
                             SET status = EXCLUDED.status,
                                 note = EXCLUDED.note,
                                 recorded_by = EXCLUDED.recorded_by,
                                 updated_at = NOW()",
                            &params![
                                Uuid::new_v4(),
                                subject_id,
                                entry.student_id,
                                date,
                                entry.status.as_str(),
                                entry.note.as_deref(),
                                recorded_by
                            ],
                        )
                        .await?;
                    }
                    Ok::<_, DbError>(entries.len())
                })
            })
            .await
    }

    pub async fn list_attendance(
        &self,
        subject_id: &Uuid,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, DbError> {
        self.fetch_all(
            "SELECT a.id, a.subject_id, a.student_id, s.student_code, u.first_name, u.last_name,
                    a.date, a.status, a.note, a.recorded_by
             FROM attendance a
             JOIN students s ON s.user_id = a.student_id
             JOIN users u ON u.id = a.student_id
             WHERE a.subject_id = $1 AND a.date = $2
             ORDER BY s.student_code",
            &params![subject_id, date],
        )
        .await
    }

    /// Status counts for one student, across all subjects or just one.
    pub async fn student_attendance_summary(
        &self,
        student_id: &Uuid,
        subject_id: Option<Uuid>,
    ) -> Result<AttendanceSummary, DbError> {
        self.fetch_one(
            "SELECT COUNT(*) FILTER (WHERE status = 'present') AS present,
                    COUNT(*) FILTER (WHERE status = 'absent') AS absent,
                    COUNT(*) FILTER (WHERE status = 'late') AS late,
                    COUNT(*) FILTER (WHERE status = 'leave') AS leave,
                    COUNT(*) AS total
             FROM attendance
             WHERE student_id = $1 AND ($2::uuid IS NULL OR subject_id = $2)",
            &params![student_id, subject_id],
        )
        .await
    }

    /// Per-student status counts for a room over an inclusive date range.
    pub async fn room_attendance_summary(
        &self,
        room_id: &Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RoomAttendanceRow>, DbError> {
        self.fetch_all(
            "SELECT s.user_id AS student_id, s.student_code, u.first_name, u.last_name,
                    COUNT(a.id) FILTER (WHERE a.status = 'present') AS present,
                    COUNT(a.id) FILTER (WHERE a.status = 'absent') AS absent,
                    COUNT(a.id) FILTER (WHERE a.status = 'late') AS late,
                    COUNT(a.id) FILTER (WHERE a.status = 'leave') AS leave
             FROM students s
             JOIN users u ON u.id = s.user_id
             LEFT JOIN attendance a ON a.student_id = s.user_id AND a.date BETWEEN $2 AND $3
             WHERE s.room_id = $1
             GROUP BY s.user_id, s.student_code, u.first_name, u.last_name
             ORDER BY s.student_code",
            &params![room_id, from, to],
        )
        .await
    }
}
