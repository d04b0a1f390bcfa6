// Student health record database operations
use uuid::Uuid;

use crate::db::core::DbError;
use crate::db::{
    models::{HealthRecord, HealthRecordInput},
    Database,
};
use crate::params;

/// Body-mass index rounded to two decimals, when both measurements are usable.
pub fn bmi(weight_kg: Option<f64>, height_cm: Option<f64>) -> Option<f64> {
    let (weight, height) = (weight_kg?, height_cm?);
    if weight <= 0.0 || height <= 0.0 {
        return None;
    }
    let meters = height / 100.0;
    Some((weight / (meters * meters) * 100.0).round() / 100.0)
}

impl Database {
    pub async fn create_health_record(
        &self,
        student_id: &Uuid,
        recorded_by: &Uuid,
        input: &HealthRecordInput,
    ) -> Result<HealthRecord, DbError> {
        self.fetch_one(
            "INSERT INTO health_records
                 (id, student_id, recorded_on, weight_kg, height_cm, bmi, vision_left, vision_right, notes, recorded_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING id, student_id, recorded_on, weight_kg, height_cm, bmi, vision_left, vision_right, notes,
                       recorded_by, created_at",
            &params![
                Uuid::new_v4(),
                student_id,
                input.recorded_on,
                input.weight_kg,
                input.height_cm,
                bmi(input.weight_kg, input.height_cm),
                input.vision_left.as_deref(),
                input.vision_right.as_deref(),
                input.notes.as_deref(),
                recorded_by
            ],
        )
        .await
    }

    /// Newest first.
    pub async fn list_health_records(&self, student_id: &Uuid) -> Result<Vec<HealthRecord>, DbError> {
        self.fetch_all(
            "SELECT id, student_id, recorded_on, weight_kg, height_cm, bmi, vision_left, vision_right, notes,
                    recorded_by, created_at
             FROM health_records
             WHERE student_id = $1
             ORDER BY recorded_on DESC, created_at DESC",
            &params![student_id],
        )
        .await
    }
}
