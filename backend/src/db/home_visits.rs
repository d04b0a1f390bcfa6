// Home visit database operations
use uuid::Uuid;

use crate::db::core::DbError;
use crate::db::{
    models::{HomeVisit, HomeVisitInput},
    Database,
};
use crate::params;

impl Database {
    pub async fn create_home_visit(&self, teacher_id: &Uuid, input: &HomeVisitInput) -> Result<HomeVisit, DbError> {
        self.fetch_one(
            "INSERT INTO home_visits
                 (id, student_id, teacher_id, visited_on, address, summary, living_condition, recommendations)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id, student_id, teacher_id, visited_on, address, summary, living_condition, recommendations,
                       created_at",
            &params![
                Uuid::new_v4(),
                input.student_id,
                teacher_id,
                input.visited_on,
                input.address.as_deref(),
                input.summary.trim(),
                input.living_condition.as_deref(),
                input.recommendations.as_deref()
            ],
        )
        .await
    }

    pub async fn list_home_visits_by_student(&self, student_id: &Uuid) -> Result<Vec<HomeVisit>, DbError> {
        self.fetch_all(
            "SELECT id, student_id, teacher_id, visited_on, address, summary, living_condition, recommendations,
                    created_at
             FROM home_visits
             WHERE student_id = $1
             ORDER BY visited_on DESC",
            &params![student_id],
        )
        .await
    }

    pub async fn list_home_visits_by_teacher(&self, teacher_id: &Uuid) -> Result<Vec<HomeVisit>, DbError> {
        self.fetch_all(
            "SELECT id, student_id, teacher_id, visited_on, address, summary, living_condition, recommendations,
                    created_at
             FROM home_visits
             WHERE teacher_id = $1
             ORDER BY visited_on DESC",
            &params![teacher_id],
        )
        .await
    }
}
