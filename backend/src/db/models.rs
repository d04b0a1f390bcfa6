use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Admin,
  Teacher,
  Student,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Role::Admin => "admin",
      Role::Teacher => "teacher",
      Role::Student => "student",
    }
  }
}

impl std::fmt::Display for Role {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for Role {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "admin" => Ok(Role::Admin),
      "teacher" => Ok(Role::Teacher),
      "student" => Ok(Role::Student),
      other => Err(format!("unknown role: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct User {
  pub id: Uuid,
  pub email: String,
  #[serde(skip_serializing)]
  pub password_hash: Option<String>,
  pub first_name: String,
  pub last_name: String,
  pub phone: Option<String>,
  pub role: Role,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Room {
  pub id: Uuid,
  pub name: String,
  pub grade_level: Option<String>,
  pub academic_year: String,
  pub homeroom_teacher_id: Option<Uuid>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RoomInput {
  pub name: String,
  pub grade_level: Option<String>,
  pub academic_year: String,
  pub homeroom_teacher_id: Option<Uuid>,
}

/// Student profile joined with the owning user and room.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct StudentProfile {
  pub user_id: Uuid,
  pub student_code: String,
  pub email: String,
  pub first_name: String,
  pub last_name: String,
  pub room_id: Option<Uuid>,
  pub room_name: Option<String>,
  pub birth_date: Option<NaiveDate>,
  pub guardian_name: Option<String>,
  pub guardian_phone: Option<String>,
  pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StudentProfileInput {
  pub student_code: String,
  pub room_id: Option<Uuid>,
  pub birth_date: Option<NaiveDate>,
  pub guardian_name: Option<String>,
  pub guardian_phone: Option<String>,
  pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Subject {
  pub id: Uuid,
  pub code: String,
  pub name: String,
  pub room_id: Uuid,
  pub teacher_id: Option<Uuid>,
  pub credits: f64,
  pub semester: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubjectInput {
  pub code: String,
  pub name: String,
  pub room_id: Uuid,
  pub teacher_id: Option<Uuid>,
  pub credits: Option<f64>,
  pub semester: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "attendance_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
  Present,
  Absent,
  Late,
  Leave,
}

impl AttendanceStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      AttendanceStatus::Present => "present",
      AttendanceStatus::Absent => "absent",
      AttendanceStatus::Late => "late",
      AttendanceStatus::Leave => "leave",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceRecord {
  pub id: Uuid,
  pub subject_id: Uuid,
  pub student_id: Uuid,
  pub student_code: String,
  pub first_name: String,
  pub last_name: String,
  pub date: NaiveDate,
  pub status: AttendanceStatus,
  pub note: Option<String>,
  pub recorded_by: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AttendanceEntry {
  pub student_id: Uuid,
  pub status: AttendanceStatus,
  pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceSummary {
  pub present: i64,
  pub absent: i64,
  pub late: i64,
  pub leave: i64,
  pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct RoomAttendanceRow {
  pub student_id: Uuid,
  pub student_code: String,
  pub first_name: String,
  pub last_name: String,
  pub present: i64,
  pub absent: i64,
  pub late: i64,
  pub leave: i64,
}

/// Grade row for one subject, with the student's identity.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Grade {
  pub id: Uuid,
  pub subject_id: Uuid,
  pub student_id: Uuid,
  pub student_code: String,
  pub first_name: String,
  pub last_name: String,
  pub coursework: f64,
  pub midterm: f64,
  pub final_exam: f64,
  pub total: f64,
  pub grade_point: f64,
  pub updated_at: DateTime<Utc>,
}

/// Grade row from a student's point of view, with the subject.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct StudentGrade {
  pub subject_id: Uuid,
  pub subject_code: String,
  pub subject_name: String,
  pub credits: f64,
  pub semester: String,
  pub coursework: f64,
  pub midterm: f64,
  pub final_exam: f64,
  pub total: f64,
  pub grade_point: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct GradeEntry {
  pub student_id: Uuid,
  pub coursework: f64,
  pub midterm: f64,
  pub final_exam: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct HealthRecord {
  pub id: Uuid,
  pub student_id: Uuid,
  pub recorded_on: NaiveDate,
  pub weight_kg: Option<f64>,
  pub height_cm: Option<f64>,
  pub bmi: Option<f64>,
  pub vision_left: Option<String>,
  pub vision_right: Option<String>,
  pub notes: Option<String>,
  pub recorded_by: Option<Uuid>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct HealthRecordInput {
  pub recorded_on: NaiveDate,
  pub weight_kg: Option<f64>,
  pub height_cm: Option<f64>,
  pub vision_left: Option<String>,
  pub vision_right: Option<String>,
  pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct HomeVisit {
  pub id: Uuid,
  pub student_id: Uuid,
  pub teacher_id: Uuid,
  pub visited_on: NaiveDate,
  pub address: Option<String>,
  pub summary: String,
  pub living_condition: Option<String>,
  pub recommendations: Option<String>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct HomeVisitInput {
  pub student_id: Uuid,
  pub visited_on: NaiveDate,
  pub address: Option<String>,
  pub summary: String,
  pub living_condition: Option<String>,
  pub recommendations: Option<String>,
}
