// Common test utilities and helpers
#![allow(dead_code)]

use std::time::Duration;

use uuid::Uuid;

use school_backend::db::core::{PgManager, PgTarget, PoolConfig};
use school_backend::db::{Role, Room, RoomInput, StudentProfile, StudentProfileInput, Subject, SubjectInput, User};
use school_backend::Database;

/// Setup test database using TEST_DATABASE_URL from environment
///
/// Returns `None` when TEST_DATABASE_URL is not set so database tests become no-ops
/// on machines without Postgres. Migrations run on a dedicated connection.
///
/// **Test Isolation**: every helper creates rows with fresh UUIDs and unique codes.
pub async fn setup_test_db() -> Option<Database> {
  // Load environment variables from .env file if it exists
  dotenv::dotenv().ok();

  let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
    eprintln!("TEST_DATABASE_URL not set; skipping database test");
    return None;
  };

  let target = PgTarget::Url(database_url);
  let manager = PgManager::new(&target, 30_000).expect("Failed to parse TEST_DATABASE_URL");
  let mut conn = manager
    .connect_raw()
    .await
    .expect("Failed to connect to test database");
  sqlx::migrate!("./migrations")
    .run(&mut conn)
    .await
    .expect("Failed to run migrations");

  let config = PoolConfig {
    max: 5,
    min: 0,
    ..PoolConfig::default()
  };
  Some(Database::connect(&target, config).expect("Failed to build test pool"))
}

/// A database whose pool points at a closed port. Nothing connects until a query runs.
pub fn unreachable_db() -> Database {
  let target = PgTarget::Discrete {
    host: "127.0.0.1".to_string(),
    port: 1,
    database: "school".to_string(),
    user: "postgres".to_string(),
    password: None,
    ssl: false,
  };
  let config = PoolConfig {
    max: 2,
    min: 0,
    connection_timeout: Duration::from_secs(2),
    query_timeout: Duration::from_secs(2),
    max_retries: 0,
    ..PoolConfig::default()
  };
  Database::connect(&target, config).expect("Failed to build pool")
}

fn unique(prefix: &str) -> String {
  format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
}

/// Create a user with a unique email
pub async fn create_test_user(db: &Database, role: Role) -> User {
  let email = format!("{}@school.test", unique(role.as_str()));
  db.create_user(&email, Some("not-a-real-hash"), "Test", role.as_str(), None, role)
    .await
    .expect("Failed to create test user")
}

/// Create a room with a unique name in academic year 2025
pub async fn create_test_room(db: &Database, homeroom_teacher_id: Option<Uuid>) -> Room {
  db.create_room(&RoomInput {
    name: unique("room"),
    grade_level: Some("M.1".to_string()),
    academic_year: "2025".to_string(),
    homeroom_teacher_id,
  })
  .await
  .expect("Failed to create test room")
}

pub async fn create_test_subject(db: &Database, room_id: Uuid, teacher_id: Option<Uuid>, credits: f64) -> Subject {
  db.create_subject(&SubjectInput {
    code: unique("SUB"),
    name: "Mathematics".to_string(),
    room_id,
    teacher_id,
    credits: Some(credits),
    semester: "2025/1".to_string(),
  })
  .await
  .expect("Failed to create test subject")
}

/// Create a student user with a profile in `room_id`
pub async fn create_test_student(db: &Database, room_id: Option<Uuid>) -> StudentProfile {
  let user = create_test_user(db, Role::Student).await;
  db.upsert_student_profile(
    &user.id,
    &StudentProfileInput {
      student_code: unique("S"),
      room_id,
      birth_date: None,
      guardian_name: Some("Guardian".to_string()),
      guardian_phone: None,
      address: None,
    },
  )
  .await
  .expect("Failed to create student profile")
}
