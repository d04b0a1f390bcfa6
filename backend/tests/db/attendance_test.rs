// Integration tests for attendance, health records and home visits
use crate::common::{create_test_room, create_test_student, create_test_subject, create_test_user, setup_test_db};
use chrono::NaiveDate;
use school_backend::db::{AttendanceEntry, AttendanceStatus, HealthRecordInput, HomeVisitInput, Role};

fn day(d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(2025, 6, d).expect("valid date")
}

#[tokio::test]
async fn test_attendance_upsert_and_summary() {
  let Some(db) = setup_test_db().await else { return };

  let teacher = create_test_user(&db, Role::Teacher).await;
  let room = create_test_room(&db, Some(teacher.id)).await;
  let subject = create_test_subject(&db, room.id, Some(teacher.id), 1.0).await;
  let alice = create_test_student(&db, Some(room.id)).await;
  let bob = create_test_student(&db, Some(room.id)).await;

  let first_call = vec![
    AttendanceEntry {
      student_id: alice.user_id,
      status: AttendanceStatus::Present,
      note: None,
    },
    AttendanceEntry {
      student_id: bob.user_id,
      status: AttendanceStatus::Absent,
      note: None,
    },
  ];
  assert_eq!(
    db.record_attendance(&subject.id, day(2), &teacher.id, &first_call)
      .await
      .expect("Failed to record attendance"),
    2
  );

  // Correction for the same day replaces the earlier status
  let correction = vec![AttendanceEntry {
    student_id: bob.user_id,
    status: AttendanceStatus::Late,
    note: Some("bus".to_string()),
  }];
  db.record_attendance(&subject.id, day(2), &teacher.id, &correction)
    .await
    .expect("Failed to record attendance");
  db.record_attendance(&subject.id, day(3), &teacher.id, &first_call)
    .await
    .expect("Failed to record attendance");

  let records = db
    .list_attendance(&subject.id, day(2))
    .await
    .expect("Failed to list attendance");
  assert_eq!(records.len(), 2);
  let bob_record = records
    .iter()
    .find(|r| r.student_id == bob.user_id)
    .expect("Bob missing");
  assert_eq!(bob_record.status, AttendanceStatus::Late);
  assert_eq!(bob_record.note.as_deref(), Some("bus"));

  let summary = db
    .student_attendance_summary(&bob.user_id, Some(subject.id))
    .await
    .expect("Failed to summarise attendance");
  assert_eq!(summary.late, 1);
  assert_eq!(summary.absent, 1);
  assert_eq!(summary.present, 0);
  assert_eq!(summary.total, 2);

  let report = db
    .room_attendance_summary(&room.id, day(1), day(2))
    .await
    .expect("Failed to build room report");
  assert_eq!(report.len(), 2);
  let alice_row = report
    .iter()
    .find(|r| r.student_id == alice.user_id)
    .expect("Alice missing");
  assert_eq!(alice_row.present, 1);
}

#[tokio::test]
async fn test_health_record_computes_bmi() {
  let Some(db) = setup_test_db().await else { return };

  let teacher = create_test_user(&db, Role::Teacher).await;
  let student = create_test_student(&db, None).await;

  let record = db
    .create_health_record(
      &student.user_id,
      &teacher.id,
      &HealthRecordInput {
        recorded_on: day(10),
        weight_kg: Some(50.0),
        height_cm: Some(160.0),
        vision_left: None,
        vision_right: None,
        notes: None,
      },
    )
    .await
    .expect("Failed to create health record");
  assert_eq!(record.bmi, Some(19.53));

  let records = db
    .list_health_records(&student.user_id)
    .await
    .expect("Failed to list health records");
  assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_home_visits_by_student_and_teacher() {
  let Some(db) = setup_test_db().await else { return };

  let teacher = create_test_user(&db, Role::Teacher).await;
  let student = create_test_student(&db, None).await;

  let visit = db
    .create_home_visit(
      &teacher.id,
      &HomeVisitInput {
        student_id: student.user_id,
        visited_on: day(12),
        address: Some("12 Village Rd".to_string()),
        summary: "Met both guardians".to_string(),
        living_condition: None,
        recommendations: None,
      },
    )
    .await
    .expect("Failed to create home visit");

  let by_student = db
    .list_home_visits_by_student(&student.user_id)
    .await
    .expect("Failed to list visits");
  assert_eq!(by_student.len(), 1);
  assert_eq!(by_student[0].id, visit.id);

  let by_teacher = db
    .list_home_visits_by_teacher(&teacher.id)
    .await
    .expect("Failed to list visits");
  assert_eq!(by_teacher.len(), 1);
}

#[tokio::test]
async fn test_attendance_for_student_outside_room_is_rejected() {
  let Some(db) = setup_test_db().await else { return };

  let teacher = create_test_user(&db, Role::Teacher).await;
  let room = create_test_room(&db, None).await;
  let subject = create_test_subject(&db, room.id, Some(teacher.id), 1.0).await;
  let member = create_test_student(&db, Some(room.id)).await;
  let unassigned = create_test_student(&db, None).await;

  let entries = vec![
    AttendanceEntry {
      student_id: member.user_id,
      status: AttendanceStatus::Present,
      note: None,
    },
    AttendanceEntry {
      student_id: unassigned.user_id,
      status: AttendanceStatus::Present,
      note: None,
    },
  ];
  let err = db
    .record_attendance(&subject.id, day(20), &teacher.id, &entries)
    .await
    .expect_err("Student without the subject's room should be rejected");

  assert_eq!(err.code(), Some("22023"));
  assert!(err.to_string().contains(&unassigned.user_id.to_string()));
  assert!(db
    .list_attendance(&subject.id, day(20))
    .await
    .expect("Failed to list attendance")
    .is_empty());
}
