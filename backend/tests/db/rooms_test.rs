// Integration tests for rooms, student profiles and subjects
use crate::common::{create_test_room, create_test_student, create_test_subject, create_test_user, setup_test_db};
use school_backend::db::{Role, RoomInput};
use uuid::Uuid;

#[tokio::test]
async fn test_room_crud() {
  let Some(db) = setup_test_db().await else { return };

  let teacher = create_test_user(&db, Role::Teacher).await;
  let room = create_test_room(&db, Some(teacher.id)).await;
  assert_eq!(room.homeroom_teacher_id, Some(teacher.id));

  let input = RoomInput {
    name: format!("renamed-{}", Uuid::new_v4()),
    grade_level: None,
    academic_year: "2026".to_string(),
    homeroom_teacher_id: None,
  };
  let updated = db
    .update_room(&room.id, &input)
    .await
    .expect("Failed to update room")
    .expect("Room not found");
  assert_eq!(updated.name, input.name);
  assert_eq!(updated.homeroom_teacher_id, None);

  assert!(db.delete_room(&room.id).await.expect("Failed to delete room"));
  assert!(db.get_room(&room.id).await.expect("Failed to get room").is_none());
}

#[tokio::test]
async fn test_duplicate_room_name_in_same_year() {
  let Some(db) = setup_test_db().await else { return };

  let room = create_test_room(&db, None).await;
  let err = db
    .create_room(&RoomInput {
      name: room.name.clone(),
      grade_level: None,
      academic_year: room.academic_year.clone(),
      homeroom_teacher_id: None,
    })
    .await
    .expect_err("Duplicate room should be rejected");
  assert!(err.is_unique_violation());
}

#[tokio::test]
async fn test_room_roster_and_assignment() {
  let Some(db) = setup_test_db().await else { return };

  let room = create_test_room(&db, None).await;
  let other = create_test_room(&db, None).await;
  let student = create_test_student(&db, Some(room.id)).await;

  let roster = db
    .list_room_students(&room.id)
    .await
    .expect("Failed to list room students");
  assert_eq!(roster.len(), 1);
  assert_eq!(roster[0].user_id, student.user_id);
  assert_eq!(roster[0].room_name.as_deref(), Some(room.name.as_str()));

  assert!(db
    .assign_student_room(&student.user_id, Some(other.id))
    .await
    .expect("Failed to assign room"));
  assert!(db
    .list_room_students(&room.id)
    .await
    .expect("Failed to list room students")
    .is_empty());

  let by_code = db
    .get_student_by_code(&student.student_code)
    .await
    .expect("Failed to get student by code")
    .expect("Student not found");
  assert_eq!(by_code.room_id, Some(other.id));
}

#[tokio::test]
async fn test_teacher_access_follows_room() {
  let Some(db) = setup_test_db().await else { return };

  let homeroom = create_test_user(&db, Role::Teacher).await;
  let subject_teacher = create_test_user(&db, Role::Teacher).await;
  let stranger = create_test_user(&db, Role::Teacher).await;

  let room = create_test_room(&db, Some(homeroom.id)).await;
  let subject = create_test_subject(&db, room.id, Some(subject_teacher.id), 1.5).await;
  let student = create_test_student(&db, Some(room.id)).await;

  assert!(db
    .teacher_can_access_student(&homeroom.id, &student.user_id)
    .await
    .expect("Access check failed"));
  assert!(db
    .teacher_can_access_student(&subject_teacher.id, &student.user_id)
    .await
    .expect("Access check failed"));
  assert!(!db
    .teacher_can_access_student(&stranger.id, &student.user_id)
    .await
    .expect("Access check failed"));

  assert!(db
    .teacher_teaches_subject(&subject_teacher.id, &subject.id)
    .await
    .expect("Subject check failed"));
  assert!(!db
    .teacher_teaches_subject(&homeroom.id, &subject.id)
    .await
    .expect("Subject check failed"));

  let taught = db
    .list_teacher_subjects(&subject_teacher.id)
    .await
    .expect("Failed to list teacher subjects");
  assert_eq!(taught.len(), 1);
  assert_eq!(taught[0].credits, 1.5);
}

#[tokio::test]
async fn test_subject_in_missing_room_is_foreign_key_violation() {
  let Some(db) = setup_test_db().await else { return };

  let err = db
    .create_subject(&school_backend::db::SubjectInput {
      code: "NOPE".to_string(),
      name: "Orphan".to_string(),
      room_id: Uuid::new_v4(),
      teacher_id: None,
      credits: None,
      semester: "2025/1".to_string(),
    })
    .await
    .expect_err("Subject without a room should be rejected");
  assert!(err.is_foreign_key_violation());
}
