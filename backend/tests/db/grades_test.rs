// Integration tests for grade recording and import
use crate::common::{create_test_room, create_test_student, create_test_subject, create_test_user, setup_test_db};
use school_backend::db::grades::{gpa, ImportedGrade};
use school_backend::db::{GradeEntry, Role};

#[tokio::test]
async fn test_upsert_grades_computes_total_and_point() {
  let Some(db) = setup_test_db().await else { return };

  let teacher = create_test_user(&db, Role::Teacher).await;
  let room = create_test_room(&db, None).await;
  let subject = create_test_subject(&db, room.id, Some(teacher.id), 2.0).await;
  let student = create_test_student(&db, Some(room.id)).await;

  let entry = GradeEntry {
    student_id: student.user_id,
    coursework: 30.0,
    midterm: 20.0,
    final_exam: 27.0,
  };
  let count = db
    .upsert_grades(&subject.id, &teacher.id, &[entry.clone()])
    .await
    .expect("Failed to upsert grades");
  assert_eq!(count, 1);

  let grades = db
    .list_subject_grades(&subject.id)
    .await
    .expect("Failed to list grades");
  assert_eq!(grades.len(), 1);
  assert_eq!(grades[0].total, 77.0);
  assert_eq!(grades[0].grade_point, 3.5);

  // Second write replaces the first
  let better = GradeEntry {
    final_exam: 35.0,
    ..entry
  };
  db.upsert_grades(&subject.id, &teacher.id, &[better])
    .await
    .expect("Failed to upsert grades");

  let mine = db
    .list_student_grades(&student.user_id)
    .await
    .expect("Failed to list student grades");
  assert_eq!(mine.len(), 1);
  assert_eq!(mine[0].total, 85.0);
  assert_eq!(gpa(&mine), Some(4.0));
}

#[tokio::test]
async fn test_out_of_range_batch_writes_nothing() {
  let Some(db) = setup_test_db().await else { return };

  let teacher = create_test_user(&db, Role::Teacher).await;
  let room = create_test_room(&db, None).await;
  let subject = create_test_subject(&db, room.id, Some(teacher.id), 1.0).await;
  let first = create_test_student(&db, Some(room.id)).await;
  let second = create_test_student(&db, Some(room.id)).await;

  let entries = vec![
    GradeEntry {
      student_id: first.user_id,
      coursework: 10.0,
      midterm: 10.0,
      final_exam: 10.0,
    },
    GradeEntry {
      student_id: second.user_id,
      coursework: 60.0,
      midterm: 30.0,
      final_exam: 30.0,
    },
  ];
  let err = db
    .upsert_grades(&subject.id, &teacher.id, &entries)
    .await
    .expect_err("Total above 100 should be rejected");
  assert_eq!(err.code(), Some("22003"));

  let grades = db
    .list_subject_grades(&subject.id)
    .await
    .expect("Failed to list grades");
  assert!(grades.is_empty());
}

#[tokio::test]
async fn test_import_reports_unknown_codes() {
  let Some(db) = setup_test_db().await else { return };

  let teacher = create_test_user(&db, Role::Teacher).await;
  let room = create_test_room(&db, None).await;
  let other_room = create_test_room(&db, None).await;
  let subject = create_test_subject(&db, room.id, Some(teacher.id), 1.0).await;
  let student = create_test_student(&db, Some(room.id)).await;
  let outsider = create_test_student(&db, Some(other_room.id)).await;

  let rows = vec![
    ImportedGrade {
      student_code: student.student_code.clone(),
      coursework: 20.0,
      midterm: 20.0,
      final_exam: 20.0,
    },
    ImportedGrade {
      student_code: outsider.student_code.clone(),
      coursework: 20.0,
      midterm: 20.0,
      final_exam: 20.0,
    },
    ImportedGrade {
      student_code: "NO-SUCH-CODE".to_string(),
      coursework: 1.0,
      midterm: 1.0,
      final_exam: 1.0,
    },
  ];
  let outcome = db
    .import_grades(&subject.id, &teacher.id, rows)
    .await
    .expect("Failed to import grades");

  assert_eq!(outcome.imported, 1);
  assert_eq!(
    outcome.unknown_students,
    vec![outsider.student_code.clone(), "NO-SUCH-CODE".to_string()]
  );

  let grades = db
    .list_subject_grades(&subject.id)
    .await
    .expect("Failed to list grades");
  assert_eq!(grades.len(), 1);
  assert_eq!(grades[0].student_code, student.student_code);
  assert_eq!(grades[0].grade_point, 2.0);
}

#[tokio::test]
async fn test_grades_for_student_outside_room_are_rejected() {
  let Some(db) = setup_test_db().await else { return };

  let teacher = create_test_user(&db, Role::Teacher).await;
  let room = create_test_room(&db, None).await;
  let other_room = create_test_room(&db, None).await;
  let subject = create_test_subject(&db, room.id, Some(teacher.id), 1.0).await;
  let member = create_test_student(&db, Some(room.id)).await;
  let outsider = create_test_student(&db, Some(other_room.id)).await;

  let entries = vec![
    GradeEntry {
      student_id: member.user_id,
      coursework: 20.0,
      midterm: 20.0,
      final_exam: 20.0,
    },
    GradeEntry {
      student_id: outsider.user_id,
      coursework: 20.0,
      midterm: 20.0,
      final_exam: 20.0,
    },
  ];
  let err = db
    .upsert_grades(&subject.id, &teacher.id, &entries)
    .await
    .expect_err("Student from another room should be rejected");

  assert_eq!(err.code(), Some("22023"));
  assert!(err.to_string().contains(&outsider.user_id.to_string()));
  assert!(!err.to_string().contains(&member.user_id.to_string()));

  // Nothing from the batch was written
  let grades = db
    .list_subject_grades(&subject.id)
    .await
    .expect("Failed to list grades");
  assert!(grades.is_empty());
}
