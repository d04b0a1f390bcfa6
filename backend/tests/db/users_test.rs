// Integration tests for users database operations
use crate::common::{create_test_user, setup_test_db};
use school_backend::db::Role;
use uuid::Uuid;

#[tokio::test]
async fn test_user_creation_and_lookup() {
  let Some(db) = setup_test_db().await else { return };

  let email = format!("lookup-{}@school.test", Uuid::new_v4());
  let user = db
    .create_user(&email, Some("hash"), "Jane", "Smith", Some("0800000000"), Role::Teacher)
    .await
    .expect("Failed to create user");

  assert_eq!(user.email, email);
  assert_eq!(user.role, Role::Teacher);

  let by_email = db
    .get_user_by_email(&email)
    .await
    .expect("Failed to get user by email")
    .expect("User not found");
  assert_eq!(by_email.id, user.id);

  let by_id = db
    .get_user_by_id(&user.id)
    .await
    .expect("Failed to get user by id")
    .expect("User not found");
  assert_eq!(by_id.first_name, "Jane");
  assert_eq!(by_id.phone.as_deref(), Some("0800000000"));
}

#[tokio::test]
async fn test_duplicate_email_is_unique_violation() {
  let Some(db) = setup_test_db().await else { return };

  let user = create_test_user(&db, Role::Student).await;
  let err = db
    .create_user(&user.email, None, "Dup", "User", None, Role::Student)
    .await
    .expect_err("Duplicate email should be rejected");

  assert!(err.is_unique_violation(), "unexpected error: {}", err);
  assert!(err.is_non_retryable());
}

#[tokio::test]
async fn test_role_update_and_delete() {
  let Some(db) = setup_test_db().await else { return };

  let user = create_test_user(&db, Role::Student).await;
  let updated = db
    .update_user_role(&user.id, Role::Teacher)
    .await
    .expect("Failed to update role")
    .expect("User not found");
  assert_eq!(updated.role, Role::Teacher);

  let teachers = db
    .list_users(Some(Role::Teacher))
    .await
    .expect("Failed to list users");
  assert!(teachers.iter().any(|u| u.id == user.id));
  assert!(teachers.iter().all(|u| u.role == Role::Teacher));

  assert!(db.delete_user(&user.id).await.expect("Failed to delete user"));
  assert!(!db.delete_user(&user.id).await.expect("Failed to delete user"));
  assert!(db
    .get_user_by_id(&user.id)
    .await
    .expect("Failed to get user")
    .is_none());
}

#[tokio::test]
async fn test_password_update() {
  let Some(db) = setup_test_db().await else { return };

  let user = create_test_user(&db, Role::Admin).await;
  assert!(db
    .update_user_password(&user.id, "new-hash")
    .await
    .expect("Failed to update password"));
  assert!(!db
    .update_user_password(&Uuid::new_v4(), "new-hash")
    .await
    .expect("Failed to update password"));

  let reloaded = db
    .get_user_by_id(&user.id)
    .await
    .expect("Failed to get user")
    .expect("User not found");
  assert_eq!(reloaded.password_hash.as_deref(), Some("new-hash"));
}
