// Integration tests for the pooled query core against a live database
use crate::common::{setup_test_db, unreachable_db};
use school_backend::db::core::DbError;
use school_backend::params;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_health_check_reports_healthy() {
  let Some(db) = setup_test_db().await else { return };

  let report = db.health_check().await;
  assert!(report.is_healthy(), "unhealthy: {:?}", report.error);
  let metrics = report.metrics.expect("Healthy report carries metrics");
  assert!(metrics.total_queries >= 1);
}

#[tokio::test]
async fn test_rolled_back_transaction_is_not_visible() {
  let Some(db) = setup_test_db().await else { return };

  let room_id = Uuid::new_v4();
  let name = format!("rollback-{}", room_id);
  let result: Result<(), DbError> = db
    .core()
    .transaction(move |tx| {
      Box::pin(async move {
        tx.execute(
          "INSERT INTO rooms (id, name, academic_year) VALUES ($1, $2, '2025')",
          &params![room_id, name.as_str()],
        )
        .await?;
        Err(DbError::Application {
          code: "P0001".to_string(),
          message: "abort".to_string(),
        })
      })
    })
    .await;

  assert!(matches!(result, Err(DbError::Application { .. })));
  assert!(db
    .get_room(&room_id)
    .await
    .expect("Failed to get room")
    .is_none());
}

#[tokio::test]
async fn test_committed_transaction_is_visible() {
  let Some(db) = setup_test_db().await else { return };

  let room_id = Uuid::new_v4();
  let name = format!("commit-{}", room_id);
  let inserted = db
    .core()
    .transaction(move |tx| {
      Box::pin(async move {
        let rows = tx
          .execute(
            "INSERT INTO rooms (id, name, academic_year) VALUES ($1, $2, '2025') RETURNING id",
            &params![room_id, name.as_str()],
          )
          .await?;
        Ok::<_, DbError>(rows.len())
      })
    })
    .await
    .expect("Transaction failed");

  assert_eq!(inserted, 1);
  assert!(db
    .get_room(&room_id)
    .await
    .expect("Failed to get room")
    .is_some());
}

#[tokio::test]
async fn test_slow_transaction_times_out() {
  let Some(db) = setup_test_db().await else { return };

  let result: Result<(), DbError> = db
    .core()
    .transaction_with_timeout(Duration::from_millis(100), |tx| {
      Box::pin(async move {
        tx.execute("SELECT pg_sleep(1)", &params![]).await?;
        Ok(())
      })
    })
    .await;

  assert!(matches!(result, Err(DbError::TransactionTimeout(_))));
  let snapshot = db.core().pool_snapshot();
  assert_eq!(snapshot.pool.waiting, 0);
  assert!(snapshot.metrics.last_error.is_some());
}

#[tokio::test]
async fn test_invalid_sql_is_not_retried() {
  let Some(db) = setup_test_db().await else { return };

  let before = db.core().metrics().snapshot().total_queries;
  let err = match db.core().query("SELECT * FROM no_such_table", &params![]).await {
    Ok(_) => panic!("Query should fail"),
    Err(e) => e,
  };
  assert!(err.is_non_retryable());
  assert_eq!(err.code(), Some("42P01"));

  let after = db.core().metrics().snapshot().total_queries;
  assert_eq!(after - before, 1);
}

#[tokio::test]
async fn test_unreachable_database_is_unhealthy() {
  let db = unreachable_db();

  let report = db.health_check().await;
  assert!(!report.is_healthy());
  assert!(report.error.is_some());
  assert!(report.metrics.is_none());
}
