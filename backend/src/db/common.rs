use sqlx::postgres::PgRow;
use sqlx::FromRow;

use crate::db::core::{DbError, SqlParam};
use crate::db::{Database, PgTx};

pub(crate) fn decode_all<T>(rows: Vec<PgRow>) -> Result<Vec<T>, DbError>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    rows.iter()
        .map(|row| T::from_row(row).map_err(DbError::from))
        .collect()
}

pub(crate) fn decode_first<T>(rows: Vec<PgRow>) -> Result<Option<T>, DbError>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    match rows.first() {
        Some(row) => Ok(Some(T::from_row(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn decode_one<T>(rows: Vec<PgRow>) -> Result<T, DbError>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    decode_first(rows)?.ok_or_else(|| DbError::Decode("statement returned no rows".to_string()))
}

// Typed wrappers over the core query interface
impl Database {
    pub(crate) async fn fetch_all<T>(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<T>, DbError>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        decode_all(self.core().query(sql, params).await?)
    }

    pub(crate) async fn fetch_optional<T>(
        &self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Option<T>, DbError>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        decode_first(self.core().query(sql, params).await?)
    }

    pub(crate) async fn fetch_one<T>(&self, sql: &str, params: &[SqlParam]) -> Result<T, DbError>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        decode_one(self.core().query(sql, params).await?)
    }

    /// Run a statement and report how many rows it returned.
    pub(crate) async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<usize, DbError> {
        Ok(self.core().query(sql, params).await?.len())
    }
}

pub(crate) async fn tx_fetch_one<T>(tx: &mut PgTx, sql: &str, params: &[SqlParam]) -> Result<T, DbError>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    decode_one(tx.execute(sql, params).await?)
}

pub(crate) async fn tx_fetch_optional<T>(
    tx: &mut PgTx,
    sql: &str,
    params: &[SqlParam],
) -> Result<Option<T>, DbError>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    decode_first(tx.execute(sql, params).await?)
}

/// Single-column `id` row, for `RETURNING id` statements.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct IdRow {
    pub id: uuid::Uuid,
}

/// Single-column `exists` row.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ExistsRow {
    pub exists: bool,
}
