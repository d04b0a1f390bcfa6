use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;
use uuid::Uuid;

/// A typed, nullable bind parameter.
///
/// Nulls keep their type so Postgres can resolve `$n` without an explicit cast.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Bool(Option<bool>),
    Int(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
    Uuid(Option<Uuid>),
    Timestamp(Option<DateTime<Utc>>),
    Date(Option<NaiveDate>),
    Json(Option<serde_json::Value>),
}

impl SqlParam {
    pub fn is_null(&self) -> bool {
        match self {
            SqlParam::Bool(v) => v.is_none(),
            SqlParam::Int(v) => v.is_none(),
            SqlParam::Float(v) => v.is_none(),
            SqlParam::Text(v) => v.is_none(),
            SqlParam::Uuid(v) => v.is_none(),
            SqlParam::Timestamp(v) => v.is_none(),
            SqlParam::Date(v) => v.is_none(),
            SqlParam::Json(v) => v.is_none(),
        }
    }

    pub(crate) fn bind_to<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        match self.clone() {
            SqlParam::Bool(v) => query.bind(v),
            SqlParam::Int(v) => query.bind(v),
            SqlParam::Float(v) => query.bind(v),
            SqlParam::Text(v) => query.bind(v),
            SqlParam::Uuid(v) => query.bind(v),
            SqlParam::Timestamp(v) => query.bind(v),
            SqlParam::Date(v) => query.bind(v),
            SqlParam::Json(v) => query.bind(v),
        }
    }
}

macro_rules! impl_from_param {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for SqlParam {
            fn from(value: $ty) -> Self {
                SqlParam::$variant(Some(value.into()))
            }
        }

        impl From<Option<$ty>> for SqlParam {
            fn from(value: Option<$ty>) -> Self {
                SqlParam::$variant(value.map(Into::into))
            }
        }
    };
}

impl_from_param!(Bool, bool);
impl_from_param!(Int, i64);
impl_from_param!(Int, i32);
impl_from_param!(Float, f64);
impl_from_param!(Text, String);
impl_from_param!(Uuid, Uuid);
impl_from_param!(Timestamp, DateTime<Utc>);
impl_from_param!(Date, NaiveDate);
impl_from_param!(Json, serde_json::Value);

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(Some(value.to_string()))
    }
}

impl From<Option<&str>> for SqlParam {
    fn from(value: Option<&str>) -> Self {
        SqlParam::Text(value.map(str::to_string))
    }
}

impl From<&String> for SqlParam {
    fn from(value: &String) -> Self {
        SqlParam::Text(Some(value.clone()))
    }
}

impl From<&Uuid> for SqlParam {
    fn from(value: &Uuid) -> Self {
        SqlParam::Uuid(Some(*value))
    }
}

/// Build a `Vec<SqlParam>` from heterogeneous values.
///
/// ```ignore
/// let params = params![user_id, "teacher", Some(42_i64)];
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::db::core::SqlParam>::new()
    };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::db::core::SqlParam::from($value)),+]
    };
}
