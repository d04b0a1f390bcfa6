// User account database operations
use uuid::Uuid;

use crate::db::common::IdRow;
use crate::db::core::DbError;
use crate::db::{
    models::{Role, User},
    Database,
};
use crate::params;

impl Database {
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: Option<&str>,
        first_name: &str,
        last_name: &str,
        phone: Option<&str>,
        role: Role,
    ) -> Result<User, DbError> {
        self.fetch_one(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, phone, role)
             VALUES ($1, $2, $3, $4, $5, $6, $7::user_role)
             RETURNING id, email, password_hash, first_name, last_name, phone, role, created_at, updated_at",
            &params![
                Uuid::new_v4(),
                email.trim().to_lowercase(),
                password_hash,
                first_name,
                last_name,
                phone,
                role.as_str()
            ],
        )
        .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        self.fetch_optional(
            "SELECT id, email, password_hash, first_name, last_name, phone, role, created_at, updated_at
             FROM users
             WHERE email = $1",
            &params![email.trim().to_lowercase()],
        )
        .await
    }

    pub async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, DbError> {
        self.fetch_optional(
            "SELECT id, email, password_hash, first_name, last_name, phone, role, created_at, updated_at
             FROM users
             WHERE id = $1",
            &params![id],
        )
        .await
    }

    /// All users, or only those with `role`, ordered by name.
    pub async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>, DbError> {
        self.fetch_all(
            "SELECT id, email, password_hash, first_name, last_name, phone, role, created_at, updated_at
             FROM users
             WHERE $1::user_role IS NULL OR role = $1::user_role
             ORDER BY first_name, last_name",
            &params![role.map(|r| r.as_str())],
        )
        .await
    }

    pub async fn update_user_profile(
        &self,
        id: &Uuid,
        first_name: Option<&str>,
        last_name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<User>, DbError> {
        self.fetch_optional(
            "UPDATE users
             SET first_name = COALESCE($2, first_name),
                 last_name = COALESCE($3, last_name),
                 phone = COALESCE($4, phone),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING id, email, password_hash, first_name, last_name, phone, role, created_at, updated_at",
            &params![id, first_name, last_name, phone],
        )
        .await
    }

    pub async fn update_user_role(&self, id: &Uuid, role: Role) -> Result<Option<User>, DbError> {
        self.fetch_optional(
            "UPDATE users
             SET role = $2::user_role, updated_at = NOW()
             WHERE id = $1
             RETURNING id, email, password_hash, first_name, last_name, phone, role, created_at, updated_at",
            &params![id, role.as_str()],
        )
        .await
    }

    pub async fn update_user_password(&self, id: &Uuid, password_hash: &str) -> Result<bool, DbError> {
        let updated = self
            .fetch_optional::<IdRow>(
                "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1 RETURNING id",
                &params![id, password_hash],
            )
            .await?;
        Ok(updated.is_some())
    }

    pub async fn delete_user(&self, id: &Uuid) -> Result<bool, DbError> {
        let deleted = self
            .execute("DELETE FROM users WHERE id = $1 RETURNING id", &params![id])
            .await?;
        Ok(deleted > 0)
    }
}
