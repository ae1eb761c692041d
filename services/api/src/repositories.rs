//! Repositories for database operations

use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Role, SyncUserRequest, User};

pub mod photo;

/// User repository for database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a user by the identity provider's subject id
    pub async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, external_id, email, username, first_name, last_name,
                   avatar_url, role, created_at, updated_at
            FROM users
            WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(map_user_row))
    }

    /// Create or refresh a user from identity-provider profile data.
    /// Idempotent: repeated syncs for the same subject update the profile
    /// in place and never touch the role.
    pub async fn upsert(&self, external_id: &str, payload: &SyncUserRequest) -> Result<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (id, external_id, email, username, first_name,
                               last_name, avatar_url, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (external_id) DO UPDATE SET
                email = EXCLUDED.email,
                username = EXCLUDED.username,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                avatar_url = EXCLUDED.avatar_url,
                updated_at = NOW()
            RETURNING id, external_id, email, username, first_name, last_name,
                      avatar_url, role, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(external_id)
        .bind(&payload.email)
        .bind(&payload.username)
        .bind(&payload.first_name)
        .bind(&payload.last_name)
        .bind(&payload.avatar_url)
        .bind(Role::User.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(map_user_row(row))
    }
}

fn map_user_row(row: PgRow) -> User {
    let role: String = row.get("role");

    User {
        id: row.get("id"),
        external_id: row.get("external_id"),
        email: row.get("email"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        avatar_url: row.get("avatar_url"),
        role: Role::from_db(&role),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
