//! API models for request and response payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod photo;

/// Account role, stored as text in the users table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    /// Text form used in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Parse the stored text form; unknown values downgrade to `User`
    pub fn from_db(value: &str) -> Self {
        match value {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

/// User entity, provisioned idempotently from identity-provider sign-ins
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Profile payload for the idempotent user sync after sign-in
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUserRequest {
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Response for the role lookup endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRoleResponse {
    pub user_id: Uuid,
    pub role: Role,
}

/// Response for the per-user photo allowance endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoCountResponse {
    pub count: i64,
    pub remaining_uploads: i64,
    pub max_uploads: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_db_text() {
        assert_eq!(Role::from_db(Role::Admin.as_str()), Role::Admin);
        assert_eq!(Role::from_db(Role::User.as_str()), Role::User);
    }

    #[test]
    fn unknown_role_text_downgrades_to_user() {
        assert_eq!(Role::from_db("superuser"), Role::User);
        assert_eq!(Role::from_db(""), Role::User);
    }
}
