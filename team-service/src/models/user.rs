//! User model - actor and invitee identities.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// User entity. Emails are stored lowercased and are unique across the platform.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, display_name: Option<String>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email: email.to_lowercase(),
            display_name,
            created_utc: Utc::now(),
        }
    }

    /// Name to show in notifications and previews; falls back to the email.
    pub fn visible_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }
}

/// User response for API.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            email: u.email,
            display_name: u.display_name,
        }
    }
}
