use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated caller. Users are provisioned by the external auth
/// service; this crate only reads them.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub preferred_unit: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserSession {
    pub id: i64,
    pub user_id: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UserSession {
    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_at: DateTime<Utc>) -> UserSession {
        UserSession {
            id: 1,
            user_id: "user".to_string(),
            token: "token".to_string(),
            created_at: Utc::now(),
            expires_at,
        }
    }

    #[test]
    fn session_validity_follows_expiry() {
        assert!(session(Utc::now() + Duration::hours(1)).is_valid());
        assert!(!session(Utc::now() - Duration::seconds(1)).is_valid());
    }
}
