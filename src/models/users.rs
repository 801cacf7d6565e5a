use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::subscriptions::ActivePlan;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_BANNED: &str = "banned";

pub const ROLE_MEMBER: &str = "member";

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub referral_code: String,
    /// Set once at registration, immutable afterwards. Forms a forest since
    /// it can only point at a user that already existed.
    pub referrer_id: Option<String>,
    pub status: String,
    pub role: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub referral_code: Option<String>,
}

/// Referral codes are handed out to users so others can register under them.
pub fn generate_referral_code() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("REF-{}", raw[..8].to_uppercase())
}

#[derive(Clone, Debug, Serialize)]
pub struct Profile {
    pub user: User,
    pub balance: i64,
    pub today_income: i64,
    pub tasks_done_today: i64,
    pub plan: Option<ActivePlan>,
}
