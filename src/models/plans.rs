use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Plan {
    pub id: String,
    pub name: String,
    /// Tier ordering used for job visibility (`jobs.min_plan_level`).
    pub level: i32,
    pub price: i64,
    /// Amount credited to the member per completed task.
    pub commission_per_task: i64,
    pub daily_quota: i32,
    pub duration_days: i32,
    /// Purchase gate: required count of direct referrals holding an active
    /// non-trial subscription. Zero disables the gate.
    pub min_direct_referrals: i32,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
