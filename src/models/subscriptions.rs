use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::plans::Plan;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_EXPIRED: &str = "expired";

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// The resolved view of a user's current plan. `end_date` is None when the
/// user fell back to the trial plan without ever subscribing to it.
#[derive(Clone, Debug, Serialize)]
pub struct ActivePlan {
    pub plan_id: String,
    pub name: String,
    pub level: i32,
    pub price: i64,
    pub commission_per_task: i64,
    pub daily_quota: i32,
    pub end_date: Option<DateTime<Utc>>,
    pub trial: bool,
}

impl ActivePlan {
    pub fn from_plan(plan: &Plan, end_date: Option<DateTime<Utc>>, trial: bool) -> Self {
        ActivePlan {
            plan_id: plan.id.clone(),
            name: plan.name.clone(),
            level: plan.level,
            price: plan.price,
            commission_per_task: plan.commission_per_task,
            daily_quota: plan.daily_quota,
            end_date,
            trial,
        }
    }
}
