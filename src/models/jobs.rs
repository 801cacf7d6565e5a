use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Job {
    pub id: String,
    pub title: String,
    pub video_url: String,
    /// Display metadata. The amount actually credited on a claim is the
    /// claimer's plan `commission_per_task`.
    pub reward_amount: i64,
    pub min_plan_level: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct TaskCompletion {
    pub id: String,
    pub user_id: String,
    pub job_id: String,
    pub amount_earned: i64,
    pub completed_at: DateTime<Utc>,
}

impl TaskCompletion {
    pub fn new(user_id: &str, job_id: &str, amount_earned: i64, completed_at: DateTime<Utc>) -> Self {
        TaskCompletion {
            id: Uuid::new_v4().hyphenated().to_string(),
            user_id: user_id.to_owned(),
            job_id: job_id.to_owned(),
            amount_earned,
            completed_at,
        }
    }
}

/// Jobs visible to a user plus the ones already done in the current reward
/// period, so callers can grey them out.
#[derive(Clone, Debug, Serialize)]
pub struct JobBoard {
    pub jobs: Vec<Job>,
    pub completed_job_ids: Vec<String>,
}
